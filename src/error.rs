use std::path::PathBuf;

use thiserror::Error;

use crate::hash::Hash;

pub type Result<T> = std::result::Result<T, Pyp4Error>;

#[derive(Error, Debug)]
pub enum Pyp4Error {
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("{}: {source}", .path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),
    #[error("invalid package: {0}")]
    InvalidFormat(String),
    #[error("package is version {found}, this build reads version {expected}")]
    VersionMismatch { found: u16, expected: u16 },
    #[error("hash mismatch for {}: declared {declared}, computed {computed}", .path.display())]
    IntegrityFailure {
        path: PathBuf,
        declared: Hash,
        computed: Hash,
    },
    #[error("{0}")]
    CryptoMisuse(&'static str),
    #[error("package truncated while reading {field}")]
    Truncated { field: &'static str },
    #[error("{}: package ends inside chunk {chunk}", .path.display())]
    BodyTruncated { path: PathBuf, chunk: usize },
    #[error("name is {len} bytes, longest permitted is 255: {name}")]
    NameTooLong { name: String, len: usize },
    #[error("{}: chunk {chunk} encoded to {len} bytes, over the u16 chunk limit", .path.display())]
    ChunkOverflow {
        path: PathBuf,
        chunk: usize,
        len: usize,
    },
    #[error("{}: chunk {chunk} failed to decode (wrong key or corrupt data)", .path.display())]
    ChunkDecode {
        path: PathBuf,
        chunk: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("chunk size {0} is outside 1..=61440")]
    InvalidChunkSize(usize),
    #[error(transparent)]
    MetadataEncode(#[from] rmp_serde::encode::Error),
    #[error(transparent)]
    MetadataDecode(#[from] rmp_serde::decode::Error),
    #[error(transparent)]
    Walk(#[from] ignore::Error),
}

impl Pyp4Error {
    /// Turns an unexpected end of file into [`Pyp4Error::Truncated`]
    pub(crate) fn eof(field: &'static str) -> impl FnOnce(std::io::Error) -> Pyp4Error {
        move |e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Pyp4Error::Truncated { field },
            _ => Pyp4Error::IO(e),
        }
    }

    pub(crate) fn at(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Pyp4Error {
        let path = path.into();
        move |source| match source.kind() {
            std::io::ErrorKind::NotFound => Pyp4Error::NotFound(path),
            std::io::ErrorKind::AlreadyExists => Pyp4Error::AlreadyExists(path),
            _ => Pyp4Error::Path { path, source },
        }
    }
}
