//! pyp4 package file format
//!
//! A package is written in a single forward pass, the index of what it holds
//! lives at the end of the file and is located through a pointer in the last 8
//! bytes. Unless other wise noted everything is stored in Little Endian format.
//!
//! # Top Level
//!
//! | Type         | Name    | Description |
//! | -----------: | ------- | ----------- |
//! | [u8; 9]      | magic   | `PYPAKKET4` |
//! | Body * N     | bodies  | One body per file, in file table order |
//! | Trailer      | trailer | Package header, directory table and file table |
//! | u64          | footer  | Absolute offset of the trailer's `version` field |
//!
//! # Body
//!
//! | Type         | Name    | Description |
//! | -----------: | ------- | ----------- |
//! | [u8; N] * M  | chunks  | Compressed (and possibly encrypted) chunks, no framing |
//! | [u8; 32]     | hash    | BLAKE2b-256 of the file's plaintext, never encrypted |
//!
//! Chunk boundaries are only known through the chunk table in the trailer. Each
//! chunk is a standalone zlib stream of up to `chunk_size` plaintext bytes, when
//! encryption is on it is then run through AES-128-CFB8 starting from the
//! package IV. No cipher state carries from one chunk to the next.
//!
//! # Trailer
//!
//! Fields marked `sealed` are encrypted one by one with a fresh cipher when the
//! package is encrypted. The chunk tables are always plaintext.
//!
//! | Type     | Name        | Sealed | Description |
//! | -------: | ----------- | :----: | ----------- |
//! | u16      | version     |        | Format version, see [`crate::VERSION`] |
//! | u8       | encrypted   |        | `0` or `1` |
//! | [u8; 16] | iv          |        | Only present when `encrypted == 1` |
//! | u8       | name length | yes    | |
//! | [u8; N]  | name        | yes    | UTF-8 package name |
//! | u32      | meta length | yes    | |
//! | [u8; N]  | metadata    | yes    | MessagePack blob, opaque here |
//! | u64      | created     | yes    | POSIX seconds |
//! | u48      | dir count   | yes    | |
//! | Dir * N  | directories | yes    | u8 length then UTF-8 `/` separated path, `.` is the root |
//! | u48      | file count  | yes    | |
//! | File * N | files       |        | See below |
//!
//! ## File
//!
//! | Type     | Name            | Sealed | Description |
//! | -------: | --------------- | :----: | ----------- |
//! | u8       | name length     | yes    | |
//! | [u8; N]  | name            | yes    | UTF-8 base name |
//! | u64      | size            | yes    | Plaintext length |
//! | [u8; 32] | hash            | yes    | Same digest as the body trailer |
//! | u64      | compressed size | yes    | Sum of the chunk table |
//! | u32      | dir id          | yes    | Index into the directory table |
//! | u64      | last modified   | yes    | POSIX seconds |
//! | u64      | base offset     | yes    | Absolute offset of the first chunk |
//! | u48      | chunk count     | no     | |
//! | u16 * N  | chunk sizes     | no     | Encoded length of each chunk |
use std::path::PathBuf;

use time::OffsetDateTime;

use crate::error::{Pyp4Error, Result};
use crate::hash::Hash;
use crate::key::IV_LEN;
use crate::tree::relative_path;

pub mod builder;
pub mod reader;
pub mod trailer;

pub use builder::{create_archive, ArchiveBuilder, CreateOptions, FileOutput};
pub use reader::{Archive, ExtractOptions, ExtractReport, IntegrityMismatch, OpenOptions};

/// One archived file as described by the trailer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub hash: Hash,
    pub compressed_size: u64,
    pub dir_id: u32,
    pub last_mod_time: u64,
    pub base_offset_start: u64,
    pub chunk_sizes: Vec<u16>,
}

impl FileEntry {
    /// Offset just past the last chunk, where the body digest starts
    pub fn body_end(&self) -> Option<u64> {
        self.base_offset_start.checked_add(self.compressed_size)
    }
}

/// Everything the trailer says about a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub version: u16,
    pub iv: Option<[u8; IV_LEN]>,
    pub name: String,
    pub metadata: Vec<u8>,
    pub created: u64,
    pub directories: Vec<String>,
    pub files: Vec<FileEntry>,
    pub footer_offset: u64,
}

impl Manifest {
    pub fn is_encrypted(&self) -> bool {
        self.iv.is_some()
    }

    pub fn created_at(&self) -> Result<OffsetDateTime> {
        i64::try_from(self.created)
            .ok()
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
            .ok_or_else(|| Pyp4Error::InvalidFormat(format!("creation time {} out of range", self.created)))
    }

    /// Package relative path of a file, `directories[dir_id] / name`
    pub fn resolve_path(&self, entry: &FileEntry) -> Result<PathBuf> {
        let dir = self.directories.get(entry.dir_id as usize).ok_or_else(|| {
            Pyp4Error::InvalidFormat(format!("{} refers to unknown directory {}", entry.name, entry.dir_id))
        })?;
        relative_path(dir, &entry.name)
    }

    pub fn metadata<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        crate::metadata::decode(&self.metadata)
    }
}

/// What to do when a file's digest does not match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashPolicy {
    /// Don't compute digests at all
    Skip,
    /// Log and report the mismatch, keep going
    #[default]
    Warn,
    /// Fail with [`Pyp4Error::IntegrityFailure`]
    Strict,
}

/// Outcome of reading one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Verified,
    Skipped,
    Mismatch { declared: Hash, computed: Hash },
}
