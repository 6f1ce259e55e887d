use std::fs::{File, OpenOptions as FsOpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use log::{debug, info};
use time::OffsetDateTime;

use crate::archive::{trailer, FileEntry, Manifest};
use crate::chunk::{Chunks, Pipeline};
use crate::compress::Zlib;
use crate::crypto;
use crate::error::{Pyp4Error, Result};
use crate::hash::{Hash, Hasher};
use crate::key::{gen_iv, IV_LEN};
use crate::tree::{check_name_len, Tree};
use crate::{DEFAULT_CHUNK_SIZE, MAGIC, MAX_CHUNK_SIZE, VERSION};

/// What streaming one file body produced, kept beside the [`Tree`] until
/// the trailer is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutput {
    pub size: u64,
    pub hash: Hash,
    pub compressed_size: u64,
    pub base_offset_start: u64,
    pub chunk_sizes: Vec<u16>,
}

/// Package level trailer fields
#[derive(Debug, Clone)]
pub struct PackageHeader {
    pub name: String,
    pub metadata: Vec<u8>,
    pub created: u64,
}

/// Single pass package writer over any [`Write`].
///
/// File bodies go out first through [`ArchiveBuilder::append_file`], then
/// [`ArchiveBuilder::finalize`] writes the trailer and the footer pointer.
/// Nothing is ever patched after the fact.
pub struct ArchiveBuilder<W: Write> {
    inner: W,
    pipeline: Pipeline,
    iv: Option<[u8; IV_LEN]>,
    chunk_size: usize,
    idx: u64,
}

impl<W: Write> ArchiveBuilder<W> {
    pub fn new(writer: W, secret: Option<&str>, chunk_size: usize) -> Result<Self> {
        Self::with_iv(writer, secret, gen_iv(), chunk_size)
    }

    /// Same as [`ArchiveBuilder::new`] with a caller supplied IV
    pub fn with_iv(writer: W, secret: Option<&str>, iv: [u8; IV_LEN], chunk_size: usize) -> Result<Self> {
        check_chunk_size(chunk_size)?;

        let cipher = crypto::for_secret(secret, iv);
        let iv = cipher.is_encrypting().then_some(iv);

        let mut builder = ArchiveBuilder {
            inner: writer,
            pipeline: Pipeline::new(Box::new(Zlib::default()), cipher),
            iv,
            chunk_size,
            idx: 0,
        };

        builder.write(&MAGIC)?;
        debug!("Magic number written");
        Ok(builder)
    }

    pub fn is_encrypted(&self) -> bool {
        self.iv.is_some()
    }

    /// Bytes written so far, also the offset the next body starts at
    pub fn get_size(&self) -> u64 {
        self.idx
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.inner.write_all(data)?;
        self.idx += data.len() as u64;
        Ok(data.len())
    }

    /// Streams one file body: its encoded chunks followed by its digest
    pub fn append_file<R: Read>(&mut self, label: &Path, reader: R) -> Result<FileOutput> {
        let base_offset_start = self.idx;
        let mut hasher = Hasher::new();
        let mut chunk_sizes = Vec::new();
        let mut compressed_size = 0;
        let mut size = 0;

        for (n, chunk) in Chunks::new(reader, self.chunk_size).enumerate() {
            let chunk = chunk.map_err(|e| Pyp4Error::at(label)(e))?;
            hasher.update(&chunk);

            let encoded = self.pipeline.encode_chunk(&chunk)?;
            let len = u16::try_from(encoded.len()).map_err(|_| Pyp4Error::ChunkOverflow {
                path: label.to_path_buf(),
                chunk: n,
                len: encoded.len(),
            })?;
            debug!("{}: chunk {} {} -> {} bytes", label.display(), n, chunk.len(), len);

            compressed_size += self.write(&encoded)? as u64;
            size += chunk.len() as u64;
            chunk_sizes.push(len);
        }

        let hash = hasher.finalize();
        self.write(hash.as_bytes())?;

        Ok(FileOutput {
            size,
            hash,
            compressed_size,
            base_offset_start,
            chunk_sizes,
        })
    }

    /// Writes the trailer and footer. `outputs[i]` must belong to `tree.files()[i]`.
    pub fn finalize(mut self, tree: &Tree, outputs: Vec<FileOutput>, header: PackageHeader) -> Result<(Manifest, W)> {
        if outputs.len() != tree.files().len() {
            return Err(Pyp4Error::InvalidFormat(format!(
                "{} file bodies written for {} files",
                outputs.len(),
                tree.files().len()
            )));
        }
        check_name_len(&header.name)?;

        let files = tree
            .files()
            .iter()
            .zip(outputs)
            .map(|(file, out)| FileEntry {
                name: file.name.clone(),
                size: out.size,
                hash: out.hash,
                compressed_size: out.compressed_size,
                dir_id: file.dir_id.0,
                last_mod_time: file.last_mod_time,
                base_offset_start: out.base_offset_start,
                chunk_sizes: out.chunk_sizes,
            })
            .collect();

        let manifest = Manifest {
            version: VERSION,
            iv: self.iv,
            name: header.name,
            metadata: header.metadata,
            created: header.created,
            directories: tree.directories().to_vec(),
            files,
            footer_offset: self.idx,
        };

        let trailer = trailer::encode(&manifest, self.pipeline.cipher())?;
        self.write(&trailer)?;
        self.inner.write_u64::<LittleEndian>(manifest.footer_offset)?;
        self.inner.flush()?;
        debug!("Trailer offset {}", manifest.footer_offset);

        Ok((manifest, self.inner))
    }
}

#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Defaults to the name of the scanned directory
    pub package_name: Option<String>,
    pub secret: Option<String>,
    /// Opaque blob, see [`crate::metadata`]
    pub metadata: Vec<u8>,
    pub overwrite: bool,
    pub chunk_size: usize,
    /// POSIX seconds, defaults to now
    pub created: Option<u64>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        CreateOptions {
            package_name: None,
            secret: None,
            metadata: crate::metadata::EMPTY.to_vec(),
            overwrite: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            created: None,
        }
    }
}

fn check_chunk_size(chunk_size: usize) -> Result<()> {
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(Pyp4Error::InvalidChunkSize(chunk_size));
    }
    Ok(())
}

fn now() -> u64 {
    u64::try_from(OffsetDateTime::now_utc().unix_timestamp()).unwrap_or(0)
}

/// Packs every file in `tree` into a new package at `target`
pub fn create_archive(tree: &Tree, target: &Path, options: &CreateOptions) -> Result<Manifest> {
    check_chunk_size(options.chunk_size)?;
    if !options.overwrite && target.exists() {
        return Err(Pyp4Error::AlreadyExists(target.to_path_buf()));
    }

    let file = if options.overwrite {
        FsOpenOptions::new().write(true).create(true).truncate(true).open(target)
    } else {
        FsOpenOptions::new().write(true).create_new(true).open(target)
    }
    .map_err(Pyp4Error::at(target))?;

    let mut builder = ArchiveBuilder::new(BufWriter::new(file), options.secret.as_deref(), options.chunk_size)?;
    if builder.is_encrypted() {
        info!("Encryption enabled");
    }

    let total = tree.files().len();
    let mut outputs = Vec::with_capacity(total);
    for (n, file) in tree.files().iter().enumerate() {
        let source = File::open(&file.path).map_err(Pyp4Error::at(&file.path))?;
        outputs.push(builder.append_file(&file.path, source)?);
        info!("<< {}/{} >> {} written", n + 1, total, tree.resolve_path(file)?.display());
    }

    let header = PackageHeader {
        name: options.package_name.clone().unwrap_or_else(|| tree.name().to_string()),
        metadata: options.metadata.clone(),
        created: options.created.unwrap_or_else(now),
    };
    let (manifest, writer) = builder.finalize(tree, outputs, header)?;

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;

    info!("Package {} created", target.display());
    Ok(manifest)
}

#[cfg(test)]
mod test_builder {
    use super::*;
    use std::fs;
    use std::io::Cursor;

    use byteorder::{ByteOrder, LittleEndian};

    use crate::tree::{SourceFile, ROOT};
    use crate::FOOTER_LEN;

    fn two_file_tree(dir: &Path) -> Tree {
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("big.bin"), vec![b'x'; 3000]).unwrap();
        fs::write(dir.join("sub").join("empty"), b"").unwrap();

        let mut tree = Tree::new("pkg");
        let root = tree.add_directory(ROOT).unwrap();
        let sub = tree.add_directory("sub").unwrap();
        for (name, dir_id, rel) in [("big.bin", root, "big.bin"), ("empty", sub, "sub/empty")] {
            tree.add_file(SourceFile {
                name: name.to_string(),
                dir_id,
                path: dir.join(rel),
                size: fs::metadata(dir.join(rel)).unwrap().len(),
                last_mod_time: 1_600_000_000,
            })
            .unwrap();
        }
        tree
    }

    #[test]
    fn offsets_line_up() {
        let dir = tempfile::tempdir().unwrap();
        let tree = two_file_tree(dir.path());

        let mut builder = ArchiveBuilder::new(Cursor::new(Vec::new()), Some("k"), 2048).unwrap();
        let mut outputs = Vec::new();
        for file in tree.files() {
            outputs.push(builder.append_file(&file.path, File::open(&file.path).unwrap()).unwrap());
        }

        assert_eq!(outputs[0].base_offset_start, MAGIC.len() as u64);
        assert_eq!(outputs[0].chunk_sizes.len(), 2);
        assert_eq!(outputs[1].chunk_sizes.len(), 1);
        assert_eq!(
            outputs[1].base_offset_start,
            outputs[0].base_offset_start + outputs[0].compressed_size + 32
        );
        for out in &outputs {
            let total: u64 = out.chunk_sizes.iter().map(|s| *s as u64).sum();
            assert_eq!(total, out.compressed_size);
        }

        let header = PackageHeader {
            name: "pkg".to_string(),
            metadata: crate::metadata::EMPTY.to_vec(),
            created: 0,
        };
        let (manifest, cursor) = builder.finalize(&tree, outputs, header).unwrap();
        let bytes = cursor.into_inner();

        assert_eq!(&bytes[..MAGIC.len()], &MAGIC);
        let footer = LittleEndian::read_u64(&bytes[bytes.len() - FOOTER_LEN..]);
        assert_eq!(footer, manifest.footer_offset);
        assert_eq!(
            LittleEndian::read_u16(&bytes[footer as usize..footer as usize + 2]),
            VERSION
        );
        assert_eq!(manifest.files[0].size, 3000);
        assert_eq!(manifest.files[1].size, 0);
    }

    #[test]
    fn body_ends_with_digest() {
        let mut builder = ArchiveBuilder::new(Cursor::new(Vec::new()), None, 2048).unwrap();
        let out = builder.append_file(Path::new("mem"), Cursor::new(b"hello".to_vec())).unwrap();

        let bytes = builder.inner.into_inner();
        let end = (out.base_offset_start + out.compressed_size) as usize;
        assert_eq!(&bytes[end..], out.hash.as_bytes());
        assert_eq!(out.hash, crate::hash::hash(&mut Cursor::new(b"hello")).unwrap());
    }

    #[test]
    fn rejects_bad_chunk_size() {
        assert!(matches!(
            ArchiveBuilder::new(Vec::new(), None, 0),
            Err(Pyp4Error::InvalidChunkSize(0))
        ));
        assert!(ArchiveBuilder::new(Vec::new(), None, MAX_CHUNK_SIZE + 1).is_err());
        assert!(ArchiveBuilder::new(Vec::new(), None, MAX_CHUNK_SIZE).is_ok());
    }

    #[test]
    fn incompressible_max_chunk_fits() {
        // xorshift noise, zlib can't shrink it
        let mut state = 0x2545f491u32;
        let noise: Vec<u8> = (0..MAX_CHUNK_SIZE)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();

        let mut builder = ArchiveBuilder::new(Vec::new(), Some("k"), MAX_CHUNK_SIZE).unwrap();
        let out = builder.append_file(Path::new("noise"), Cursor::new(noise)).unwrap();
        assert_eq!(out.chunk_sizes.len(), 1);
        assert!(out.compressed_size > MAX_CHUNK_SIZE as u64);
    }

    #[test]
    fn overwrite_policy() {
        let dir = tempfile::tempdir().unwrap();
        let tree = two_file_tree(&dir.path().join("src"));
        let target = dir.path().join("out.pyp4");
        fs::write(&target, b"old contents").unwrap();

        assert!(matches!(
            create_archive(&tree, &target, &CreateOptions::default()),
            Err(Pyp4Error::AlreadyExists(_))
        ));
        assert_eq!(fs::read(&target).unwrap(), b"old contents");

        let options = CreateOptions {
            overwrite: true,
            ..CreateOptions::default()
        };
        let manifest = create_archive(&tree, &target, &options).unwrap();
        let bytes = fs::read(&target).unwrap();

        assert_eq!(&bytes[..MAGIC.len()], &MAGIC);
        assert_eq!(
            LittleEndian::read_u64(&bytes[bytes.len() - FOOTER_LEN..]),
            manifest.footer_offset
        );
        assert_eq!(manifest.name, "pkg");
    }
}
