use std::io::{Cursor, Read};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};

use crate::archive::reader::OpenOptions;
use crate::archive::{FileEntry, Manifest};
use crate::crypto::{AesCfb8, Cipher, Plaintext};
use crate::error::{Pyp4Error, Result};
use crate::hash::{Hash, HASH_LEN};
use crate::key::{SecretKey, IV_LEN};
use crate::tree::{check_file_name, check_name_len, relative_dir};
use crate::VERSION;

const U48_MAX: u64 = (1 << 48) - 1;

// name length + size + hash + compressed size + dir id + mtime + offset + chunk count
const MIN_FILE_ENTRY: u64 = 1 + 8 + HASH_LEN as u64 + 8 + 4 + 8 + 8 + 6;

fn u48(count: usize) -> Result<[u8; 6]> {
    let count = count as u64;
    if count > U48_MAX {
        return Err(Pyp4Error::InvalidFormat(format!("{} entries do not fit a u48 count", count)));
    }
    let mut buf = [0u8; 6];
    LittleEndian::write_u48(&mut buf, count);
    Ok(buf)
}

struct TrailerWriter<'a> {
    out: Vec<u8>,
    cipher: &'a dyn Cipher,
}

impl<'a> TrailerWriter<'a> {
    fn sealed(&mut self, data: &[u8]) {
        let data = self.cipher.seal(data.to_vec());
        self.out.extend_from_slice(&data);
    }

    fn sealed_name(&mut self, name: &str) -> Result<()> {
        let len = check_name_len(name)?;
        self.sealed(&[len]);
        self.sealed(name.as_bytes());
        Ok(())
    }
}

/// Serializes everything from `version` up to, not including, the footer
pub fn encode(manifest: &Manifest, cipher: &dyn Cipher) -> Result<Vec<u8>> {
    let mut w = TrailerWriter {
        out: Vec::new(),
        cipher,
    };

    w.out.write_u16::<LittleEndian>(manifest.version)?;
    match &manifest.iv {
        Some(iv) => {
            w.out.write_u8(1)?;
            w.out.extend_from_slice(iv);
        }
        None => w.out.write_u8(0)?,
    }

    w.sealed_name(&manifest.name)?;

    let meta_len = u32::try_from(manifest.metadata.len())
        .map_err(|_| Pyp4Error::InvalidFormat(format!("metadata is {} bytes", manifest.metadata.len())))?;
    w.sealed(&meta_len.to_le_bytes());
    w.sealed(&manifest.metadata);
    w.sealed(&manifest.created.to_le_bytes());

    w.sealed(&u48(manifest.directories.len())?);
    for dir in &manifest.directories {
        w.sealed_name(dir)?;
    }

    w.sealed(&u48(manifest.files.len())?);
    for file in &manifest.files {
        w.sealed_name(&file.name)?;
        w.sealed(&file.size.to_le_bytes());
        w.sealed(file.hash.as_bytes());
        w.sealed(&file.compressed_size.to_le_bytes());
        w.sealed(&file.dir_id.to_le_bytes());
        w.sealed(&file.last_mod_time.to_le_bytes());
        w.sealed(&file.base_offset_start.to_le_bytes());

        w.out.extend_from_slice(&u48(file.chunk_sizes.len())?);
        for size in &file.chunk_sizes {
            w.out.write_u16::<LittleEndian>(*size)?;
        }
        debug!("Trailer entry: {} ({} chunks)", file.name, file.chunk_sizes.len());
    }

    Ok(w.out)
}

struct TrailerReader<'a> {
    inner: Cursor<&'a [u8]>,
    cipher: Box<dyn Cipher>,
}

impl<'a> TrailerReader<'a> {
    fn remaining(&self) -> u64 {
        (self.inner.get_ref().len() as u64).saturating_sub(self.inner.position())
    }

    fn plain(&mut self, len: usize, field: &'static str) -> Result<Vec<u8>> {
        if len as u64 > self.remaining() {
            return Err(Pyp4Error::Truncated { field });
        }
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf).map_err(Pyp4Error::eof(field))?;
        Ok(buf)
    }

    fn sealed(&mut self, len: usize, field: &'static str) -> Result<Vec<u8>> {
        let data = self.plain(len, field)?;
        Ok(self.cipher.open(data))
    }

    fn sealed_u8(&mut self, field: &'static str) -> Result<u8> {
        Ok(self.sealed(1, field)?[0])
    }

    fn sealed_u32(&mut self, field: &'static str) -> Result<u32> {
        Ok(LittleEndian::read_u32(&self.sealed(4, field)?))
    }

    fn sealed_u48(&mut self, field: &'static str) -> Result<u64> {
        Ok(LittleEndian::read_u48(&self.sealed(6, field)?))
    }

    fn sealed_u64(&mut self, field: &'static str) -> Result<u64> {
        Ok(LittleEndian::read_u64(&self.sealed(8, field)?))
    }

    fn sealed_string(&mut self, field: &'static str) -> Result<String> {
        let len = self.sealed_u8(field)? as usize;
        let bytes = self.sealed(len, field)?;
        String::from_utf8(bytes)
            .map_err(|_| Pyp4Error::InvalidFormat(format!("{} is not valid UTF-8 (wrong key?)", field)))
    }

    // Refuses counts that could not possibly fit in what is left
    fn check_count(&self, count: u64, min_size: u64, field: &'static str) -> Result<usize> {
        match count.checked_mul(min_size) {
            Some(needed) if needed <= self.remaining() => Ok(count as usize),
            _ => Err(Pyp4Error::Truncated { field }),
        }
    }
}

fn select_cipher(iv: Option<[u8; IV_LEN]>, secret: Option<&str>, options: &OpenOptions) -> Result<Box<dyn Cipher>> {
    let secret = secret.filter(|s| !s.is_empty());

    match (iv, secret) {
        (Some(iv), Some(secret)) => {
            info!("Package is encrypted");
            Ok(Box::new(AesCfb8::new(&SecretKey::derive(secret), iv)))
        }
        (Some(_), None) => {
            let msg = "package is encrypted but no key was given";
            if options.strict_crypto {
                return Err(Pyp4Error::CryptoMisuse(msg));
            }
            warn!("{}, reading will most likely fail", msg);
            Ok(Box::new(Plaintext))
        }
        (None, Some(_)) => {
            let msg = "a key was given but the package is not encrypted";
            if options.strict_crypto {
                return Err(Pyp4Error::CryptoMisuse(msg));
            }
            warn!("{}, ignoring the key", msg);
            Ok(Box::new(Plaintext))
        }
        (None, None) => Ok(Box::new(Plaintext)),
    }
}

/// Parses a trailer, `bytes` runs from the `version` field up to the footer.
///
/// Returns the manifest along with the cipher the chunk bodies need.
pub fn decode(
    bytes: &[u8],
    footer_offset: u64,
    secret: Option<&str>,
    options: &OpenOptions,
) -> Result<(Manifest, Box<dyn Cipher>)> {
    let mut r = TrailerReader {
        inner: Cursor::new(bytes),
        cipher: Box::new(Plaintext),
    };

    let version = r.inner.read_u16::<LittleEndian>().map_err(Pyp4Error::eof("version"))?;
    if version != VERSION {
        if !options.skip_version_check {
            return Err(Pyp4Error::VersionMismatch {
                found: version,
                expected: VERSION,
            });
        }
        warn!("Package is version {}, expected {}, reading anyway", version, VERSION);
    }

    let iv = match r.inner.read_u8().map_err(Pyp4Error::eof("encryption flag"))? {
        0 => None,
        1 => {
            let mut iv = [0u8; IV_LEN];
            iv.copy_from_slice(&r.plain(IV_LEN, "iv")?);
            Some(iv)
        }
        flag => {
            return Err(Pyp4Error::InvalidFormat(format!("unknown encryption flag {}", flag)));
        }
    };
    r.cipher = select_cipher(iv, secret, options)?;

    let name = r.sealed_string("package name")?;
    let meta_len = r.sealed_u32("metadata length")? as usize;
    let metadata = r.sealed(meta_len, "metadata")?;
    let created = r.sealed_u64("creation time")?;
    info!("Package name: {}", name);

    let dir_count = r.sealed_u48("directory count")?;
    let dir_count = r.check_count(dir_count, 1, "directory table")?;
    let mut directories = Vec::with_capacity(dir_count);
    for _ in 0..dir_count {
        let dir = r.sealed_string("directory name")?;
        relative_dir(&dir)?;
        debug!("Found directory: {}", dir);
        directories.push(dir);
    }

    let file_count = r.sealed_u48("file count")?;
    let file_count = r.check_count(file_count, MIN_FILE_ENTRY, "file table")?;
    let mut files = Vec::with_capacity(file_count);
    for _ in 0..file_count {
        let name = r.sealed_string("file name")?;
        check_file_name(&name)?;

        let size = r.sealed_u64("file size")?;
        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(&r.sealed(HASH_LEN, "file hash")?);
        let compressed_size = r.sealed_u64("compressed size")?;
        let dir_id = r.sealed_u32("directory id")?;
        let last_mod_time = r.sealed_u64("modification time")?;
        let base_offset_start = r.sealed_u64("base offset")?;

        if dir_id as usize >= directories.len() {
            return Err(Pyp4Error::InvalidFormat(format!(
                "{} refers to directory {} of {}",
                name,
                dir_id,
                directories.len()
            )));
        }

        let mut raw = [0u8; 6];
        raw.copy_from_slice(&r.plain(6, "chunk count")?);
        let chunk_count = r.check_count(LittleEndian::read_u48(&raw), 2, "chunk table")?;
        let chunk_sizes: Vec<u16> = r
            .plain(chunk_count * 2, "chunk table")?
            .chunks_exact(2)
            .map(LittleEndian::read_u16)
            .collect();

        let total: u64 = chunk_sizes.iter().map(|s| *s as u64).sum();
        if total != compressed_size {
            return Err(Pyp4Error::InvalidFormat(format!(
                "{}: chunk table sums to {} but compressed size is {}",
                name, total, compressed_size
            )));
        }

        debug!("Found file: {} in {}", name, directories[dir_id as usize]);
        files.push(FileEntry {
            name,
            size,
            hash: Hash::from(hash),
            compressed_size,
            dir_id,
            last_mod_time,
            base_offset_start,
            chunk_sizes,
        });
    }

    if r.remaining() != 0 {
        return Err(Pyp4Error::InvalidFormat(format!(
            "{} unexpected bytes after the file table",
            r.remaining()
        )));
    }

    let manifest = Manifest {
        version,
        iv,
        name,
        metadata,
        created,
        directories,
        files,
        footer_offset,
    };
    Ok((manifest, r.cipher))
}
