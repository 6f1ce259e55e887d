use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use filetime::FileTime;
use log::{debug, error, info, warn};
use time::format_description::well_known::Rfc3339;

use crate::archive::{trailer, HashPolicy, Manifest, Verification};
use crate::chunk::Pipeline;
use crate::compress::Zlib;
use crate::error::{Pyp4Error, Result};
use crate::hash::{Hash, Hasher};
use crate::tree::relative_dir;
use crate::{metadata, FOOTER_LEN, MAGIC, MAGIC_LEN};

/// Name of the summary written by [`ExtractOptions::metadata_file`]
pub const METADATA_FILE: &str = "pyp4_metadata.txt";

#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Read packages written with another format version
    pub skip_version_check: bool,
    /// Fail on a bad magic number instead of logging it
    pub strict_magic: bool,
    /// Fail instead of warning when the key does not fit the package
    pub strict_crypto: bool,
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub create_dir: bool,
    pub overwrite: bool,
    pub hash_policy: HashPolicy,
    pub metadata_file: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            create_dir: true,
            overwrite: false,
            hash_policy: HashPolicy::default(),
            metadata_file: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityMismatch {
    pub path: PathBuf,
    pub declared: Hash,
    pub computed: Hash,
}

#[derive(Debug, Default)]
pub struct ExtractReport {
    pub directories: usize,
    pub files: usize,
    pub mismatches: Vec<IntegrityMismatch>,
}

/// An opened package, ready for random access to its files
pub struct Archive<R: Read + Seek> {
    handle: R,
    manifest: Manifest,
    pipeline: Pipeline,
}

impl Archive<BufReader<File>> {
    pub fn open(path: &Path, secret: Option<&str>, options: &OpenOptions) -> Result<Self> {
        let file = File::open(path).map_err(Pyp4Error::at(path))?;
        info!("Opening {}", path.display());
        Archive::from_reader(BufReader::new(file), secret, options)
    }
}

impl<R: Read + Seek> Archive<R> {
    pub fn from_reader(mut handle: R, secret: Option<&str>, options: &OpenOptions) -> Result<Self> {
        let len = handle.seek(SeekFrom::End(0))?;
        let min_len = (MAGIC_LEN + FOOTER_LEN) as u64;
        if len < min_len {
            return Err(Pyp4Error::InvalidFormat(format!(
                "package is {} bytes, at least {} expected",
                len, min_len
            )));
        }

        handle.seek(SeekFrom::Start(0))?;
        let mut magic = [0u8; MAGIC_LEN];
        handle.read_exact(&mut magic)?;
        if magic != MAGIC {
            error!("Not a pyp4 package, magic number is {}", hex::encode(magic));
            if options.strict_magic {
                return Err(Pyp4Error::InvalidFormat("bad magic number".to_string()));
            }
        }

        let trailer_end = len - FOOTER_LEN as u64;
        handle.seek(SeekFrom::Start(trailer_end))?;
        let footer = handle.read_u64::<LittleEndian>()?;
        if footer < MAGIC_LEN as u64 || footer > trailer_end {
            return Err(Pyp4Error::InvalidFormat(format!(
                "footer points at {} in a {} byte package",
                footer, len
            )));
        }
        debug!("Trailer offset {}", footer);

        handle.seek(SeekFrom::Start(footer))?;
        let mut raw = vec![0u8; (trailer_end - footer) as usize];
        handle.read_exact(&mut raw).map_err(Pyp4Error::eof("trailer"))?;
        let (manifest, cipher) = trailer::decode(&raw, footer, secret, options)?;

        for entry in &manifest.files {
            match entry.body_end() {
                Some(end) if entry.base_offset_start >= MAGIC_LEN as u64 && end <= footer => {}
                _ => {
                    return Err(Pyp4Error::InvalidFormat(format!(
                        "{}: body at {}+{} runs into the trailer at {}",
                        entry.name, entry.base_offset_start, entry.compressed_size, footer
                    )));
                }
            }
        }

        info!(
            "Opened package {}: {} directories, {} files",
            manifest.name,
            manifest.directories.len(),
            manifest.files.len()
        );
        Ok(Archive {
            handle,
            manifest,
            pipeline: Pipeline::new(Box::new(Zlib::default()), cipher),
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn into_manifest(self) -> Manifest {
        self.manifest
    }

    /// Decodes file `index` into `out`, chunk by chunk
    pub fn read_entry<W: Write>(&mut self, index: usize, out: &mut W, policy: HashPolicy) -> Result<Verification> {
        let Archive {
            handle,
            manifest,
            pipeline,
        } = self;
        let entry = manifest
            .files
            .get(index)
            .ok_or_else(|| Pyp4Error::InvalidFormat(format!("no file at index {}", index)))?;
        let path = manifest.resolve_path(entry)?;

        handle.seek(SeekFrom::Start(entry.base_offset_start))?;
        let mut hasher = (policy != HashPolicy::Skip).then(Hasher::new);
        let mut written = 0u64;

        for (n, size) in entry.chunk_sizes.iter().enumerate() {
            let mut raw = vec![0u8; *size as usize];
            handle.read_exact(&mut raw).map_err(|source| match source.kind() {
                io::ErrorKind::UnexpectedEof => Pyp4Error::BodyTruncated {
                    path: path.clone(),
                    chunk: n,
                },
                _ => Pyp4Error::Path {
                    path: path.clone(),
                    source,
                },
            })?;

            let plain = pipeline
                .decode_chunk(raw, entry.size.saturating_sub(written))
                .map_err(|source| Pyp4Error::ChunkDecode {
                    path: path.clone(),
                    chunk: n,
                    source,
                })?;
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&plain);
            }
            out.write_all(&plain)?;
            written += plain.len() as u64;
        }

        if written != entry.size {
            warn!("{}: decoded {} bytes, {} recorded", path.display(), written, entry.size);
        }

        let computed = match hasher {
            Some(hasher) => hasher.finalize(),
            None => return Ok(Verification::Skipped),
        };
        if computed == entry.hash {
            debug!("{}: hash ok", path.display());
            return Ok(Verification::Verified);
        }

        warn!(
            "{} failed its hash check, the package may be corrupt or tampered with",
            path.display()
        );
        match policy {
            HashPolicy::Strict => Err(Pyp4Error::IntegrityFailure {
                path,
                declared: entry.hash,
                computed,
            }),
            _ => Ok(Verification::Mismatch {
                declared: entry.hash,
                computed,
            }),
        }
    }

    /// Writes file `index` to `dest`, replacing it, and restores its mtime
    pub fn extract_one(&mut self, index: usize, dest: &Path, policy: HashPolicy) -> Result<Verification> {
        let mtime = self
            .manifest
            .files
            .get(index)
            .map(|e| e.last_mod_time)
            .ok_or_else(|| Pyp4Error::InvalidFormat(format!("no file at index {}", index)))?;

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(Pyp4Error::at(parent))?;
        }

        let mut out = BufWriter::new(File::create(dest).map_err(Pyp4Error::at(dest))?);
        let verification = self.read_entry(index, &mut out, policy);
        out.flush().map_err(Pyp4Error::at(dest))?;
        drop(out);
        let verification = verification?;

        let mtime = FileTime::from_unix_time(i64::try_from(mtime).unwrap_or(i64::MAX), 0);
        filetime::set_file_times(dest, mtime, mtime).map_err(Pyp4Error::at(dest))?;

        debug!("{} extracted", dest.display());
        Ok(verification)
    }

    /// Recreates every directory and file under `output_dir`
    pub fn extract_all(&mut self, output_dir: &Path, options: &ExtractOptions) -> Result<ExtractReport> {
        if !output_dir.is_dir() {
            if !options.create_dir {
                return Err(Pyp4Error::NotFound(output_dir.to_path_buf()));
            }
            fs::create_dir_all(output_dir).map_err(Pyp4Error::at(output_dir))?;
        }

        let targets = self
            .manifest
            .files
            .iter()
            .map(|entry| -> Result<PathBuf> { Ok(output_dir.join(self.manifest.resolve_path(entry)?)) })
            .collect::<Result<Vec<PathBuf>>>()?;

        // Nothing gets written unless every destination is free
        if !options.overwrite {
            if let Some(taken) = targets.iter().find(|t| t.exists()) {
                error!("{} already exists and overwriting is off", taken.display());
                return Err(Pyp4Error::AlreadyExists(taken.clone()));
            }
        }

        let mut report = ExtractReport::default();
        for dir in &self.manifest.directories {
            let path = output_dir.join(relative_dir(dir)?);
            fs::create_dir_all(&path).map_err(Pyp4Error::at(&path))?;
            report.directories += 1;
        }

        let total = targets.len();
        for (index, target) in targets.into_iter().enumerate() {
            if let Verification::Mismatch { declared, computed } =
                self.extract_one(index, &target, options.hash_policy)?
            {
                report.mismatches.push(IntegrityMismatch {
                    path: target.clone(),
                    declared,
                    computed,
                });
            }
            report.files += 1;
            info!("<< {}/{} >> {} extracted", index + 1, total, target.display());
        }
        info!("All files extracted");

        if options.metadata_file {
            self.write_metadata_file(output_dir)?;
        }
        Ok(report)
    }

    /// Decodes every file without writing anything, collecting mismatches
    pub fn verify(&mut self) -> Result<Vec<IntegrityMismatch>> {
        let mut mismatches = Vec::new();
        for index in 0..self.manifest.files.len() {
            if let Verification::Mismatch { declared, computed } =
                self.read_entry(index, &mut io::sink(), HashPolicy::Warn)?
            {
                mismatches.push(IntegrityMismatch {
                    path: self.manifest.resolve_path(&self.manifest.files[index])?,
                    declared,
                    computed,
                });
            }
        }
        Ok(mismatches)
    }

    pub fn write_metadata_file(&self, output_dir: &Path) -> Result<PathBuf> {
        let created = self
            .manifest
            .created_at()
            .ok()
            .and_then(|t| t.format(&Rfc3339).ok())
            .unwrap_or_else(|| self.manifest.created.to_string());

        let contents = format!(
            "This file was generated by pyp4 and was not part of the original package\n\n\
             pyp4 format version: {}\n\
             Package name: {}\n\
             Created on: {}\n\
             Metadata: {}\n\
             -- END OF FILE --\n",
            self.manifest.version,
            self.manifest.name,
            created,
            metadata::render(&self.manifest.metadata)
        );

        let path = output_dir.join(METADATA_FILE);
        fs::write(&path, contents).map_err(Pyp4Error::at(&path))?;
        info!("Metadata written to {}", path.display());
        Ok(path)
    }
}
