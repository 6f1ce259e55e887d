//! One call packing and unpacking with the usual defaults
use std::env;
use std::path::{Path, PathBuf};

use crate::archive::{create_archive, Archive, CreateOptions, ExtractOptions, ExtractReport, OpenOptions};
use crate::error::{Pyp4Error, Result};
use crate::walk::{scan_directory, WalkOptions};

/// Package file name for a directory: spaces become `_` and anything that is
/// not a word character is dropped
fn package_stem(dir: &Path) -> String {
    dir.to_string_lossy()
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

/// First `<stem><n>.pyp4` that does not exist yet in `out_dir`
fn free_target(out_dir: &Path, stem: &str) -> PathBuf {
    (0u64..)
        .map(|n| out_dir.join(format!("{}{}.pyp4", stem, n)))
        .find(|p| !p.exists())
        .unwrap_or_else(|| out_dir.join(format!("{}.pyp4", stem)))
}

/// Packs `dir` into a fresh package inside `out_dir` and returns its path
pub fn package_directory_in(
    dir: &Path,
    out_dir: &Path,
    secret: Option<&str>,
    metadata: Option<Vec<u8>>,
    overwrite: bool,
) -> Result<PathBuf> {
    let tree = scan_directory(dir, &WalkOptions::default())?;
    let target = free_target(out_dir, &package_stem(dir));

    let mut options = CreateOptions {
        secret: secret.map(|s| s.to_string()),
        overwrite,
        ..CreateOptions::default()
    };
    if let Some(metadata) = metadata {
        options.metadata = metadata;
    }

    create_archive(&tree, &target, &options)?;
    Ok(target)
}

/// Packs `dir` into the current directory
pub fn package_directory(dir: &Path, secret: Option<&str>, metadata: Option<Vec<u8>>, overwrite: bool) -> Result<PathBuf> {
    let cwd = env::current_dir()?;
    package_directory_in(dir, &cwd, secret, metadata, overwrite)
}

/// `<archive>_extract`, the default output directory for a package
pub fn extract_dir(archive: &Path) -> PathBuf {
    let mut out = archive.as_os_str().to_owned();
    out.push("_extract");
    PathBuf::from(out)
}

/// Extracts `archive` next to itself into `<archive>_extract`, along with the
/// metadata summary file
pub fn extract_package(archive: &Path, secret: Option<&str>, overwrite: bool) -> Result<(PathBuf, ExtractReport)> {
    if !archive.is_file() {
        return Err(Pyp4Error::NotFound(archive.to_path_buf()));
    }

    let out = extract_dir(archive);
    let options = ExtractOptions {
        overwrite,
        metadata_file: true,
        ..ExtractOptions::default()
    };
    let report = Archive::open(archive, secret, &OpenOptions::default())?.extract_all(&out, &options)?;
    Ok((out, report))
}
