use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Pyp4Error, Result};
use crate::MAX_NAME_LEN;

/// Name of the package root in the directory table
pub const ROOT: &str = ".";

/// Index into the directory table of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirId(pub u32);

/// A file on disk waiting to be packed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub dir_id: DirId,
    pub path: PathBuf,
    pub size: u64,
    pub last_mod_time: u64,
}

/// Directories and files to pack, in the order they will be written.
///
/// Directories live in an append only arena, [`DirId`] is the position in it.
/// Nothing here changes while a package is being written, the per-file results
/// are collected alongside instead.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    name: String,
    directories: Vec<String>,
    dir_index: HashMap<String, DirId>,
    files: Vec<SourceFile>,
}

impl Tree {
    pub fn new(name: impl Into<String>) -> Self {
        Tree {
            name: name.into(),
            ..Tree::default()
        }
    }

    /// Default package name, usually the basename of the scanned directory
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a directory given as a `/` separated path relative to the
    /// root, re-adding a known path hands back the existing id.
    pub fn add_directory(&mut self, path: &str) -> Result<DirId> {
        if let Some(id) = self.dir_index.get(path) {
            return Ok(*id);
        }

        check_name_len(path)?;
        relative_dir(path)?;

        let id = u32::try_from(self.directories.len())
            .map(DirId)
            .map_err(|_| Pyp4Error::InvalidFormat("too many directories".to_string()))?;
        self.directories.push(path.to_string());
        self.dir_index.insert(path.to_string(), id);
        Ok(id)
    }

    pub fn add_file(&mut self, file: SourceFile) -> Result<()> {
        if self.directory(file.dir_id).is_none() {
            return Err(Pyp4Error::InvalidFormat(format!(
                "{} refers to unknown directory {}",
                file.name, file.dir_id.0
            )));
        }
        check_name_len(&file.name)?;
        check_file_name(&file.name)?;

        self.files.push(file);
        Ok(())
    }

    pub fn directory(&self, id: DirId) -> Option<&str> {
        self.directories.get(id.0 as usize).map(|d| d.as_str())
    }

    pub fn directory_id(&self, path: &str) -> Option<DirId> {
        self.dir_index.get(path).copied()
    }

    pub fn directories(&self) -> &[String] {
        &self.directories
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// Path of a file inside the package, relative to the package root
    pub fn resolve_path(&self, file: &SourceFile) -> Result<PathBuf> {
        let dir = self.directory(file.dir_id).ok_or_else(|| {
            Pyp4Error::InvalidFormat(format!("unknown directory {}", file.dir_id.0))
        })?;
        relative_path(dir, &file.name)
    }
}

pub fn check_name_len(name: &str) -> Result<u8> {
    if name.len() > MAX_NAME_LEN {
        return Err(Pyp4Error::NameTooLong {
            name: name.to_string(),
            len: name.len(),
        });
    }
    Ok(name.len() as u8)
}

// `\` is an ordinary file name character everywhere but Windows
#[cfg(windows)]
fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

#[cfg(not(windows))]
fn is_separator(c: char) -> bool {
    c == '/'
}

/// A file name must be a single plain component
pub fn check_file_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(is_separator)
        || name.contains('\0')
        || (cfg!(windows) && has_drive_prefix(name))
    {
        return Err(Pyp4Error::InvalidFormat(format!("unsafe path {:?}", name)));
    }
    Ok(())
}

/// Turns a stored `/` separated directory path into a relative path.
///
/// Anything that could climb out of the extraction root is refused.
pub fn relative_dir(dir: &str) -> Result<PathBuf> {
    if dir.starts_with(is_separator) || dir.contains('\0') || (cfg!(windows) && has_drive_prefix(dir)) {
        return Err(Pyp4Error::InvalidFormat(format!("unsafe path {:?}", dir)));
    }

    let mut path = PathBuf::new();
    for component in dir.split(is_separator) {
        match component {
            "" | "." => continue,
            ".." => return Err(Pyp4Error::InvalidFormat(format!("unsafe path {:?}", dir))),
            c => path.push(c),
        }
    }
    Ok(path)
}

pub fn relative_path(dir: &str, name: &str) -> Result<PathBuf> {
    check_file_name(name)?;
    Ok(relative_dir(dir)?.join(name))
}

// C:foo style paths turn absolute once joined on Windows
fn has_drive_prefix(dir: &str) -> bool {
    let bytes = dir.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
