use std::path::{Component, Path};
use std::time::UNIX_EPOCH;

use ignore::WalkBuilder;
use log::{debug, info};

use crate::error::{Pyp4Error, Result};
use crate::tree::{SourceFile, Tree, ROOT};

#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub follow_links: bool,
    pub same_file_system: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        WalkOptions {
            follow_links: true,
            same_file_system: false,
        }
    }
}

/// Walks `root` depth first in name order and records every directory and
/// regular file under it. The root itself is directory 0, named `.`.
pub fn scan_directory(root: &Path, options: &WalkOptions) -> Result<Tree> {
    if !root.is_dir() {
        return Err(Pyp4Error::NotFound(root.to_path_buf()));
    }

    let name = root
        .canonicalize()
        .map_err(Pyp4Error::at(root))?
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(ROOT)
        .to_string();
    let mut tree = Tree::new(name);

    let walker = WalkBuilder::new(root)
        .follow_links(options.follow_links)
        .standard_filters(false)
        .same_file_system(options.same_file_system)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    for entry in walker {
        let entry = entry?;
        let rel = package_path(root, entry.path())?;

        match entry.file_type() {
            Some(ft) if ft.is_dir() => {
                let id = tree.add_directory(&rel)?;
                debug!("DIR: {} -> {}", rel, id.0);
            }
            Some(ft) if ft.is_file() => {
                let (parent, name) = match rel.rsplit_once('/') {
                    Some((parent, name)) => (parent, name),
                    None => (ROOT, rel.as_str()),
                };
                let dir_id = tree.directory_id(parent).ok_or_else(|| {
                    Pyp4Error::InvalidFormat(format!("{} was walked before its directory", rel))
                })?;

                let meta = entry.metadata()?;
                let last_mod_time = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs())
                    .unwrap_or(0);

                tree.add_file(SourceFile {
                    name: name.to_string(),
                    dir_id,
                    path: entry.path().to_path_buf(),
                    size: meta.len(),
                    last_mod_time,
                })?;
                debug!("FILE: {} ({} bytes)", rel, meta.len());
            }
            _ => debug!("SKIP: {}", entry.path().display()),
        }
    }

    info!(
        "Scanned {}: {} directories, {} files",
        root.display(),
        tree.directories().len(),
        tree.files().len()
    );
    Ok(tree)
}

// Relative `/` joined path of a walked entry, `.` for the root itself
fn package_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(root).map_err(|_| {
        Pyp4Error::InvalidFormat(format!("{} is outside {}", path.display(), root.display()))
    })?;

    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(|| {
                Pyp4Error::InvalidFormat(format!("{} is not valid UTF-8", path.display()))
            })?),
            Component::CurDir => continue,
            _ => {
                return Err(Pyp4Error::InvalidFormat(format!("unsafe path {}", path.display())));
            }
        }
    }

    if parts.is_empty() {
        Ok(ROOT.to_string())
    } else {
        Ok(parts.join("/"))
    }
}

#[cfg(test)]
mod test_walk {
    use super::*;
    use std::fs;

    use crate::tree::DirId;

    #[test]
    fn records_tree_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), b"bbb").unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::create_dir_all(dir.path().join("sub").join("deeper")).unwrap();
        fs::write(dir.path().join("sub").join("c.bin"), vec![0u8; 10]).unwrap();
        fs::write(dir.path().join(".hidden"), b"h").unwrap();

        let tree = scan_directory(dir.path(), &WalkOptions::default()).unwrap();

        assert_eq!(
            tree.directories(),
            &[".".to_string(), "sub".to_string(), "sub/deeper".to_string()]
        );
        let names: Vec<(&str, DirId, u64)> = tree
            .files()
            .iter()
            .map(|f| (f.name.as_str(), f.dir_id, f.size))
            .collect();
        assert_eq!(
            names,
            vec![
                (".hidden", DirId(0), 1),
                ("a.txt", DirId(0), 1),
                ("b.txt", DirId(0), 3),
                ("c.bin", DirId(1), 10),
            ]
        );
    }

    #[test]
    fn names_tree_after_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("my_assets");
        fs::create_dir(&root).unwrap();

        let tree = scan_directory(&root, &WalkOptions::default()).unwrap();
        assert_eq!(tree.name(), "my_assets");
        assert_eq!(tree.directories(), &[".".to_string()]);
        assert!(tree.files().is_empty());
    }

    #[test]
    fn missing_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            scan_directory(&dir.path().join("nope"), &WalkOptions::default()),
            Err(Pyp4Error::NotFound(_))
        ));
    }
}
