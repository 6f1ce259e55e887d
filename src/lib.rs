//! Reader and writer for `pyp4` packages.
//!
//! A package stores a whole directory tree in one file. Every file body is cut
//! into small chunks that are compressed and optionally encrypted on their own,
//! and a trailer at the end of the file describes where everything lives. See
//! [`archive`] for the on-disk layout.
//!
//! ```no_run
//! use std::path::Path;
//!
//! use pyp4::archive::{create_archive, Archive, CreateOptions, ExtractOptions, OpenOptions};
//! use pyp4::walk::{scan_directory, WalkOptions};
//!
//! # fn main() -> pyp4::error::Result<()> {
//! let tree = scan_directory(Path::new("assets"), &WalkOptions::default())?;
//!
//! let options = CreateOptions {
//!     secret: Some("hunter2".to_string()),
//!     ..CreateOptions::default()
//! };
//! create_archive(&tree, Path::new("assets.pyp4"), &options)?;
//!
//! let mut archive = Archive::open(Path::new("assets.pyp4"), Some("hunter2"), &OpenOptions::default())?;
//! let report = archive.extract_all(Path::new("assets_extract"), &ExtractOptions::default())?;
//! assert!(report.mismatches.is_empty());
//! # Ok(())
//! # }
//! ```
pub mod archive;
pub mod chunk;
pub mod compress;
pub mod crypto;
pub mod easy;
pub mod error;
pub mod hash;
pub mod key;
pub mod metadata;
pub mod tree;
pub mod walk;

mod buf;

pub use hash::HASH_LEN;
pub use key::IV_LEN;

/// Magic bytes at the very start of every package
pub const MAGIC: [u8; MAGIC_LEN] = *b"PYPAKKET4";
pub const MAGIC_LEN: usize = 9;

/// Format version written into the trailer
pub const VERSION: u16 = 4;

/// Plaintext bytes per chunk unless configured otherwise
pub const DEFAULT_CHUNK_SIZE: usize = 2 * 1024;

// Worst case zlib expansion of a chunk this size still fits the u16 chunk table
pub const MAX_CHUNK_SIZE: usize = 60 * 1024;

/// Size of the trailing pointer to the start of the trailer
pub const FOOTER_LEN: usize = 8;

/// Longest package, directory or file name, in encoded bytes
pub const MAX_NAME_LEN: usize = u8::MAX as usize;
