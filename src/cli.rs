use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use pyp4::archive::HashPolicy;
use pyp4::DEFAULT_CHUNK_SIZE;

#[derive(Parser)]
#[command(name = "pyp4")]
#[command(about = "Pack a directory into a single compressed, optionally encrypted file")]
#[command(author, version, long_about = None)]
pub struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// More output, repeat for more
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Packs a directory into a package
    Pack {
        /// Directory to pack
        dir: PathBuf,

        /// Output file, defaults to `<dir name>.pyp4`
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Package name, defaults to the directory name
        #[arg(long)]
        name: Option<String>,

        /// Encrypt with this key
        #[arg(short, long)]
        key: Option<String>,

        /// Metadata to embed, as JSON
        #[arg(long)]
        metadata: Option<String>,

        /// Replace the output if it exists
        #[arg(long)]
        overwrite: bool,

        /// Plaintext bytes per chunk
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Creation time to record, POSIX seconds
        #[arg(long)]
        timestamp: Option<u64>,

        /// Follow symbolic links while walking
        #[arg(long)]
        follow_links: Option<bool>,
    },

    /// Extracts a package
    Unpack {
        /// Package to extract
        archive: PathBuf,

        /// Output directory, defaults to `<archive>_extract`
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Key the package was encrypted with
        #[arg(short, long)]
        key: Option<String>,

        /// Replace files that already exist
        #[arg(long)]
        overwrite: bool,

        /// What to do with files that fail their hash check
        #[arg(long, value_enum)]
        hash_check: Option<HashCheck>,

        /// Read packages written by another format version
        #[arg(long)]
        skip_version_check: bool,

        /// Also write a pyp4_metadata.txt summary
        #[arg(long)]
        metadata_file: bool,
    },

    /// Lists the contents of a package
    List {
        archive: PathBuf,

        #[arg(short, long)]
        key: Option<String>,

        #[arg(long)]
        skip_version_check: bool,
    },

    /// Checks every file against its stored hash
    Verify {
        archive: PathBuf,

        #[arg(short, long)]
        key: Option<String>,
    },
}

#[derive(ValueEnum, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashCheck {
    Skip,
    #[default]
    Warn,
    Strict,
}

impl From<HashCheck> for HashPolicy {
    fn from(check: HashCheck) -> Self {
        match check {
            HashCheck::Skip => HashPolicy::Skip,
            HashCheck::Warn => HashPolicy::Warn,
            HashCheck::Strict => HashPolicy::Strict,
        }
    }
}

// Configuration, every field is optional and the command line wins
#[derive(Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    pub chunk_size: usize,
    pub follow_links: bool,

    pub pack: PackConfig,
    pub unpack: UnpackConfig,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct PackConfig {
    pub overwrite: bool,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct UnpackConfig {
    pub overwrite: bool,
    pub hash_check: HashCheck,
    pub skip_version_check: bool,
    pub metadata_file: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            chunk_size: DEFAULT_CHUNK_SIZE,
            follow_links: true,
            pack: PackConfig::default(),
            unpack: UnpackConfig::default(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("reading {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let path = match path {
            Some(path) => path,
            None => return Ok(Config::default()),
        };

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
