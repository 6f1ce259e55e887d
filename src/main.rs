use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;

use pyp4::archive::{create_archive, Archive, CreateOptions, ExtractOptions, OpenOptions};
use pyp4::easy::extract_dir;
use pyp4::error::Pyp4Error;
use pyp4::walk::{scan_directory, WalkOptions};

mod cli;
use crate::cli::Cli;
use crate::cli::Commands;
use crate::cli::Config;
use crate::cli::ConfigError;

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Package(#[from] Pyp4Error),
    #[error("--metadata is not valid JSON: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("{0} file(s) failed their hash check")]
    Mismatches(usize),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    info!("CONFIG: {:?}", config);

    match cli.command {
        Commands::Pack {
            dir,
            output,
            name,
            key,
            metadata,
            overwrite,
            chunk_size,
            timestamp,
            follow_links,
        } => {
            let walk = WalkOptions {
                follow_links: follow_links.unwrap_or(config.follow_links),
                ..WalkOptions::default()
            };
            let tree = scan_directory(&dir, &walk)?;

            let metadata = match metadata {
                Some(json) => {
                    let value: serde_json::Value = serde_json::from_str(&json)?;
                    pyp4::metadata::encode(&value)?
                }
                None => pyp4::metadata::EMPTY.to_vec(),
            };

            let target = output.unwrap_or_else(|| PathBuf::from(format!("{}.pyp4", tree.name())));
            let options = CreateOptions {
                package_name: name,
                secret: key,
                metadata,
                overwrite: overwrite || config.pack.overwrite,
                chunk_size: chunk_size.unwrap_or(config.chunk_size),
                created: timestamp,
            };
            let manifest = create_archive(&tree, &target, &options)?;
            println!("{}: {} files", target.display(), manifest.files.len());
        }
        Commands::Unpack {
            archive,
            output,
            key,
            overwrite,
            hash_check,
            skip_version_check,
            metadata_file,
        } => {
            let open = OpenOptions {
                skip_version_check: skip_version_check || config.unpack.skip_version_check,
                ..OpenOptions::default()
            };
            let mut package = Archive::open(&archive, key.as_deref(), &open)?;

            let output = output.unwrap_or_else(|| extract_dir(&archive));
            let options = ExtractOptions {
                create_dir: true,
                overwrite: overwrite || config.unpack.overwrite,
                hash_policy: hash_check.unwrap_or(config.unpack.hash_check).into(),
                metadata_file: metadata_file || config.unpack.metadata_file,
            };
            let report = package.extract_all(&output, &options)?;

            println!(
                "{}: {} directories, {} files",
                output.display(),
                report.directories,
                report.files
            );
            for m in &report.mismatches {
                println!("HASH MISMATCH {} (declared {}, computed {})", m.path.display(), m.declared, m.computed);
            }
        }
        Commands::List {
            archive,
            key,
            skip_version_check,
        } => {
            let open = OpenOptions {
                skip_version_check: skip_version_check || config.unpack.skip_version_check,
                ..OpenOptions::default()
            };
            let package = Archive::open(&archive, key.as_deref(), &open)?;
            let manifest = package.manifest();

            let created = manifest
                .created_at()
                .ok()
                .and_then(|t| t.format(&Rfc3339).ok())
                .unwrap_or_else(|| manifest.created.to_string());

            println!("Package:   {}", manifest.name);
            println!("Version:   {}", manifest.version);
            println!("Encrypted: {}", manifest.is_encrypted());
            println!("Created:   {}", created);
            println!("Metadata:  {}", pyp4::metadata::render(&manifest.metadata));
            println!("Directories: {}", manifest.directories.len());
            for dir in &manifest.directories {
                println!("  {}", dir);
            }
            println!("Files: {}", manifest.files.len());
            for entry in &manifest.files {
                println!(
                    "  {:>12} {:>12} {:>6} {} {}",
                    entry.size,
                    entry.compressed_size,
                    entry.chunk_sizes.len(),
                    entry.hash,
                    manifest.resolve_path(entry)?.display()
                );
            }
        }
        Commands::Verify { archive, key } => {
            let mut package = Archive::open(&archive, key.as_deref(), &OpenOptions::default())?;
            let mismatches = package.verify()?;

            for m in &mismatches {
                println!("HASH MISMATCH {} (declared {}, computed {})", m.path.display(), m.declared, m.computed);
            }
            if !mismatches.is_empty() {
                return Err(CliError::Mismatches(mismatches.len()));
            }
            println!("{}: {} files verified", archive.display(), package.manifest().files.len());
        }
    }

    Ok(())
}
