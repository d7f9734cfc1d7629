//! shelf-reader CLI: browse and read a sandboxed document library.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use shelf_reader::config::{DEFAULT_CONFIG_PATH, load_config, serialize_config};
use shelf_reader::Library;

#[derive(Parser)]
#[command(name = "shelf-reader", version, about = "Sandboxed document reader")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a directory inside the library.
    List {
        /// Relative directory path; the root when omitted.
        #[arg(default_value = "")]
        path: String,

        /// Case-insensitive name filter.
        #[arg(long)]
        query: Option<String>,
    },

    /// Show the descriptor for a single file.
    Info { path: String },

    /// Read and normalize a file.
    Read { path: String },

    /// List the pages of a CBZ archive.
    Pages { path: String },

    /// Extract one comic page.
    Page {
        /// Archive path, may be percent-encoded.
        path: String,
        /// Entry name, may be percent-encoded.
        entry: String,
        #[arg(long)]
        out: PathBuf,
    },

    /// Stage a local file as a temporary upload.
    Upload { file: PathBuf },

    /// Remove expired temporary uploads.
    Cleanup,

    /// Print the effective configuration as TOML.
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Config = cli.command {
        print!("{}", serialize_config(&config)?);
        return Ok(());
    }

    let library = Library::open(&config).with_context(|| {
        format!("failed to open library at {}", config.root_dir.display())
    })?;

    match cli.command {
        Commands::List { path, query } => print_json(&library.list(&path, query.as_deref())?),
        Commands::Info { path } => print_json(&library.describe(&path)?),
        Commands::Read { path } => {
            let outcome = library
                .read(&path)
                .with_context(|| format!("failed to read {path}"))?;
            print_json(&outcome)
        }
        Commands::Pages { path } => print_json(&library.comic_pages(&path)?),
        Commands::Page { path, entry, out } => {
            let page = library.comic_page(&path, &entry)?;
            fs::write(&out, &page.bytes)
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!(entry = %page.name, mime = page.mime, out = %out.display(), "Wrote comic page");
            Ok(())
        }
        Commands::Upload { file } => {
            let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
                bail!("{} has no usable file name", file.display());
            };
            let bytes =
                fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let uploads = library
                .uploads()
                .context("upload directory is not configured")?;
            print_json(&uploads.stage(name, &bytes)?)
        }
        Commands::Cleanup => {
            let uploads = library
                .uploads()
                .context("upload directory is not configured")?;
            let removed = uploads.cleanup(config.temp_max_age())?;
            println!("Removed {removed} expired upload(s)");
            Ok(())
        }
        // Printed before the library is opened.
        Commands::Config => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
