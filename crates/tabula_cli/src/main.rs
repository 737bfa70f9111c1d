//! Tabula CLI
//!
//! Command-line tools for Tabula database maintenance.
//!
//! # Commands
//!
//! - `inspect` - Display tables, schemas, indexes and statistics
//! - `verify` - Verify segment checksums and index integrity
//! - `seal` - Seal the active segment of a table
//! - `traverse` - Print the live rows of a table as JSON lines

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Tabula command-line database tools.
#[derive(Parser)]
#[command(name = "tabula")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format of `inspect`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Display tables, schemas, indexes and statistics
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Verify segment checksums and index integrity
    Verify,

    /// Seal the active segment of a table
    Seal {
        /// Table name
        #[arg(short, long)]
        table: String,
    },

    /// Print the live rows of a table as JSON lines
    Traverse {
        /// Table name
        #[arg(short, long)]
        table: String,

        /// Maximum number of rows
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Database path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Seal { table } => {
            let path = cli.path.ok_or("Database path required for seal")?;
            commands::seal::run(&path, &table)?;
        }
        Commands::Traverse { table, limit } => {
            let path = cli.path.ok_or("Database path required for traverse")?;
            commands::traverse::run(&path, &table, limit)?;
        }
        Commands::Version => {
            println!("Tabula CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Row format v{}", tabula_codec::ROW_FORMAT_VERSION);
            println!("Catalog format v{}", tabula_core::CATALOG_VERSION);
        }
    }

    Ok(())
}
