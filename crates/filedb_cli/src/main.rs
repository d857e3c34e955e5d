//! FileDB CLI
//!
//! Offline tools for FileDB database directories. Every command expects the
//! database to be shut down.
//!
//! # Commands
//!
//! - `inspect` - Display database and table metadata
//! - `verify` - Check every table's data file
//! - `backups` - List a table's backups
//! - `restore` - Restore a table from one of its backups
//! - `relocate` - Move the database directory

mod commands;

use clap::{Args, Parser, Subcommand};
use filedb_core::BackupChoice;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// FileDB command-line database tools.
#[derive(Parser)]
#[command(name = "filedb")]
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

#[derive(Subcommand)]
enum Commands {
    /// Display database and table metadata
    Inspect {
        /// Print the records of this table
        #[arg(short, long)]
        table: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check every table's data file
    Verify,

    /// List the backups of a table
    Backups {
        /// Table identifier
        #[arg(short, long)]
        table: String,
    },

    /// Restore a table from a backup
    Restore {
        /// Table identifier
        #[arg(short, long)]
        table: String,

        #[command(flatten)]
        choice: ChoiceArgs,
    },

    /// Move the database directory
    Relocate {
        /// New database directory
        #[arg(short, long)]
        to: PathBuf,

        /// Replace files that already exist at the target
        #[arg(long)]
        overwrite: bool,

        /// Keep the old directory after copying
        #[arg(long)]
        keep_old: bool,
    },

    /// Show version information
    Version,
}

#[derive(Args)]
#[group(multiple = false)]
struct ChoiceArgs {
    /// Restore the oldest retained backup
    #[arg(long)]
    earliest: bool,

    /// Restore the backup at this position in `backups` output
    #[arg(long)]
    index: Option<usize>,
}

impl ChoiceArgs {
    fn choice(&self) -> BackupChoice {
        match (self.earliest, self.index) {
            (_, Some(index)) => BackupChoice::Index(index),
            (true, None) => BackupChoice::Earliest,
            (false, None) => BackupChoice::Latest,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { table, format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, table.as_deref(), &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Database path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Backups { table } => {
            let path = cli.path.ok_or("Database path required for backups")?;
            commands::backup::list(&path, &table)?;
        }
        Commands::Restore { table, choice } => {
            let path = cli.path.ok_or("Database path required for restore")?;
            commands::backup::restore(&path, &table, choice.choice())?;
        }
        Commands::Relocate {
            to,
            overwrite,
            keep_old,
        } => {
            let path = cli.path.ok_or("Database path required for relocate")?;
            commands::relocate::run(&path, &to, overwrite, keep_old)?;
        }
        Commands::Version => {
            println!("FileDB CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
