//! CLI arguments

use crate::sync::SyncMode;
use clap::Parser;
use std::path::PathBuf;

/// Survey sentiment sync
#[derive(Parser, Debug)]
#[command(name = "sentiment-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Project that owns both datasets
    #[arg(short = 'p', long = "bigquery-project-name")]
    pub project: String,

    /// Dataset holding the survey table
    #[arg(short = 'd', long = "bigquery-input-dataset")]
    pub input_dataset: String,

    /// Dataset the results are written to
    #[arg(short = 't', long = "bigquery-output-dataset")]
    pub output_dataset: String,

    /// Configuration file (YAML or JSON)
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// Write mode for the result table
    #[arg(long)]
    pub mode: Option<ModeArg>,

    /// Merge routine for `replace` mode
    #[arg(long)]
    pub stored_procedure: Option<String>,

    /// Warehouse backend
    #[arg(long)]
    pub backend: Option<Backend>,

    /// DuckDB database file (duckdb backend only)
    #[arg(long)]
    pub duckdb_path: Option<PathBuf>,

    /// Survey table
    #[arg(long)]
    pub source_table: Option<String>,

    /// Result table
    #[arg(long)]
    pub destination_table: Option<String>,

    /// Analyze every row, including ones already in the result table
    #[arg(long)]
    pub full_refresh: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Write mode flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeArg {
    /// Add rows
    Append,
    /// Delete all rows, then add
    Truncate,
    /// Merge through a stored procedure
    Replace,
}

impl From<ModeArg> for SyncMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Append => SyncMode::Append,
            ModeArg::Truncate => SyncMode::Truncate,
            ModeArg::Replace => SyncMode::Replace,
        }
    }
}

/// Warehouse backend flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// Google BigQuery
    Bigquery,
    /// Embedded DuckDB
    Duckdb,
}
