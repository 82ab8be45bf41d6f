//! Pipeline types

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::schema::SchemaFetchPolicy;
use crate::sync::{WriteMode, WriteSummary};

/// Columns of the result table, in order
pub const OUTPUT_COLUMNS: [&str; 3] = ["id", "query_text", "sentiment"];

/// What the pipeline reads, where it writes, and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Survey table in the source dataset
    pub source_table: String,
    /// Identifier column of the survey table
    pub id_column: String,
    /// Free-text column of the survey table
    pub text_column: String,
    /// Result table in the destination dataset
    pub destination_table: String,
    /// Write mode for the result table
    pub mode: WriteMode,
    /// Skip identifiers already in the result table
    pub incremental: bool,
    /// How schema fetch failures are handled
    pub schema_fetch: SchemaFetchPolicy,
}

impl PipelineOptions {
    /// Options from a validated config
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            source_table: config.source_table.clone(),
            id_column: config.id_column.clone(),
            text_column: config.text_column.clone(),
            destination_table: config.destination_table.clone(),
            mode: config.write_mode()?,
            incremental: config.incremental,
            schema_fetch: config.schema_fetch,
        })
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            source_table: "satisfaction_surveys".to_string(),
            id_column: "id".to_string(),
            text_column: "body_text".to_string(),
            destination_table: "staging_sentiment_analysis".to_string(),
            mode: WriteMode::Append,
            incremental: true,
            schema_fetch: SchemaFetchPolicy::default(),
        }
    }
}

/// Statistics for a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Eligible rows returned by the ingestion query
    pub rows_read: usize,
    /// Identifiers already processed and excluded
    pub ids_skipped: usize,
    /// Rows handed to the warehouse
    pub rows_written: u64,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// Outcome of the write, if one happened
    pub write: Option<WriteSummary>,
}

impl PipelineStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Set duration
    pub fn set_duration(&mut self, ms: u64) {
        self.duration_ms = ms;
    }
}
