//! Sentiment pipeline
//!
//! Reads unprocessed survey rows, scores each one, and writes
//! `(id, query_text, sentiment)` rows to the result table.
//!
//! # Overview
//!
//! 1. Collect identifiers already in the result table (incremental runs,
//!    except under truncate, which rewrites the whole table)
//! 2. Query the survey table for non-empty text, excluding those identifiers
//! 3. Call the analyzer once per row, in order
//! 4. Write the result through [`TableSync`]

mod types;

pub use types::{PipelineOptions, PipelineStats, OUTPUT_COLUMNS};

use crate::dataset::{Cell, Dataset};
use crate::error::{Error, Result};
use crate::schema::SchemaFetchPolicy;
use crate::sentiment::SentimentAnalyzer;
use crate::sync::{TableSync, WriteMode};
use crate::types::JsonValue;
use crate::warehouse::{validate_token, Warehouse};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Sentiment pipeline over a source and a destination warehouse dataset
pub struct SentimentPipeline<'a> {
    source: &'a dyn Warehouse,
    destination: &'a dyn Warehouse,
    analyzer: &'a dyn SentimentAnalyzer,
    options: PipelineOptions,
}

impl<'a> SentimentPipeline<'a> {
    /// Create a pipeline with default options
    pub fn new(
        source: &'a dyn Warehouse,
        destination: &'a dyn Warehouse,
        analyzer: &'a dyn SentimentAnalyzer,
    ) -> Self {
        Self {
            source,
            destination,
            analyzer,
            options: PipelineOptions::default(),
        }
    }

    /// Set pipeline options
    #[must_use]
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Get the options
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run the pipeline once
    pub async fn run(&self) -> Result<PipelineStats> {
        let start = Instant::now();
        let mut stats = PipelineStats::new();

        // Truncate deletes every earlier result, so nothing may be skipped
        let truncating = self.options.mode == WriteMode::Truncate;
        if self.options.incremental && truncating {
            warn!(
                table = %self.options.destination_table,
                "truncate mode rewrites the whole table, analyzing every row"
            );
        }

        let processed = if self.options.incremental && !truncating {
            self.processed_ids().await?
        } else {
            Vec::new()
        };
        stats.ids_skipped = processed.len();

        let query = self.ingestion_query(&processed)?;
        let result = self.source.execute(&query).await?;
        stats.rows_read = result.len();

        if result.is_empty() {
            info!(
                source = %self.options.source_table,
                skipped = stats.ids_skipped,
                "no new records to analyze"
            );
            stats.set_duration(start.elapsed().as_millis() as u64);
            return Ok(stats);
        }

        info!(rows = result.len(), "got records to analyze");

        let mut dataset = Dataset::new(OUTPUT_COLUMNS);
        for row in result.rows {
            let mut cells = row.into_iter();
            let id = cells.next().unwrap_or(JsonValue::Null);
            let text = json_to_text(&cells.next().unwrap_or(JsonValue::Null));

            let sentiment = self.analyzer.analyze(&text).await?;
            debug!(id = %id, %sentiment, "analyzed record");

            dataset.push_row(vec![Cell::from(id), Cell::Text(text), Cell::Text(sentiment)])?;
        }

        let summary = TableSync::new(self.destination)
            .with_schema_policy(self.options.schema_fetch)
            .write(&self.options.destination_table, &dataset, &self.options.mode)
            .await?;

        stats.rows_written = summary.rows_written;
        stats.write = Some(summary);
        stats.set_duration(start.elapsed().as_millis() as u64);

        info!(
            table = %self.options.destination_table,
            rows = stats.rows_written,
            duration_ms = stats.duration_ms,
            "pipeline finished"
        );
        Ok(stats)
    }

    /// Identifiers already present in the result table
    pub async fn processed_ids(&self) -> Result<Vec<String>> {
        let table = &self.options.destination_table;
        let schema = match self.destination.get_schema(table).await {
            Ok(schema) => schema,
            Err(e @ Error::SchemaFetch { .. })
                if self.options.schema_fetch == SchemaFetchPolicy::TreatAsAbsent =>
            {
                warn!(%table, error = %e, "schema fetch failed, assuming nothing processed");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        if schema.is_absent() || !schema.has_column(OUTPUT_COLUMNS[0]) {
            debug!(%table, "result table absent, nothing processed yet");
            return Ok(Vec::new());
        }

        let dialect = self.destination.dialect();
        let id = dialect.quote_ident(OUTPUT_COLUMNS[0]);
        let sql = format!(
            "SELECT DISTINCT {} AS id FROM {} WHERE {id} IS NOT NULL",
            dialect.cast_to_text(&id),
            self.destination.qualified_table(table)
        );

        let result = self.destination.execute(&sql).await?;
        let ids: Vec<String> = result
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter(|v| !v.is_null())
            .map(|v| json_to_text(&v))
            .collect();

        debug!(%table, count = ids.len(), "already processed identifiers");
        Ok(ids)
    }

    /// Query for eligible rows, excluding `processed` identifiers
    ///
    /// Every identifier must be a safe token; one that is not aborts with
    /// [`Error::UnsafeIdentifier`].
    pub fn ingestion_query(&self, processed: &[String]) -> Result<String> {
        let dialect = self.source.dialect();
        let id = dialect.quote_ident(&self.options.id_column);
        let text = dialect.quote_ident(&self.options.text_column);

        let mut sql = format!(
            "SELECT {id}, {text} FROM {} WHERE {text} IS NOT NULL AND {text} != ''",
            self.source.qualified_table(&self.options.source_table)
        );

        if !processed.is_empty() {
            let literals = processed
                .iter()
                .map(|value| validate_token(value).map(|v| dialect.quote_literal(v)))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(&format!(
                " AND {} NOT IN ({})",
                dialect.cast_to_text(&id),
                literals.join(", ")
            ));
        }

        Ok(sql)
    }
}

impl std::fmt::Debug for SentimentPipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentimentPipeline")
            .field("source", &self.source.dataset())
            .field("destination", &self.destination.dataset())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn json_to_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests;
