//! Table sync
//!
//! Writes a dataset into a warehouse table under one of three write modes,
//! reconciling the destination schema first.
//!
//! # Modes
//!
//! - **append**: add missing columns, then append rows
//! - **truncate**: `DELETE ... WHERE 1=1`, then append; the schema is kept
//! - **replace**: load into an empty copy of the destination, call a stored
//!   procedure to merge, and drop the copy on every path
//!
//! A destination table that does not exist yet is always created by an
//! append load, whatever the mode.

mod types;

pub use types::{
    StagingPhase, StagingTable, SyncMode, WriteMode, WriteSummary, STAGING_PREFIX,
    STAGING_TOKEN_LEN,
};

use crate::dataset::Dataset;
use crate::error::{report, Error, Result};
use crate::sanitize::{sanitize_dataset, SanitizedDataset};
use crate::schema::{add_columns_sql, reconcile, SchemaFetchPolicy, TableSchema};
use crate::warehouse::{LoadDisposition, Warehouse};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

/// Writes datasets into tables of one warehouse dataset
pub struct TableSync<'a> {
    warehouse: &'a dyn Warehouse,
    schema_policy: SchemaFetchPolicy,
}

impl<'a> TableSync<'a> {
    /// Create a writer over a warehouse
    pub fn new(warehouse: &'a dyn Warehouse) -> Self {
        Self {
            warehouse,
            schema_policy: SchemaFetchPolicy::default(),
        }
    }

    /// Set how schema fetch failures are handled
    #[must_use]
    pub fn with_schema_policy(mut self, policy: SchemaFetchPolicy) -> Self {
        self.schema_policy = policy;
        self
    }

    /// Validate `mode` and write `dataset` into `table`
    ///
    /// A dataset with no rows is a logged no-op whatever the mode. Otherwise
    /// mode errors are reported before any warehouse call.
    pub async fn insert_alter(
        &self,
        table: &str,
        dataset: &Dataset,
        mode: &str,
        stored_procedure: Option<&str>,
    ) -> Result<WriteSummary> {
        if dataset.is_empty() {
            info!(%table, %mode, "dataset is empty, nothing to write");
            let mode = mode.parse::<SyncMode>().unwrap_or_default();
            return Ok(WriteSummary::empty(table, mode));
        }

        let mode = WriteMode::parse(mode, stored_procedure)?;
        self.write(table, dataset, &mode).await
    }

    /// Write `dataset` into `table` under an already validated mode
    pub async fn write(
        &self,
        table: &str,
        dataset: &Dataset,
        mode: &WriteMode,
    ) -> Result<WriteSummary> {
        if dataset.is_empty() {
            info!(%table, mode = %mode.mode(), "dataset is empty, nothing to write");
            return Ok(WriteSummary::empty(table, mode.mode()));
        }

        let data = sanitize_dataset(dataset);
        if let Some(column) = data.duplicate_column() {
            return Err(Error::config(format!(
                "Column '{column}' appears more than once after name normalization"
            )));
        }

        let schema = self.fetch_schema(table).await?;
        let mut summary = WriteSummary::empty(table, mode.mode());

        if schema.is_absent() {
            info!(
                %table,
                mode = %mode.mode(),
                "destination table absent, creating it from the dataset"
            );
            summary.rows_written = self
                .warehouse
                .load(table, &data, LoadDisposition::Append)
                .await?;
            summary.created = true;
            return Ok(summary);
        }

        let columns: BTreeSet<String> = data.columns.iter().cloned().collect();
        let to_add = reconcile(&columns, &schema, mode.mode());
        self.add_columns(table, &to_add).await?;
        summary.columns_added = to_add.into_iter().collect();

        summary.rows_written = match mode {
            WriteMode::Append => {
                info!(%table, rows = data.len(), "appending rows");
                self.warehouse
                    .load(table, &data, LoadDisposition::Append)
                    .await?
            }
            WriteMode::Truncate => {
                let qualified = self.warehouse.qualified_table(table);
                info!(%table, rows = data.len(), "truncating table before load");
                self.warehouse
                    .execute(&self.warehouse.dialect().delete_all_sql(&qualified))
                    .await?;
                self.warehouse
                    .load(table, &data, LoadDisposition::Append)
                    .await?
            }
            WriteMode::Replace { procedure } => self.replace(table, &data, procedure).await?,
        };

        Ok(summary)
    }

    async fn fetch_schema(&self, table: &str) -> Result<TableSchema> {
        match self.warehouse.get_schema(table).await {
            Ok(schema) => Ok(schema),
            Err(e @ Error::SchemaFetch { .. })
                if self.schema_policy == SchemaFetchPolicy::TreatAsAbsent =>
            {
                warn!(%table, error = %e, "schema fetch failed, treating table as absent");
                Ok(TableSchema::absent())
            }
            Err(e) => Err(e),
        }
    }

    async fn add_columns(&self, table: &str, columns: &BTreeSet<String>) -> Result<()> {
        let qualified = self.warehouse.qualified_table(table);
        let Some(sql) = add_columns_sql(self.warehouse.dialect(), &qualified, columns) else {
            return Ok(());
        };

        info!(%table, ?columns, "adding columns: {}", sql);
        match self.warehouse.execute(&sql).await {
            Ok(_) => {
                info!(%table, added = columns.len(), "schema updated");
                Ok(())
            }
            Err(e) => {
                error!(%table, error = %e, "schema update failed");
                Err(e)
            }
        }
    }

    async fn replace(&self, table: &str, data: &SanitizedDataset, procedure: &str) -> Result<u64> {
        let staging = StagingTable::generate(table);
        let qualified_target = self.warehouse.qualified_table(table);
        let qualified_staging = self.warehouse.qualified_table(staging.name());
        let dialect = self.warehouse.dialect();

        debug!(%table, %staging, phase = %StagingPhase::Start, "replace starting");
        self.warehouse
            .execute(&dialect.create_empty_copy_sql(&qualified_staging, &qualified_target))
            .await?;

        let mut phase = StagingPhase::StagingCreated;
        info!(%table, %staging, %phase, "staging table created");

        let outcome = self
            .load_and_merge(table, &staging, data, procedure, &mut phase)
            .await;

        let dropped = self
            .warehouse
            .execute(&dialect.drop_table_sql(&qualified_staging))
            .await;
        if dropped.is_ok() {
            info!(
                %table,
                %staging,
                phase = %StagingPhase::StagingDropped,
                "staging table dropped"
            );
        }

        match (outcome, dropped) {
            (Ok(rows), Ok(_)) => Ok(rows),
            (Ok(_), Err(drop_error)) => {
                error!(%table, %staging, error = %drop_error, "failed to drop staging table");
                Err(drop_error)
            }
            (Err(cause), dropped) => {
                error!(%table, %staging, %phase, "merge failed: {}", report(&cause));
                if let Err(drop_error) = &dropped {
                    warn!(
                        %table,
                        %staging,
                        error = %drop_error,
                        "failed to drop staging table after merge failure"
                    );
                }
                Err(Error::Merge {
                    table: table.to_string(),
                    staging: staging.name().to_string(),
                    phase,
                    staging_dropped: dropped.is_ok(),
                    source: Box::new(cause),
                })
            }
        }
    }

    async fn load_and_merge(
        &self,
        table: &str,
        staging: &StagingTable,
        data: &SanitizedDataset,
        procedure: &str,
        phase: &mut StagingPhase,
    ) -> Result<u64> {
        let rows = self
            .warehouse
            .load(staging.name(), data, LoadDisposition::Replace)
            .await?;
        *phase = StagingPhase::StagingLoaded;
        info!(
            %table,
            %staging,
            phase = %StagingPhase::StagingLoaded,
            rows,
            "staging table loaded"
        );

        let args = [
            table.to_string(),
            staging.name().to_string(),
            self.warehouse.dataset().to_string(),
        ];
        self.warehouse.call_procedure(procedure, &args).await?;
        *phase = StagingPhase::MergeCalled;
        info!(
            %table,
            %staging,
            phase = %StagingPhase::MergeCalled,
            %procedure,
            "merge procedure returned"
        );

        Ok(rows)
    }
}

impl std::fmt::Debug for TableSync<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableSync")
            .field("dataset", &self.warehouse.dataset())
            .field("dialect", &self.warehouse.dialect())
            .field("schema_policy", &self.schema_policy)
            .finish()
    }
}

#[cfg(test)]
mod tests;
