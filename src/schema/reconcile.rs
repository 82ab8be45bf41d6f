//! Schema reconciliation
//!
//! Computes which dataset columns are missing from a destination table.
//! Added columns are always text; existing columns are never dropped or retyped.

use super::types::TableSchema;
use crate::sync::SyncMode;
use crate::warehouse::Dialect;
use std::collections::BTreeSet;

/// Columns of the dataset that the destination table lacks
///
/// Returns an empty set when the table is absent or the mode is `truncate`:
/// in both cases the load path owns the table structure.
pub fn reconcile(
    dataset_columns: &BTreeSet<String>,
    destination: &TableSchema,
    mode: SyncMode,
) -> BTreeSet<String> {
    if destination.is_absent() || mode == SyncMode::Truncate {
        return BTreeSet::new();
    }

    let existing = destination.column_names();
    dataset_columns.difference(&existing).cloned().collect()
}

/// Build the additive `ADD COLUMN IF NOT EXISTS` mutation for a dialect
///
/// Returns `None` when there is nothing to add.
pub fn add_columns_sql(
    dialect: Dialect,
    qualified_table: &str,
    columns: &BTreeSet<String>,
) -> Option<String> {
    if columns.is_empty() {
        return None;
    }

    let text_type = dialect.text_type();
    let sql = match dialect {
        Dialect::BigQuery => {
            let clauses: Vec<String> = columns
                .iter()
                .map(|c| {
                    format!(
                        "ADD COLUMN IF NOT EXISTS {} {text_type}",
                        dialect.quote_ident(c)
                    )
                })
                .collect();
            format!("ALTER TABLE {qualified_table} {}", clauses.join(", "))
        }
        // DuckDB accepts a single ADD COLUMN per ALTER TABLE
        Dialect::DuckDb => columns
            .iter()
            .map(|c| {
                format!(
                    "ALTER TABLE {qualified_table} ADD COLUMN IF NOT EXISTS {} {text_type};",
                    dialect.quote_ident(c)
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
    };

    Some(sql)
}
