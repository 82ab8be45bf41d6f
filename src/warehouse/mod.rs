//! Warehouse clients
//!
//! The [`Warehouse`] trait is the seam between the sync core and a concrete
//! warehouse. Two implementations ship with the crate:
//!
//! - [`BigQueryWarehouse`] - Google BigQuery over the v2 REST API
//! - [`DuckDbWarehouse`] - embedded DuckDB, in memory or on disk
//!
//! Every call is awaited before the next one starts; the sync core never
//! issues warehouse calls concurrently.

mod bigquery;
mod dialect;
mod duckdb;

pub use bigquery::{BigQueryConfig, BigQueryWarehouse};
pub use dialect::{validate_token, Dialect};
pub use duckdb::DuckDbWarehouse;

use crate::dataset::{Cell, Dataset};
use crate::error::Result;
use crate::sanitize::SanitizedDataset;
use crate::schema::TableSchema;
use crate::types::JsonValue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How a load treats rows already in the target table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadDisposition {
    /// Keep existing rows
    Append,
    /// Remove existing rows first (the table structure is kept)
    Replace,
}

/// Tabular result of a query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Column names in result order
    pub columns: Vec<String>,
    /// Row values in column order
    pub rows: Vec<Vec<JsonValue>>,
}

impl QueryResult {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All values of one column
    pub fn column(&self, name: &str) -> Option<Vec<&JsonValue>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().filter_map(|row| row.get(idx)).collect())
    }

    /// Convert into an in-memory dataset
    pub fn into_dataset(self) -> Dataset {
        let mut dataset = Dataset::new(self.columns);
        for row in self.rows {
            // Rows come straight from the warehouse and always match the width
            let _ = dataset.push_row(row.into_iter().map(Cell::from).collect());
        }
        dataset
    }
}

/// A remote (or embedded) warehouse the sync core can read from and write to
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// SQL dialect spoken by this warehouse
    fn dialect(&self) -> Dialect;

    /// Dataset (namespace) tables are resolved in
    fn dataset(&self) -> &str;

    /// Fully qualified, quoted name of a table in this dataset
    fn qualified_table(&self, table: &str) -> String;

    /// Live schema of a table; an absent table yields an empty schema
    async fn get_schema(&self, table: &str) -> Result<TableSchema>;

    /// Execute a SQL statement and return its tabular result
    async fn execute(&self, sql: &str) -> Result<QueryResult>;

    /// Load a sanitized dataset into a table, creating it (all text) if absent
    async fn load(
        &self,
        table: &str,
        data: &SanitizedDataset,
        disposition: LoadDisposition,
    ) -> Result<u64>;

    /// Call a stored procedure in this dataset with string arguments
    async fn call_procedure(&self, name: &str, args: &[String]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_result_column() {
        let result = QueryResult {
            columns: vec!["id".to_string(), "body_text".to_string()],
            rows: vec![vec![json!(1), json!("ok")], vec![json!(2), json!("meh")]],
        };

        assert_eq!(result.len(), 2);
        assert_eq!(result.column("id").unwrap(), vec![&json!(1), &json!(2)]);
        assert!(result.column("missing").is_none());
    }

    #[test]
    fn test_query_result_into_dataset() {
        let result = QueryResult {
            columns: vec!["id".to_string(), "body_text".to_string()],
            rows: vec![vec![json!(1), json!("ok")]],
        };

        let dataset = result.into_dataset();
        assert_eq!(dataset.columns(), &["id", "body_text"]);
        assert_eq!(dataset.rows()[0], vec![Cell::Integer(1), Cell::from("ok")]);
    }
}
