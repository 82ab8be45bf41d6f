//! DuckDB-backed warehouse
//!
//! Runs the whole sync contract against an embedded DuckDB database. A
//! dataset maps to a DuckDB schema. DuckDB has no stored procedures, so
//! procedures are SQL templates registered by name and rendered with
//! `{{ vars.target }}`, `{{ vars.staging }}` and `{{ vars.dataset }}`.

use super::{Dialect, LoadDisposition, QueryResult, Warehouse};
use crate::error::{Error, Result};
use crate::sanitize::SanitizedDataset;
use crate::schema::{SchemaField, TableSchema};
use crate::template::{self, TemplateContext};
use ::duckdb::Connection;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Warehouse backed by an embedded DuckDB database
pub struct DuckDbWarehouse {
    /// DuckDB connection
    conn: Mutex<Connection>,
    /// Schema used as the dataset namespace
    dataset: String,
    /// Database location (for logging)
    location: String,
    /// Registered procedure templates by name
    procedures: HashMap<String, String>,
}

impl DuckDbWarehouse {
    /// Open an in-memory database
    pub fn in_memory(dataset: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::config(format!("Failed to create DuckDB connection: {e}")))?;
        Self::from_connection(conn, dataset.into(), ":memory:".to_string())
    }

    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>, dataset: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            Error::config(format!(
                "Failed to open DuckDB database '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_connection(conn, dataset.into(), path.display().to_string())
    }

    fn from_connection(conn: Connection, dataset: String, location: String) -> Result<Self> {
        let create_schema = format!(
            "CREATE SCHEMA IF NOT EXISTS {};",
            Dialect::DuckDb.quote_ident(&dataset)
        );
        conn.execute_batch(&create_schema)
            .map_err(|e| Error::warehouse(format!("Failed to create schema '{dataset}': {e}")))?;

        tracing::debug!(%location, %dataset, "opened duckdb warehouse");

        Ok(Self {
            conn: Mutex::new(conn),
            dataset,
            location,
            procedures: HashMap::new(),
        })
    }

    /// Open another dataset in the same database
    pub fn with_dataset(&self, dataset: impl Into<String>) -> Result<Self> {
        let conn = self
            .lock()?
            .try_clone()
            .map_err(|e| Error::warehouse(format!("Failed to clone DuckDB connection: {e}")))?;
        Self::from_connection(conn, dataset.into(), self.location.clone())
    }

    /// Register a procedure template
    #[must_use]
    pub fn with_procedure(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.procedures.insert(name.into(), sql.into());
        self
    }

    /// Register a procedure template in place
    pub fn register_procedure(&mut self, name: impl Into<String>, sql: impl Into<String>) {
        self.procedures.insert(name.into(), sql.into());
    }

    /// Database location (path or `:memory:`)
    pub fn location(&self) -> &str {
        &self.location
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::warehouse("DuckDB connection mutex poisoned"))
    }

    fn table_exists(conn: &Connection, dataset: &str, table: &str) -> Result<bool> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM information_schema.tables
                 WHERE table_catalog = current_database() AND table_schema = ? AND table_name = ?",
                [dataset, table],
                |row| row.get(0),
            )
            .map_err(|e| Error::warehouse(format!("Failed to check table '{table}': {e}")))?;
        Ok(count > 0)
    }

    fn run_query(conn: &Connection, sql: &str) -> Result<QueryResult> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Error::warehouse(format!("Failed to prepare query: {e}")))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| Error::warehouse(format!("Query failed: {e}")))?;

        let columns: Vec<String> = rows
            .as_ref()
            .map(::duckdb::Statement::column_names)
            .unwrap_or_default();

        let mut result = QueryResult {
            columns,
            rows: Vec::new(),
        };

        while let Some(row) = rows
            .next()
            .map_err(|e| Error::warehouse(format!("Failed to read row: {e}")))?
        {
            let mut values = Vec::with_capacity(result.columns.len());
            for idx in 0..result.columns.len() {
                let value: ::duckdb::types::Value = row
                    .get(idx)
                    .map_err(|e| Error::warehouse(format!("Failed to read column {idx}: {e}")))?;
                values.push(duckdb_value_to_json(value));
            }
            result.rows.push(values);
        }

        Ok(result)
    }
}

#[async_trait]
impl Warehouse for DuckDbWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::DuckDb
    }

    fn dataset(&self) -> &str {
        &self.dataset
    }

    fn qualified_table(&self, table: &str) -> String {
        format!(
            "{}.{}",
            Dialect::DuckDb.quote_ident(&self.dataset),
            Dialect::DuckDb.quote_ident(table)
        )
    }

    async fn get_schema(&self, table: &str) -> Result<TableSchema> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT column_name, data_type FROM information_schema.columns
                 WHERE table_catalog = current_database() AND table_schema = ? AND table_name = ?
                 ORDER BY ordinal_position",
            )
            .map_err(|e| Error::schema_fetch(table, e.to_string()))?;

        let fields: Vec<SchemaField> = stmt
            .query_map([self.dataset.as_str(), table], |row| {
                Ok(SchemaField::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                ))
            })
            .map_err(|e| Error::schema_fetch(table, e.to_string()))?
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::schema_fetch(table, e.to_string()))?;

        Ok(TableSchema::new(fields))
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let conn = self.lock()?;
        tracing::debug!("Executing query: {}", sql);

        let head = sql.trim_start().to_uppercase();
        if head.starts_with("SELECT") || head.starts_with("WITH") || head.starts_with("FROM") {
            return Self::run_query(&conn, sql);
        }

        conn.execute_batch(sql)
            .map_err(|e| Error::warehouse(format!("Statement failed: {e}")))?;
        Ok(QueryResult::default())
    }

    async fn load(
        &self,
        table: &str,
        data: &SanitizedDataset,
        disposition: LoadDisposition,
    ) -> Result<u64> {
        let qualified = self.qualified_table(table);
        let mut conn = self.lock()?;
        let exists = Self::table_exists(&conn, &self.dataset, table)?;

        let tx = conn
            .transaction()
            .map_err(|e| Error::warehouse(format!("Failed to begin transaction: {e}")))?;

        if exists {
            if disposition == LoadDisposition::Replace {
                tx.execute_batch(&Dialect::DuckDb.delete_all_sql(&qualified))
                    .map_err(|e| Error::warehouse(format!("Failed to clear {qualified}: {e}")))?;
            }
        } else {
            let columns: Vec<String> = data
                .columns
                .iter()
                .map(|c| format!("{} VARCHAR", Dialect::DuckDb.quote_ident(c)))
                .collect();
            tx.execute_batch(&format!(
                "CREATE TABLE {qualified} ({});",
                columns.join(", ")
            ))
            .map_err(|e| Error::warehouse(format!("Failed to create {qualified}: {e}")))?;
            tracing::info!(table = %qualified, "created table from dataset structure");
        }

        let column_list: Vec<String> = data
            .columns
            .iter()
            .map(|c| Dialect::DuckDb.quote_ident(c))
            .collect();
        let placeholders = vec!["?"; data.columns.len()].join(", ");
        let insert_sql = format!(
            "INSERT INTO {qualified} ({}) VALUES ({placeholders})",
            column_list.join(", ")
        );

        {
            let mut stmt = tx
                .prepare(&insert_sql)
                .map_err(|e| Error::warehouse(format!("Failed to prepare insert: {e}")))?;
            for row in &data.rows {
                stmt.execute(::duckdb::params_from_iter(row.iter()))
                    .map_err(|e| {
                        Error::warehouse(format!("Failed to insert into {qualified}: {e}"))
                    })?;
            }
        }

        tx.commit()
            .map_err(|e| Error::warehouse(format!("Failed to commit load: {e}")))?;

        Ok(data.len() as u64)
    }

    async fn call_procedure(&self, name: &str, args: &[String]) -> Result<()> {
        let template = self
            .procedures
            .get(name)
            .ok_or_else(|| Error::warehouse(format!("Procedure '{name}' is not registered")))?;

        let mut ctx = TemplateContext::new();
        for (key, value) in ["target", "staging", "dataset"].iter().zip(args) {
            ctx.set_var(*key, value.as_str());
        }
        let sql = template::render(template, &ctx)?;

        let conn = self.lock()?;
        tracing::debug!(procedure = name, "Executing procedure: {}", sql);
        conn.execute_batch(&sql)
            .map_err(|e| Error::warehouse(format!("Procedure '{name}' failed: {e}")))?;
        Ok(())
    }
}

impl std::fmt::Debug for DuckDbWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbWarehouse")
            .field("dataset", &self.dataset)
            .field("location", &self.location)
            .field("procedures", &self.procedures.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Convert DuckDB Value to JSON Value
fn duckdb_value_to_json(value: ::duckdb::types::Value) -> Value {
    use ::duckdb::types::Value as Db;
    match value {
        Db::Null => Value::Null,
        Db::Boolean(b) => Value::Bool(b),
        Db::TinyInt(i) => Value::Number(i.into()),
        Db::SmallInt(i) => Value::Number(i.into()),
        Db::Int(i) => Value::Number(i.into()),
        Db::BigInt(i) => Value::Number(i.into()),
        Db::HugeInt(i) => Value::String(i.to_string()),
        Db::UTinyInt(i) => Value::Number(i.into()),
        Db::USmallInt(i) => Value::Number(i.into()),
        Db::UInt(i) => Value::Number(i.into()),
        Db::UBigInt(i) => Value::Number(i.into()),
        Db::Float(f) => {
            serde_json::Number::from_f64(f64::from(f)).map_or(Value::Null, Value::Number)
        }
        Db::Double(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        Db::Text(s) => Value::String(s),
        Db::Timestamp(unit, i) => timestamp_to_json(unit, i),
        Db::Date32(d) => {
            // Days since epoch (719163 is the number of days from 1 CE to 1970-01-01)
            chrono::NaiveDate::from_num_days_from_ce_opt(d + 719_163)
                .map(|date| Value::String(date.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Number(d.into()))
        }
        other => Value::String(format!("{other:?}")),
    }
}

/// RFC 3339 text for a timestamp of `value` units since the epoch
///
/// Values outside the representable range come back as the raw number.
fn timestamp_to_json(unit: ::duckdb::types::TimeUnit, value: i64) -> Value {
    use ::duckdb::types::TimeUnit;
    let micros = match unit {
        TimeUnit::Second => value.checked_mul(1_000_000),
        TimeUnit::Millisecond => value.checked_mul(1_000),
        TimeUnit::Microsecond => Some(value),
        TimeUnit::Nanosecond => Some(value.div_euclid(1_000)),
    };
    micros
        .and_then(chrono::DateTime::from_timestamp_micros)
        .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()))
        .unwrap_or(Value::Number(value.into()))
}
