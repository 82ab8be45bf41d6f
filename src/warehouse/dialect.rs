//! SQL dialects
//!
//! Statement builders for the warehouses this crate can write to. Only the
//! handful of statements the sync path needs are covered.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Values that may be interpolated into SQL without binding
static SAFE_TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.:@-]+$").unwrap());

/// SQL dialect spoken by a warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// Google BigQuery (GoogleSQL)
    BigQuery,
    /// Embedded DuckDB
    DuckDb,
}

impl Dialect {
    /// Generic text type used for added and auto-created columns
    pub fn text_type(self) -> &'static str {
        match self {
            Dialect::BigQuery => "STRING",
            Dialect::DuckDb => "VARCHAR",
        }
    }

    /// Quote an identifier (column, table, dataset)
    pub fn quote_ident(self, ident: &str) -> String {
        match self {
            Dialect::BigQuery => {
                let mut escaped = String::with_capacity(ident.len() + 2);
                escaped.push('`');
                for ch in ident.chars() {
                    match ch {
                        '`' => escaped.push_str("\\`"),
                        '\\' => escaped.push_str("\\\\"),
                        _ => escaped.push(ch),
                    }
                }
                escaped.push('`');
                escaped
            }
            Dialect::DuckDb => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Quote a string literal
    pub fn quote_literal(self, value: &str) -> String {
        match self {
            Dialect::BigQuery => format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'")),
            Dialect::DuckDb => format!("'{}'", value.replace('\'', "''")),
        }
    }

    /// Cast an expression to text
    pub fn cast_to_text(self, expr: &str) -> String {
        format!("CAST({expr} AS {})", self.text_type())
    }

    /// Schema-preserving row deletion
    pub fn delete_all_sql(self, qualified_table: &str) -> String {
        format!("DELETE FROM {qualified_table} WHERE 1=1")
    }

    /// Zero-row copy of a table's structure
    pub fn create_empty_copy_sql(self, qualified_new: &str, qualified_source: &str) -> String {
        format!("CREATE TABLE {qualified_new} AS SELECT * FROM {qualified_source} LIMIT 0")
    }

    /// Drop a table
    pub fn drop_table_sql(self, qualified_table: &str) -> String {
        format!("DROP TABLE IF EXISTS {qualified_table}")
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::BigQuery => write!(f, "bigquery"),
            Dialect::DuckDb => write!(f, "duckdb"),
        }
    }
}

/// Check that a value is a safe SQL token before it is interpolated
pub fn validate_token(value: &str) -> Result<&str> {
    if SAFE_TOKEN_REGEX.is_match(value) {
        Ok(value)
    } else {
        Err(Error::UnsafeIdentifier {
            value: value.to_string(),
        })
    }
}
