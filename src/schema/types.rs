//! Schema types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single column of a warehouse table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Column name
    pub name: String,
    /// Warehouse type name (e.g. `STRING`, `INT64`, `VARCHAR`)
    #[serde(rename = "type")]
    pub field_type: String,
}

impl SchemaField {
    /// Create a new field
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
        }
    }
}

/// Live schema of a destination table
///
/// An empty schema means the table does not exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Columns in warehouse order
    pub fields: Vec<SchemaField>,
}

impl TableSchema {
    /// Create a schema from fields
    pub fn new(fields: Vec<SchemaField>) -> Self {
        Self { fields }
    }

    /// Schema of a table that does not exist
    pub fn absent() -> Self {
        Self::default()
    }

    /// Check if the table is absent
    pub fn is_absent(&self) -> bool {
        self.fields.is_empty()
    }

    /// Column names as a set
    pub fn column_names(&self) -> BTreeSet<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Check if a column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// What to do when a schema fetch fails for a reason other than "not found"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaFetchPolicy {
    /// Propagate the failure
    #[default]
    Strict,
    /// Log it and treat the table as absent
    TreatAsAbsent,
}
