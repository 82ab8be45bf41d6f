//! In-memory tabular datasets
//!
//! A [`Dataset`] is an ordered list of named columns plus rows of [`Cell`]s.
//! It is what the ingestion query and the inference loop produce before
//! anything is written to a warehouse.

use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// A single dynamically-typed cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    List(Vec<JsonValue>),
    Map(JsonObject),
}

/// Coarse classification used by the row sanitizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellClass {
    /// Missing value
    Null,
    /// Free text
    Text,
    /// Date or date/time
    Temporal,
    /// List or mapping
    Structured,
    /// Numbers, booleans
    Other,
}

impl Cell {
    /// Resolve the sanitizer class for this cell
    pub fn class(&self) -> CellClass {
        match self {
            Cell::Null => CellClass::Null,
            Cell::Text(_) => CellClass::Text,
            Cell::Date(_) | Cell::Timestamp(_) | Cell::TimestampTz(_) => CellClass::Temporal,
            Cell::List(_) | Cell::Map(_) => CellClass::Structured,
            Cell::Integer(_) | Cell::Float(_) | Cell::Boolean(_) => CellClass::Other,
        }
    }

    /// Check if this cell is null
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Integer(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Float(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Boolean(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map_or(Cell::Null, Into::into)
    }
}

/// Convert a JSON value (as returned by a warehouse query) into a cell
impl From<JsonValue> for Cell {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Cell::Null,
            JsonValue::Bool(b) => Cell::Boolean(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Cell::Integer(i),
                None => n.as_f64().map_or(Cell::Null, Cell::Float),
            },
            JsonValue::String(s) => Cell::Text(s),
            JsonValue::Array(items) => Cell::List(items),
            JsonValue::Object(map) => Cell::Map(map),
        }
    }
}

/// An ordered, named-column table held in memory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Dataset {
    /// Create an empty dataset with the given columns
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Create a dataset from columns and rows, rejecting ragged rows
    pub fn from_rows<I, S>(columns: I, rows: Vec<Vec<Cell>>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut dataset = Self::new(columns);
        for row in rows {
            dataset.push_row(row)?;
        }
        Ok(dataset)
    }

    /// Append a row; its width must match the column count
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::config(format!(
                "Row has {} cells but dataset has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Column names in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in order
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the dataset has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cell_class() {
        assert_eq!(Cell::Null.class(), CellClass::Null);
        assert_eq!(Cell::from("hi").class(), CellClass::Text);
        assert_eq!(
            Cell::Date(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()).class(),
            CellClass::Temporal
        );
        assert_eq!(Cell::List(vec![json!(1)]).class(), CellClass::Structured);
        assert_eq!(Cell::from(3_i64).class(), CellClass::Other);
        assert_eq!(Cell::from(true).class(), CellClass::Other);
    }

    #[test]
    fn test_cell_from_json() {
        assert_eq!(Cell::from(json!(null)), Cell::Null);
        assert_eq!(Cell::from(json!(42)), Cell::Integer(42));
        assert_eq!(Cell::from(json!(1.5)), Cell::Float(1.5));
        assert_eq!(Cell::from(json!("x")), Cell::Text("x".to_string()));
        assert!(matches!(Cell::from(json!({"a": 1})), Cell::Map(_)));
    }

    #[test]
    fn test_cell_from_option() {
        assert_eq!(Cell::from(None::<String>), Cell::Null);
        assert_eq!(Cell::from(Some("x")), Cell::Text("x".to_string()));
    }

    #[test]
    fn test_dataset_push_row() {
        let mut dataset = Dataset::new(["id", "text"]);
        assert!(dataset.is_empty());

        dataset.push_row(vec![1_i64.into(), "ok".into()]).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.column_index("text"), Some(1));
        assert_eq!(dataset.column_index("missing"), None);
    }

    #[test]
    fn test_dataset_rejects_ragged_rows() {
        let result = Dataset::from_rows(["id", "text"], vec![vec![Cell::from(1_i64)]]);
        assert!(result.unwrap_err().is_config());
    }
}
