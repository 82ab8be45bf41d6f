//! Row sanitizer
//!
//! Turns arbitrary cells into warehouse-safe strings and column names into
//! plain `[A-Za-z0-9_]` identifiers. Every function here is total: no input
//! cell or column name can make it fail.

use crate::dataset::{Cell, CellClass, Dataset};
use regex::Regex;
use std::sync::LazyLock;

/// Characters not allowed in a warehouse column name
static COLUMN_CHAR_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_]").unwrap());

/// A dataset whose names and values are ready to load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizedDataset {
    /// Normalized column names
    pub columns: Vec<String>,
    /// String-or-null cells
    pub rows: Vec<Vec<Option<String>>>,
}

impl SanitizedDataset {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column name that appears more than once, if any
    pub fn duplicate_column(&self) -> Option<&str> {
        self.columns
            .iter()
            .enumerate()
            .find(|(i, c)| self.columns[..*i].contains(c))
            .map(|(_, c)| c.as_str())
    }

    /// Render rows as JSON objects keyed by column name (NULLs omitted)
    pub fn to_json_rows(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .filter_map(|(column, value)| {
                        value
                            .as_ref()
                            .map(|v| (column.clone(), serde_json::Value::String(v.clone())))
                    })
                    .collect()
            })
            .collect()
    }
}

/// Normalize a column name: every character outside `[A-Za-z0-9_]` becomes `_`
pub fn normalize_column_name(name: &str) -> String {
    COLUMN_CHAR_REGEX.replace_all(name, "_").into_owned()
}

/// Sanitize a single cell into a string or null
pub fn sanitize_cell(cell: &Cell) -> Option<String> {
    let rendered = match cell.class() {
        CellClass::Null => return None,
        CellClass::Text => render_text(cell),
        CellClass::Temporal => render_temporal(cell),
        CellClass::Structured => render_structured(cell),
        CellClass::Other => render_other(cell),
    };

    if rendered.eq_ignore_ascii_case("nan") {
        return None;
    }

    Some(strip_nul(&rendered))
}

/// Sanitize every column name and every cell of a dataset
pub fn sanitize_dataset(dataset: &Dataset) -> SanitizedDataset {
    SanitizedDataset {
        columns: dataset
            .columns()
            .iter()
            .map(|c| normalize_column_name(c))
            .collect(),
        rows: dataset
            .rows()
            .iter()
            .map(|row| row.iter().map(sanitize_cell).collect())
            .collect(),
    }
}

fn strip_nul(value: &str) -> String {
    value.replace('\0', " ")
}

fn render_text(cell: &Cell) -> String {
    match cell {
        Cell::Text(s) => s.clone(),
        _ => render_other(cell),
    }
}

fn render_temporal(cell: &Cell) -> String {
    match cell {
        Cell::Date(d) => d.to_string(),
        Cell::Timestamp(ts) => ts.to_string(),
        Cell::TimestampTz(ts) => ts.to_string(),
        _ => render_other(cell),
    }
}

fn render_structured(cell: &Cell) -> String {
    let json = match cell {
        Cell::List(items) => serde_json::to_string(items),
        Cell::Map(map) => serde_json::to_string(map),
        _ => return render_other(cell),
    };
    // Serializing a serde_json value cannot fail, but stay total regardless
    json.unwrap_or_else(|_| format!("{cell:?}"))
}

fn render_other(cell: &Cell) -> String {
    match cell {
        Cell::Null => String::new(),
        Cell::Text(s) => s.clone(),
        Cell::Integer(i) => i.to_string(),
        Cell::Float(f) => f.to_string(),
        Cell::Boolean(b) => b.to_string(),
        Cell::Date(d) => d.to_string(),
        Cell::Timestamp(ts) => ts.to_string(),
        Cell::TimestampTz(ts) => ts.to_string(),
        Cell::List(_) | Cell::Map(_) => format!("{cell:?}"),
    }
}
