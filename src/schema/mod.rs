//! Schema reconciliation module
//!
//! Compares an incoming dataset's columns against the live schema of the
//! destination table and builds the additive mutation that closes the gap.
//!
//! # Rules
//!
//! - **Absent table**: nothing to reconcile, the load creates the table
//! - **Truncate mode**: never reconciled, the existing schema is kept as-is
//! - **Otherwise**: `dataset columns - table columns`, each added as text

mod reconcile;
mod types;

pub use reconcile::{add_columns_sql, reconcile};
pub use types::{SchemaFetchPolicy, SchemaField, TableSchema};
