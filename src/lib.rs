// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Sentiment Sync
//!
//! Batch sentiment scoring of survey text, written back to a warehouse with
//! schema reconciliation.
//!
//! ## Features
//!
//! - **Incremental runs**: identifiers already scored are skipped
//! - **Schema reconciliation**: missing text columns are added before a write
//! - **Three write modes**: append, truncate, and stored-procedure replace
//!   through an ephemeral staging table
//! - **Two backends**: BigQuery over REST, embedded DuckDB
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sentiment_sync::dataset::Dataset;
//! use sentiment_sync::sync::TableSync;
//! use sentiment_sync::warehouse::DuckDbWarehouse;
//!
//! #[tokio::main]
//! async fn main() -> sentiment_sync::Result<()> {
//!     let warehouse = DuckDbWarehouse::in_memory("analytics")?;
//!
//!     let mut data = Dataset::new(["id", "query_text", "sentiment"]);
//!     data.push_row(vec!["1".into(), "Loved it".into(), "Positive".into()])?;
//!
//!     let summary = TableSync::new(&warehouse)
//!         .insert_alter("survey_sentiment", &data, "append", None)
//!         .await?;
//!     println!("wrote {} rows", summary.rows_written);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       SentimentPipeline                         │
//! │  processed ids → ingestion query → analyze per row → write      │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌────────────┬─────────────┬───┴─────────┬────────────┬───────────┐
//! │ Sentiment  │  TableSync  │  Sanitize   │  Schema    │ Warehouse │
//! ├────────────┼─────────────┼─────────────┼────────────┼───────────┤
//! │ Completion │ Append      │ Cells       │ Fetch      │ BigQuery  │
//! │ Rate limit │ Truncate    │ Columns     │ Reconcile  │ DuckDB    │
//! │            │ Replace     │             │ ALTER      │           │
//! └────────────┴─────────────┴─────────────┴────────────┴───────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Authentication (bearer, service-account JWT)
pub mod auth;

/// HTTP client with retry and rate limiting
pub mod http;

/// Template interpolation for procedure bodies
pub mod template;

/// In-memory tabular data
pub mod dataset;

/// Cell and column-name sanitization
pub mod sanitize;

/// Table schemas and column reconciliation
pub mod schema;

/// Warehouse clients
pub mod warehouse;

/// Schema-reconciling table writes
pub mod sync;

/// Sentiment inference
pub mod sentiment;

/// Pipeline configuration
pub mod config;

/// Ingest, analyze, write
pub mod pipeline;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

pub use config::PipelineConfig;
pub use dataset::{Cell, Dataset};
pub use pipeline::{PipelineStats, SentimentPipeline};
pub use sync::{TableSync, WriteMode, WriteSummary};
pub use warehouse::Warehouse;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
