//! Error types for sentiment-sync
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use crate::sync::StagingPhase;
use thiserror::Error;

/// The main error type for sentiment-sync
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Authentication Errors
    // ============================================================================
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("JWT generation failed: {message}")]
    JwtGeneration { message: String },

    // ============================================================================
    // HTTP Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Max retries ({max_retries}) exceeded")]
    MaxRetriesExceeded { max_retries: u32 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // Warehouse Errors
    // ============================================================================
    #[error("Warehouse error: {message}")]
    Warehouse { message: String },

    #[error("Failed to fetch schema for table '{table}': {message}")]
    SchemaFetch { table: String, message: String },

    /// A `replace` write failed after the staging table was created.
    ///
    /// A drop was attempted before this is returned; `staging_dropped`
    /// records whether it succeeded. The underlying failure is the source.
    #[error(
        "Merge into '{table}' failed after {phase} (staging table {staging} {})",
        staging_note(.staging_dropped)
    )]
    Merge {
        table: String,
        staging: String,
        phase: StagingPhase,
        staging_dropped: bool,
        #[source]
        source: Box<Error>,
    },

    #[error("Identifier '{value}' is not a safe SQL token")]
    UnsafeIdentifier { value: String },

    // ============================================================================
    // Sentiment Errors
    // ============================================================================
    #[error("Sentiment inference failed: {message}")]
    Sentiment { message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a warehouse error
    pub fn warehouse(message: impl Into<String>) -> Self {
        Self::Warehouse {
            message: message.into(),
        }
    }

    /// Create a schema fetch error
    pub fn schema_fetch(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaFetch {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a sentiment error
    pub fn sentiment(message: impl Into<String>) -> Self {
        Self::Sentiment {
            message: message.into(),
        }
    }

    /// Check if this is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::Config { .. }
                | Error::MissingConfigField { .. }
                | Error::InvalidConfigValue { .. }
        )
    }
}

fn staging_note(dropped: &bool) -> &'static str {
    if *dropped {
        "dropped"
    } else {
        "was not dropped"
    }
}

/// Render an error followed by its `source` chain, one cause per line
pub fn report(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\n  caused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

/// Result type alias for sentiment-sync
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = Error::config("test message");
        assert_eq!(err.to_string(), "Configuration error: test message");

        let err = Error::missing_field("project");
        assert_eq!(err.to_string(), "Missing required config field: project");

        let err = Error::http_status(404, "Not found");
        assert_eq!(err.to_string(), "HTTP 404: Not found");
    }

    #[test]
    fn test_is_config() {
        assert!(Error::config("bad mode").is_config());
        assert!(Error::missing_field("project").is_config());
        assert!(Error::invalid_value("mode", "bogus").is_config());
        assert!(!Error::warehouse("boom").is_config());
    }

    #[test]
    fn test_merge_error_keeps_source() {
        let err = Error::Merge {
            table: "survey".to_string(),
            staging: "_STG_ABCDEFGH_survey".to_string(),
            phase: StagingPhase::StagingLoaded,
            staging_dropped: true,
            source: Box::new(Error::warehouse("procedure not found")),
        };

        let summary = err.to_string();
        assert!(summary.contains("survey"));
        assert!(summary.ends_with("(staging table _STG_ABCDEFGH_survey dropped)"));

        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "Warehouse error: procedure not found");
    }

    #[test]
    fn test_report_includes_chain() {
        let err = Error::Merge {
            table: "survey".to_string(),
            staging: "_STG_ABCDEFGH_survey".to_string(),
            phase: StagingPhase::MergeCalled,
            staging_dropped: false,
            source: Box::new(Error::warehouse("procedure not found")),
        };

        let rendered = report(&err);
        assert!(rendered.starts_with("Merge into 'survey' failed after MERGE_CALLED"));
        assert!(rendered.contains("_STG_ABCDEFGH_survey was not dropped"));
        assert!(rendered.ends_with("caused by: Warehouse error: procedure not found"));
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::config("inner"));
        let with_context = result.context("outer");
        assert!(with_context
            .unwrap_err()
            .to_string()
            .contains("outer: Configuration error: inner"));
    }
}
