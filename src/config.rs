//! Pipeline configuration
//!
//! Loaded from a YAML (or JSON) file, then overridden by CLI flags. Secrets
//! missing from the file are filled in from the environment.

use crate::error::{Error, Result, ResultExt};
use crate::schema::SchemaFetchPolicy;
use crate::sentiment::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::sync::{SyncMode, WriteMode};
use crate::types::OptionStringExt;
use crate::warehouse::validate_token;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding the completion API key
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";

/// Environment variables holding the completion organization id, in lookup order
pub const ENV_ORGANIZATION: [&str; 2] = ["ORG_KEY", "OPENAI_ORGANIZATION"];

/// Environment variable pointing at a service account key file
pub const ENV_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";

// ============================================================================
// Top-Level Pipeline Config
// ============================================================================

/// Complete pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Project that owns both datasets
    #[serde(default)]
    pub project: String,

    /// Dataset holding the survey table
    #[serde(default)]
    pub source_dataset: String,

    /// Dataset the results are written to
    #[serde(default)]
    pub output_dataset: String,

    /// Survey table
    #[serde(default = "default_source_table")]
    pub source_table: String,

    /// Identifier column of the survey table
    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Free-text column of the survey table
    #[serde(default = "default_text_column")]
    pub text_column: String,

    /// Result table
    #[serde(default = "default_destination_table")]
    pub destination_table: String,

    /// Write mode for the result table
    #[serde(default)]
    pub mode: SyncMode,

    /// Merge routine for `replace` mode
    #[serde(default)]
    pub stored_procedure: Option<String>,

    /// Skip identifiers already present in the result table
    #[serde(default = "default_true")]
    pub incremental: bool,

    /// How schema fetch failures are handled
    #[serde(default)]
    pub schema_fetch: SchemaFetchPolicy,

    /// Warehouse backend
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// Completion endpoint settings
    #[serde(default)]
    pub sentiment: SentimentConfig,
}

fn default_source_table() -> String {
    "satisfaction_surveys".to_string()
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_text_column() -> String {
    "body_text".to_string()
}

fn default_destination_table() -> String {
    "staging_sentiment_analysis".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            source_dataset: String::new(),
            output_dataset: String::new(),
            source_table: default_source_table(),
            id_column: default_id_column(),
            text_column: default_text_column(),
            destination_table: default_destination_table(),
            mode: SyncMode::default(),
            stored_procedure: None,
            incremental: true,
            schema_fetch: SchemaFetchPolicy::default(),
            warehouse: WarehouseConfig::default(),
            sentiment: SentimentConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a config document (YAML or JSON)
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load a config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Fill missing secrets from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Fill missing secrets from a variable lookup
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).none_if_empty();

        if self.sentiment.api_key.is_none() {
            self.sentiment.api_key = lookup(ENV_API_KEY);
        }
        if self.sentiment.organization.is_none() {
            self.sentiment.organization = ENV_ORGANIZATION.iter().find_map(|key| lookup(*key));
        }
        if let WarehouseConfig::BigQuery {
            credentials_path, ..
        } = &mut self.warehouse
        {
            if credentials_path.is_none() {
                *credentials_path = lookup(ENV_CREDENTIALS).map(PathBuf::from);
            }
        }
    }

    /// Validated write mode
    pub fn write_mode(&self) -> Result<WriteMode> {
        WriteMode::from_mode(self.mode, self.stored_procedure.as_deref())
    }

    /// Check required fields and identifier safety
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("project", &self.project),
            ("source_dataset", &self.source_dataset),
            ("output_dataset", &self.output_dataset),
        ] {
            if value.trim().is_empty() {
                return Err(Error::missing_field(field));
            }
        }

        for (field, value) in [
            ("project", &self.project),
            ("source_dataset", &self.source_dataset),
            ("output_dataset", &self.output_dataset),
            ("source_table", &self.source_table),
            ("id_column", &self.id_column),
            ("text_column", &self.text_column),
            ("destination_table", &self.destination_table),
        ] {
            validate_token(value).map_err(|_| {
                Error::invalid_value(field, format!("'{value}' is not a safe identifier"))
            })?;
        }

        self.write_mode()?;

        if self.sentiment.requests_per_second == 0 {
            return Err(Error::invalid_value(
                "sentiment.requests_per_second",
                "must be greater than zero",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Warehouse Config
// ============================================================================

/// Warehouse backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WarehouseConfig {
    /// Google BigQuery
    #[serde(rename = "bigquery")]
    BigQuery {
        /// Service account key file
        #[serde(default)]
        credentials_path: Option<PathBuf>,
        /// REST endpoint override
        #[serde(default)]
        api_base: Option<String>,
        /// Upload endpoint override
        #[serde(default)]
        upload_base: Option<String>,
        /// Job location
        #[serde(default)]
        location: Option<String>,
    },
    /// Embedded DuckDB
    #[serde(rename = "duckdb")]
    DuckDb {
        /// Database file (in memory when absent)
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        WarehouseConfig::BigQuery {
            credentials_path: None,
            api_base: None,
            upload_base: None,
            location: None,
        }
    }
}

// ============================================================================
// Sentiment Config
// ============================================================================

/// Completion endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentConfig {
    /// API root (the client posts to `{base_url}/completions`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Completion model
    #[serde(default = "default_model")]
    pub model: String,

    /// API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// Organization id, sent as `OpenAI-Organization`
    #[serde(default)]
    pub organization: Option<String>,

    /// Client-side request rate cap
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_rps() -> u32 {
    5
}

fn default_timeout() -> u64 {
    30
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            organization: None,
            requests_per_second: default_rps(),
            timeout_secs: default_timeout(),
        }
    }
}
