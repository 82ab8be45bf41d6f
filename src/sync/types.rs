//! Sync types

use crate::error::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix of every staging table name
pub const STAGING_PREFIX: &str = "_STG_";

/// Length of the random part of a staging table name
pub const STAGING_TOKEN_LEN: usize = 8;

/// Write semantics requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Add rows, keep existing ones
    #[default]
    Append,
    /// Delete every row, then add
    Truncate,
    /// Merge through a stored procedure and a staging table
    Replace,
}

impl SyncMode {
    /// Mode name as accepted on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            SyncMode::Append => "append",
            SyncMode::Truncate => "truncate",
            SyncMode::Replace => "replace",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "append" => Ok(SyncMode::Append),
            "truncate" => Ok(SyncMode::Truncate),
            "replace" => Ok(SyncMode::Replace),
            other => Err(Error::config(format!(
                "Unknown write mode '{other}' (expected append, truncate or replace)"
            ))),
        }
    }
}

/// A validated write mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    /// Append rows
    Append,
    /// Delete all rows, then append
    Truncate,
    /// Stage rows, then hand the merge to a stored procedure
    Replace {
        /// Merge routine in the destination dataset
        procedure: String,
    },
}

impl WriteMode {
    /// Validate a mode string and its stored procedure
    pub fn parse(mode: &str, stored_procedure: Option<&str>) -> Result<Self> {
        Self::from_mode(mode.parse()?, stored_procedure)
    }

    /// Pair an already-parsed mode with its stored procedure
    pub fn from_mode(mode: SyncMode, stored_procedure: Option<&str>) -> Result<Self> {
        match mode {
            SyncMode::Append => Ok(WriteMode::Append),
            SyncMode::Truncate => Ok(WriteMode::Truncate),
            SyncMode::Replace => match stored_procedure.map(str::trim) {
                Some(procedure) if !procedure.is_empty() => Ok(WriteMode::Replace {
                    procedure: procedure.to_string(),
                }),
                _ => Err(Error::config(
                    "Write mode 'replace' requires a stored procedure name",
                )),
            },
        }
    }

    /// The unvalidated mode
    pub fn mode(&self) -> SyncMode {
        match self {
            WriteMode::Append => SyncMode::Append,
            WriteMode::Truncate => SyncMode::Truncate,
            WriteMode::Replace { .. } => SyncMode::Replace,
        }
    }
}

/// Progress of a `replace` write through its staging table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingPhase {
    /// Nothing created yet
    Start,
    /// Empty copy of the destination exists
    StagingCreated,
    /// Rows loaded into the staging table
    StagingLoaded,
    /// Stored procedure returned
    MergeCalled,
    /// Staging table removed
    StagingDropped,
}

impl StagingPhase {
    /// Phase name used in logs and errors
    pub fn as_str(self) -> &'static str {
        match self {
            StagingPhase::Start => "START",
            StagingPhase::StagingCreated => "STAGING_CREATED",
            StagingPhase::StagingLoaded => "STAGING_LOADED",
            StagingPhase::MergeCalled => "MERGE_CALLED",
            StagingPhase::StagingDropped => "STAGING_DROPPED",
        }
    }
}

impl fmt::Display for StagingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of an ephemeral staging table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingTable {
    name: String,
}

impl StagingTable {
    /// Generate a staging name for a destination table
    ///
    /// The name is `_STG_` + 8 random uppercase letters + `_` + `table`.
    /// With 26^8 (about 2.09e11) tokens, two staging tables that are live at
    /// the same time for one destination collide with probability of about
    /// 4.8e-12.
    pub fn generate(table: &str) -> Self {
        Self::generate_with(&mut rand::rng(), table)
    }

    /// Generate a staging name from a caller-supplied RNG
    pub fn generate_with<R: Rng>(rng: &mut R, table: &str) -> Self {
        let token: String = (0..STAGING_TOKEN_LEN)
            .map(|_| char::from(rng.random_range(b'A'..=b'Z')))
            .collect();
        Self {
            name: format!("{STAGING_PREFIX}{token}_{table}"),
        }
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check whether a table name looks like a staging table
    pub fn is_staging_name(name: &str) -> bool {
        name.strip_prefix(STAGING_PREFIX).is_some_and(|rest| {
            rest.len() > STAGING_TOKEN_LEN
                && rest.as_bytes()[..STAGING_TOKEN_LEN]
                    .iter()
                    .all(u8::is_ascii_uppercase)
                && rest.as_bytes()[STAGING_TOKEN_LEN] == b'_'
        })
    }
}

impl fmt::Display for StagingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Outcome of a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    /// Destination table
    pub table: String,
    /// Mode that was applied
    pub mode: SyncMode,
    /// Rows handed to the warehouse
    pub rows_written: u64,
    /// Columns added to the destination table
    pub columns_added: Vec<String>,
    /// Whether the destination table was created by this write
    pub created: bool,
}

impl WriteSummary {
    pub(crate) fn empty(table: &str, mode: SyncMode) -> Self {
        Self {
            table: table.to_string(),
            mode,
            rows_written: 0,
            columns_added: Vec::new(),
            created: false,
        }
    }
}
