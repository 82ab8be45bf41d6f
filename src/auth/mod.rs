//! Authentication module
//!
//! Supports: none, static bearer tokens (completion API keys) and
//! service-account JWT assertions exchanged for BigQuery access tokens.
//!
//! The `Authenticator` caches exchanged tokens until shortly before expiry.

mod authenticator;
mod types;

pub use authenticator::Authenticator;
pub use types::{AuthConfig, CachedToken, ServiceAccountKey, BIGQUERY_SCOPE, GOOGLE_TOKEN_URL};
