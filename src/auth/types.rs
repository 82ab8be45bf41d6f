//! Auth configuration types

use crate::error::{Error, Result, ResultExt};
use crate::types::JwtAlgorithm;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;

/// Google OAuth2 token endpoint
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// OAuth scope for BigQuery read/write access
pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

/// Authentication configuration
#[derive(Debug, Clone, Default)]
pub enum AuthConfig {
    /// No authentication required
    #[default]
    None,

    /// Bearer token authentication
    Bearer {
        /// The bearer token
        token: String,
    },

    /// JWT assertion exchanged for an access token (service account style)
    Jwt {
        /// Token issuer (iss claim)
        issuer: String,
        /// Token audience (aud claim)
        audience: String,
        /// Signing key (PEM for RS256, shared secret for HS256)
        private_key: String,
        /// Signing algorithm
        algorithm: JwtAlgorithm,
        /// Token lifetime in seconds
        token_lifetime_seconds: u64,
        /// Requested OAuth scope (scope claim)
        scope: Option<String>,
        /// Token endpoint the assertion is exchanged at; the JWT itself is
        /// used as the bearer token when absent
        token_url: Option<String>,
    },
}

/// Fields of a Google service account key file that token exchange needs
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    /// Service account email (issuer)
    pub client_email: String,
    /// RSA private key in PEM format
    pub private_key: String,
    /// Token endpoint
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl ServiceAccountKey {
    /// Parse a key from its JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::auth(format!("Invalid service account key: {e}")))
    }

    /// Read a key file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read key file '{}'", path.display()))?;
        Self::from_json(&json)
    }

    /// Auth config that exchanges a signed assertion for a BigQuery token
    pub fn into_auth(self) -> AuthConfig {
        AuthConfig::Jwt {
            issuer: self.client_email,
            audience: self.token_uri.clone(),
            private_key: self.private_key,
            algorithm: JwtAlgorithm::RS256,
            token_lifetime_seconds: 3600,
            scope: Some(BIGQUERY_SCOPE.to_string()),
            token_url: Some(self.token_uri),
        }
    }
}

/// Cached token with expiration
#[derive(Debug, Clone)]
pub struct CachedToken {
    /// The access token
    pub token: String,
    /// When the token expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    /// Create a new cached token
    pub fn new(token: String, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { token, expires_at }
    }

    /// Create a token that expires in N seconds from now
    pub fn expires_in(token: String, seconds: i64) -> Self {
        let expires_at = Utc::now() + chrono::Duration::seconds(seconds);
        Self {
            token,
            expires_at: Some(expires_at),
        }
    }

    /// Check if the token is expired (with 30 second buffer)
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() + chrono::Duration::seconds(30) >= expires_at,
            None => false,
        }
    }
}
