//! Authenticator implementation
//!
//! Applies credentials to outgoing requests and caches exchanged access
//! tokens until shortly before they expire.

use super::types::{AuthConfig, CachedToken};
use crate::error::{Error, Result};
use crate::types::JwtAlgorithm;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Authenticator handles applying authentication to HTTP requests
pub struct Authenticator {
    /// Auth configuration
    config: AuthConfig,
    /// Cached access token for JWT auth
    cached_token: Arc<RwLock<Option<CachedToken>>>,
    /// HTTP client for token requests
    http_client: Client,
}

impl Authenticator {
    /// Create a new authenticator with the given config
    pub fn new(config: AuthConfig) -> Self {
        Self::with_client(config, Client::new())
    }

    /// Create an authenticator with a custom HTTP client
    pub fn with_client(config: AuthConfig, http_client: Client) -> Self {
        Self {
            config,
            cached_token: Arc::new(RwLock::new(None)),
            http_client,
        }
    }

    /// Apply authentication to a request builder
    pub async fn apply(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        match &self.config {
            AuthConfig::None => Ok(req),
            AuthConfig::Bearer { token } => Ok(req.bearer_auth(token)),
            AuthConfig::Jwt { .. } => {
                let token = self.get_or_refresh_token().await?;
                Ok(req.bearer_auth(token))
            }
        }
    }

    /// Get a valid token, refreshing if necessary
    async fn get_or_refresh_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if !token.is_expired() {
                    return Ok(token.token.clone());
                }
            }
        }

        let mut cached = self.cached_token.write().await;

        // Another task may have refreshed while we waited for the write lock
        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(token.token.clone());
            }
        }

        let new_token = self.fetch_new_token().await?;
        let token_str = new_token.token.clone();
        *cached = Some(new_token);

        Ok(token_str)
    }

    async fn fetch_new_token(&self) -> Result<CachedToken> {
        match &self.config {
            AuthConfig::Jwt {
                issuer,
                audience,
                private_key,
                algorithm,
                token_lifetime_seconds,
                scope,
                token_url,
            } => {
                let jwt = sign_assertion(
                    issuer,
                    audience,
                    private_key,
                    *algorithm,
                    *token_lifetime_seconds,
                    scope.as_deref(),
                )?;
                match token_url {
                    Some(url) => self.exchange_assertion(url, &jwt).await,
                    None => Ok(CachedToken::expires_in(
                        jwt,
                        *token_lifetime_seconds as i64,
                    )),
                }
            }
            _ => Err(Error::auth("Token refresh not supported for this auth type")),
        }
    }

    /// Exchange a signed assertion for an access token (Google-style)
    async fn exchange_assertion(&self, token_url: &str, jwt: &str) -> Result<CachedToken> {
        let form = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", jwt),
        ];

        let response = self
            .http_client
            .post(token_url)
            .form(&form)
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::JwtGeneration {
                message: format!("JWT token exchange failed with status {status}: {body}"),
            });
        }

        let token_response: TokenResponse = response.json().await.map_err(Error::Http)?;
        tracing::debug!(token_url, "exchanged service account assertion");
        Ok(token_response.into_cached_token())
    }

    /// Clear the cached token
    pub async fn clear_cache(&self) {
        let mut cached = self.cached_token.write().await;
        *cached = None;
    }

    /// Get the current auth config
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}

/// Build and sign a JWT assertion
fn sign_assertion(
    issuer: &str,
    audience: &str,
    private_key: &str,
    algorithm: JwtAlgorithm,
    lifetime_seconds: u64,
    scope: Option<&str>,
) -> Result<String> {
    let now = Utc::now().timestamp();
    let claims = JwtClaims {
        iss: issuer.to_string(),
        aud: audience.to_string(),
        scope: scope.map(String::from),
        iat: now,
        exp: now + lifetime_seconds as i64,
    };

    let encoding_key = match algorithm {
        JwtAlgorithm::RS256 => EncodingKey::from_rsa_pem(private_key.as_bytes()).map_err(|e| {
            Error::JwtGeneration {
                message: format!("Invalid private key: {e}"),
            }
        })?,
        JwtAlgorithm::HS256 => EncodingKey::from_secret(private_key.as_bytes()),
    };

    encode(&Header::new(algorithm.into()), &claims, &encoding_key).map_err(|e| {
        Error::JwtGeneration {
            message: format!("Failed to encode JWT: {e}"),
        }
    })
}

/// OAuth2 token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_cached_token(self) -> CachedToken {
        match self.expires_in {
            Some(secs) => CachedToken::expires_in(self.access_token, secs),
            None => CachedToken::new(self.access_token, None),
        }
    }
}

/// JWT claims structure
#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    aud: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    iat: i64,
    exp: i64,
}
