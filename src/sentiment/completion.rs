//! Completion-endpoint sentiment client

use super::{build_prompt, SentimentAnalyzer};
use crate::auth::AuthConfig;
use crate::config::SentimentConfig;
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpClientConfig, RateLimiterConfig, RequestConfig};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default completion model
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo-instruct";

/// Body of a `/completions` request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    /// Model name
    pub model: String,
    /// Prompt text
    pub prompt: String,
    /// Sampling temperature
    pub temperature: f64,
    /// Completion length cap
    pub max_tokens: u32,
    /// Nucleus sampling mass
    pub top_p: f64,
    /// Frequency penalty
    pub frequency_penalty: f64,
    /// Presence penalty
    pub presence_penalty: f64,
    /// Stop sequences
    pub stop: Vec<String>,
}

impl CompletionRequest {
    /// Sentiment request for a text
    pub fn sentiment(model: &str, text: &str) -> Self {
        Self {
            model: model.to_string(),
            prompt: build_prompt(text),
            temperature: 0.5,
            max_tokens: 3,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            stop: vec!["\n".to_string()],
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    text: String,
}

/// Sentiment analyzer backed by a completion endpoint
#[derive(Debug)]
pub struct CompletionSentiment {
    client: HttpClient,
    model: String,
}

impl CompletionSentiment {
    /// Build a client from settings; the API key is required
    pub fn from_config(config: &SentimentConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::missing_field("sentiment.api_key"))?;

        let mut http = HttpClientConfig::builder()
            .base_url(config.base_url.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .max_retries(0)
            .rate_limit(RateLimiterConfig::new(
                config.requests_per_second,
                config.requests_per_second,
            ));
        if let Some(org) = &config.organization {
            http = http.header("OpenAI-Organization", org.as_str());
        }

        let client = HttpClient::with_auth(http.build(), AuthConfig::Bearer { token: api_key })?;
        Ok(Self {
            client,
            model: config.model.clone(),
        })
    }

    /// Model used for completions
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl SentimentAnalyzer for CompletionSentiment {
    async fn analyze(&self, text: &str) -> Result<String> {
        let request = CompletionRequest::sentiment(&self.model, text);
        let response: CompletionResponse = self
            .client
            .request_json(
                Method::POST,
                "/completions",
                RequestConfig::new().json(serde_json::to_value(&request)?),
            )
            .await?;

        let label = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text.trim().to_string())
            .ok_or_else(|| Error::sentiment("completion returned no choices"))?;

        debug!(model = %self.model, %label, "sentiment inferred");
        Ok(label)
    }
}
