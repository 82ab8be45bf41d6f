//! Sentiment inference
//!
//! [`SentimentAnalyzer`] turns a piece of text into a short sentiment label.
//! [`CompletionSentiment`] asks an OpenAI-compatible `/completions` endpoint
//! with fixed decoding parameters, one request per text.

mod completion;

pub use completion::{CompletionRequest, CompletionSentiment, DEFAULT_BASE_URL, DEFAULT_MODEL};

use crate::error::Result;
use async_trait::async_trait;

/// Scores the sentiment of a text
#[async_trait]
pub trait SentimentAnalyzer: Send + Sync {
    /// Short categorical label (e.g. "Positive")
    async fn analyze(&self, text: &str) -> Result<String>;
}

/// Prompt sent for a text
pub fn build_prompt(text: &str) -> String {
    format!("Sentiment analysis of the following text:\n{}\n", text.trim())
}
