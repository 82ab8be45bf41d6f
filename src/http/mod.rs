//! HTTP client module
//!
//! Provides the HTTP client used by the BigQuery warehouse and the
//! completion sentiment client.
//!
//! # Features
//!
//! - **Automatic Retries**: Configurable retry logic with backoff
//! - **Rate Limiting**: Token bucket rate limiter using governor
//! - **Raw Bodies**: Multipart payloads for BigQuery load jobs
//! - **Authentication**: Integration with auth module

mod client;
mod rate_limit;

pub use client::{HttpClient, HttpClientConfig, RequestBody, RequestConfig};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
