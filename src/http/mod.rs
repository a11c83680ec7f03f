//! HTTP client module
//!
//! Transport used by the Storage API client.
//!
//! # Features
//!
//! - **Automatic Retries**: Configurable retry logic with backoff
//! - **Rate Limiting**: Token bucket rate limiter using governor
//! - **Error Bodies**: Storage API error messages surfaced with their status code

mod client;
mod rate_limit;

pub(crate) use client::backoff_delay;
pub use client::{HttpClient, HttpClientConfig, HttpClientConfigBuilder, RequestBody, RequestConfig};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
