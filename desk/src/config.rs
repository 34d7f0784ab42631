//! Configuration management for the support desk.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use support_sync_runtime::retry::RetryPolicy;

/// Default backend base URL
pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";

/// Default tracing filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "support_desk=info,support_sync_runtime=info";

/// Desk configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeskConfig {
    /// Backend base URL (`SUPPORT_API_URL`)
    pub api_url: String,
    /// Bearer token sent with every request (`SUPPORT_API_TOKEN`)
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    /// Per-request timeout in seconds (`SUPPORT_API_TIMEOUT_SECS`)
    pub api_timeout_secs: u64,
    /// Retries for list fetches on transport errors (`SUPPORT_FETCH_RETRIES`)
    pub fetch_retries: usize,
    /// User agent reported to the backend and in device metadata (`SUPPORT_USER_AGENT`)
    pub user_agent: String,
    /// Tracing filter (`RUST_LOG`)
    pub log_filter: String,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            api_timeout_secs: 10,
            fetch_retries: 3,
            user_agent: default_user_agent(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl DeskConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            api_url: lookup("SUPPORT_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_url),
            api_token: lookup("SUPPORT_API_TOKEN").filter(|token| !token.is_empty()),
            api_timeout_secs: lookup("SUPPORT_API_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.api_timeout_secs),
            fetch_retries: lookup("SUPPORT_FETCH_RETRIES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fetch_retries),
            user_agent: lookup("SUPPORT_USER_AGENT").unwrap_or(defaults.user_agent),
            log_filter: lookup("RUST_LOG").unwrap_or(defaults.log_filter),
        }
    }

    /// Per-request timeout
    #[must_use]
    pub const fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Backoff used for idempotent list fetches
    #[must_use]
    pub fn fetch_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder().max_retries(self.fetch_retries).build()
    }
}

fn default_user_agent() -> String {
    format!("support-desk/{}", env!("CARGO_PKG_VERSION"))
}
