//! Transport Configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default window for a reverse request before it times out
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Transport configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// How long a request may stay pending, in milliseconds
    ///
    /// Applies to owner-to-controller requests and to controller
    /// invokes alike.
    pub request_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl TransportConfig {
    /// Configuration with a specific request timeout
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            request_timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `SHELL_REQUEST_TIMEOUT_MS`: Request timeout in ms
    pub fn from_env() -> Self {
        Self {
            request_timeout_ms: std::env::var("SHELL_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|ms| *ms > 0)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }

    /// Request timeout as a duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
