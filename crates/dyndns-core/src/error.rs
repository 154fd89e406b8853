//! Error types for the dyndns system
//!
//! The reconciliation loop only distinguishes two families of failure:
//! resolution failures (the IP oracle could not give us an address) and
//! update failures (the DNS zone service did not accept the change). Both
//! are retried the same way; the finer variants exist for logging and for
//! provider crates to report what went wrong.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for dyndns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the dyndns system
#[derive(Error, Debug)]
pub enum Error {
    /// The IP oracle was unreachable or returned unusable data
    #[error("IP resolution failed: {0}")]
    Resolution(String),

    /// The DNS zone service rejected or could not perform the change
    #[error("DNS update failed ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Authentication or authorization against the provider failed
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The provider throttled the request
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Zone or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input (bad request values, malformed change)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// An external call did not finish within the configured timeout
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Which call timed out
        operation: &'static str,
        /// The configured limit
        after: Duration,
    },

    /// The loop hit its consecutive-failure limit
    #[error("giving up after {failures} consecutive failed cycles: {last_error}")]
    RetriesExhausted {
        /// Number of consecutive failed cycles
        failures: usize,
        /// Rendered error of the last failed cycle
        last_error: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a resolution error
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    /// Create a provider-specific update error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error came from the IP resolution side
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Self::Resolution(_)
                | Self::Timeout {
                    operation: "resolve",
                    ..
                }
        )
    }

    /// Whether this error came from the DNS update side
    pub fn is_update(&self) -> bool {
        matches!(
            self,
            Self::Provider { .. }
                | Self::Authentication(_)
                | Self::RateLimited(_)
                | Self::NotFound(_)
                | Self::InvalidInput(_)
                | Self::Timeout {
                    operation: "upsert",
                    ..
                }
        )
    }
}
