//! Error types for the registration agent
//!
//! This module defines all error types used throughout the crate.
//! Adapter crates (MySQL store, Route53 publisher, HTTP lookup) map their
//! library errors into [`Error`] at the boundary.

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the registration agent
#[derive(Error, Debug)]
pub enum Error {
    /// Public address lookup failed
    #[error("Identity lookup error: {0}")]
    IdentityLookup(String),

    /// Registry store query or transaction failed
    #[error("Registry store error: {0}")]
    Registry(String),

    /// DNS publish failed
    #[error("DNS publisher error: {0}")]
    DnsPublisher(String),

    /// Store liveness check failed
    #[error("Liveness check failed: {0}")]
    Liveness(String),

    /// Restart cleanup batch failed (rolled back)
    #[error("Restart cleanup failed: {0}")]
    Cleanup(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// An operation exceeded its time bound
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Record or zone not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },
}

impl Error {
    /// Create an identity lookup error
    pub fn identity_lookup(msg: impl Into<String>) -> Self {
        Self::IdentityLookup(msg.into())
    }

    /// Create a registry store error
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    /// Create a DNS publisher error
    pub fn dns_publisher(msg: impl Into<String>) -> Self {
        Self::DnsPublisher(msg.into())
    }

    /// Create a liveness error
    pub fn liveness(msg: impl Into<String>) -> Self {
        Self::Liveness(msg.into())
    }

    /// Create a cleanup error
    pub fn cleanup(msg: impl Into<String>) -> Self {
        Self::Cleanup(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
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

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_formats_provider_name() {
        let err = Error::provider("route53", "zone missing");
        assert_eq!(err.to_string(), "Provider error (route53): zone missing");
    }

    #[test]
    fn constructors_pick_matching_variant() {
        assert!(matches!(Error::identity_lookup("no answer"), Error::IdentityLookup(_)));
        assert!(matches!(Error::liveness("gone"), Error::Liveness(_)));
        assert_eq!(
            Error::cleanup("rolled back").to_string(),
            "Restart cleanup failed: rolled back"
        );
    }
}
