//! Unified error types for the nametag engine.
//!
//! This module provides the error hierarchy covering:
//! - Configuration and pattern validation errors
//! - Transport and JSON-RPC errors
//! - Key-value store errors
//!
//! Per-slot decode failures are not part of this hierarchy; they are reported
//! as [`SlotError`](crate::abi::SlotError) inside the decoded result list so a
//! single bad slot never aborts a batch.

/// Result type alias for nametag operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the nametag engine.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid configuration value (out-of-range batch size, cooldown, ...).
    #[error("Config error: {0}")]
    Config(String),

    /// A user-supplied pattern was rejected.
    #[error("Pattern `{pattern}` rejected: {reason}")]
    Pattern {
        /// The offending pattern source.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// ABI encoding error.
    #[error("ABI error: {0}")]
    Abi(String),

    /// Transport failure (network error, non-2xx status, malformed body).
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON-RPC level error returned by the endpoint.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// Key-value store error.
    #[error("Store error: {0}")]
    Store(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Create a config error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a pattern rejection error.
    #[must_use]
    pub fn pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Create an ABI error.
    #[must_use]
    pub fn abi(msg: impl Into<String>) -> Self {
        Self::Abi(msg.into())
    }

    /// Create a transport error.
    #[must_use]
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a JSON-RPC error.
    #[must_use]
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    /// Create a store error.
    #[must_use]
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Whether this error came from the network path (transport, RPC, HTTP).
    ///
    /// The resolver logs failed chunks at `warn` when this holds and at
    /// `error` otherwise. The chunk is skipped and left uncached either way.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Rpc { .. } | Self::Http(_))
    }
}
