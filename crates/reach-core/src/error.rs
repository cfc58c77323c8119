//! Error types for the reach engine
//!
//! Errors that describe a single target's transient trouble (probe failures,
//! store hiccups) are handled inside the worker or dispatcher that hit them.
//! The variants that reach callers are usage errors: malformed addresses,
//! duplicate adds and updates for unknown targets.

use thiserror::Error;

use crate::target::TargetKey;

/// Result type alias for reach operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the reach engine
#[derive(Error, Debug)]
pub enum Error {
    /// A target address could not be parsed
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress {
        /// The offending address
        address: String,
        /// Why it was rejected
        reason: String,
    },

    /// No worker (or stored record) exists for the target
    #[error("Target not found: {0}")]
    NotFound(TargetKey),

    /// A worker is already registered for the target
    #[error("Probe already exists for target: {0}")]
    AlreadyExists(TargetKey),

    /// Prober-related errors
    #[error("Prober error: {0}")]
    Prober(String),

    /// Target store-related errors
    #[error("Target store error: {0}")]
    Store(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid address error
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Create a "not found" error
    pub fn not_found(key: &TargetKey) -> Self {
        Self::NotFound(key.clone())
    }

    /// Create an "already exists" error
    pub fn already_exists(key: &TargetKey) -> Self {
        Self::AlreadyExists(key.clone())
    }

    /// Create a prober error
    pub fn prober(msg: impl Into<String>) -> Self {
        Self::Prober(msg.into())
    }

    /// Create a target store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error means the target is simply absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
