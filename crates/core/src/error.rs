//! Error types for relo-core
//!
//! Provides a unified error type that can be converted to appropriate exit codes.
//! Per-item failures inside a batch are not errors; see [`crate::relocation::FailureReason`].

use thiserror::Error;

/// Result type alias for relo-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for relo-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid path format
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Alias not found
    #[error("Alias not found: {0}")]
    AliasNotFound(String),

    /// Alias already exists
    #[error("Alias already exists: {0}")]
    AliasExists(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network error (retryable)
    #[error("Network error: {0}")]
    Network(String),

    /// A single store call exceeded its deadline
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Conflict error
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Feature not supported by backend
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// A batch was started without the inputs it needs (no container, no items)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Get the appropriate exit code for this error
    pub const fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidPath(_) | Error::Config(_) | Error::Precondition(_) => 2, // UsageError
            Error::Network(_) | Error::Timeout(_) => 3,                            // NetworkError
            Error::Auth(_) => 4,                                                   // AuthError
            Error::NotFound(_) | Error::AliasNotFound(_) => 5,                     // NotFound
            Error::Conflict(_) | Error::AliasExists(_) => 6,                       // Conflict
            Error::UnsupportedFeature(_) => 7, // UnsupportedFeature
            _ => 1,                            // GeneralError
        }
    }

    /// Whether the error says the addressed key is absent
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
