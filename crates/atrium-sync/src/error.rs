//! # Engine Error Types
//!
//! Operational errors internal to the sync engine.
//!
//! ## Two Error Surfaces
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Error Surfaces                                   │
//! │                                                                         │
//! │  ErrorKind (atrium-core)              StoreError (this file)           │
//! │  ───────────────────────              ────────────────────────         │
//! │  • What subscribers see               • What the embedding app sees    │
//! │  • Classified network outcomes        • Config load/save failures      │
//! │  • Stable, non-technical text         • Credential store I/O           │
//! │  • Stored on cache entries            • Invalid configuration          │
//! │                                                                         │
//! │  A network failure never becomes a StoreError; a config failure        │
//! │  never reaches a cache entry.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for engine operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Operational failures of the engine itself.
#[derive(Debug, Error)]
pub enum StoreError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid store configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Credential Store Errors
    // =========================================================================
    /// Failed to read the persisted session.
    #[error("Failed to load stored session: {0}")]
    CredentialLoadFailed(String),

    /// Failed to write the persisted session.
    #[error("Failed to save session: {0}")]
    CredentialSaveFailed(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(err: toml::de::Error) -> Self {
        StoreError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for StoreError {
    fn from(err: toml::ser::Error) -> Self {
        StoreError::CredentialSaveFailed(err.to_string())
    }
}

impl From<url::ParseError> for StoreError {
    fn from(err: url::ParseError) -> Self {
        StoreError::InvalidConfig(err.to_string())
    }
}
