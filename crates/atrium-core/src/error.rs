//! # Error Taxonomy
//!
//! The fixed set of surfaced error kinds and the classifier that maps raw
//! transport failures onto it.
//!
//! ## Classification
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Failure Classification                            │
//! │                                                                         │
//! │  FetchFailure (raw, transport-level)     ErrorKind (surfaced)          │
//! │  ─────────────────────────────────       ────────────────────          │
//! │  Status 401                         ──►  Unauthenticated               │
//! │  Status 403                         ──►  Forbidden                     │
//! │  Status 404                         ──►  NotFound                      │
//! │  Status 429                         ──►  RateLimited                   │
//! │  Status 5xx                         ──►  ServerError                   │
//! │  Connect error / timeout            ──►  NetworkUnreachable            │
//! │  Envelope schema mismatch           ──►  ServerError                   │
//! │  Anything else                      ──►  Unknown                       │
//! │                                                                         │
//! │  Raw detail (bodies, io messages) stays in FetchFailure for the        │
//! │  transport's tracing output. ErrorKind carries only the stable,        │
//! │  non-technical template the UI may show.                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only `Unauthenticated` triggers the silent refresh-and-retry path; every
//! other kind is stored on the cache entry and surfaced verbatim.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Surfaced Error Kinds
// =============================================================================

/// The surfaced error taxonomy.
///
/// `Display` is the stable, user-presentable template for each kind. The
/// layer never auto-retries `ServerError`/`NetworkUnreachable`/`RateLimited`;
/// callers re-invoke `load()` explicitly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ErrorKind {
    /// The session credential was missing, expired, or rejected.
    #[error("Your session has expired. Please sign in again.")]
    Unauthenticated,

    /// The session is valid but not allowed to access this resource.
    #[error("You don't have permission to view this.")]
    Forbidden,

    /// The requested resource does not exist.
    #[error("The requested data could not be found.")]
    NotFound,

    /// The backend asked us to slow down.
    #[error("Too many requests. Please wait a moment and try again.")]
    RateLimited,

    /// The backend failed, or answered with an unrecognizable shape.
    #[error("The server ran into a problem. Please try again.")]
    ServerError,

    /// No response at all: connection failure or timeout.
    #[error("Could not reach the server. Check your connection.")]
    NetworkUnreachable,

    /// Anything that fits no other bucket.
    #[error("Something went wrong. Please try again.")]
    Unknown,
}

impl ErrorKind {
    /// True for the one kind that the silent-refresh path handles locally.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, ErrorKind::Unauthenticated)
    }
}

// =============================================================================
// Raw Transport Failures
// =============================================================================

/// A failed network outcome before classification.
///
/// Produced only at the transport boundary; the detail strings are for
/// diagnostic logging and must never reach a surfaced message.
#[derive(Debug, Clone)]
pub enum FetchFailure {
    /// The backend answered with a non-success status.
    Status {
        /// HTTP status code.
        code: u16,
        /// Response body (or a prefix of it), kept for diagnostics.
        detail: String,
    },

    /// No usable response: DNS, connect, or transport-level failure.
    Network(String),

    /// The transport-level timeout elapsed.
    Timeout(String),

    /// The response arrived but did not match the validated envelope schema.
    Decode(String),
}

impl FetchFailure {
    /// Diagnostic detail for tracing output.
    pub fn detail(&self) -> &str {
        match self {
            FetchFailure::Status { detail, .. } => detail,
            FetchFailure::Network(detail) => detail,
            FetchFailure::Timeout(detail) => detail,
            FetchFailure::Decode(detail) => detail,
        }
    }
}

/// Maps a raw failure into the surfaced taxonomy.
///
/// Schema mismatches classify as `ServerError`: the backend broke its
/// contract, and guessing at alternate shapes is not this layer's job.
pub fn classify(failure: &FetchFailure) -> ErrorKind {
    match failure {
        FetchFailure::Status { code: 401, .. } => ErrorKind::Unauthenticated,
        FetchFailure::Status { code: 403, .. } => ErrorKind::Forbidden,
        FetchFailure::Status { code: 404, .. } => ErrorKind::NotFound,
        FetchFailure::Status { code: 429, .. } => ErrorKind::RateLimited,
        FetchFailure::Status { code, .. } if (500..=599).contains(code) => ErrorKind::ServerError,
        FetchFailure::Status { .. } => ErrorKind::Unknown,
        FetchFailure::Network(_) | FetchFailure::Timeout(_) => ErrorKind::NetworkUnreachable,
        FetchFailure::Decode(_) => ErrorKind::ServerError,
    }
}
