//! # Auth Session Types
//!
//! Value types for the authentication lifecycle.
//!
//! ## Phase Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Auth Phase Transitions                           │
//! │                                                                         │
//! │              login/register                                             │
//! │  SignedOut ───────────────► SigningIn ──success──► Authenticated       │
//! │      ▲                          │                       │               │
//! │      │                 failure  │            401 on any │ request       │
//! │      │◄─────────────────────────┘                       ▼               │
//! │      │                                             Refreshing           │
//! │      │            logout                                │               │
//! │      │◄────────────────────────── Authenticated ◄───────┤ success       │
//! │      │                                                  │ failure       │
//! │      │                                                  ▼               │
//! │      └────────────── sign-in ◄─────────────── SignedOutError           │
//! │                                                                         │
//! │  SignedOutError is SignedOut with a reason: the session died under     │
//! │  the user (refresh rejected, restore revoked), not by their hand.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

// =============================================================================
// Auth Phase
// =============================================================================

/// Where the process currently stands in the authentication lifecycle.
///
/// Exactly one phase is active at a time; the view layer renders it
/// directly (login form, spinner, signed-in shell, session-expired notice).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum AuthPhase {
    /// No session. The user signed out, or never signed in.
    #[default]
    SignedOut,

    /// A login or registration call is in flight.
    SigningIn,

    /// A session is active and requests carry its access credential.
    Authenticated,

    /// An access credential was rejected and a refresh exchange is in
    /// flight.
    Refreshing,

    /// The session died without a logout: refresh failed irrecoverably or a
    /// restored session was revoked.
    SignedOutError,
}

impl AuthPhase {
    /// True when requests may be issued with a credential.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthPhase::Authenticated | AuthPhase::Refreshing)
    }

    /// True for both signed-out phases.
    pub fn is_signed_out(&self) -> bool {
        matches!(self, AuthPhase::SignedOut | AuthPhase::SignedOutError)
    }
}

impl std::fmt::Display for AuthPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthPhase::SignedOut => write!(f, "signed_out"),
            AuthPhase::SigningIn => write!(f, "signing_in"),
            AuthPhase::Authenticated => write!(f, "authenticated"),
            AuthPhase::Refreshing => write!(f, "refreshing"),
            AuthPhase::SignedOutError => write!(f, "signed_out_error"),
        }
    }
}

// =============================================================================
// Auth Session
// =============================================================================

/// The active credential set. Exactly one per process.
///
/// Replaced atomically on login/refresh, cleared atomically on logout.
/// Expiry is wall-clock so a persisted session stays meaningful across a
/// restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    /// Bearer credential attached to authenticated requests.
    pub access_token: String,

    /// Credential exchanged for a new pair when the access token is
    /// rejected.
    pub refresh_token: String,

    /// When the access token expires.
    pub expires_at: DateTime<Utc>,

    /// Server-assigned session identity.
    pub session_id: Uuid,
}

impl AuthSession {
    /// True once the access token's expiry has passed.
    ///
    /// Advisory only: the backend's 401 is authoritative, and the refresh
    /// path reacts to that rather than to the clock.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Seconds of validity remaining (0 if already expired).
    pub fn remaining_secs(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

// =============================================================================
// User Record
// =============================================================================

/// The signed-in user as last reported by the backend.
///
/// Cached alongside the credentials so a restart can restore the signed-in
/// shell before the confirming current-user call returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UserRecord {
    /// Stable user identity.
    pub id: String,

    /// Sign-in email.
    pub email: String,

    /// Name shown in the dashboard chrome.
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn session(expires_in_secs: i64) -> AuthSession {
        AuthSession {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            expires_at: Utc::now() + ChronoDuration::seconds(expires_in_secs),
            session_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_session_expiry() {
        assert!(!session(3600).is_expired());
        assert!(session(-1).is_expired());
    }

    #[test]
    fn test_remaining_secs_floors_at_zero() {
        assert_eq!(session(-100).remaining_secs(), 0);
        assert!(session(3600).remaining_secs() > 3500);
    }

    #[test]
    fn test_phase_predicates() {
        assert!(AuthPhase::Authenticated.is_authenticated());
        assert!(AuthPhase::Refreshing.is_authenticated());
        assert!(AuthPhase::SignedOut.is_signed_out());
        assert!(AuthPhase::SignedOutError.is_signed_out());
        assert!(!AuthPhase::SigningIn.is_authenticated());
        assert!(!AuthPhase::SigningIn.is_signed_out());
    }
}
