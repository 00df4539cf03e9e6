//! # Auth Manager
//!
//! Owns the process-wide auth session and its lifecycle: sign-in,
//! registration, silent refresh, logout, and restart restoration.
//!
//! ## Silent Refresh
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Single-Flight Refresh Join                           │
//! │                                                                         │
//! │  request A ──401──┐                                                     │
//! │  request B ──401──┼──► refresh in flight?                               │
//! │  request C ──401──┘        │                                            │
//! │                    no ─────┴───── yes                                   │
//! │                    │               │                                    │
//! │                    ▼               ▼                                    │
//! │              POST /auth/refresh   subscribe to the pending outcome      │
//! │                    │               │                                    │
//! │          ┌─────────┴───────┐       │                                    │
//! │          ▼                 ▼       ▼                                    │
//! │   swap credential      sign out  every joiner sees the same outcome;    │
//! │   pair atomically      + clear   each failed request retries exactly    │
//! │                        + notify  once with the refreshed credential     │
//! │                                                                         │
//! │  Exactly ONE refresh exchange runs no matter how many in-flight        │
//! │  requests observed the 401.                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the manager mutates the session; every other component reads
//! snapshots (`phase()`, `access_token()`, `user()`).

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use atrium_core::{classify, AuthPhase, AuthSession, ErrorKind, UserRecord};

use crate::bus::{StoreEvent, SubscriptionBus, Topic};
use crate::persist::{CredentialStore, PersistedSession};
use crate::protocol::{LoginRequest, RegisterRequest, SessionGrant};
use crate::transport::AuthApi;

// =============================================================================
// Refresh Outcome
// =============================================================================

/// How a silent refresh resolved, shared by every joined caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A fresh credential pair is installed; retry the failed request once.
    Refreshed,

    /// The refresh was rejected: the session is gone, credentials are
    /// cleared, and sign-out has been broadcast. Surface the kind.
    SignedOut(ErrorKind),
}

// =============================================================================
// Auth State
// =============================================================================

struct AuthState {
    phase: AuthPhase,
    session: Option<AuthSession>,
    user: Option<UserRecord>,
}

impl Default for AuthState {
    fn default() -> Self {
        AuthState {
            phase: AuthPhase::SignedOut,
            session: None,
            user: None,
        }
    }
}

// =============================================================================
// Auth Manager
// =============================================================================

/// The token lifecycle manager. One instance per process, owned by the
/// store.
pub struct AuthManager {
    api: Arc<dyn AuthApi>,
    credentials: Arc<dyn CredentialStore>,
    bus: SubscriptionBus,
    state: RwLock<AuthState>,

    /// Single-flight gate: Some while a refresh exchange is in flight.
    refresh_gate: Mutex<Option<broadcast::Sender<RefreshOutcome>>>,
}

impl AuthManager {
    /// Creates a manager in the SignedOut phase.
    pub fn new(
        api: Arc<dyn AuthApi>,
        credentials: Arc<dyn CredentialStore>,
        bus: SubscriptionBus,
    ) -> Self {
        AuthManager {
            api,
            credentials,
            bus,
            state: RwLock::new(AuthState::default()),
            refresh_gate: Mutex::new(None),
        }
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Current lifecycle phase.
    pub async fn phase(&self) -> AuthPhase {
        self.state.read().await.phase
    }

    /// Current bearer credential, if a session is active.
    pub async fn access_token(&self) -> Option<String> {
        self.state
            .read()
            .await
            .session
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    /// The signed-in user as last reported by the backend.
    pub async fn user(&self) -> Option<UserRecord> {
        self.state.read().await.user.clone()
    }

    // =========================================================================
    // Sign-In / Registration
    // =========================================================================

    /// Signs in. Success installs the granted session; failure surfaces the
    /// classified kind and leaves the phase where it was.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserRecord, ErrorKind> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let prior = self.phase().await;
        self.transition(AuthPhase::SigningIn).await;

        match self.api.login(&request).await {
            Ok(grant) => {
                info!(session_id = %grant.session_id, "Signed in");
                let user = grant.user.clone();
                self.install_grant(grant).await;
                Ok(user)
            }
            Err(failure) => {
                let kind = classify(&failure);
                warn!(error = %kind, detail = failure.detail(), "Sign-in failed");
                self.transition(prior).await;
                Err(kind)
            }
        }
    }

    /// Registers a new account. Follows the login contract.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<UserRecord, ErrorKind> {
        let request = RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            display_name: display_name.to_string(),
        };
        let prior = self.phase().await;
        self.transition(AuthPhase::SigningIn).await;

        match self.api.register(&request).await {
            Ok(grant) => {
                info!(session_id = %grant.session_id, "Registered and signed in");
                let user = grant.user.clone();
                self.install_grant(grant).await;
                Ok(user)
            }
            Err(failure) => {
                let kind = classify(&failure);
                warn!(error = %kind, detail = failure.detail(), "Registration failed");
                self.transition(prior).await;
                Err(kind)
            }
        }
    }

    // =========================================================================
    // Logout
    // =========================================================================

    /// Signs out: best-effort remote invalidation, then local state is
    /// cleared regardless of the remote outcome.
    pub async fn logout(&self) {
        let token = self.access_token().await;
        if let Some(token) = token {
            if let Err(failure) = self.api.logout(&token).await {
                warn!(
                    detail = failure.detail(),
                    "Remote session invalidation failed; clearing locally anyway"
                );
            }
        }
        self.clear_session(AuthPhase::SignedOut).await;
        info!("Signed out");
    }

    // =========================================================================
    // Silent Refresh
    // =========================================================================

    /// Exchanges the refresh credential after a request came back
    /// Unauthenticated.
    ///
    /// At most one exchange runs at a time: concurrent callers join the
    /// pending one and all observe the same outcome. On success the caller
    /// retries its original request exactly once; on failure the session is
    /// gone and sign-out has already been broadcast.
    pub async fn refresh_after_unauthenticated(&self) -> RefreshOutcome {
        let rx = {
            let mut gate = self.refresh_gate.lock().await;
            match gate.as_ref() {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    *gate = Some(tx);
                    None
                }
            }
        };

        if let Some(mut rx) = rx {
            debug!("Joining in-flight refresh");
            return rx
                .recv()
                .await
                .unwrap_or(RefreshOutcome::SignedOut(ErrorKind::Unknown));
        }

        let outcome = self.run_refresh().await;

        let tx = self.refresh_gate.lock().await.take();
        if let Some(tx) = tx {
            let _ = tx.send(outcome);
        }
        outcome
    }

    async fn run_refresh(&self) -> RefreshOutcome {
        let refresh_token = {
            let state = self.state.read().await;
            state.session.as_ref().map(|s| s.refresh_token.clone())
        };
        let Some(refresh_token) = refresh_token else {
            // Nothing to exchange; the caller raced a sign-out.
            return RefreshOutcome::SignedOut(ErrorKind::Unauthenticated);
        };

        self.transition(AuthPhase::Refreshing).await;
        info!("Access credential rejected, refreshing");

        match self.api.refresh(&refresh_token).await {
            Ok(grant) => {
                info!(
                    session_id = %grant.session_id,
                    expires_in_secs = (grant.expires_at - Utc::now()).num_seconds(),
                    "Credential pair refreshed"
                );
                self.install_grant(grant).await;
                RefreshOutcome::Refreshed
            }
            Err(failure) => {
                let kind = classify(&failure);
                warn!(
                    error = %kind,
                    detail = failure.detail(),
                    "Refresh rejected, signing out"
                );
                self.clear_session(AuthPhase::SignedOutError).await;
                RefreshOutcome::SignedOut(kind)
            }
        }
    }

    // =========================================================================
    // Session Restoration
    // =========================================================================

    /// Optimistically restores a persisted session.
    ///
    /// Returns true if a session was found and installed. Callers should
    /// follow up with [`spawn_confirmation`](Self::spawn_confirmation).
    pub async fn restore(&self) -> bool {
        let persisted = match self.credentials.load() {
            Ok(Some(persisted)) => persisted,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "Could not read stored session");
                return false;
            }
        };

        {
            let mut state = self.state.write().await;
            state.session = Some(persisted.session);
            state.user = Some(persisted.user);
            state.phase = AuthPhase::Authenticated;
        }
        info!("Session restored optimistically");
        self.publish_phase(AuthPhase::Authenticated);
        true
    }

    /// Spawns the background call that confirms or revokes a restored
    /// session against the current-user endpoint.
    pub fn spawn_confirmation(self: Arc<Self>) {
        tokio::spawn(async move {
            self.confirm_restored().await;
        });
    }

    /// Confirms the restored session, refreshing once if the credential was
    /// already stale. Unreachable backends leave the optimistic state alone.
    pub(crate) async fn confirm_restored(&self) {
        let Some(token) = self.access_token().await else {
            return;
        };

        match self.api.current_user(&token).await {
            Ok(user) => {
                debug!(user_id = %user.id, "Restored session confirmed");
                self.update_user(user).await;
            }
            Err(failure) if classify(&failure).is_unauthenticated() => {
                match self.refresh_after_unauthenticated().await {
                    RefreshOutcome::Refreshed => {
                        if let Some(token) = self.access_token().await {
                            if let Ok(user) = self.api.current_user(&token).await {
                                self.update_user(user).await;
                            }
                        }
                    }
                    RefreshOutcome::SignedOut(_) => {
                        info!("Restored session was revoked");
                    }
                }
            }
            Err(failure) => {
                warn!(
                    detail = failure.detail(),
                    "Could not confirm restored session; keeping optimistic state"
                );
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Installs a grant: session + user swapped under one write lock, then
    /// persisted, then announced.
    async fn install_grant(&self, grant: SessionGrant) {
        let (session, user) = grant.into_parts();
        {
            let mut state = self.state.write().await;
            state.session = Some(session.clone());
            state.user = Some(user.clone());
            state.phase = AuthPhase::Authenticated;
        }
        if let Err(e) = self.credentials.save(&PersistedSession {
            session,
            user,
            saved_at: Utc::now(),
        }) {
            warn!(error = %e, "Could not persist session");
        }
        self.publish_phase(AuthPhase::Authenticated);
    }

    /// Clears session + user atomically, removes persisted credentials, and
    /// broadcasts the resulting phase.
    async fn clear_session(&self, phase: AuthPhase) {
        {
            let mut state = self.state.write().await;
            state.session = None;
            state.user = None;
            state.phase = phase;
        }
        if let Err(e) = self.credentials.clear() {
            warn!(error = %e, "Could not remove stored session");
        }
        self.publish_phase(phase);
    }

    async fn update_user(&self, user: UserRecord) {
        let session = {
            let mut state = self.state.write().await;
            state.user = Some(user.clone());
            state.session.clone()
        };
        if let Some(session) = session {
            if let Err(e) = self.credentials.save(&PersistedSession {
                session,
                user,
                saved_at: Utc::now(),
            }) {
                warn!(error = %e, "Could not persist refreshed user record");
            }
        }
    }

    async fn transition(&self, phase: AuthPhase) {
        let changed = {
            let mut state = self.state.write().await;
            if state.phase == phase {
                false
            } else {
                state.phase = phase;
                true
            }
        };
        if changed {
            self.publish_phase(phase);
        }
    }

    fn publish_phase(&self, phase: AuthPhase) {
        self.bus.publish(&Topic::Auth, &StoreEvent::AuthChanged { phase });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryCredentialStore;
    use async_trait::async_trait;
    use atrium_core::FetchFailure;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use uuid::Uuid;

    fn grant(tag: &str) -> SessionGrant {
        SessionGrant {
            access_token: format!("access-{tag}"),
            refresh_token: format!("refresh-{tag}"),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            session_id: Uuid::new_v4(),
            user: UserRecord {
                id: "u1".into(),
                email: "ops@example.com".into(),
                display_name: "Ops".into(),
            },
        }
    }

    fn unauthorized() -> FetchFailure {
        FetchFailure::Status {
            code: 401,
            detail: "token expired".into(),
        }
    }

    /// Scriptable AuthApi double with call counters.
    #[derive(Default)]
    struct MockAuthApi {
        login_results: StdMutex<VecDeque<Result<SessionGrant, FetchFailure>>>,
        refresh_results: StdMutex<VecDeque<Result<SessionGrant, FetchFailure>>>,
        current_user_results: StdMutex<VecDeque<Result<UserRecord, FetchFailure>>>,
        logout_fails: bool,
        refresh_delay: Option<Duration>,
        refresh_calls: AtomicUsize,
        logout_calls: AtomicUsize,
    }

    impl MockAuthApi {
        fn with_refresh(results: Vec<Result<SessionGrant, FetchFailure>>) -> Self {
            MockAuthApi {
                refresh_results: StdMutex::new(results.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl AuthApi for MockAuthApi {
        async fn login(&self, _request: &LoginRequest) -> Result<SessionGrant, FetchFailure> {
            self.login_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(FetchFailure::Network("unscripted login".into())))
        }

        async fn register(&self, _request: &RegisterRequest) -> Result<SessionGrant, FetchFailure> {
            self.login_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(FetchFailure::Network("unscripted register".into())))
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<SessionGrant, FetchFailure> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.refresh_delay {
                tokio::time::sleep(delay).await;
            }
            self.refresh_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(FetchFailure::Network("unscripted refresh".into())))
        }

        async fn logout(&self, _access_token: &str) -> Result<(), FetchFailure> {
            self.logout_calls.fetch_add(1, Ordering::SeqCst);
            if self.logout_fails {
                Err(FetchFailure::Network("connection reset".into()))
            } else {
                Ok(())
            }
        }

        async fn current_user(&self, _access_token: &str) -> Result<UserRecord, FetchFailure> {
            self.current_user_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(FetchFailure::Network("unscripted current_user".into())))
        }
    }

    struct Fixture {
        manager: Arc<AuthManager>,
        api: Arc<MockAuthApi>,
        credentials: Arc<MemoryCredentialStore>,
        bus: SubscriptionBus,
    }

    fn fixture(api: MockAuthApi) -> Fixture {
        let api = Arc::new(api);
        let credentials = Arc::new(MemoryCredentialStore::new());
        let bus = SubscriptionBus::new();
        let manager = Arc::new(AuthManager::new(
            api.clone(),
            credentials.clone(),
            bus.clone(),
        ));
        Fixture {
            manager,
            api,
            credentials,
            bus,
        }
    }

    #[tokio::test]
    async fn test_login_success_installs_and_persists() {
        let api = MockAuthApi {
            login_results: StdMutex::new(vec![Ok(grant("a"))].into()),
            ..Default::default()
        };
        let f = fixture(api);

        let user = f.manager.login("ops@example.com", "hunter2").await.unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(f.manager.phase().await, AuthPhase::Authenticated);
        assert_eq!(f.manager.access_token().await.as_deref(), Some("access-a"));
        assert!(f.credentials.load().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_login_failure_leaves_state_unchanged() {
        let api = MockAuthApi {
            login_results: StdMutex::new(
                vec![Err(FetchFailure::Status {
                    code: 403,
                    detail: "bad password".into(),
                })]
                .into(),
            ),
            ..Default::default()
        };
        let f = fixture(api);

        let err = f.manager.login("ops@example.com", "wrong").await.unwrap_err();
        assert_eq!(err, ErrorKind::Forbidden);
        assert_eq!(f.manager.phase().await, AuthPhase::SignedOut);
        assert!(f.manager.access_token().await.is_none());
        assert!(f.credentials.load().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failures_trigger_exactly_one_refresh() {
        let mut api = MockAuthApi::with_refresh(vec![Ok(grant("new"))]);
        api.login_results = StdMutex::new(vec![Ok(grant("old"))].into());
        api.refresh_delay = Some(Duration::from_millis(50));
        let f = fixture(api);
        f.manager.login("ops@example.com", "hunter2").await.unwrap();

        // Three in-flight requests all observed a 401.
        let (a, b, c) = tokio::join!(
            f.manager.refresh_after_unauthenticated(),
            f.manager.refresh_after_unauthenticated(),
            f.manager.refresh_after_unauthenticated(),
        );

        assert_eq!(a, RefreshOutcome::Refreshed);
        assert_eq!(b, RefreshOutcome::Refreshed);
        assert_eq!(c, RefreshOutcome::Refreshed);

        assert_eq!(f.api.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.manager.access_token().await.as_deref(), Some("access-new"));
    }

    #[tokio::test]
    async fn test_refresh_failure_clears_everything_and_broadcasts() {
        let mut api = MockAuthApi::with_refresh(vec![Err(unauthorized())]);
        api.login_results = StdMutex::new(vec![Ok(grant("old"))].into());
        let f = fixture(api);
        f.manager.login("ops@example.com", "hunter2").await.unwrap();

        let phases: Arc<StdMutex<Vec<AuthPhase>>> = Arc::new(StdMutex::new(Vec::new()));
        let seen = phases.clone();
        let _sub = f.bus.subscribe(Topic::Auth, move |event| {
            if let StoreEvent::AuthChanged { phase } = event {
                seen.lock().unwrap().push(*phase);
            }
        });

        let outcome = f.manager.refresh_after_unauthenticated().await;
        assert_eq!(outcome, RefreshOutcome::SignedOut(ErrorKind::Unauthenticated));
        assert_eq!(f.manager.phase().await, AuthPhase::SignedOutError);
        assert!(f.manager.access_token().await.is_none());
        assert!(f.credentials.load().unwrap().is_none());
        assert_eq!(
            phases.lock().unwrap().as_slice(),
            &[AuthPhase::Refreshing, AuthPhase::SignedOutError]
        );
    }

    #[tokio::test]
    async fn test_logout_clears_locally_even_when_remote_fails() {
        let api = MockAuthApi {
            login_results: StdMutex::new(vec![Ok(grant("a"))].into()),
            logout_fails: true,
            ..Default::default()
        };
        let f = fixture(api);
        f.manager.login("ops@example.com", "hunter2").await.unwrap();

        f.manager.logout().await;
        assert_eq!(f.manager.phase().await, AuthPhase::SignedOut);
        assert!(f.manager.access_token().await.is_none());
        assert!(f.credentials.load().unwrap().is_none());
        assert_eq!(f.api.logout_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restore_then_confirm_updates_user() {
        let renamed = UserRecord {
            id: "u1".into(),
            email: "ops@example.com".into(),
            display_name: "Renamed".into(),
        };
        let api = MockAuthApi {
            current_user_results: StdMutex::new(vec![Ok(renamed.clone())].into()),
            ..Default::default()
        };
        let f = fixture(api);
        let (session, user) = grant("persisted").into_parts();
        f.credentials
            .save(&PersistedSession {
                session,
                user,
                saved_at: Utc::now(),
            })
            .unwrap();

        assert!(f.manager.restore().await);
        assert_eq!(f.manager.phase().await, AuthPhase::Authenticated);

        f.manager.confirm_restored().await;
        assert_eq!(f.manager.user().await.unwrap().display_name, "Renamed");
        assert_eq!(
            f.credentials.load().unwrap().unwrap().user.display_name,
            "Renamed"
        );
    }

    #[tokio::test]
    async fn test_restore_revoked_session_signs_out() {
        let api = MockAuthApi {
            current_user_results: StdMutex::new(vec![Err(unauthorized())].into()),
            refresh_results: StdMutex::new(vec![Err(unauthorized())].into()),
            ..Default::default()
        };
        let f = fixture(api);
        let (session, user) = grant("persisted").into_parts();
        f.credentials
            .save(&PersistedSession {
                session,
                user,
                saved_at: Utc::now(),
            })
            .unwrap();

        assert!(f.manager.restore().await);
        f.manager.confirm_restored().await;

        assert_eq!(f.manager.phase().await, AuthPhase::SignedOutError);
        assert!(f.credentials.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_without_session_reports_signed_out() {
        let f = fixture(MockAuthApi::default());
        let outcome = f.manager.refresh_after_unauthenticated().await;
        assert_eq!(
            outcome,
            RefreshOutcome::SignedOut(ErrorKind::Unauthenticated)
        );
    }
}
