//! # Sync Store
//!
//! The facade every UI surface talks to. Owns the process-wide cache, bus,
//! coordinator, and auth manager, and wires them into the load / subscribe /
//! invalidate / mutate contract.
//!
//! ## Load Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       SyncStore::load(k)                                │
//! │                                                                         │
//! │  canonicalize params ──► fresh in cache? ──yes──► snapshot, no network │
//! │                              │                                          │
//! │                              no                                         │
//! │                              ▼                                          │
//! │                    LoadCoordinator (join or own the fetch)              │
//! │                              │                                          │
//! │                              ▼                                          │
//! │               authenticated fetch via RestTransport                     │
//! │                              │                                          │
//! │                     401? ────┤                                          │
//! │                      │       └──other──► classified error to cache     │
//! │                      ▼                                                  │
//! │          AuthManager silent refresh ──ok──► retry exactly once         │
//! │                      │                                                  │
//! │                      └──fail──► sign-out broadcast + cache discard     │
//! │                                                                         │
//! │  Every accepted cache write is published to the key's subscribers.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There are no globals: the embedding application constructs one store at
//! its composition root and hands it to the surfaces that need it. Tests
//! build fresh instances, so nothing leaks between them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use atrium_core::{
    classify, AuthPhase, CacheEntry, ErrorKind, FetchFailure, QueryParams, ResourceKey, UserRecord,
};

use crate::auth::{AuthManager, RefreshOutcome};
use crate::bus::{StoreEvent, SubscriptionBus, SubscriptionHandle, Topic};
use crate::cache::ResourceCache;
use crate::config::StoreConfig;
use crate::coordinator::LoadCoordinator;
use crate::error::StoreResult;
use crate::persist::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
use crate::protocol::MutationRequest;
use crate::transport::{AuthApi, ResourceApi, RestTransport};

// =============================================================================
// Store Status
// =============================================================================

/// Point-in-time view of the store for diagnostics surfaces.
#[derive(Debug, Clone)]
pub struct StoreStatus {
    /// Current auth phase.
    pub auth_phase: AuthPhase,

    /// The signed-in user, if any.
    pub user: Option<UserRecord>,

    /// Number of keys with a cache slot.
    pub cached_keys: usize,

    /// Number of fetches currently in flight.
    pub in_flight: usize,
}

// =============================================================================
// Sync Store
// =============================================================================

/// The data synchronization facade.
pub struct SyncStore {
    max_age: Duration,
    cache: Arc<ResourceCache>,
    bus: SubscriptionBus,
    coordinator: Arc<LoadCoordinator>,
    auth: Arc<AuthManager>,
    resources: Arc<dyn ResourceApi>,

    /// Keeps the forced-sign-out reaction registered for the store's
    /// lifetime.
    _forced_sign_out: SubscriptionHandle,
}

impl SyncStore {
    /// Builds a store from explicit collaborators.
    ///
    /// This is the seam tests use; applications usually go through
    /// [`connect`](Self::connect).
    pub fn new(
        config: StoreConfig,
        resources: Arc<dyn ResourceApi>,
        auth_api: Arc<dyn AuthApi>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let cache = Arc::new(ResourceCache::new());
        let bus = SubscriptionBus::new();
        let coordinator = Arc::new(LoadCoordinator::new(cache.clone(), bus.clone()));
        let auth = Arc::new(AuthManager::new(auth_api, credentials, bus.clone()));

        // A session that dies under the user is the one case where the
        // store discards all cached data on its own: a signed-out session
        // cannot vouch for the provenance of previously fetched records.
        let forced_sign_out = {
            let coordinator = coordinator.clone();
            bus.subscribe(Topic::Auth, move |event| {
                if let StoreEvent::AuthChanged {
                    phase: AuthPhase::SignedOutError,
                } = event
                {
                    info!("Session died; discarding all cached data");
                    coordinator.clear_all();
                }
            })
        };

        SyncStore {
            max_age: config.cache.max_age(),
            cache,
            bus,
            coordinator,
            auth,
            resources,
            _forced_sign_out: forced_sign_out,
        }
    }

    /// Builds a store wired to the real REST transport and the configured
    /// credential store.
    pub fn connect(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let transport = Arc::new(RestTransport::new(&config)?);
        let credentials: Arc<dyn CredentialStore> = if config.session.persist {
            match config.session.credentials_path.clone() {
                Some(path) => Arc::new(FileCredentialStore::new(path)),
                None => match FileCredentialStore::at_default_path() {
                    Some(store) => Arc::new(store),
                    None => Arc::new(MemoryCredentialStore::new()),
                },
            }
        } else {
            Arc::new(MemoryCredentialStore::new())
        };
        Ok(Self::new(config, transport.clone(), transport, credentials))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Loads one view of a resource.
    ///
    /// Fresh cache entries are returned immediately with no network access.
    /// Stale or absent entries go through the coordinator: concurrent
    /// callers of the same key share one fetch, and the outcome lands in the
    /// cache before anyone resolves. On failure the classified kind is both
    /// returned and recorded on the entry.
    pub async fn load(
        &self,
        resource: &str,
        params: &QueryParams,
    ) -> Result<CacheEntry, ErrorKind> {
        let key = ResourceKey::new(resource, params);
        if self.cache.is_fresh(&key, self.max_age) {
            debug!(key = %key, "Serving fresh snapshot without network access");
            return Ok(self.cache.snapshot(&key));
        }

        // The fetcher owns its collaborators: once issued it runs to
        // completion on its own task, whether or not this caller survives.
        let outcome = self
            .coordinator
            .load(&key, {
                let auth = self.auth.clone();
                let resources = self.resources.clone();
                let resource = resource.to_string();
                let params = params.clone();
                move || async move {
                    call_with_refresh(&auth, |token| {
                        let resources = resources.clone();
                        let resource = resource.clone();
                        let params = params.clone();
                        async move { resources.fetch(&resource, &params, &token).await }
                    })
                    .await
                }
            })
            .await;

        match outcome {
            Ok(_) => Ok(self.cache.snapshot(&key)),
            Err(kind) => Err(kind),
        }
    }

    /// Subscribes to changes of one resource view. The callback runs
    /// synchronously on every published snapshot for the key.
    pub fn subscribe(
        &self,
        resource: &str,
        params: &QueryParams,
        callback: impl Fn(&StoreEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let key = ResourceKey::new(resource, params);
        self.bus.subscribe(Topic::Resource(key), callback)
    }

    /// Subscribes to auth phase changes.
    pub fn subscribe_auth(
        &self,
        callback: impl Fn(&StoreEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.bus.subscribe(Topic::Auth, callback)
    }

    // =========================================================================
    // Invalidation & Mutation
    // =========================================================================

    /// Clears one view (with params) or every view of a resource type
    /// (without), publishing the cleared state. Any in-flight response for
    /// the old generation is discarded on arrival.
    pub fn invalidate(&self, resource: &str, params: Option<&QueryParams>) {
        match params {
            Some(params) => {
                let key = ResourceKey::new(resource, params);
                self.coordinator.invalidate(&key);
            }
            None => self.coordinator.invalidate_resource(resource),
        }
    }

    /// Performs a write with the same silent-refresh discipline as reads.
    ///
    /// On success every cached view of the resource is invalidated, so the
    /// next load reflects the change; the layer guarantees no optimistic
    /// merge beyond that.
    pub async fn mutate(&self, request: &MutationRequest) -> Result<Option<Value>, ErrorKind> {
        let result = call_with_refresh(&self.auth, |token| async move {
            self.resources.mutate(request, &token).await
        })
        .await?;

        info!(
            resource = %request.resource,
            verb = %request.verb,
            "Mutation succeeded; invalidating cached views"
        );
        self.coordinator.invalidate_resource(&request.resource);
        Ok(result)
    }

    // =========================================================================
    // Auth Passthrough
    // =========================================================================

    /// Signs in.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserRecord, ErrorKind> {
        self.auth.login(email, password).await
    }

    /// Registers a new account and signs in.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<UserRecord, ErrorKind> {
        self.auth.register(email, password, display_name).await
    }

    /// Signs out (best-effort remote invalidation) and clears the cache -
    /// caller-initiated, unlike the forced path.
    pub async fn logout(&self) {
        self.auth.logout().await;
        self.coordinator.clear_all();
    }

    /// Optimistically restores a persisted session and spawns the
    /// background confirmation call. Returns true if a session was found.
    pub async fn restore_session(&self) -> bool {
        let restored = self.auth.restore().await;
        if restored {
            self.auth.clone().spawn_confirmation();
        }
        restored
    }

    /// Current auth phase.
    pub async fn auth_phase(&self) -> AuthPhase {
        self.auth.phase().await
    }

    /// The signed-in user, if any.
    pub async fn current_user(&self) -> Option<UserRecord> {
        self.auth.user().await
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Point-in-time status snapshot.
    pub async fn status(&self) -> StoreStatus {
        StoreStatus {
            auth_phase: self.auth.phase().await,
            user: self.auth.user().await,
            cached_keys: self.cache.len(),
            in_flight: self.coordinator.in_flight_count(),
        }
    }
}

// =============================================================================
// Authenticated Call Helper
// =============================================================================

/// Runs an authenticated operation with the silent-refresh discipline:
/// on Unauthenticated, join/trigger exactly one refresh and retry exactly
/// once with the new credential. Every other kind surfaces as classified.
async fn call_with_refresh<T, F, Fut>(auth: &AuthManager, op: F) -> Result<T, ErrorKind>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, FetchFailure>>,
{
    let Some(token) = auth.access_token().await else {
        return Err(ErrorKind::Unauthenticated);
    };

    match op(token).await {
        Ok(value) => Ok(value),
        Err(failure) => {
            let kind = classify(&failure);
            if !kind.is_unauthenticated() {
                return Err(kind);
            }
            match auth.refresh_after_unauthenticated().await {
                RefreshOutcome::Refreshed => {
                    let Some(token) = auth.access_token().await else {
                        return Err(ErrorKind::Unauthenticated);
                    };
                    // A second rejection surfaces as-is; one retry only.
                    op(token).await.map_err(|f| classify(&f))
                }
                RefreshOutcome::SignedOut(kind) => Err(kind),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{LoginRequest, RegisterRequest, SessionGrant};
    use async_trait::async_trait;
    use atrium_core::{PageInfo, ResourceData};
    use chrono::Utc;
    use serde_json::json;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    type FetchScript = VecDeque<Result<(ResourceData, Option<PageInfo>), FetchFailure>>;

    fn orders(n: usize) -> (ResourceData, Option<PageInfo>) {
        let records = (0..n).map(|i| json!({"id": i, "status": "pending"})).collect();
        (
            ResourceData::collection(records),
            Some(PageInfo {
                page: 1,
                per_page: 25,
                total: n as u64,
            }),
        )
    }

    fn unauthorized() -> FetchFailure {
        FetchFailure::Status {
            code: 401,
            detail: "token expired".into(),
        }
    }

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

    /// Scriptable ResourceApi double keyed by resource type.
    #[derive(Default)]
    struct MockResourceApi {
        scripts: StdMutex<HashMap<String, FetchScript>>,
        fetch_calls: AtomicUsize,
        fetch_tokens: StdMutex<Vec<String>>,
        fetch_delay: Option<Duration>,
        mutation_results: StdMutex<VecDeque<Result<Option<Value>, FetchFailure>>>,
        mutation_calls: AtomicUsize,
    }

    impl MockResourceApi {
        fn script(&self, resource: &str, outcomes: Vec<Result<(ResourceData, Option<PageInfo>), FetchFailure>>) {
            self.scripts
                .lock()
                .unwrap()
                .entry(resource.to_string())
                .or_default()
                .extend(outcomes);
        }
    }

    #[async_trait]
    impl ResourceApi for MockResourceApi {
        async fn fetch(
            &self,
            resource: &str,
            _params: &QueryParams,
            access_token: &str,
        ) -> Result<(ResourceData, Option<PageInfo>), FetchFailure> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            self.fetch_tokens
                .lock()
                .unwrap()
                .push(access_token.to_string());
            if let Some(delay) = self.fetch_delay {
                tokio::time::sleep(delay).await;
            }
            self.scripts
                .lock()
                .unwrap()
                .get_mut(resource)
                .and_then(|script| script.pop_front())
                .unwrap_or(Err(FetchFailure::Network("unscripted fetch".into())))
        }

        async fn mutate(
            &self,
            _request: &MutationRequest,
            _access_token: &str,
        ) -> Result<Option<Value>, FetchFailure> {
            self.mutation_calls.fetch_add(1, Ordering::SeqCst);
            self.mutation_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(None))
        }
    }

    /// Minimal AuthApi double for store-level scenarios.
    #[derive(Default)]
    struct MockAuthApi {
        refresh_results: StdMutex<VecDeque<Result<SessionGrant, FetchFailure>>>,
        refresh_calls: AtomicUsize,
        refresh_delay: Option<Duration>,
    }

    #[async_trait]
    impl AuthApi for MockAuthApi {
        async fn login(&self, _request: &LoginRequest) -> Result<SessionGrant, FetchFailure> {
            Ok(grant("initial"))
        }

        async fn register(&self, _request: &RegisterRequest) -> Result<SessionGrant, FetchFailure> {
            Ok(grant("initial"))
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
                .unwrap_or(Ok(grant("refreshed")))
        }

        async fn logout(&self, _access_token: &str) -> Result<(), FetchFailure> {
            Ok(())
        }

        async fn current_user(&self, _access_token: &str) -> Result<UserRecord, FetchFailure> {
            Ok(grant("initial").user)
        }
    }

    struct Fixture {
        store: SyncStore,
        resources: Arc<MockResourceApi>,
        auth_api: Arc<MockAuthApi>,
    }

    fn fixture_with(resources: MockResourceApi, auth_api: MockAuthApi) -> Fixture {
        let resources = Arc::new(resources);
        let auth_api = Arc::new(auth_api);
        let store = SyncStore::new(
            StoreConfig::default(),
            resources.clone(),
            auth_api.clone(),
            Arc::new(MemoryCredentialStore::new()),
        );
        Fixture {
            store,
            resources,
            auth_api,
        }
    }

    fn fixture(resources: MockResourceApi) -> Fixture {
        fixture_with(resources, MockAuthApi::default())
    }

    async fn signed_in(f: &Fixture) {
        f.store.login("ops@example.com", "hunter2").await.unwrap();
    }

    /// Recorded (loading, record_count, error) triple per published
    /// snapshot.
    fn record_events(
        store: &SyncStore,
        resource: &str,
        params: &QueryParams,
    ) -> (Arc<StdMutex<Vec<(bool, usize, Option<ErrorKind>)>>>, SubscriptionHandle) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let log = seen.clone();
        let handle = store.subscribe(resource, params, move |event| {
            if let StoreEvent::CacheUpdated { entry, .. } = event {
                let count = entry.data.as_ref().map(|d| d.record_count()).unwrap_or(0);
                log.lock().unwrap().push((entry.loading, count, entry.error));
            }
        });
        (seen, handle)
    }

    #[tokio::test]
    async fn test_load_publishes_loading_then_populates() {
        let resources = MockResourceApi::default();
        resources.script("orders", vec![Ok(orders(12))]);
        let f = fixture(resources);
        signed_in(&f).await;

        let params = QueryParams::none().with_filter("status", "pending");
        let (events, _sub) = record_events(&f.store, "orders", &params);

        let entry = f.store.load("orders", &params).await.unwrap();
        assert_eq!(entry.data.unwrap().record_count(), 12);
        assert!(!entry.loading);
        assert!(entry.error.is_none());
        assert!(entry.last_fetch.is_some());
        assert_eq!(entry.page.unwrap().total, 12);

        assert_eq!(
            events.lock().unwrap().as_slice(),
            &[(true, 0, None), (false, 12, None)]
        );
    }

    #[tokio::test]
    async fn test_entity_load_stores_single_record() {
        let resources = MockResourceApi::default();
        resources.script(
            "orders",
            vec![Ok((ResourceData::single(json!({"id": "42", "status": "shipped"})), None))],
        );
        let f = fixture(resources);
        signed_in(&f).await;

        let entry = f
            .store
            .load("orders", &QueryParams::entity("42"))
            .await
            .unwrap();
        let data = entry.data.unwrap();
        assert_eq!(data.as_single().unwrap()["status"], "shipped");
        assert!(entry.page.is_none());
    }

    #[tokio::test]
    async fn test_server_error_surfaces_to_subscribers() {
        let resources = MockResourceApi::default();
        resources.script(
            "orders",
            vec![Err(FetchFailure::Status {
                code: 500,
                detail: "boom".into(),
            })],
        );
        let f = fixture(resources);
        signed_in(&f).await;

        let (events, _sub) = record_events(&f.store, "orders", &QueryParams::none());
        let err = f
            .store
            .load("orders", &QueryParams::none())
            .await
            .unwrap_err();

        assert_eq!(err, ErrorKind::ServerError);
        assert_eq!(
            events.lock().unwrap().as_slice(),
            &[(true, 0, None), (false, 0, Some(ErrorKind::ServerError))]
        );
        // No silent retry for server errors; one call went out.
        assert_eq!(f.resources.fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_events_stay_on_their_key() {
        // A subscriber of the unfiltered view hears nothing about a
        // filtered load of the same resource.
        let resources = MockResourceApi::default();
        resources.script("orders", vec![Ok(orders(12))]);
        let f = fixture(resources);
        signed_in(&f).await;

        let (events, _sub) = record_events(&f.store, "orders", &QueryParams::none());
        f.store
            .load("orders", &QueryParams::none().with_filter("status", "pending"))
            .await
            .unwrap();

        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_load_within_window_is_cache_only() {
        let resources = MockResourceApi::default();
        resources.script("users", vec![Ok(orders(3))]);
        let f = fixture(resources);
        signed_in(&f).await;

        let params = QueryParams::none().with_page(1, 25);
        f.store.load("users", &params).await.unwrap();
        let second = f.store.load("users", &params).await.unwrap();

        assert_eq!(second.data.unwrap().record_count(), 3);
        assert_eq!(f.resources.fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_entry_refetches() {
        let resources = MockResourceApi::default();
        resources.script("users", vec![Ok(orders(3)), Ok(orders(4))]);
        let mut config = StoreConfig::default();
        config.cache.max_age_secs = 0;

        let resources = Arc::new(resources);
        let store = SyncStore::new(
            config,
            resources.clone(),
            Arc::new(MockAuthApi::default()),
            Arc::new(MemoryCredentialStore::new()),
        );
        store.login("ops@example.com", "hunter2").await.unwrap();

        store.load("users", &QueryParams::none()).await.unwrap();
        let second = store.load("users", &QueryParams::none()).await.unwrap();

        assert_eq!(resources.fetch_calls.load(Ordering::SeqCst), 2);
        assert_eq!(second.data.unwrap().record_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_loads_share_one_network_call() {
        let mut resources = MockResourceApi::default();
        resources.fetch_delay = Some(Duration::from_millis(20));
        resources.script("orders", vec![Ok(orders(12))]);
        let f = fixture(resources);
        signed_in(&f).await;

        let params = QueryParams::none();
        let (a, b, c) = tokio::join!(
            f.store.load("orders", &params),
            f.store.load("orders", &params),
            f.store.load("orders", &params),
        );

        assert_eq!(f.resources.fetch_calls.load(Ordering::SeqCst), 1);
        for entry in [a.unwrap(), b.unwrap(), c.unwrap()] {
            assert_eq!(entry.data.unwrap().record_count(), 12);
        }
    }

    #[tokio::test]
    async fn test_unauthenticated_fetch_refreshes_and_retries_once() {
        let resources = MockResourceApi::default();
        resources.script("orders", vec![Err(unauthorized()), Ok(orders(5))]);
        let f = fixture(resources);
        signed_in(&f).await;

        let (events, _sub) = record_events(&f.store, "orders", &QueryParams::none());
        let entry = f.store.load("orders", &QueryParams::none()).await.unwrap();

        assert_eq!(entry.data.unwrap().record_count(), 5);
        assert_eq!(f.auth_api.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.resources.fetch_calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            f.resources.fetch_tokens.lock().unwrap().as_slice(),
            &["access-initial", "access-refreshed"]
        );

        // Subscribers never saw an error; just loading then data.
        assert_eq!(
            events.lock().unwrap().as_slice(),
            &[(true, 0, None), (false, 5, None)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_concurrent_unauthenticated_failures_one_refresh() {
        let mut resources = MockResourceApi::default();
        resources.fetch_delay = Some(Duration::from_millis(5));
        for r in ["orders", "users", "reports"] {
            resources.script(r, vec![Err(unauthorized()), Ok(orders(2))]);
        }
        let mut auth_api = MockAuthApi::default();
        auth_api.refresh_delay = Some(Duration::from_millis(50));
        let f = fixture_with(resources, auth_api);
        signed_in(&f).await;

        let params = QueryParams::none();
        let (a, b, c) = tokio::join!(
            f.store.load("orders", &params),
            f.store.load("users", &params),
            f.store.load("reports", &params),
        );

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(f.auth_api.refresh_calls.load(Ordering::SeqCst), 1);
        // Each of the three requests retried exactly once.
        assert_eq!(f.resources.fetch_calls.load(Ordering::SeqCst), 6);
        let tokens = f.resources.fetch_tokens.lock().unwrap();
        assert_eq!(
            tokens.iter().filter(|t| *t == "access-refreshed").count(),
            3
        );
    }

    #[tokio::test]
    async fn test_refresh_failure_signs_out_and_clears_everything() {
        let resources = MockResourceApi::default();
        resources.script("users", vec![Ok(orders(4))]);
        resources.script("orders", vec![Err(unauthorized())]);
        let auth_api = MockAuthApi {
            refresh_results: StdMutex::new(vec![Err(unauthorized())].into()),
            ..Default::default()
        };
        let f = fixture_with(resources, auth_api);
        signed_in(&f).await;

        // Populate users so there is cached data to discard.
        f.store.load("users", &QueryParams::none()).await.unwrap();
        let (user_events, _sub) = record_events(&f.store, "users", &QueryParams::none());
        let phases: Arc<StdMutex<Vec<AuthPhase>>> = Arc::new(StdMutex::new(Vec::new()));
        let seen = phases.clone();
        let _auth_sub = f.store.subscribe_auth(move |event| {
            if let StoreEvent::AuthChanged { phase } = event {
                seen.lock().unwrap().push(*phase);
            }
        });

        let err = f
            .store
            .load("orders", &QueryParams::none())
            .await
            .unwrap_err();
        assert_eq!(err, ErrorKind::Unauthenticated);
        assert_eq!(f.store.auth_phase().await, AuthPhase::SignedOutError);

        // The users subscriber saw its entry cleared.
        assert_eq!(
            user_events.lock().unwrap().last(),
            Some(&(false, 0, None))
        );

        // And the users snapshot really is gone: a signed-out reload can't
        // serve it from cache.
        let reload_err = f
            .store
            .load("users", &QueryParams::none())
            .await
            .unwrap_err();
        assert_eq!(reload_err, ErrorKind::Unauthenticated);

        assert_eq!(
            phases.lock().unwrap().as_slice(),
            &[AuthPhase::Refreshing, AuthPhase::SignedOutError]
        );
    }

    #[tokio::test]
    async fn test_mutation_invalidates_affected_views() {
        let resources = MockResourceApi::default();
        resources.script("orders", vec![Ok(orders(2)), Ok(orders(3))]);
        resources
            .mutation_results
            .lock()
            .unwrap()
            .push_back(Ok(Some(json!({"id": 99}))));
        let f = fixture(resources);
        signed_in(&f).await;

        f.store.load("orders", &QueryParams::none()).await.unwrap();

        let written = f
            .store
            .mutate(&MutationRequest::create("orders", json!({"status": "pending"})))
            .await
            .unwrap();
        assert_eq!(written.unwrap()["id"], 99);

        // The cached view was invalidated, so this load goes to the
        // network again and sees the post-mutation state.
        let entry = f.store.load("orders", &QueryParams::none()).await.unwrap();
        assert_eq!(entry.data.unwrap().record_count(), 3);
        assert_eq!(f.resources.fetch_calls.load(Ordering::SeqCst), 2);
        assert_eq!(f.resources.mutation_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_load_without_session_surfaces_unauthenticated() {
        let f = fixture(MockResourceApi::default());

        let err = f
            .store
            .load("orders", &QueryParams::none())
            .await
            .unwrap_err();
        assert_eq!(err, ErrorKind::Unauthenticated);
        assert_eq!(f.resources.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_logout_clears_cache() {
        let resources = MockResourceApi::default();
        resources.script("orders", vec![Ok(orders(2))]);
        let f = fixture(resources);
        signed_in(&f).await;
        f.store.load("orders", &QueryParams::none()).await.unwrap();

        f.store.logout().await;

        assert_eq!(f.store.auth_phase().await, AuthPhase::SignedOut);
        let status = f.store.status().await;
        assert_eq!(status.in_flight, 0);
        // Slots survive but hold no data.
        let err = f
            .store
            .load("orders", &QueryParams::none())
            .await
            .unwrap_err();
        assert_eq!(err, ErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn test_explicit_invalidate_forces_refetch() {
        let resources = MockResourceApi::default();
        resources.script("orders", vec![Ok(orders(2)), Ok(orders(7))]);
        let f = fixture(resources);
        signed_in(&f).await;

        f.store.load("orders", &QueryParams::none()).await.unwrap();
        f.store.invalidate("orders", None);

        let entry = f.store.load("orders", &QueryParams::none()).await.unwrap();
        assert_eq!(entry.data.unwrap().record_count(), 7);
        assert_eq!(f.resources.fetch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let resources = MockResourceApi::default();
        resources.script("orders", vec![Ok(orders(1))]);
        let f = fixture(resources);
        signed_in(&f).await;
        f.store.load("orders", &QueryParams::none()).await.unwrap();

        let status = f.store.status().await;
        assert_eq!(status.auth_phase, AuthPhase::Authenticated);
        assert_eq!(status.user.unwrap().id, "u1");
        assert_eq!(status.cached_keys, 1);
        assert_eq!(status.in_flight, 0);
    }
}
