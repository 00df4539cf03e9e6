//! # atrium-sync: Client-Side Sync Engine for Atrium
//!
//! This crate keeps every UI surface (dashboards, tables, forms) consistent
//! with the remote backend without duplicating network traffic or racing on
//! stale data.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Engine Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    SyncStore (Facade)                            │  │
//! │  │                                                                  │  │
//! │  │  Constructed once at the application's composition root          │  │
//! │  │  load / subscribe / invalidate / mutate / login / logout         │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │LoadCoordinator │  │  AuthManager   │  │  SubscriptionBus       │    │
//! │  │                │  │                │  │                        │    │
//! │  │ One fetch per  │  │ Login/refresh/ │  │ Typed events to every  │    │
//! │  │ key; shared    │  │ logout/restore │  │ observer of a key      │    │
//! │  │ completion     │  │ single-flight  │  │ snapshot iteration,    │    │
//! │  │ channel        │  │ refresh join   │  │ panic isolation        │    │
//! │  └───────┬────────┘  └───────┬────────┘  └────────────────────────┘    │
//! │          │                   │                                         │
//! │          ▼                   ▼                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ ResourceCache  │  │ CredentialStore│  │  RestTransport         │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Per-key slots  │  │ TOML session   │  │ reqwest client with    │    │
//! │  │ TTL freshness  │  │ file (or in-   │  │ validated envelopes    │    │
//! │  │ generation gate│  │ memory)        │  │ and failure mapping    │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  EVENTS (to the UI):                                                   │
//! │  • CacheUpdated { key, entry } - loading start, success, error, clear  │
//! │  • AuthChanged { phase }       - sign-in, refresh, sign-out            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - The `SyncStore` facade and status snapshot
//! - [`cache`] - Per-key cache with TTL freshness and generation tags
//! - [`coordinator`] - Per-key single-flight fetch dedup
//! - [`bus`] - Typed pub/sub fan-out
//! - [`auth`] - Token lifecycle: login, silent refresh, restore, logout
//! - [`transport`] - REST transport and the `ResourceApi`/`AuthApi` seams
//! - [`protocol`] - Wire types (envelopes, auth DTOs, mutations)
//! - [`persist`] - Non-volatile credential storage
//! - [`config`] - Store configuration (TOML + env overrides)
//! - [`error`] - Operational error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use atrium_sync::{StoreConfig, SyncStore};
//! use atrium_core::QueryParams;
//!
//! let config = StoreConfig::load(None)?;
//! let store = SyncStore::connect(config)?;
//!
//! if !store.restore_session().await {
//!     store.login("ops@example.com", "secret").await?;
//! }
//!
//! let params = QueryParams::none().with_filter("status", "pending");
//! let handle = store.subscribe("orders", &params, |event| {
//!     // render the published snapshot
//! });
//! let entry = store.load("orders", &params).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod auth;
pub mod bus;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod persist;
pub mod protocol;
pub mod store;
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================

// Facade
pub use store::{StoreStatus, SyncStore};

// Engine components
pub use auth::{AuthManager, RefreshOutcome};
pub use bus::{StoreEvent, SubscriptionBus, SubscriptionHandle, Topic};
pub use cache::ResourceCache;
pub use config::StoreConfig;
pub use coordinator::{FetchOutcome, LoadCoordinator};
pub use error::{StoreError, StoreResult};
pub use persist::{CredentialStore, FileCredentialStore, MemoryCredentialStore, PersistedSession};
pub use protocol::{MutationRequest, MutationVerb, SessionGrant};
pub use transport::{AuthApi, ResourceApi, RestTransport};

// Core types, re-exported for convenience
pub use atrium_core::{
    classify, AuthPhase, AuthSession, CacheEntry, ErrorKind, FetchFailure, PageInfo, QueryParams,
    ResourceData, ResourceKey, UserRecord,
};
