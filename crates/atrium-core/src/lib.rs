//! # atrium-core: Pure Types for the Atrium Sync Layer
//!
//! This crate holds the value types shared by the sync engine and everything
//! that consumes its snapshots. It has zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Atrium Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Dashboard UI (TypeScript)                       │   │
//! │  │    Tables ──► Forms ──► Detail panes ──► Session chrome        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ generated bindings (ts-rs)             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ atrium-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │    key    │  │   entry   │  │   error   │  │  session  │  │   │
//! │  │   │ResourceKey│  │CacheEntry │  │ ErrorKind │  │ AuthPhase │  │   │
//! │  │   │QueryParams│  │ PageInfo  │  │ classify  │  │UserRecord │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO RUNTIME • PURE TYPES AND FUNCTIONS               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 atrium-sync (Sync Engine)                       │   │
//! │  │        Cache, coordinator, bus, auth manager, transport         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`key`] - Resource keys and parameter canonicalization
//! - [`entry`] - Cache snapshot types and freshness arithmetic
//! - [`error`] - The surfaced error taxonomy and the HTTP failure classifier
//! - [`session`] - Auth session, phase machine, and user record types

pub mod entry;
pub mod error;
pub mod key;
pub mod session;

pub use entry::{CacheEntry, PageInfo, ResourceData, DEFAULT_MAX_AGE};
pub use error::{classify, ErrorKind, FetchFailure};
pub use key::{QueryParams, ResourceKey};
pub use session::{AuthPhase, AuthSession, UserRecord};
