//! # Cache Snapshot Types
//!
//! The immutable value types handed to subscribers and callers.
//!
//! ## Snapshot Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CacheEntry Lifecycle                             │
//! │                                                                         │
//! │   absent ──begin_load──► loading ──success──► populated (fresh)        │
//! │     ▲                       │                     │                     │
//! │     │                       └──failure──► errored │ max_age elapses     │
//! │     │                                        │    ▼                     │
//! │     └────────────── invalidate ◄─────────────┴── stale                  │
//! │                                                                         │
//! │  Snapshots are clones. Record payloads sit behind Arc, so cloning an   │
//! │  entry never copies the records - and callers can never write through  │
//! │  a snapshot into the cache.                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::error::ErrorKind;

/// Default freshness window: a populated entry is served without a network
/// call for this long after its last fetch.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(5 * 60);

// =============================================================================
// Pagination Metadata
// =============================================================================

/// Pagination metadata from a list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PageInfo {
    /// Page number (1-based).
    pub page: u32,

    /// Requested page size.
    pub per_page: u32,

    /// Total matching records across all pages.
    pub total: u64,
}

impl PageInfo {
    /// Number of pages needed for `total` at this page size.
    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(self.per_page as u64)
    }
}

// =============================================================================
// Resource Data
// =============================================================================

/// The payload of a populated cache entry: a collection of domain records or
/// a single record.
///
/// Records stay as JSON values; this layer moves and caches them, the view
/// layer gives them meaning through the generated TypeScript types.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceData {
    /// A filtered/paginated collection view.
    Collection(Arc<Vec<Value>>),

    /// A single entity view (`orders/42`).
    Single(Arc<Value>),
}

impl ResourceData {
    /// Wraps a list of records.
    pub fn collection(records: Vec<Value>) -> Self {
        ResourceData::Collection(Arc::new(records))
    }

    /// Wraps one record.
    pub fn single(record: Value) -> Self {
        ResourceData::Single(Arc::new(record))
    }

    /// Number of records held.
    pub fn record_count(&self) -> usize {
        match self {
            ResourceData::Collection(records) => records.len(),
            ResourceData::Single(_) => 1,
        }
    }

    /// The records of a collection view, if this is one.
    pub fn as_collection(&self) -> Option<&[Value]> {
        match self {
            ResourceData::Collection(records) => Some(records),
            ResourceData::Single(_) => None,
        }
    }

    /// The record of a single-entity view, if this is one.
    pub fn as_single(&self) -> Option<&Value> {
        match self {
            ResourceData::Collection(_) => None,
            ResourceData::Single(record) => Some(record),
        }
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

/// Point-in-time snapshot of one cached resource view.
///
/// While `loading` is true, the only writer for the entry's data is the
/// in-flight operation that set it (the cache enforces this with generation
/// tags).
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cached payload. None until the first successful fetch.
    pub data: Option<ResourceData>,

    /// True while a fetch for this key is in flight.
    pub loading: bool,

    /// The classified error of the most recent failed fetch, if the entry
    /// has not been successfully written since.
    pub error: Option<ErrorKind>,

    /// When the data was last written from the network. None when absent or
    /// invalidated.
    pub last_fetch: Option<Instant>,

    /// Pagination metadata for collection views.
    pub page: Option<PageInfo>,
}

impl CacheEntry {
    /// The absent state: no data, not loading, no error, no timestamp.
    pub fn absent() -> Self {
        CacheEntry {
            data: None,
            loading: false,
            error: None,
            last_fetch: None,
            page: None,
        }
    }

    /// True iff the entry was fetched less than `max_age` ago.
    ///
    /// Monotonic in the stamped instant: once a fetch stamps t0, the answer
    /// is `now - t0 < max_age` for any max_age, and never becomes true again
    /// after turning false (the timestamp only moves forward).
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        match self.last_fetch {
            Some(stamped) => stamped.elapsed() < max_age,
            None => false,
        }
    }

    /// True once a successful fetch has populated the entry.
    pub fn is_populated(&self) -> bool {
        self.data.is_some()
    }
}

impl Default for CacheEntry {
    fn default() -> Self {
        CacheEntry::absent()
    }
}
