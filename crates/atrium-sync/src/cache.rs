//! # Resource Cache
//!
//! Per-key store of cache entries with TTL freshness and generation-tagged
//! writes.
//!
//! ## Generation Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Generation-Tagged Writes                            │
//! │                                                                         │
//! │  begin_load("orders")          ──► slot gen = 4, loading = true        │
//! │      │                                                                  │
//! │      │   invalidate("orders")  ──► slot gen = 5, entry reset           │
//! │      ▼                                                                  │
//! │  complete_success(gen = 4)     ──► REJECTED (4 != 5): the response     │
//! │                                    belongs to a dead generation and    │
//! │                                    must not resurrect stale state      │
//! │                                                                         │
//! │  Writes land in completion order, not issue order: whichever network   │
//! │  operation finishes last wins the slot, provided its generation is     │
//! │  still current.                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All methods take `&self` behind a short-lived mutex that is never held
//! across an await point, so every mutation is atomic relative to other
//! logical callers.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use atrium_core::{CacheEntry, ErrorKind, PageInfo, ResourceData, ResourceKey};

// =============================================================================
// Cache Slot
// =============================================================================

/// One key's entry plus its write-acceptance generation.
#[derive(Debug, Default)]
struct CacheSlot {
    entry: CacheEntry,
    generation: u64,
}

// =============================================================================
// Resource Cache
// =============================================================================

/// Process-wide cache of resource snapshots.
///
/// Only the load coordinator writes here (and the store's sign-out path,
/// through the coordinator); every other component reads snapshots.
#[derive(Debug, Default)]
pub struct ResourceCache {
    slots: Mutex<HashMap<ResourceKey, CacheSlot>>,
}

impl ResourceCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an immutable snapshot of the entry for `key`.
    ///
    /// Absent keys yield `CacheEntry::absent()`; callers cannot tell a
    /// never-loaded key from an invalidated one, and don't need to.
    pub fn snapshot(&self, key: &ResourceKey) -> CacheEntry {
        let slots = self.slots.lock().unwrap();
        slots
            .get(key)
            .map(|slot| slot.entry.clone())
            .unwrap_or_default()
    }

    /// True iff the entry was fetched less than `max_age` ago.
    pub fn is_fresh(&self, key: &ResourceKey, max_age: Duration) -> bool {
        let slots = self.slots.lock().unwrap();
        slots
            .get(key)
            .map(|slot| slot.entry.is_fresh(max_age))
            .unwrap_or(false)
    }

    /// Marks the start of a fetch: sets `loading = true` (creating the slot
    /// if needed) and returns the generation the eventual completion must
    /// carry.
    pub fn begin_load(&self, key: &ResourceKey) -> u64 {
        let mut slots = self.slots.lock().unwrap();
        let slot = slots.entry(key.clone()).or_default();
        slot.entry.loading = true;
        trace!(key = %key, generation = slot.generation, "Load started");
        slot.generation
    }

    /// Applies a successful fetch outcome.
    ///
    /// Accepted iff `generation` is still current for the key: replaces the
    /// data, clears the error, stamps `last_fetch = now`, clears `loading`.
    /// Returns the accepted snapshot, or None if the generation was
    /// invalidated while the fetch was in flight.
    pub fn complete_success(
        &self,
        key: &ResourceKey,
        generation: u64,
        data: ResourceData,
        page: Option<PageInfo>,
    ) -> Option<CacheEntry> {
        let mut slots = self.slots.lock().unwrap();
        let slot = slots.entry(key.clone()).or_default();
        if slot.generation != generation {
            debug!(
                key = %key,
                stale = generation,
                current = slot.generation,
                "Discarding response from invalidated generation"
            );
            return None;
        }
        slot.entry = CacheEntry {
            data: Some(data),
            loading: false,
            error: None,
            last_fetch: Some(Instant::now()),
            page,
        };
        Some(slot.entry.clone())
    }

    /// Applies a failed fetch outcome.
    ///
    /// Same generation gate as [`complete_success`](Self::complete_success);
    /// on acceptance the error is recorded, `loading` clears, and existing
    /// data is left in place (stale data plus an error beats a blank pane).
    pub fn complete_error(
        &self,
        key: &ResourceKey,
        generation: u64,
        kind: ErrorKind,
    ) -> Option<CacheEntry> {
        let mut slots = self.slots.lock().unwrap();
        let slot = slots.entry(key.clone()).or_default();
        if slot.generation != generation {
            debug!(
                key = %key,
                stale = generation,
                current = slot.generation,
                "Discarding error from invalidated generation"
            );
            return None;
        }
        slot.entry.loading = false;
        slot.entry.error = Some(kind);
        Some(slot.entry.clone())
    }

    /// Resets the entry to absent and bumps the generation so any in-flight
    /// response for the old generation is discarded on arrival.
    ///
    /// Returns the cleared snapshot for publication.
    pub fn invalidate(&self, key: &ResourceKey) -> CacheEntry {
        let mut slots = self.slots.lock().unwrap();
        let slot = slots.entry(key.clone()).or_default();
        slot.generation += 1;
        slot.entry = CacheEntry::absent();
        debug!(key = %key, generation = slot.generation, "Entry invalidated");
        slot.entry.clone()
    }

    /// Invalidates every entry of the given resource type.
    ///
    /// Returns the affected keys with their cleared snapshots.
    pub fn invalidate_resource(&self, resource: &str) -> Vec<(ResourceKey, CacheEntry)> {
        let mut slots = self.slots.lock().unwrap();
        let mut cleared = Vec::new();
        for (key, slot) in slots.iter_mut() {
            if key.is_for_resource(resource) {
                slot.generation += 1;
                slot.entry = CacheEntry::absent();
                cleared.push((key.clone(), slot.entry.clone()));
            }
        }
        debug!(resource, count = cleared.len(), "Resource invalidated");
        cleared
    }

    /// Invalidates every entry in the cache.
    ///
    /// Returns the affected keys with their cleared snapshots. Used on
    /// forced sign-out, when previously fetched data can no longer be
    /// trusted.
    pub fn clear_all(&self) -> Vec<(ResourceKey, CacheEntry)> {
        let mut slots = self.slots.lock().unwrap();
        let mut cleared = Vec::new();
        for (key, slot) in slots.iter_mut() {
            slot.generation += 1;
            slot.entry = CacheEntry::absent();
            cleared.push((key.clone(), slot.entry.clone()));
        }
        debug!(count = cleared.len(), "All entries cleared");
        cleared
    }

    /// Number of keys with a slot (populated, loading, or errored).
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    /// True when no slot exists.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().unwrap().is_empty()
    }
}
