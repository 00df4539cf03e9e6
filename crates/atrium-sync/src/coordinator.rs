//! # Load Coordinator
//!
//! Deduplicates concurrent fetches per resource key and owns every cache
//! write.
//!
//! ## Single-Flight Join
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Per-Key Request Dedup                              │
//! │                                                                         │
//! │  load(k) ──┐                                                            │
//! │  load(k) ──┼──► in-flight for k?                                        │
//! │  load(k) ──┘        │                                                   │
//! │              no ────┴──── yes                                           │
//! │              │             │                                            │
//! │              ▼             ▼                                            │
//! │        run the fetch   subscribe to the owner's broadcast channel       │
//! │              │             │                                            │
//! │              ▼             │                                            │
//! │        write cache         │                                            │
//! │        (generation gate)   │                                            │
//! │              │             │                                            │
//! │              ▼             ▼                                            │
//! │        send outcome ──► every joined caller resolves with the same      │
//! │                         result; exactly ONE network operation ran       │
//! │                                                                         │
//! │  The broadcast channel replaces the legacy "poll until the loading     │
//! │  flag clears" scheme: joiners suspend on recv(), nothing busy-waits.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use atrium_core::{ErrorKind, PageInfo, ResourceData, ResourceKey};

use crate::bus::{StoreEvent, SubscriptionBus, Topic};
use crate::cache::ResourceCache;

/// Outcome of one fetch, shared by every joined caller. Cheap to clone:
/// payloads sit behind `Arc`.
pub type FetchOutcome = Result<(ResourceData, Option<PageInfo>), ErrorKind>;

// =============================================================================
// Load Coordinator
// =============================================================================

/// Guarantees at most one in-flight network operation per resource key and
/// routes every completed outcome through the cache's generation gate.
pub struct LoadCoordinator {
    cache: Arc<ResourceCache>,
    bus: SubscriptionBus,
    in_flight: Arc<Mutex<HashMap<ResourceKey, broadcast::Sender<FetchOutcome>>>>,
}

impl LoadCoordinator {
    /// Creates a coordinator over the process-wide cache and bus.
    pub fn new(cache: Arc<ResourceCache>, bus: SubscriptionBus) -> Self {
        LoadCoordinator {
            cache,
            bus,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Loads a key, joining the in-flight fetch if one exists.
    ///
    /// The first caller becomes the owner: it marks the entry loading and
    /// spawns the fetch as its own task - once issued, the operation and its
    /// eventual cache write survive even if every caller is dropped. The
    /// outcome goes through the generation gate, is broadcast, and every
    /// caller (owner included) resolves with it from the shared channel. The
    /// in-flight marker clears on completion, so a later call may retry
    /// after a failure.
    pub async fn load<F, Fut>(&self, key: &ResourceKey, fetcher: F) -> FetchOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchOutcome> + Send + 'static,
    {
        let (mut rx, owner) = {
            let mut in_flight = self.in_flight.lock().unwrap();
            match in_flight.get(key) {
                Some(tx) => (tx.subscribe(), false),
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    in_flight.insert(key.clone(), tx);
                    (rx, true)
                }
            }
        };

        if owner {
            let generation = self.cache.begin_load(key);
            self.spawn_fetch(key.clone(), generation, fetcher());
        } else {
            debug!(key = %key, "Joining in-flight fetch");
        }

        match rx.recv().await {
            Ok(outcome) => outcome,
            // The fetch task died without reporting (fetcher panic).
            Err(_) => Err(ErrorKind::Unknown),
        }
    }

    fn spawn_fetch(
        &self,
        key: ResourceKey,
        generation: u64,
        fetch: impl Future<Output = FetchOutcome> + Send + 'static,
    ) {
        self.publish(&key);

        let cache = self.cache.clone();
        let bus = self.bus.clone();
        let in_flight = self.in_flight.clone();
        tokio::spawn(async move {
            let outcome = fetch.await;

            let accepted = match &outcome {
                Ok((data, page)) => cache
                    .complete_success(&key, generation, data.clone(), *page)
                    .is_some(),
                Err(kind) => {
                    warn!(key = %key, error = %kind, "Fetch failed");
                    cache.complete_error(&key, generation, *kind).is_some()
                }
            };
            if accepted {
                let entry = cache.snapshot(&key);
                bus.publish(
                    &Topic::Resource(key.clone()),
                    &StoreEvent::CacheUpdated {
                        key: key.clone(),
                        entry,
                    },
                );
            }

            // Remove the marker before sending: a caller arriving now starts
            // a fresh fetch instead of joining a completed one. Joined
            // callers already hold receivers, so they still get the outcome.
            let tx = in_flight.lock().unwrap().remove(&key);
            if let Some(tx) = tx {
                let _ = tx.send(outcome);
            }
        });
    }

    /// Invalidates one key: resets the entry, bumps its generation, and
    /// publishes the cleared snapshot.
    pub fn invalidate(&self, key: &ResourceKey) {
        let entry = self.cache.invalidate(key);
        self.bus.publish(
            &Topic::Resource(key.clone()),
            &StoreEvent::CacheUpdated {
                key: key.clone(),
                entry,
            },
        );
    }

    /// Invalidates every cached view of a resource type, publishing each
    /// cleared snapshot.
    pub fn invalidate_resource(&self, resource: &str) {
        for (key, entry) in self.cache.invalidate_resource(resource) {
            self.bus.publish(
                &Topic::Resource(key.clone()),
                &StoreEvent::CacheUpdated { key, entry },
            );
        }
    }

    /// Discards every cache entry and publishes cleared snapshots - both for
    /// keys that held data and for keys that only have subscribers.
    ///
    /// This is the forced sign-out path: a signed-out session cannot vouch
    /// for the provenance of previously fetched data.
    pub fn clear_all(&self) {
        let mut cleared: HashMap<ResourceKey, _> = self.cache.clear_all().into_iter().collect();
        for key in self.bus.subscribed_keys() {
            cleared.entry(key).or_insert_with(atrium_core::CacheEntry::absent);
        }
        for (key, entry) in cleared {
            self.bus.publish(
                &Topic::Resource(key.clone()),
                &StoreEvent::CacheUpdated { key, entry },
            );
        }
    }

    /// Number of fetches currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }

    fn publish(&self, key: &ResourceKey) {
        let entry = self.cache.snapshot(key);
        self.bus.publish(
            &Topic::Resource(key.clone()),
            &StoreEvent::CacheUpdated {
                key: key.clone(),
                entry,
            },
        );
    }
}
