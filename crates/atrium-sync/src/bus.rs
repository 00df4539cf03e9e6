//! # Subscription Bus
//!
//! Typed pub/sub fan-out from the sync engine to UI observers.
//!
//! ## Delivery Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Fan-Out Guarantees                               │
//! │                                                                         │
//! │  publish(topic, event)                                                  │
//! │      │                                                                  │
//! │      ├── snapshot the subscriber list, release the lock                 │
//! │      │   (unsubscribing during delivery can't skip or double-invoke     │
//! │      │    anyone else)                                                  │
//! │      │                                                                  │
//! │      ├── invoke callbacks synchronously, in subscription order          │
//! │      │                                                                  │
//! │      └── a panicking callback is caught and logged; the remaining       │
//! │          callbacks still run                                            │
//! │                                                                         │
//! │  Events are a tagged enum, so the payload shape for each topic is      │
//! │  checked at compile time.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The bus itself is a cheap handle over shared state; components hold
//! clones of it the way they would a channel sender.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{trace, warn};

use atrium_core::{AuthPhase, CacheEntry, ResourceKey};

// =============================================================================
// Topics & Events
// =============================================================================

/// What a subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Changes to one cached resource view.
    Resource(ResourceKey),

    /// Auth lifecycle changes (sign-in, refresh, sign-out).
    Auth,
}

/// A state change published by the engine.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A cache entry changed: loading started, a fetch completed, or the
    /// entry was invalidated. Carries the new snapshot.
    CacheUpdated {
        key: ResourceKey,
        entry: CacheEntry,
    },

    /// The auth phase changed.
    AuthChanged { phase: AuthPhase },
}

/// Observer callback. Must be safe to invoke any number of times, including
/// zero, and must not assume delivery in issue order.
pub type Callback = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

// =============================================================================
// Subscription Bus
// =============================================================================

struct Subscriber {
    id: u64,
    callback: Callback,
}

#[derive(Default)]
struct BusShared {
    topics: Mutex<HashMap<Topic, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

/// Pub/sub registry notifying interested observers of engine state changes.
///
/// Clones share the same subscriber registry.
#[derive(Clone, Default)]
pub struct SubscriptionBus {
    shared: Arc<BusShared>,
}

impl SubscriptionBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for a topic and returns its unsubscribe handle.
    pub fn subscribe(
        &self,
        topic: Topic,
        callback: impl Fn(&StoreEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let mut topics = self.shared.topics.lock().unwrap();
        topics.entry(topic.clone()).or_default().push(Subscriber {
            id,
            callback: Arc::new(callback),
        });
        trace!(?topic, id, "Subscribed");
        SubscriptionHandle {
            shared: Arc::clone(&self.shared),
            topic,
            id,
        }
    }

    /// Delivers an event to every current subscriber of the topic,
    /// synchronously, in subscription order.
    pub fn publish(&self, topic: &Topic, event: &StoreEvent) {
        // Snapshot under the lock, deliver outside it: re-entrant
        // subscribe/unsubscribe/publish from inside a callback must not
        // deadlock or disturb this delivery round.
        let callbacks: Vec<Callback> = {
            let topics = self.shared.topics.lock().unwrap();
            match topics.get(topic) {
                Some(subscribers) => subscribers.iter().map(|s| s.callback.clone()).collect(),
                None => return,
            }
        };

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                warn!(?topic, "Subscriber callback panicked; continuing fan-out");
            }
        }
    }

    /// Number of callbacks currently subscribed to a topic.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        let topics = self.shared.topics.lock().unwrap();
        topics.get(topic).map(|s| s.len()).unwrap_or(0)
    }

    /// Every resource key that currently has at least one subscriber.
    ///
    /// The sign-out path publishes cleared snapshots to each of these.
    pub fn subscribed_keys(&self) -> Vec<ResourceKey> {
        let topics = self.shared.topics.lock().unwrap();
        topics
            .iter()
            .filter(|(_, subscribers)| !subscribers.is_empty())
            .filter_map(|(topic, _)| match topic {
                Topic::Resource(key) => Some(key.clone()),
                Topic::Auth => None,
            })
            .collect()
    }
}

// =============================================================================
// Subscription Handle
// =============================================================================

/// Handle returned by [`SubscriptionBus::subscribe`].
///
/// Dropping the handle does NOT unsubscribe; removal is explicit so a
/// component can hand the handle around without changing delivery.
pub struct SubscriptionHandle {
    shared: Arc<BusShared>,
    topic: Topic,
    id: u64,
}

impl SubscriptionHandle {
    /// Removes exactly this callback. Idempotent: calling it again (or after
    /// the topic is gone) is a no-op.
    pub fn unsubscribe(&self) {
        let mut topics = self.shared.topics.lock().unwrap();
        if let Some(subscribers) = topics.get_mut(&self.topic) {
            subscribers.retain(|s| s.id != self.id);
            if subscribers.is_empty() {
                topics.remove(&self.topic);
            }
        }
    }

    /// The topic this subscription listens to.
    pub fn topic(&self) -> &Topic {
        &self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_core::QueryParams;
    use std::sync::atomic::AtomicUsize;

    fn resource_topic(resource: &str) -> Topic {
        Topic::Resource(ResourceKey::new(resource, &QueryParams::none()))
    }

    fn auth_event() -> StoreEvent {
        StoreEvent::AuthChanged {
            phase: AuthPhase::SignedOut,
        }
    }

    #[test]
    fn test_publish_reaches_all_subscribers_in_order() {
        let bus = SubscriptionBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let topic = resource_topic("orders");

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            bus.subscribe(topic.clone(), move |_| {
                order.lock().unwrap().push(tag);
            });
        }

        bus.publish(&topic, &auth_event());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unsubscribe_removes_exactly_one_callback() {
        let bus = SubscriptionBus::new();
        let topic = resource_topic("orders");
        let kept = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));

        let kept_count = kept.clone();
        let _keep = bus.subscribe(topic.clone(), move |_| {
            kept_count.fetch_add(1, Ordering::SeqCst);
        });
        let removed_count = removed.clone();
        let handle = bus.subscribe(topic.clone(), move |_| {
            removed_count.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&topic, &auth_event());
        handle.unsubscribe();
        handle.unsubscribe(); // idempotent
        bus.publish(&topic, &auth_event());

        assert_eq!(kept.load(Ordering::SeqCst), 2);
        assert_eq!(removed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_does_not_affect_other_topics() {
        let bus = SubscriptionBus::new();
        let orders = resource_topic("orders");
        let users = resource_topic("users");
        let users_hits = Arc::new(AtomicUsize::new(0));

        let handle = bus.subscribe(orders.clone(), |_| {});
        let hits = users_hits.clone();
        let _users_sub = bus.subscribe(users.clone(), move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });

        handle.unsubscribe();
        bus.publish(&users, &auth_event());
        assert_eq!(users_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_fanout() {
        let bus = SubscriptionBus::new();
        let topic = resource_topic("orders");
        let survivors = Arc::new(AtomicUsize::new(0));

        bus.subscribe(topic.clone(), |_| panic!("subscriber bug"));
        let count = survivors.clone();
        bus.subscribe(topic.clone(), move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&topic, &auth_event());
        assert_eq!(survivors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_during_delivery_keeps_snapshot() {
        // A callback that unsubscribes a later subscriber mid-delivery must
        // not skip it in the current round.
        let bus = SubscriptionBus::new();
        let topic = resource_topic("orders");
        let victim_hits = Arc::new(AtomicUsize::new(0));
        let victim_slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));

        // Runs first: removes the subscriber registered after it.
        let slot = victim_slot.clone();
        bus.subscribe(topic.clone(), move |_| {
            if let Some(handle) = slot.lock().unwrap().as_ref() {
                handle.unsubscribe();
            }
        });

        let hits = victim_hits.clone();
        let victim = bus.subscribe(topic.clone(), move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        *victim_slot.lock().unwrap() = Some(victim);

        // Round 1: the snapshot was taken before removal, so the victim
        // still runs. Round 2: it is gone.
        bus.publish(&topic, &auth_event());
        assert_eq!(victim_hits.load(Ordering::SeqCst), 1);
        bus.publish(&topic, &auth_event());
        assert_eq!(victim_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribed_keys_lists_resource_topics_only() {
        let bus = SubscriptionBus::new();
        let _a = bus.subscribe(resource_topic("orders"), |_| {});
        let _b = bus.subscribe(Topic::Auth, |_| {});

        let keys = bus.subscribed_keys();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].is_for_resource("orders"));
    }
}
