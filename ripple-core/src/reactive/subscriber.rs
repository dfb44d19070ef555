//! Subscriber registrations.
//!
//! Anything that can be depended on (signals and computeds) keeps a
//! [`SubscriberList`]: callbacks to invoke when its value changes. Registering
//! a callback yields a [`Subscription`], a revocable handle that does not own
//! the source. Dropping every handle to a source therefore never leaks the
//! observers, and revoking a subscription never needs a strong reference.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

/// Unique identifier for a single subscription.
///
/// Each call to [`SubscriberList::add`] gets a fresh ID, so the same
/// closure registered twice is two independent subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A change-notification callback.
///
/// Callbacks registered by observers only enqueue work on the scheduler.
/// They must not re-run observer bodies inline.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// The set of callbacks registered on a source, in registration order.
#[derive(Default)]
pub struct SubscriberList {
    entries: Mutex<IndexMap<SubscriberId, Callback>>,
}

impl SubscriberList {
    /// Create an empty list behind an `Arc`, ready to hand out
    /// subscriptions.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a callback and return the handle that revokes it.
    pub fn add(self: &Arc<Self>, callback: Callback) -> Subscription {
        let id = SubscriberId::new();
        self.entries.lock().insert(id, callback);

        Subscription {
            id,
            list: Arc::downgrade(self),
        }
    }

    /// Remove a callback. Returns false if it was already gone.
    pub fn remove(&self, id: SubscriberId) -> bool {
        // Dropped after the lock is released: the callback may own an
        // observer whose teardown revokes registrations on this list.
        let removed = self.entries.lock().shift_remove(&id);
        removed.is_some()
    }

    /// Invoke every callback registered at the time of the call.
    ///
    /// The lock is released before any callback runs, so callbacks may
    /// subscribe or unsubscribe on this same list.
    pub fn notify(&self) {
        let snapshot: Vec<Callback> = self.entries.lock().values().cloned().collect();
        for callback in snapshot {
            callback();
        }
    }

    /// Drop every registration.
    pub fn clear(&self) {
        let entries = std::mem::take(&mut *self.entries.lock());
        drop(entries);
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the list has no registrations.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl fmt::Debug for SubscriberList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberList")
            .field("len", &self.len())
            .finish()
    }
}

/// Handle to a registered callback.
///
/// Revocation is explicit: dropping the handle leaves the callback in place.
#[must_use = "the callback stays registered until `unsubscribe` is called"]
#[derive(Clone)]
pub struct Subscription {
    id: SubscriberId,
    list: Weak<SubscriberList>,
}

impl Subscription {
    /// The ID of this registration.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Revoke the registration. Calling this more than once is harmless.
    pub fn unsubscribe(&self) {
        if let Some(list) = self.list.upgrade() {
            list.remove(self.id);
        }
    }

    /// Whether the callback is still registered on a live source.
    pub fn is_active(&self) -> bool {
        self.list
            .upgrade()
            .map(|list| list.entries.lock().contains_key(&self.id))
            .unwrap_or(false)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
