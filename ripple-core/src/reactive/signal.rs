//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! a list of subscriber callbacks.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed/effect), the
//!    signal is recorded as a dependency of the running observer.
//!
//! 2. When a signal is written, the value is stored unconditionally and every
//!    subscriber callback is invoked.
//!
//! 3. Callbacks only queue work on the scheduler. The write runs inside an
//!    implicit batch, so the queue is flushed once, after every subscriber
//!    of this write has been notified.
//!
//! # Thread Safety
//!
//! Handles are `Send + Sync` and share state through an `Arc`. The value sits
//! behind a `parking_lot::RwLock` that is never held while user code runs,
//! except inside [`Signal::with`].

use std::fmt::{self, Debug};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::context::{untracked, ReactiveContext};
use super::node::{NodeId, Source};
use super::subscriber::{Callback, SubscriberList, Subscription};
use super::Readable;
use crate::scheduler::Scheduler;

struct SignalInner<T> {
    id: NodeId,
    value: RwLock<T>,
    subscribers: Arc<SubscriberList>,
}

impl<T> Source for SignalInner<T>
where
    T: Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn subscribe(&self, callback: Callback) -> Subscription {
        self.subscribers.add(callback)
    }
}

/// A reactive signal holding a value of type T.
///
/// # Type Parameters
///
/// - `T`: The type of value stored in the signal. Must be Clone + Send + Sync.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: NodeId::new(),
                value: RwLock::new(value),
                subscribers: SubscriberList::new(),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also records the signal
    /// as a dependency of the running observer.
    pub fn get(&self) -> T {
        self.track();
        self.inner.value.read().clone()
    }

    /// Borrow the current value, tracking it like [`Signal::get`].
    ///
    /// The value stays read-locked while `f` runs, so `f` must not write
    /// this signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.read())
    }

    /// Get the current value without tracking dependencies.
    pub fn peek(&self) -> T {
        untracked(|| self.get())
    }

    /// Set a new value and notify subscribers.
    ///
    /// The value is stored even if it equals the current one; see
    /// [`Signal::set_if_changed`] for the short-circuiting variant.
    pub fn set(&self, value: T) {
        let previous = std::mem::replace(&mut *self.inner.value.write(), value);
        drop(previous);
        self.notify();
    }

    /// Update the value using a function.
    ///
    /// This is useful for updates that depend on the current value. `f`
    /// works on a copy, so it may read or write this signal itself; its
    /// result is written last.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.inner.value.read().clone();
        self.set(f(&current));
    }

    /// Register a callback invoked synchronously on every write.
    ///
    /// To stay glitch-free, callbacks should only queue work (for example
    /// through [`crate::scheduler::Scheduler::enqueue`]) rather than read
    /// other reactive values.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.subscribers.add(Arc::new(callback))
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    fn track(&self) {
        if ReactiveContext::is_active() {
            ReactiveContext::track(self.inner.clone());
        }
    }

    fn notify(&self) {
        tracing::trace!(signal = %self.inner.id, "signal written");
        Scheduler::batch(|| self.inner.subscribers.notify());
    }
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Set the value only if it differs from the current one.
    ///
    /// Returns whether a write (and therefore a notification) happened.
    pub fn set_if_changed(&self, value: T) -> bool {
        let changed = {
            let mut guard = self.inner.value.write();
            if *guard == value {
                false
            } else {
                *guard = value;
                true
            }
        };

        if changed {
            self.notify();
        }
        changed
    }
}

impl<T> Readable<T> for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get(&self) -> T {
        Signal::get(self)
    }

    fn peek(&self) -> T {
        Signal::peek(self)
    }

    fn subscribe(&self, callback: Callback) -> Subscription {
        self.inner.subscribers.add(callback)
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Signal<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Serializes the current value without tracking it.
impl<T> Serialize for Signal<T>
where
    T: Clone + Send + Sync + Serialize + 'static,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.value.read().serialize(serializer)
    }
}

/// Deserializes a value into a fresh signal.
impl<'de, T> Deserialize<'de> for Signal<T>
where
    T: Clone + Send + Sync + Deserialize<'de> + 'static,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Signal::new)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
