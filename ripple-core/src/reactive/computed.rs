//! Computed Implementation
//!
//! A Computed is a cached derived value. It is an observer (it reads other
//! signals) and a source (other observers read it).
//!
//! # How Computeds Work
//!
//! 1. On creation, the computed runs its derivation once and caches it.
//!
//! 2. When a dependency changes, the computed is marked stale and queues a
//!    notification of its own subscribers. It does not recompute yet, and
//!    further changes before the next computation notify no one again.
//!
//! 3. The next read of a stale computed recomputes, re-tracking its
//!    dependencies from scratch.
//!
//! # Why This Matters
//!
//! Staleness travels eagerly, so dependents are scheduled promptly, but the
//! work itself is lazy:
//!
//! - A signal changes
//! - 10 computeds depend on it
//! - Only the computeds actually read will recompute
//! - Computeds that are never read stay stale (no wasted work)
//!
//! # Self-reads
//!
//! A read that arrives while the derivation is already running (the
//! derivation reading itself, or a cyclic peer reading it back) does not
//! recurse. It gets the previously cached value instead. Two computeds that
//! read each other therefore settle: each notifies the other at most once
//! per computation.

use std::fmt::{self, Debug};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::ser::Error as _;
use serde::{Serialize, Serializer};

use super::context::{untracked, ReactiveContext};
use super::node::{Dependencies, NodeId, Observer, Source};
use super::subscriber::{Callback, SubscriberList, Subscription};
use super::Readable;
use crate::error::{ReactiveError, Result};
use crate::scheduler::{Reaction, Scheduler};

struct ComputingGuard<'a>(&'a AtomicBool);

impl Drop for ComputingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct ComputedInner<T> {
    id: NodeId,
    derive: Box<dyn Fn() -> T + Send + Sync>,
    value: RwLock<Option<T>>,
    stale: AtomicBool,
    // Subscribers were told about the current staleness.
    notified: AtomicBool,
    computing: AtomicBool,
    disposed: AtomicBool,
    compute_count: AtomicUsize,
    dependencies: Mutex<Dependencies>,
    subscribers: Arc<SubscriberList>,
    this: Weak<ComputedInner<T>>,
}

impl<T> ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn read(&self) -> Result<T> {
        if ReactiveContext::is_active() && !self.disposed.load(Ordering::SeqCst) {
            if let Some(this) = self.this.upgrade() {
                ReactiveContext::track(this);
            }
        }

        if self.stale.load(Ordering::SeqCst) && !self.computing.load(Ordering::SeqCst) {
            self.compute();
        }

        self.value
            .read()
            .clone()
            .ok_or(ReactiveError::Uninitialized { id: self.id.raw() })
    }

    fn compute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        if self.computing.swap(true, Ordering::SeqCst) {
            return;
        }
        let _computing = ComputingGuard(&self.computing);
        let Some(this) = self.this.upgrade() else {
            return;
        };

        self.stale.store(false, Ordering::SeqCst);
        self.notified.store(false, Ordering::SeqCst);
        let previous = std::mem::take(&mut *self.dependencies.lock());
        previous.revoke();

        let result = {
            let _ctx = ReactiveContext::enter(this.clone());
            panic::catch_unwind(AssertUnwindSafe(|| (self.derive)()))
        };
        self.compute_count.fetch_add(1, Ordering::SeqCst);

        if self.disposed.load(Ordering::SeqCst) {
            let collected = std::mem::take(&mut *self.dependencies.lock());
            collected.revoke();
        } else {
            let weak = Arc::downgrade(&this);
            self.dependencies.lock().subscribe_pending(|| {
                let weak = weak.clone();
                let callback: Callback = Arc::new(move || {
                    if let Some(computed) = weak.upgrade() {
                        computed.invalidate();
                    }
                });
                callback
            });
        }

        match result {
            Ok(value) => {
                let previous = self.value.write().replace(value);
                drop(previous);
            }
            Err(payload) => {
                // Retry on the next read.
                self.stale.store(true, Ordering::SeqCst);
                panic::resume_unwind(payload);
            }
        }
    }

    /// Dependency callback: mark stale and queue the subscriber notification.
    fn invalidate(self: Arc<Self>) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        self.stale.store(true, Ordering::SeqCst);
        if self.notified.swap(true, Ordering::SeqCst) {
            return;
        }
        Scheduler::enqueue(self);
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(computed = %self.id, "disposing computed");

        let dependencies = std::mem::take(&mut *self.dependencies.lock());
        dependencies.revoke();
        self.subscribers.clear();
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        std::mem::take(self.dependencies.get_mut()).revoke();
    }
}

impl<T> Observer for ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn track(&self, source: Arc<dyn Source>) {
        // A derivation reading itself gets the cached value, not an edge.
        if source.node_id() == self.id || self.disposed.load(Ordering::SeqCst) {
            return;
        }
        self.dependencies.lock().record(source);
    }

    fn run(&self) {
        self.compute();
    }

    fn dispose(&self) {
        ComputedInner::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl<T> Source for ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn subscribe(&self, callback: Callback) -> Subscription {
        self.subscribers.add(callback)
    }
}

impl<T> Reaction for ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn react(&self) {
        if !self.disposed.load(Ordering::SeqCst) {
            self.subscribers.notify();
        }
    }
}

/// A cached derived value that recomputes lazily after its dependencies
/// change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Must be Clone + Send + Sync.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(2);
/// let doubled = Computed::new(move || count.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// ```
pub struct Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new computed and run its derivation once.
    ///
    /// # Panics
    ///
    /// Propagates a panic from the first derivation.
    pub fn new<F>(derive: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|this| ComputedInner {
            id: NodeId::new(),
            derive: Box::new(derive),
            value: RwLock::new(None),
            stale: AtomicBool::new(true),
            notified: AtomicBool::new(false),
            computing: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            compute_count: AtomicUsize::new(0),
            dependencies: Mutex::new(Dependencies::default()),
            subscribers: SubscriberList::new(),
            this: this.clone(),
        });

        inner.compute();
        Self { inner }
    }

    /// Get the computed's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value, recomputing first if it is stale.
    ///
    /// Inside a reactive context the computed is recorded as a dependency.
    ///
    /// # Panics
    ///
    /// If the computed never produced a value; see [`Computed::try_get`].
    pub fn get(&self) -> T {
        self.try_get().unwrap_or_else(|err| panic!("{err}"))
    }

    /// Get the current value, or [`ReactiveError::Uninitialized`] if the
    /// derivation never completed (it read itself during its first run, or
    /// that run panicked).
    pub fn try_get(&self) -> Result<T> {
        self.inner.read()
    }

    /// Get the current value without tracking it.
    ///
    /// A stale computed still recomputes.
    pub fn peek(&self) -> T {
        untracked(|| self.get())
    }

    /// Untracked [`Computed::try_get`].
    pub fn try_peek(&self) -> Result<T> {
        untracked(|| self.try_get())
    }

    /// Register a callback invoked when the computed goes stale.
    ///
    /// It fires once per staleness: after a notification, the computed has
    /// to be read again before the next one.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.subscribers.add(Arc::new(callback))
    }

    /// Dispose of the computed.
    ///
    /// Revokes its subscriptions and drops its subscribers. The cached value
    /// stays readable but is never recomputed. Calling this twice is
    /// harmless.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Check if the computed has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Whether the next read will recompute.
    pub fn is_stale(&self) -> bool {
        self.inner.stale.load(Ordering::SeqCst)
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// Number of times the derivation has run.
    pub fn compute_count(&self) -> usize {
        self.inner.compute_count.load(Ordering::SeqCst)
    }

    /// Get the number of dependencies recorded by the latest computation.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }
}

impl<T> Readable<T> for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get(&self) -> T {
        Computed::get(self)
    }

    fn peek(&self) -> T {
        Computed::peek(self)
    }

    fn subscribe(&self, callback: Callback) -> Subscription {
        self.inner.subscribers.add(callback)
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("stale", &self.is_stale())
            .field("value", &*self.inner.value.read())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Serializes the current value without tracking it.
impl<T> Serialize for Computed<T>
where
    T: Clone + Send + Sync + Serialize + 'static,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.try_peek()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Effect, Signal};
    use std::sync::atomic::AtomicI32;
    use std::sync::OnceLock;

    #[test]
    fn computed_computes_on_creation() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let computed = Computed::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert!(computed.has_value());
        assert!(!computed.is_stale());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        assert_eq!(computed.get(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn computed_goes_stale_without_recomputing() {
        let signal = Signal::new(1);
        let signal_clone = signal.clone();
        let computed = Computed::new(move || signal_clone.get() * 10);

        signal.set(2);
        assert!(computed.is_stale());
        assert_eq!(computed.compute_count(), 1);

        assert_eq!(computed.get(), 20);
        assert!(!computed.is_stale());
        assert_eq!(computed.compute_count(), 2);
    }

    #[test]
    fn stale_computed_notifies_once_until_read() {
        let signal = Signal::new(1);
        let signal_clone = signal.clone();
        let computed = Computed::new(move || signal_clone.get());

        let notified = Arc::new(AtomicI32::new(0));
        let notified_clone = notified.clone();
        let _sub = computed.subscribe(move || {
            notified_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set(2);
        signal.set(3);
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        assert_eq!(computed.get(), 3);
        signal.set(4);
        assert_eq!(notified.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn computed_depends_on_computed() {
        let base = Signal::new(5);

        let base_clone = base.clone();
        let doubled = Computed::new(move || base_clone.get() * 2);
        let doubled_clone = doubled.clone();
        let plus_ten = Computed::new(move || doubled_clone.get() + 10);

        assert_eq!(plus_ten.get(), 20);

        base.set(10);
        assert!(doubled.is_stale());
        assert!(plus_ten.is_stale());

        assert_eq!(plus_ten.get(), 30);
        assert_eq!(doubled.get(), 20);
    }

    #[test]
    fn self_read_returns_previous_value() {
        let signal = Signal::new(1);
        let slot: Arc<OnceLock<Computed<i32>>> = Arc::new(OnceLock::new());

        let (signal_clone, slot_clone) = (signal.clone(), slot.clone());
        let computed = Computed::new(move || {
            let previous = slot_clone.get().and_then(|c| c.try_get().ok()).unwrap_or(0);
            previous + signal_clone.get()
        });
        let _ = slot.set(computed.clone());
        assert_eq!(computed.get(), 1);

        signal.set(5);
        // Reads itself mid-computation and gets the cached 1.
        assert_eq!(computed.get(), 6);
        assert_eq!(computed.compute_count(), 2);
    }

    #[test]
    fn self_read_does_not_subscribe_to_itself() {
        let signal = Signal::new(1);
        let slot: Arc<OnceLock<Computed<i32>>> = Arc::new(OnceLock::new());
        let (signal_clone, slot_clone) = (signal.clone(), slot.clone());
        let computed = Computed::new(move || {
            slot_clone.get().map(|c| c.get()).unwrap_or(0) + signal_clone.get()
        });
        let _ = slot.set(computed.clone());

        signal.set(2);
        assert_eq!(computed.get(), 3);
        assert_eq!(computed.dependency_count(), 1);
        assert_eq!(computed.subscriber_count(), 0);
    }

    #[test]
    fn cyclic_peers_settle() {
        let a = Signal::new(1);
        let slot: Arc<OnceLock<Computed<i32>>> = Arc::new(OnceLock::new());

        let (a_clone, slot_clone) = (a.clone(), slot.clone());
        let first = Computed::new(move || {
            a_clone.get() + slot_clone.get().map_or(0, |peer| peer.get())
        });
        let first_clone = first.clone();
        let second = Computed::new(move || first_clone.get() + 1);
        let _ = slot.set(second.clone());

        let notified = Arc::new(AtomicI32::new(0));
        let notified_clone = notified.clone();
        let _sub = first.subscribe(move || {
            notified_clone.fetch_add(1, Ordering::SeqCst);
        });

        // The first computation ran before the peer existed.
        a.set(2);
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        // `second` reads `first` mid-computation and gets the cached 1.
        assert_eq!(first.get(), 4);
        assert_eq!(second.peek(), 2);

        // Now each reads the other. One write notifies each of them once.
        a.set(3);
        assert_eq!(notified.load(Ordering::SeqCst), 2);
        assert_eq!(Scheduler::pending_count(), 0);
        assert!(second.is_stale());

        assert_eq!(first.get(), 8);
        assert_eq!(second.peek(), 5);
        assert_eq!(first.compute_count(), 3);
    }

    #[test]
    fn dropped_computed_releases_its_subscriptions() {
        let signal = Signal::new(1);

        for _ in 0..3 {
            let signal_clone = signal.clone();
            let computed = Computed::new(move || signal_clone.get());
            assert_eq!(signal.subscriber_count(), 1);
            drop(computed);
        }
        assert_eq!(signal.subscriber_count(), 0);

        let signal_clone = signal.clone();
        let base = Computed::new(move || signal_clone.get() * 2);
        let base_clone = base.clone();
        let derived = Computed::new(move || base_clone.get() + 1);
        assert_eq!(base.subscriber_count(), 1);

        // `derived` still holds `base`.
        drop(base);
        assert_eq!(signal.subscriber_count(), 1);

        drop(derived);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn missing_value_is_an_error() {
        let computed = Computed::new(|| 1);
        *computed.inner.value.write() = None;
        computed.dispose();

        let err = computed.try_get().unwrap_err();
        assert_eq!(err, ReactiveError::Uninitialized { id: computed.id().raw() });
        assert!(computed.try_peek().is_err());
    }

    #[test]
    fn panicking_derivation_stays_stale() {
        let signal = Signal::new(1);
        let signal_clone = signal.clone();
        let computed = Computed::new(move || {
            let value = signal_clone.get();
            assert_ne!(value, 2, "two is not allowed");
            value
        });

        signal.set(2);
        let result = panic::catch_unwind(AssertUnwindSafe(|| computed.get()));
        assert!(result.is_err());
        assert!(computed.is_stale());
        assert!(ReactiveContext::current_observer().is_none());

        signal.set(3);
        assert_eq!(computed.get(), 3);
    }

    #[test]
    fn peek_does_not_track_computed() {
        let signal = Signal::new(1);
        let signal_clone = signal.clone();
        let computed = Computed::new(move || signal_clone.get());

        let runs = Arc::new(AtomicI32::new(0));
        let (computed_clone, runs_clone) = (computed.clone(), runs.clone());
        let _effect = Effect::new(move || {
            computed_clone.peek();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(computed.subscriber_count(), 0);
    }

    #[test]
    fn dispose_is_idempotent_and_keeps_value() {
        let signal = Signal::new(1);
        let signal_clone = signal.clone();
        let computed = Computed::new(move || signal_clone.get());

        computed.dispose();
        computed.dispose();
        assert!(computed.is_disposed());
        assert_eq!(signal.subscriber_count(), 0);

        signal.set(9);
        assert_eq!(computed.get(), 1);
        assert_eq!(computed.compute_count(), 1);
    }

    #[test]
    fn computed_clone_shares_state() {
        let signal = Signal::new(42);
        let signal_clone = signal.clone();
        let computed1 = Computed::new(move || signal_clone.get());
        let computed2 = computed1.clone();

        assert_eq!(computed1.id(), computed2.id());
        assert_eq!(computed2.get(), 42);

        signal.set(7);
        assert!(computed1.is_stale());
        assert_eq!(computed2.get(), 7);
        assert!(!computed1.is_stale());
    }

    #[test]
    fn computed_serializes_current_value() {
        let signal = Signal::new(3);
        let signal_clone = signal.clone();
        let computed = Computed::new(move || signal_clone.get() + 1);

        assert_eq!(serde_json::to_string(&computed).unwrap(), "4");
        signal.set(4);
        assert_eq!(serde_json::to_string(&computed).unwrap(), "5");
    }
}
