//! Graph nodes: sources, observers and the edges between them.
//!
//! The engine never stores an explicit graph. Edges live in two places:
//! a source's [`SubscriberList`](super::SubscriberList) (outgoing, as
//! callbacks) and an observer's [`Dependencies`] (incoming, as strong
//! references plus the subscriptions that back them).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::subscriber::{Callback, Subscription};

/// Identity of a signal, computed or effect.
///
/// The scheduler deduplicates pending work by this ID, and observers use it
/// to record each source at most once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Something an observer can depend on.
///
/// Implemented by signals and computeds.
pub trait Source: Send + Sync {
    /// Identity of this source.
    fn node_id(&self) -> NodeId;

    /// Register a change callback.
    fn subscribe(&self, callback: Callback) -> Subscription;
}

/// A computation that reads sources and reacts to their changes.
///
/// Implemented by effects and computeds. The tracking context holds the
/// currently running observer and forwards every tracked read to
/// [`Observer::track`].
pub trait Observer: Send + Sync {
    /// Identity of this observer.
    fn node_id(&self) -> NodeId;

    /// Record a source read during the current run.
    fn track(&self, source: Arc<dyn Source>);

    /// Run the observer body now (effects execute, computeds recompute).
    fn run(&self);

    /// Revoke every subscription and make the observer inert.
    fn dispose(&self);

    /// Whether [`Observer::dispose`] has been called.
    fn is_disposed(&self) -> bool;
}

/// The sources an observer read during its most recent run, and the
/// subscriptions registered on them.
///
/// Sources are appended as they are read; once the run ends,
/// [`Dependencies::subscribe_pending`] subscribes to the new ones so both
/// collections line up again.
#[derive(Default)]
pub(crate) struct Dependencies {
    sources: IndexMap<NodeId, Arc<dyn Source>>,
    subscriptions: SmallVec<[Subscription; 4]>,
}

impl Dependencies {
    /// Record a source. Returns false if it was already recorded this run.
    pub(crate) fn record(&mut self, source: Arc<dyn Source>) -> bool {
        let id = source.node_id();
        if self.sources.contains_key(&id) {
            return false;
        }
        self.sources.insert(id, source);
        true
    }

    /// Subscribe to every recorded source that has no subscription yet,
    /// building one callback per source.
    pub(crate) fn subscribe_pending(&mut self, mut make_callback: impl FnMut() -> Callback) {
        let start = self.subscriptions.len();
        for source in self.sources.values().skip(start) {
            self.subscriptions.push(source.subscribe(make_callback()));
        }
    }

    /// Revoke every subscription. Consumes the set so the caller can take it
    /// out of its lock first.
    pub(crate) fn revoke(self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
    }

    /// Number of recorded sources.
    pub(crate) fn len(&self) -> usize {
        self.sources.len()
    }

    #[cfg(test)]
    pub(crate) fn is_subscribed(&self) -> bool {
        self.sources.len() == self.subscriptions.len()
    }
}
