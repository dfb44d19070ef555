//! Reactive Context
//!
//! The reactive context tracks which observer is currently running. This
//! enables automatic dependency tracking: when a signal is read, it is
//! recorded as a dependency of the current observer.
//!
//! # Implementation
//!
//! Each thread has one slot holding the current observer and one flag
//! saying whether tracking is enabled. There is no explicit stack: entering
//! an observer saves the previous occupant in a guard, and dropping the
//! guard puts it back. Nesting depth equals call-stack depth, and the guard
//! restores the slot on every exit path, including unwinding.
//!
//! [`untracked`] uses the same save/restore discipline for the tracking
//! flag, so the two nest in any order.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use super::node::{NodeId, Observer, Source};

thread_local! {
    static CURRENT_OBSERVER: RefCell<Option<Arc<dyn Observer>>> = const { RefCell::new(None) };
    static TRACKING: Cell<bool> = const { Cell::new(true) };
}

/// Guard that restores the previous observer when dropped.
///
/// While it is alive, tracked reads on this thread are recorded on the
/// observer passed to [`ReactiveContext::enter`].
#[must_use = "the observer is uninstalled as soon as the guard is dropped"]
pub struct ReactiveContext {
    previous: Option<Arc<dyn Observer>>,
    previous_tracking: bool,
}

impl ReactiveContext {
    /// Install `observer` as the current observer.
    ///
    /// Tracking is switched on for the observer's run even when the caller
    /// is inside [`untracked`]; the caller's setting comes back with the
    /// guard.
    pub fn enter(observer: Arc<dyn Observer>) -> Self {
        let previous = CURRENT_OBSERVER.with(|slot| slot.replace(Some(observer)));
        let previous_tracking = TRACKING.with(|flag| flag.replace(true));

        Self {
            previous,
            previous_tracking,
        }
    }

    /// Whether a read right now would be recorded as a dependency.
    pub fn is_active() -> bool {
        TRACKING.with(Cell::get) && CURRENT_OBSERVER.with(|slot| slot.borrow().is_some())
    }

    /// The current observer's ID, if any.
    ///
    /// Reported regardless of the tracking flag.
    pub fn current_observer() -> Option<NodeId> {
        CURRENT_OBSERVER.with(|slot| slot.borrow().as_ref().map(|observer| observer.node_id()))
    }

    /// Record `source` as a dependency of the current observer.
    ///
    /// Does nothing when no observer is installed or tracking is disabled.
    pub fn track(source: Arc<dyn Source>) {
        if !TRACKING.with(Cell::get) {
            return;
        }

        let observer = CURRENT_OBSERVER.with(|slot| slot.borrow().clone());
        if let Some(observer) = observer {
            observer.track(source);
        }
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_OBSERVER.with(|slot| slot.replace(previous));
        TRACKING.with(|flag| flag.set(self.previous_tracking));
    }
}

/// Run `f` with dependency tracking disabled.
///
/// Reads inside `f` return values but register nothing. The previous
/// tracking state is restored afterwards, even if `f` panics.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    struct UntrackGuard {
        previous: bool,
    }

    impl Drop for UntrackGuard {
        fn drop(&mut self) {
            TRACKING.with(|flag| flag.set(self.previous));
        }
    }

    let _guard = UntrackGuard {
        previous: TRACKING.with(|flag| flag.replace(false)),
    };
    f()
}

/// Whether reads on this thread are currently being tracked.
pub fn is_tracking() -> bool {
    ReactiveContext::is_active()
}
