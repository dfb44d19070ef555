//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever one of
//! the values it read changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its body immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued on the scheduler.
//!    It never runs inline from inside the write.
//!
//! # Re-entrancy
//!
//! An effect never runs inside its own body: a nested execution on the
//! same thread is skipped. A run requested from another thread while the
//! body executes is deferred, and queued once that execution finishes.
//!
//! 3. Before re-running, the effect runs the previous cleanup, revokes its
//!    old subscriptions and tracks new dependencies from scratch.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (recompute on read); effects are eager (run as soon
//!   as the scheduler flushes).
//!
//! # Lifetime
//!
//! The subscriptions an effect registers keep it alive, so dropping the
//! [`Effect`] handle does not stop it. [`Effect::dispose`] does.
//!
//! # Cleanup
//!
//! The body may return a [`Cleanup`]. It runs before the next execution and
//! on disposal, which is the place to release listeners or timers.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use super::context::ReactiveContext;
use super::node::{Dependencies, NodeId, Observer, Source};
use super::subscriber::Callback;
use crate::scheduler::{Reaction, Scheduler};

/// A callback run before an effect's next execution or on disposal.
pub struct Cleanup(Box<dyn FnOnce() + Send>);

impl Cleanup {
    /// Wrap a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(f))
    }

    fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Values an effect body may return.
pub trait IntoCleanup {
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl IntoCleanup for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl IntoCleanup for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

/// Clears the executing state on every exit path.
struct ExecutingGuard<'a>(&'a EffectInner);

impl Drop for ExecutingGuard<'_> {
    fn drop(&mut self) {
        *self.0.runner.lock() = None;
        self.0.executing.store(false, Ordering::SeqCst);
    }
}

struct EffectInner {
    id: NodeId,
    body: Box<dyn Fn() -> Option<Cleanup> + Send + Sync>,
    dependencies: Mutex<Dependencies>,
    cleanup: Mutex<Option<Cleanup>>,
    disposed: AtomicBool,
    executing: AtomicBool,
    runner: Mutex<Option<ThreadId>>,
    rerun: AtomicBool,
    run_count: AtomicUsize,
    this: Weak<EffectInner>,
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        if self.executing.swap(true, Ordering::SeqCst) {
            if *self.runner.lock() == Some(thread::current().id()) {
                tracing::trace!(effect = %self.id, "skipping re-entrant execution");
            } else {
                self.defer();
            }
            return;
        }

        {
            *self.runner.lock() = Some(thread::current().id());
            let _executing = ExecutingGuard(self);
            self.rerun.store(false, Ordering::SeqCst);
            self.run_body();
        }

        if self.rerun.swap(false, Ordering::SeqCst) {
            self.schedule();
        }
    }

    /// Ask the execution running on another thread to queue another run
    /// once it finishes.
    fn defer(&self) {
        tracing::trace!(effect = %self.id, "effect busy on another thread, deferring rerun");
        self.rerun.store(true, Ordering::SeqCst);

        // The execution may have finished before it could see the request.
        if !self.executing.load(Ordering::SeqCst) && self.rerun.swap(false, Ordering::SeqCst) {
            self.schedule();
        }
    }

    fn run_body(&self) {
        let Some(this) = self.this.upgrade() else {
            return;
        };

        let cleanup = self.cleanup.lock().take();
        if let Some(cleanup) = cleanup {
            cleanup.run();
        }

        let previous = std::mem::take(&mut *self.dependencies.lock());
        previous.revoke();

        let result = {
            let _ctx = ReactiveContext::enter(this.clone());
            panic::catch_unwind(AssertUnwindSafe(|| (self.body)()))
        };
        self.run_count.fetch_add(1, Ordering::SeqCst);

        // Subscribe even when the body panicked, so the effect can recover
        // once one of the values it got to read changes.
        if self.disposed.load(Ordering::SeqCst) {
            let collected = std::mem::take(&mut *self.dependencies.lock());
            collected.revoke();
        } else {
            self.dependencies.lock().subscribe_pending(|| {
                let effect = Arc::clone(&this);
                let callback: Callback = Arc::new(move || effect.schedule());
                callback
            });
        }

        match result {
            Ok(Some(cleanup)) if self.disposed.load(Ordering::SeqCst) => cleanup.run(),
            Ok(cleanup) => *self.cleanup.lock() = cleanup,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    fn schedule(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        if let Some(this) = self.this.upgrade() {
            Scheduler::enqueue(this);
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(effect = %self.id, "disposing effect");

        let dependencies = std::mem::take(&mut *self.dependencies.lock());
        dependencies.revoke();

        let cleanup = self.cleanup.lock().take();
        if let Some(cleanup) = cleanup {
            if panic::catch_unwind(AssertUnwindSafe(|| cleanup.run())).is_err() {
                tracing::error!(effect = %self.id, "effect cleanup panicked during dispose");
            }
        }
    }
}

impl Observer for EffectInner {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn track(&self, source: Arc<dyn Source>) {
        if !self.disposed.load(Ordering::SeqCst) {
            self.dependencies.lock().record(source);
        }
    }

    fn run(&self) {
        self.execute();
    }

    fn dispose(&self) {
        EffectInner::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Reaction for EffectInner {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn react(&self) {
        self.execute();
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// The handle doubles as the disposer. Clones share the same effect.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let effect = Effect::new(move || {
///     println!("Count is: {}", count.get());
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create a new effect and run it once, synchronously.
    ///
    /// The body may return `()`, a [`Cleanup`] or an `Option<Cleanup>`.
    ///
    /// # Panics
    ///
    /// Propagates a panic from the first run. The effect keeps the
    /// subscriptions it registered before panicking.
    pub fn new<F, R>(body: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoCleanup,
    {
        let inner = Arc::new_cyclic(|this| EffectInner {
            id: NodeId::new(),
            body: Box::new(move || body().into_cleanup()),
            dependencies: Mutex::new(Dependencies::default()),
            cleanup: Mutex::new(None),
            disposed: AtomicBool::new(false),
            executing: AtomicBool::new(false),
            runner: Mutex::new(None),
            rerun: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
            this: this.clone(),
        });

        inner.execute();
        Self { inner }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Run the effect body now, bypassing the scheduler.
    ///
    /// A no-op once disposed, or when called from inside its own body. While
    /// the body runs on another thread, the run is deferred and queued on
    /// that thread's scheduler once the current execution finishes.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Dispose of the effect.
    ///
    /// Runs the pending cleanup and revokes every subscription. After
    /// disposal the effect never runs again. Calling this twice is harmless.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of dependencies recorded by the latest run.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
