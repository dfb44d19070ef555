//! Update Scheduler
//!
//! The scheduler decides when queued reactions run. Sources never run
//! observers inline: a write only enqueues reactions here, and the queue is
//! flushed once the outermost write or batch completes.
//!
//! # Algorithm
//!
//! 1. `enqueue` adds a reaction to the pending set, keyed by node identity,
//!    so the same observer queued twice runs once.
//! 2. When the batch depth is zero and no flush is running, the queue is
//!    flushed right away. Otherwise the reaction waits.
//! 3. A flush runs in passes. Each pass swaps out the pending set and runs
//!    its reactions in first-enqueue order. Reactions queued during a pass
//!    land in a fresh set and run in the next pass.
//! 4. The flush ends when a pass finds the queue empty, or fails once the
//!    configured pass limit is exceeded.
//!
//! # Panics in reactions
//!
//! A panicking reaction aborts the flush and the panic propagates to the
//! caller that triggered it. The reactions of that pass that had not run
//! yet are put back at the front of the queue and run on the next flush.
//!
//! # Threads
//!
//! All of this state is thread-local. A thread that never writes a signal
//! never pays for it.

mod queue;

use std::cell::RefCell;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{ReactiveError, Result};
use crate::reactive::NodeId;

use queue::PendingQueue;

/// Work that can be queued on the scheduler.
///
/// Effects react by re-running their body. Computeds react by notifying
/// their own subscribers.
pub trait Reaction: Send + Sync {
    /// Identity used to deduplicate queued work.
    fn node_id(&self) -> NodeId;

    /// Perform the queued work. Must be a no-op for disposed observers.
    fn react(&self);
}

#[derive(Default)]
struct SchedulerState {
    queue: PendingQueue,
    depth: usize,
    flushing: bool,
    config: EngineConfig,
}

thread_local! {
    static STATE: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

fn with_state<R>(f: impl FnOnce(&mut SchedulerState) -> R) -> R {
    STATE.with(|state| f(&mut state.borrow_mut()))
}

/// The per-thread scheduler.
pub struct Scheduler;

impl Scheduler {
    /// Queue a reaction.
    ///
    /// Flushes immediately when called outside any batch or flush.
    pub fn enqueue(reaction: Arc<dyn Reaction>) {
        let id = reaction.node_id();
        let flush_now = with_state(|state| {
            if state.queue.push(reaction) {
                tracing::trace!(reaction = %id, pending = state.queue.len(), "reaction queued");
            }
            state.depth == 0 && !state.flushing
        });

        if flush_now {
            Self::flush_or_log();
        }
    }

    /// Run `f` with flushing deferred, then flush if this was the outermost
    /// batch.
    ///
    /// The batch depth is restored on every exit path. If `f` panics, the
    /// reactions it queued stay pending until the next flush.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        struct BatchGuard;

        impl Drop for BatchGuard {
            fn drop(&mut self) {
                with_state(|state| state.depth -= 1);
            }
        }

        let guard = {
            with_state(|state| state.depth += 1);
            BatchGuard
        };
        let result = f();
        drop(guard);

        if !Self::is_batching() {
            Self::flush_or_log();
        }
        result
    }

    /// Run every pending reaction until the queue settles.
    ///
    /// Returns the number of reactions that ran. Calling this from inside a
    /// running flush returns `Ok(0)`; the running flush picks up anything
    /// queued in the meantime.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::FlushLimitExceeded`] when the queue is still not
    /// empty after `max_flush_passes` passes. The remaining reactions are
    /// discarded.
    pub fn flush() -> Result<usize> {
        struct FlushingGuard;

        impl Drop for FlushingGuard {
            fn drop(&mut self) {
                with_state(|state| state.flushing = false);
            }
        }

        struct PassGuard {
            remaining: std::vec::IntoIter<Arc<dyn Reaction>>,
        }

        impl Drop for PassGuard {
            fn drop(&mut self) {
                let remaining: Vec<_> = self.remaining.by_ref().collect();
                if !remaining.is_empty() {
                    tracing::warn!(
                        requeued = remaining.len(),
                        "reaction panicked during flush, requeueing the rest of the pass"
                    );
                    with_state(|state| state.queue.requeue_front(remaining));
                }
            }
        }

        let (already_flushing, limit) = with_state(|state| {
            let already = std::mem::replace(&mut state.flushing, true);
            (already, state.config.max_flush_passes)
        });
        if already_flushing {
            return Ok(0);
        }
        let _flushing = FlushingGuard;

        let mut passes = 0;
        let mut ran = 0;
        loop {
            let pass = with_state(|state| state.queue.take());
            if pass.is_empty() {
                break;
            }

            if passes >= limit {
                let dropped = pass.len() + with_state(|state| state.queue.clear());
                tracing::error!(passes, dropped, "flush pass limit exceeded, discarding queue");
                return Err(ReactiveError::FlushLimitExceeded { passes });
            }
            passes += 1;
            tracing::debug!(pass = passes, reactions = pass.len(), "flush pass");

            let mut pass = PassGuard {
                remaining: pass.into_iter(),
            };
            while let Some(reaction) = pass.remaining.next() {
                reaction.react();
                ran += 1;
            }
        }

        Ok(ran)
    }

    /// Flush on behalf of a write or batch, which have no way to return the
    /// error.
    fn flush_or_log() {
        if let Err(err) = Self::flush() {
            tracing::error!(%err, "reactive flush failed");
        }
    }

    /// Whether a batch is open on this thread.
    pub fn is_batching() -> bool {
        with_state(|state| state.depth > 0)
    }

    /// Whether a flush is running on this thread.
    pub fn is_flushing() -> bool {
        with_state(|state| state.flushing)
    }

    /// Number of reactions waiting for the next pass.
    pub fn pending_count() -> usize {
        with_state(|state| state.queue.len())
    }

    /// Replace this thread's engine configuration.
    pub fn configure(config: EngineConfig) {
        with_state(|state| state.config = config);
    }

    /// This thread's engine configuration.
    pub fn config() -> EngineConfig {
        with_state(|state| state.config)
    }
}

/// Run `f` as one batch. See [`Scheduler::batch`].
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    Scheduler::batch(f)
}

/// Flush pending reactions now. See [`Scheduler::flush`].
pub fn flush() -> Result<usize> {
    Scheduler::flush()
}

/// Whether a batch is open on this thread.
pub fn is_batching() -> bool {
    Scheduler::is_batching()
}

/// Replace this thread's engine configuration.
pub fn configure(config: EngineConfig) {
    Scheduler::configure(config)
}

/// This thread's engine configuration.
pub fn config() -> EngineConfig {
    Scheduler::config()
}
