//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds, and
//! effects.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a computed or effect), the signal is
//! recorded as a dependency of that context. When the signal is written, its
//! subscribers are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. A dependency change
//! marks it stale; it recomputes only when read again. Other observers read
//! it exactly like a signal.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are used to synchronize reactive state with
//! external systems, such as updating the DOM or logging.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to detect
//! dependencies automatically. Writes never run observers inline: every
//! reaction goes through the [`Scheduler`](crate::scheduler::Scheduler),
//! which is what keeps propagation glitch-free.

mod computed;
mod context;
mod effect;
mod node;
mod signal;
mod subscriber;

pub use computed::Computed;
pub use context::{is_tracking, untracked, ReactiveContext};
pub use effect::{Cleanup, Effect, IntoCleanup};
pub use node::{NodeId, Observer, Source};
pub use signal::Signal;
pub use subscriber::{Callback, SubscriberId, SubscriberList, Subscription};

/// The read surface shared by [`Signal`] and [`Computed`].
///
/// Consumers that only need to read and watch a value (bindings, derived
/// chains) can take `&dyn Readable<T>` and accept either.
pub trait Readable<T> {
    /// Tracked read.
    fn get(&self) -> T;

    /// Untracked read.
    fn peek(&self) -> T;

    /// Register a change callback.
    fn subscribe(&self, callback: Callback) -> Subscription;
}
