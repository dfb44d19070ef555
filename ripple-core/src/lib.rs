//! Ripple Core
//!
//! This crate provides the fine-grained reactive dependency engine behind
//! the Ripple UI framework. It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - Automatic dependency tracking through a thread-local context
//! - A deduplicating, batching update scheduler
//!
//! Template compilation, DOM bindings and server rendering live in other
//! crates and only consume the four entry points below.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `scheduler`: Pending reaction queue, batching and flushing
//! - `config`: Engine tunables
//! - `error`: Recoverable error types
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::{create_computed, create_effect, create_signal};
//!
//! // Create a signal
//! let count = create_signal(0);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     create_computed(move || count.get() * 2)
//! };
//!
//! // Create an effect
//! create_effect(move || {
//!     println!("Doubled: {}", doubled.get());
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Doubled: 10"
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod scheduler;

pub use config::EngineConfig;
pub use error::{ReactiveError, Result};
pub use reactive::{
    is_tracking, untracked, Cleanup, Computed, Effect, IntoCleanup, Readable, Signal,
    Subscription,
};
pub use scheduler::{batch, flush, Scheduler};

/// Create a signal holding `initial`.
pub fn create_signal<T>(initial: T) -> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    Signal::new(initial)
}

/// Create a computed from a derivation. The derivation runs once now and
/// again on the first read after any dependency changes.
pub fn create_computed<T, F>(derive: F) -> Computed<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Computed::new(derive)
}

/// Create an effect. It runs once now; the returned handle disposes it.
pub fn create_effect<F, R>(body: F) -> Effect
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoCleanup,
{
    Effect::new(body)
}

/// Run `f` as one batch: writes inside it are coalesced into a single flush
/// when the outermost batch ends.
pub fn run_batched<R>(f: impl FnOnce() -> R) -> R {
    scheduler::batch(f)
}
