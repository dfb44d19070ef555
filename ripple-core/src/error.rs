//! Error types for the reactive engine.
//!
//! Panics inside effect bodies and derivations are programmer errors and are
//! propagated as-is. The variants here cover the conditions a caller can
//! reasonably react to.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;

/// Recoverable engine errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A flush kept producing new reactions for more passes than the
    /// configured limit allows. This is what an oscillating cycle between
    /// observers looks like; the remaining queue was discarded.
    #[error("flush did not settle after {passes} passes (possible reactive cycle)")]
    FlushLimitExceeded {
        /// Number of passes that ran before giving up.
        passes: usize,
    },

    /// A computed was read before it ever produced a value, either because
    /// its derivation read itself during the first computation or because
    /// that computation panicked.
    #[error("computed {id} has no value yet")]
    Uninitialized {
        /// Raw id of the computed.
        id: u64,
    },
}
