//! Engine Configuration
//!
//! The engine has very few knobs. They are grouped in [`EngineConfig`],
//! which is installed per thread through [`crate::scheduler::configure`].
//! The struct is serde-friendly so hosts can keep it next to the rest of
//! their settings.

use serde::{Deserialize, Serialize};

/// Default upper bound on flush passes before the scheduler gives up.
pub const DEFAULT_MAX_FLUSH_PASSES: usize = 10_000;

/// Tunables for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of passes a single flush may run.
    ///
    /// Every pass drains the reactions queued by the previous one, so a
    /// graph that settles needs only a handful. Mutually triggering effects
    /// that never settle hit this limit instead of looping forever.
    pub max_flush_passes: usize,
}

impl EngineConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flush pass limit. A limit of zero is treated as one.
    pub fn with_max_flush_passes(mut self, passes: usize) -> Self {
        self.max_flush_passes = passes.max(1);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_flush_passes: DEFAULT_MAX_FLUSH_PASSES,
        }
    }
}
