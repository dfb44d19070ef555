//! Pending reaction queue.

use std::sync::Arc;

use indexmap::IndexMap;

use super::Reaction;
use crate::reactive::NodeId;

/// Reactions waiting for the next flush pass, deduplicated by node identity
/// and kept in first-enqueue order.
#[derive(Default)]
pub(crate) struct PendingQueue {
    reactions: IndexMap<NodeId, Arc<dyn Reaction>>,
}

impl PendingQueue {
    /// Add a reaction. Returns false if it was already queued, in which case
    /// it keeps its original position.
    pub(crate) fn push(&mut self, reaction: Arc<dyn Reaction>) -> bool {
        let id = reaction.node_id();
        if self.reactions.contains_key(&id) {
            return false;
        }
        self.reactions.insert(id, reaction);
        true
    }

    /// Swap out everything queued so far, leaving the queue empty for
    /// reactions scheduled while the returned batch runs.
    pub(crate) fn take(&mut self) -> Vec<Arc<dyn Reaction>> {
        std::mem::take(&mut self.reactions).into_values().collect()
    }

    /// Put reactions back ahead of whatever is queued now.
    pub(crate) fn requeue_front(&mut self, reactions: Vec<Arc<dyn Reaction>>) {
        let queued_since = std::mem::take(&mut self.reactions);
        for reaction in reactions {
            self.push(reaction);
        }
        for (_, reaction) in queued_since {
            self.push(reaction);
        }
    }

    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.reactions.len();
        self.reactions.clear();
        dropped
    }

    pub(crate) fn len(&self) -> usize {
        self.reactions.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }
}
