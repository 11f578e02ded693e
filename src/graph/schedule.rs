//! Node placement

use super::function::FunctionBody;
use super::node::{BlockId, NodeId};
use rustc_hash::FxHashMap;

/// Maps a node to the block it was scheduled into
pub trait Schedule {
    /// Owning block of `node`, `None` for unscheduled values (literals,
    /// parameters) that float above the control flow
    fn block_for(&self, node: NodeId) -> Option<BlockId>;
}

/// Schedule read back from the block node lists of a body
#[derive(Debug, Default, Clone)]
pub struct BlockSchedule {
    owner: FxHashMap<NodeId, BlockId>,
}

impl BlockSchedule {
    /// Build the schedule of `body`
    pub fn from_body(body: &FunctionBody) -> Self {
        let mut owner = FxHashMap::default();
        for block in body.blocks() {
            for &id in &block.nodes {
                owner.insert(id, block.id);
            }
            owner.insert(block.terminator, block.id);
        }
        Self { owner }
    }

    /// Number of scheduled nodes
    pub fn len(&self) -> usize {
        self.owner.len()
    }

    /// True if nothing is scheduled
    pub fn is_empty(&self) -> bool {
        self.owner.is_empty()
    }
}

impl Schedule for BlockSchedule {
    fn block_for(&self, node: NodeId) -> Option<BlockId> {
        self.owner.get(&node).copied()
    }
}
