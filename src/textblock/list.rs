//! Ordered block sequences and their resolution against runtime state

use super::block::{Block, BlockId, NodeId, TextBlock, VirtualBlock};
use crate::runtime::{BlockResolution, BlockStateMap};
use serde::{Deserialize, Serialize};

/// An ordered sequence of blocks forming one prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockList {
    pub id: String,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl Default for BlockList {
    fn default() -> Self {
        Self::new()
    }
}

/// Displayable content of a single block.
///
/// Never fails: unresolved references render as bracketed placeholders.
pub fn block_content(block: &Block, states: &BlockStateMap) -> String {
    match block {
        Block::Text(text) => text.content.clone(),
        Block::Virtual(virt) => {
            let Some(state) = states.get(&virt.id) else {
                return format!("[{}]", virt.label());
            };
            if let Some(content) = state.frozen_content() {
                return content.to_string();
            }
            match state.state {
                BlockResolution::Resolved => state.resolved_content.clone().unwrap_or_default(),
                BlockResolution::Pending => format!("[{}]", virt.label()),
                BlockResolution::Error => format!("[Error: {}]", virt.label()),
            }
        }
        Block::AgentInject(inject) => states
            .get(&inject.id)
            .filter(|s| s.is_ready())
            .and_then(|s| s.resolved_content.clone())
            .unwrap_or_default(),
    }
}

/// Whether a block has real content
pub fn is_block_ready(block: &Block, states: &BlockStateMap) -> bool {
    match block {
        Block::Text(_) | Block::AgentInject(_) => true,
        Block::Virtual(virt) => states.get(&virt.id).is_some_and(|s| s.is_ready()),
    }
}

impl BlockList {
    /// Create an empty list with a fresh id
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            blocks: Vec::new(),
        }
    }

    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Self {
            blocks,
            ..Self::new()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn append(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Insert at `index`, clamped to the end of the list
    pub fn insert(&mut self, index: usize, block: Block) {
        let index = index.min(self.blocks.len());
        self.blocks.insert(index, block);
    }

    pub fn remove(&mut self, block_id: &BlockId) -> Option<Block> {
        let pos = self.blocks.iter().position(|b| b.id() == block_id)?;
        Some(self.blocks.remove(pos))
    }

    /// Replace a block through `updater`. Returns false if no block has that id.
    pub fn update(&mut self, block_id: &BlockId, updater: impl FnOnce(Block) -> Block) -> bool {
        let Some(pos) = self.blocks.iter().position(|b| b.id() == block_id) else {
            return false;
        };
        let block = self.blocks.remove(pos);
        self.blocks.insert(pos, updater(block));
        true
    }

    pub fn find(&self, block_id: &BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id() == block_id)
    }

    /// Concatenated prompt text, in list order
    pub fn content(&self, states: &BlockStateMap) -> String {
        self.blocks
            .iter()
            .map(|b| block_content(b, states))
            .collect()
    }

    /// True iff every block is literal or has resolved/frozen content
    pub fn is_ready(&self, states: &BlockStateMap) -> bool {
        self.blocks.iter().all(|b| is_block_ready(b, states))
    }

    /// Deduplicated source nodes referenced by this list, in first-seen order
    pub fn dependencies(&self) -> Vec<NodeId> {
        let mut deps: Vec<NodeId> = Vec::new();
        for source in self.blocks.iter().filter_map(Block::source_node) {
            if !deps.contains(source) {
                deps.push(source.clone());
            }
        }
        deps
    }

    /// Reference blocks pointing at `node_id`
    pub fn references<'a>(&'a self, node_id: &'a NodeId) -> impl Iterator<Item = &'a VirtualBlock> {
        self.blocks.iter().filter_map(move |b| match b {
            Block::Virtual(v) if &v.source_node_id == node_id => Some(v),
            _ => None,
        })
    }

    /// Ids of blocks that carry runtime state
    pub fn dynamic_block_ids(&self) -> impl Iterator<Item = &BlockId> {
        self.blocks.iter().filter(|b| b.is_dynamic()).map(Block::id)
    }

    /// Unfrozen reference blocks still waiting for their source
    pub fn pending_virtual_blocks(&self, states: &BlockStateMap) -> Vec<&VirtualBlock> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                Block::Virtual(v) => Some(v),
                _ => None,
            })
            .filter(|v| {
                states
                    .get(&v.id)
                    .is_none_or(|s| !s.frozen && s.state == BlockResolution::Pending)
            })
            .collect()
    }

    /// Resolve every unfrozen reference to `node_id` with `content`.
    /// Returns true if any block state changed.
    pub fn resolve_node_output(
        &self,
        states: &mut BlockStateMap,
        node_id: &NodeId,
        content: &str,
    ) -> bool {
        let mut changed = false;
        for block in self.references(node_id) {
            changed |= states.resolve(&block.id, content);
        }
        changed
    }

    /// Revert unfrozen references to `node_id` to pending
    pub fn reset_node_dependents(&self, states: &mut BlockStateMap, node_id: &NodeId) -> bool {
        let mut changed = false;
        for block in self.references(node_id) {
            changed |= states.reset(&block.id);
        }
        changed
    }

    /// Mark unfrozen references to `node_id` as errored
    pub fn fail_node_dependents(&self, states: &mut BlockStateMap, node_id: &NodeId) -> bool {
        let mut changed = false;
        for block in self.references(node_id) {
            changed |= states.mark_error(&block.id);
        }
        changed
    }

    /// Cut every reference to a removed node out of the list.
    ///
    /// Frozen references become literal text (same id) holding the pinned
    /// content; unfrozen ones are dropped. Returns the ids whose runtime
    /// state is now obsolete.
    pub fn detach_node(&mut self, node_id: &NodeId, states: &BlockStateMap) -> Vec<BlockId> {
        let mut detached = Vec::new();
        let blocks = std::mem::take(&mut self.blocks);

        for block in blocks {
            match block {
                Block::Virtual(v) if &v.source_node_id == node_id => {
                    if let Some(content) = states.get(&v.id).and_then(|s| s.frozen_content()) {
                        self.blocks.push(Block::Text(TextBlock {
                            id: v.id.clone(),
                            content: content.to_string(),
                        }));
                    }
                    detached.push(v.id);
                }
                other => self.blocks.push(other),
            }
        }

        detached
    }
}
