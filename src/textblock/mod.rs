//! Prompt block model
//!
//! A prompt is a [`BlockList`]: literal text interleaved with references to
//! other nodes' outputs and agent-injected placeholders. Definitions here are
//! pure metadata; resolution state is kept in [`crate::runtime::BlockStateMap`].

mod block;
mod list;

pub use block::{AgentInjectBlock, Block, BlockId, NodeId, TextBlock, VirtualBlock};
pub use list::{BlockList, block_content, is_block_ready};
