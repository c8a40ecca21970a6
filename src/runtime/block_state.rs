//! Per-block resolution state and the freeze mechanism

use super::StateError;
use crate::textblock::BlockId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Resolution status of a dynamic block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockResolution {
    #[default]
    Pending,
    Resolved,
    Error,
}

impl fmt::Display for BlockResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BlockResolution::Pending => "pending",
            BlockResolution::Resolved => "resolved",
            BlockResolution::Error => "error",
        })
    }
}

/// Runtime state of one virtual or agent-inject block
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VirtualBlockState {
    pub state: BlockResolution,
    pub resolved_content: Option<String>,
    /// While set, `state` and `resolved_content` cannot change
    pub frozen: bool,
}

impl VirtualBlockState {
    pub fn is_ready(&self) -> bool {
        self.frozen || self.state == BlockResolution::Resolved
    }

    /// Content pinned by a freeze
    pub fn frozen_content(&self) -> Option<&str> {
        if self.frozen {
            self.resolved_content.as_deref()
        } else {
            None
        }
    }
}

/// Runtime states of all dynamic blocks, keyed by block id
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockStateMap(HashMap<BlockId, VirtualBlockState>);

impl BlockStateMap {
    pub fn get(&self, block_id: &BlockId) -> Option<&VirtualBlockState> {
        self.0.get(block_id)
    }

    pub fn is_frozen(&self, block_id: &BlockId) -> bool {
        self.0.get(block_id).is_some_and(|s| s.frozen)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BlockId, &VirtualBlockState)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn insert(&mut self, block_id: BlockId, state: VirtualBlockState) {
        self.0.insert(block_id, state);
    }

    pub fn remove(&mut self, block_id: &BlockId) -> Option<VirtualBlockState> {
        self.0.remove(block_id)
    }

    /// Write `next` unless the block is frozen. Returns true on change.
    fn update_unfrozen(&mut self, block_id: &BlockId, next: VirtualBlockState) -> bool {
        let current = self.0.get(block_id);
        if current.is_some_and(|s| s.frozen) || current == Some(&next) {
            return false;
        }
        self.0.insert(block_id.clone(), next);
        true
    }

    /// Set resolved content; no-op while frozen
    pub fn resolve(&mut self, block_id: &BlockId, content: &str) -> bool {
        self.update_unfrozen(
            block_id,
            VirtualBlockState {
                state: BlockResolution::Resolved,
                resolved_content: Some(content.to_string()),
                frozen: false,
            },
        )
    }

    /// Source failed; no-op while frozen
    pub fn mark_error(&mut self, block_id: &BlockId) -> bool {
        self.update_unfrozen(
            block_id,
            VirtualBlockState {
                state: BlockResolution::Error,
                resolved_content: None,
                frozen: false,
            },
        )
    }

    /// Back to pending; no-op while frozen
    pub fn reset(&mut self, block_id: &BlockId) -> bool {
        self.update_unfrozen(block_id, VirtualBlockState::default())
    }

    /// Pin the current content. Only resolved blocks with content can be frozen.
    pub fn freeze(&mut self, block_id: &BlockId) -> Result<(), StateError> {
        match self.0.get_mut(block_id) {
            Some(s) if s.state == BlockResolution::Resolved && s.resolved_content.is_some() => {
                s.frozen = true;
                Ok(())
            }
            other => Err(StateError::NotResolved {
                block: block_id.clone(),
                state: other.map(|s| s.state).unwrap_or_default(),
            }),
        }
    }

    /// Release a pin. Resolution state is left as is.
    pub fn unfreeze(&mut self, block_id: &BlockId) -> bool {
        match self.0.get_mut(block_id) {
            Some(s) if s.frozen => {
                s.frozen = false;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freeze_requires_resolved_content() {
        let mut states = BlockStateMap::default();
        let b = BlockId::from("b");

        assert_eq!(
            states.freeze(&b),
            Err(StateError::NotResolved {
                block: b.clone(),
                state: BlockResolution::Pending,
            })
        );
        assert!(states.is_empty());

        states.mark_error(&b);
        let before = states.clone();
        assert!(matches!(
            states.freeze(&b),
            Err(StateError::NotResolved { state: BlockResolution::Error, .. })
        ));
        assert_eq!(states, before);
    }

    #[test]
    fn test_frozen_content_is_immutable() {
        let mut states = BlockStateMap::default();
        let b = BlockId::from("b");
        states.resolve(&b, "x");
        states.freeze(&b).unwrap();

        assert!(!states.resolve(&b, "y"));
        assert!(!states.mark_error(&b));
        assert!(!states.reset(&b));

        let state = states.get(&b).unwrap();
        assert_eq!(state.state, BlockResolution::Resolved);
        assert_eq!(state.resolved_content.as_deref(), Some("x"));
        assert!(state.frozen);
    }

    #[test]
    fn test_unfreeze_then_resolve() {
        let mut states = BlockStateMap::default();
        let b = BlockId::from("b");
        states.resolve(&b, "x");
        states.freeze(&b).unwrap();

        assert!(states.unfreeze(&b));
        assert_eq!(states.get(&b).unwrap().resolved_content.as_deref(), Some("x"));
        assert!(!states.unfreeze(&b));

        assert!(states.resolve(&b, "y"));
        assert_eq!(states.get(&b).unwrap().resolved_content.as_deref(), Some("y"));
    }

    #[test]
    fn test_readiness() {
        let mut states = BlockStateMap::default();
        let b = BlockId::from("b");
        states.reset(&b);
        assert!(!states.get(&b).unwrap().is_ready());

        states.resolve(&b, "x");
        assert!(states.get(&b).unwrap().is_ready());
        assert_eq!(states.get(&b).unwrap().frozen_content(), None);

        states.freeze(&b).unwrap();
        assert_eq!(states.get(&b).unwrap().frozen_content(), Some("x"));
    }
}
