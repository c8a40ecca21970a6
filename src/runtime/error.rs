//! Errors raised by runtime state transitions

use super::{BlockResolution, NodeStatus};
use crate::textblock::{BlockId, NodeId};
use thiserror::Error;

/// A rejected state transition. The state it was applied to is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("node '{node}' cannot move from {from} to {to}")]
    InvalidTransition {
        node: NodeId,
        from: NodeStatus,
        to: NodeStatus,
    },

    #[error("node '{0}' is running; cancel it before resetting")]
    NodeRunning(NodeId),

    #[error("cannot freeze block '{block}' while it is {state}")]
    NotResolved {
        block: BlockId,
        state: BlockResolution,
    },
}
