//! Outbound events
//!
//! Events are derived by comparing two runtime snapshots, so anything a
//! caller can observe is a function of runtime state alone.

use crate::runtime::{BlockResolution, NodeStatus, WorkflowRuntimeState, WorkflowStatus};
use crate::textblock::{BlockId, NodeId};
use serde::{Deserialize, Serialize};

/// Something observable changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    NodeState {
        node_id: NodeId,
        status: NodeStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    NodeOutput {
        node_id: NodeId,
        /// Full output, or one fragment while streaming
        content: String,
        streaming: bool,
        done: bool,
    },
    BlockState {
        block_id: BlockId,
        state: BlockResolution,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        frozen: bool,
    },
    WorkflowState {
        workflow_id: String,
        status: WorkflowStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<f64>,
    },
    WorkflowDone {
        workflow_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    WorkflowError {
        workflow_id: String,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        node_id: Option<NodeId>,
    },
}

/// Receives engine events
pub trait EventHandler: Send + Sync {
    fn emit(&self, event: &EngineEvent);
}

/// Events describing the change from `prev` to `next`.
///
/// Order is fixed: node events by node id, block events by block id, then
/// workflow-level events.
pub fn diff(prev: &WorkflowRuntimeState, next: &WorkflowRuntimeState) -> Vec<EngineEvent> {
    let mut events = Vec::new();

    let mut node_ids: Vec<&NodeId> = next.nodes.iter().map(|(id, _)| id).collect();
    node_ids.sort();
    for node_id in node_ids {
        let Some(after) = next.nodes.get(node_id) else {
            continue;
        };
        let before = prev.nodes.get(node_id);

        if before.map(|s| (s.status, &s.error_message)) != Some((after.status, &after.error_message))
        {
            events.push(EngineEvent::NodeState {
                node_id: node_id.clone(),
                status: after.status,
                error: after.error_message.clone(),
            });
        }
        if let Some(output) = &after.output {
            if before.and_then(|s| s.output.as_ref()) != Some(output) {
                events.push(EngineEvent::NodeOutput {
                    node_id: node_id.clone(),
                    content: output.clone(),
                    streaming: false,
                    done: true,
                });
            }
        }
    }

    let mut block_ids: Vec<&BlockId> = next.blocks.iter().map(|(id, _)| id).collect();
    block_ids.sort();
    for block_id in block_ids {
        let Some(after) = next.blocks.get(block_id) else {
            continue;
        };
        if prev.blocks.get(block_id) != Some(after) {
            events.push(EngineEvent::BlockState {
                block_id: block_id.clone(),
                state: after.state,
                content: after.resolved_content.clone(),
                frozen: after.frozen,
            });
        }
    }

    let status_changed = prev.status != next.status;
    if status_changed || prev.current_index != next.current_index {
        events.push(EngineEvent::WorkflowState {
            workflow_id: next.workflow_id.clone(),
            status: next.status,
            progress: next.progress(),
        });
    }
    if status_changed {
        match next.status {
            WorkflowStatus::Completed => events.push(EngineEvent::WorkflowDone {
                workflow_id: next.workflow_id.clone(),
                duration_ms: next.duration_ms(),
            }),
            WorkflowStatus::Error => events.push(EngineEvent::WorkflowError {
                workflow_id: next.workflow_id.clone(),
                error: next.error_message.clone().unwrap_or_default(),
                node_id: next.failed_node.clone(),
            }),
            _ => {}
        }
    }

    events
}
