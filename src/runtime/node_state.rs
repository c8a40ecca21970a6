//! Per-node execution state

use super::StateError;
use crate::textblock::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Execution status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Waiting for its inputs
    #[default]
    Idle,
    /// Inputs ready, queued
    Pending,
    /// LLM call in flight
    Running,
    Completed,
    Error,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Idle => "idle",
            NodeStatus::Pending => "pending",
            NodeStatus::Running => "running",
            NodeStatus::Completed => "completed",
            NodeStatus::Error => "error",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime state of one node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeRuntimeState {
    pub status: NodeStatus,

    /// LLM output, set only once completed
    pub output: Option<String>,

    /// Set only in the error state
    pub error_message: Option<String>,

    /// Completed without running (skip command)
    #[serde(default)]
    pub skipped: bool,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl NodeRuntimeState {
    pub fn duration_ms(&self) -> Option<u64> {
        let started = self.started_at?;
        let finished = self.finished_at?;
        u64::try_from((finished - started).num_milliseconds()).ok()
    }
}

/// Runtime states of all nodes in a workflow
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeStateMap(HashMap<NodeId, NodeRuntimeState>);

impl NodeStateMap {
    pub fn get(&self, node_id: &NodeId) -> Option<&NodeRuntimeState> {
        self.0.get(node_id)
    }

    /// Status of a node; unknown nodes are idle
    pub fn status(&self, node_id: &NodeId) -> NodeStatus {
        self.0.get(node_id).map(|s| s.status).unwrap_or_default()
    }

    pub fn output(&self, node_id: &NodeId) -> Option<&str> {
        self.0.get(node_id).and_then(|s| s.output.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &NodeRuntimeState)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn remove(&mut self, node_id: &NodeId) -> Option<NodeRuntimeState> {
        self.0.remove(node_id)
    }

    /// Apply `update` if the node's current status is one of `allowed`
    fn transition(
        &mut self,
        node_id: &NodeId,
        allowed: &[NodeStatus],
        to: NodeStatus,
        update: impl FnOnce(&mut NodeRuntimeState),
    ) -> Result<(), StateError> {
        let from = self.status(node_id);
        if !allowed.contains(&from) {
            return Err(StateError::InvalidTransition {
                node: node_id.clone(),
                from,
                to,
            });
        }

        let state = self.0.entry(node_id.clone()).or_default();
        state.status = to;
        update(state);
        Ok(())
    }

    /// Inputs are ready
    pub fn set_pending(&mut self, node_id: &NodeId) -> Result<(), StateError> {
        self.transition(
            node_id,
            &[NodeStatus::Idle, NodeStatus::Pending],
            NodeStatus::Pending,
            |s| s.error_message = None,
        )
    }

    /// Dequeued for execution
    pub fn set_running(&mut self, node_id: &NodeId) -> Result<(), StateError> {
        self.transition(node_id, &[NodeStatus::Pending], NodeStatus::Running, |s| {
            s.started_at = Some(Utc::now());
            s.finished_at = None;
            s.error_message = None;
        })
    }

    pub fn set_completed(&mut self, node_id: &NodeId, output: String) -> Result<(), StateError> {
        self.transition(node_id, &[NodeStatus::Running], NodeStatus::Completed, |s| {
            s.output = Some(output);
            s.error_message = None;
            s.finished_at = Some(Utc::now());
        })
    }

    pub fn set_error(&mut self, node_id: &NodeId, message: String) -> Result<(), StateError> {
        self.transition(node_id, &[NodeStatus::Running], NodeStatus::Error, |s| {
            s.output = None;
            s.error_message = Some(message);
            s.finished_at = Some(Utc::now());
        })
    }

    /// Back to idle, clearing output and timestamps. Running nodes must be
    /// cancelled first.
    pub fn reset(&mut self, node_id: &NodeId) -> Result<(), StateError> {
        if self.status(node_id) == NodeStatus::Running {
            return Err(StateError::NodeRunning(node_id.clone()));
        }
        self.0.insert(node_id.clone(), NodeRuntimeState::default());
        Ok(())
    }

    /// Abandon an in-flight node
    pub fn cancel(&mut self, node_id: &NodeId) -> Result<(), StateError> {
        self.transition(node_id, &[NodeStatus::Running], NodeStatus::Idle, |s| {
            *s = NodeRuntimeState::default();
        })
    }

    /// Complete a node without running it (manual output or skip)
    pub fn override_output(
        &mut self,
        node_id: &NodeId,
        output: String,
        skipped: bool,
    ) -> Result<(), StateError> {
        self.transition(
            node_id,
            &[
                NodeStatus::Idle,
                NodeStatus::Pending,
                NodeStatus::Completed,
                NodeStatus::Error,
            ],
            NodeStatus::Completed,
            |s| {
                let now = Utc::now();
                s.output = Some(output);
                s.error_message = None;
                s.skipped = skipped;
                s.started_at = Some(now);
                s.finished_at = Some(now);
            },
        )
    }
}
