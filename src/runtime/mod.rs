//! Ephemeral execution state
//!
//! Nothing in here is persisted. Workflow and node definitions are pure
//! metadata; everything that changes while a workflow runs (node status,
//! outputs, block resolution, freezes, the execution cursor) lives in a
//! [`WorkflowRuntimeState`] owned by a single writer.

mod block_state;
mod error;
mod node_state;

pub use block_state::{BlockResolution, BlockStateMap, VirtualBlockState};
pub use error::StateError;
pub use node_state::{NodeRuntimeState, NodeStateMap, NodeStatus};

use crate::textblock::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution status of a whole workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    #[default]
    Idle,
    Running,
    /// Stopped at a node boundary; resumable
    Paused,
    Completed,
    Error,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkflowStatus::Idle => "idle",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Paused => "paused",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Error => "error",
        })
    }
}

/// Runtime state of one workflow execution
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkflowRuntimeState {
    pub workflow_id: String,
    pub status: WorkflowStatus,

    /// Topological order computed by `prepare`
    pub execution_order: Vec<NodeId>,

    /// Cursor into `execution_order`
    pub current_index: usize,

    pub nodes: NodeStateMap,
    pub blocks: BlockStateMap,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Set when status is `Error`
    pub error_message: Option<String>,

    /// Node whose failure halted the run
    pub failed_node: Option<NodeId>,
}

impl WorkflowRuntimeState {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            ..Default::default()
        }
    }

    /// Node under the cursor
    pub fn current_node(&self) -> Option<&NodeId> {
        self.execution_order.get(self.current_index)
    }

    /// Fraction of the execution order already passed, if there is one
    pub fn progress(&self) -> Option<f64> {
        if self.execution_order.is_empty() {
            None
        } else {
            Some(self.current_index.min(self.execution_order.len()) as f64
                / self.execution_order.len() as f64)
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == WorkflowStatus::Running
    }

    /// Total wall time of the run so far
    pub fn duration_ms(&self) -> Option<u64> {
        let started = self.started_at?;
        let finished = self.finished_at.unwrap_or_else(Utc::now);
        u64::try_from((finished - started).num_milliseconds()).ok()
    }

    /// Drop the cached order; the workflow must be prepared again
    pub fn invalidate(&mut self) {
        self.status = WorkflowStatus::Idle;
        self.execution_order.clear();
        self.current_index = 0;
        self.error_message = None;
        self.failed_node = None;
    }
}
