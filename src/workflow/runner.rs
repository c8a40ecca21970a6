//! Workflow runner - command surface over one workflow and its runtime state

use super::definition::{NodeDefinition, WorkflowDefinition};
use super::events::{EventHandler, diff};
use super::executor::{
    NodeExecutor, WorkflowError, execute_workflow, override_node_output, remove_node, reset_node,
};
use crate::runtime::{NodeStatus, WorkflowRuntimeState, WorkflowStatus};
use crate::signals::CancellationToken;
use crate::textblock::{Block, BlockId, NodeId};
use std::ops::ControlFlow;

/// Owns a workflow definition and the single runtime state driving it.
///
/// Every command emits the events describing its effect.
pub struct WorkflowRunner {
    workflow: WorkflowDefinition,
    state: WorkflowRuntimeState,
}

fn emit_diff(handler: &dyn EventHandler, prev: &WorkflowRuntimeState, next: &WorkflowRuntimeState) {
    for event in diff(prev, next) {
        handler.emit(&event);
    }
}

impl WorkflowRunner {
    pub fn new(workflow: WorkflowDefinition) -> Self {
        let state = WorkflowRuntimeState::new(&workflow.id);
        Self { workflow, state }
    }

    pub fn workflow(&self) -> &WorkflowDefinition {
        &self.workflow
    }

    pub fn state(&self) -> &WorkflowRuntimeState {
        &self.state
    }

    pub fn into_parts(self) -> (WorkflowDefinition, WorkflowRuntimeState) {
        (self.workflow, self.state)
    }

    /// Apply a command and emit what changed, even if it failed halfway
    fn apply<T>(
        &mut self,
        handler: &dyn EventHandler,
        command: impl FnOnce(
            &mut WorkflowDefinition,
            &mut WorkflowRuntimeState,
        ) -> Result<T, WorkflowError>,
    ) -> Result<T, WorkflowError> {
        let prev = self.state.clone();
        let result = command(&mut self.workflow, &mut self.state);
        emit_diff(handler, &prev, &self.state);
        result
    }

    /// Run the workflow until it completes, fails or is stopped.
    ///
    /// A paused workflow resumes at its cursor; anything else starts over
    /// from `prepare`. `cancel` is checked between nodes and pauses the run.
    pub async fn run<E>(
        &mut self,
        executor: &E,
        cancel: &CancellationToken,
        handler: &dyn EventHandler,
    ) -> Result<(), WorkflowError>
    where
        E: NodeExecutor + ?Sized,
    {
        let mut prev = self.state.clone();
        if self.state.status == WorkflowStatus::Paused {
            if cancel.is_cancelled() {
                tracing::info!(workflow = %self.workflow.id, "Stop requested, staying paused");
                return Ok(());
            }
            tracing::info!(workflow = %self.workflow.id, index = self.state.current_index, "Resuming workflow");
            self.state.status = WorkflowStatus::Running;
        }

        let result = execute_workflow(&self.workflow, &mut self.state, executor, |next| {
            emit_diff(handler, &prev, next);
            prev = next.clone();
            if cancel.is_cancelled() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await;

        emit_diff(handler, &prev, &self.state);
        result
    }

    /// Reset a failed node so the next `run` executes it again
    pub fn retry_node(
        &mut self,
        node_id: &NodeId,
        handler: &dyn EventHandler,
    ) -> Result<(), WorkflowError> {
        self.apply(handler, |workflow, state| {
            if state.is_running() {
                return Err(WorkflowError::WorkflowRunning);
            }
            let status = state.nodes.status(node_id);
            if status != NodeStatus::Error {
                return Err(WorkflowError::NotFailed {
                    node: node_id.clone(),
                    status,
                });
            }

            reset_node(workflow, state, node_id)?;
            if state.failed_node.as_ref() == Some(node_id) {
                state.status = WorkflowStatus::Paused;
                state.error_message = None;
                state.failed_node = None;
                state.finished_at = None;
            }
            tracing::info!(node = %node_id, "Node queued for retry");
            Ok(())
        })
    }

    /// Complete a node with `content` instead of calling the LLM
    pub fn set_node_output(
        &mut self,
        node_id: &NodeId,
        content: impl Into<String>,
        handler: &dyn EventHandler,
    ) -> Result<(), WorkflowError> {
        let content = content.into();
        self.apply(handler, |workflow, state| {
            override_node_output(workflow, state, node_id, content, false)
        })
    }

    /// Complete a node with empty output
    pub fn skip_node(
        &mut self,
        node_id: &NodeId,
        handler: &dyn EventHandler,
    ) -> Result<(), WorkflowError> {
        self.apply(handler, |workflow, state| {
            override_node_output(workflow, state, node_id, String::new(), true)
        })
    }

    /// Pin a resolved block's content
    pub fn freeze_block(
        &mut self,
        block_id: &BlockId,
        handler: &dyn EventHandler,
    ) -> Result<(), WorkflowError> {
        self.apply(handler, |workflow, state| {
            if workflow.find_block(block_id).is_none() {
                return Err(WorkflowError::UnknownBlock(block_id.clone()));
            }
            state.blocks.freeze(block_id)?;
            tracing::debug!(block = %block_id, "Block frozen");
            Ok(())
        })
    }

    /// Release a pin. Returns false if the block was not frozen.
    pub fn unfreeze_block(
        &mut self,
        block_id: &BlockId,
        handler: &dyn EventHandler,
    ) -> Result<bool, WorkflowError> {
        self.apply(handler, |workflow, state| {
            if workflow.find_block(block_id).is_none() {
                return Err(WorkflowError::UnknownBlock(block_id.clone()));
            }
            Ok(state.blocks.unfreeze(block_id))
        })
    }

    /// Fill an agent-inject block. Returns false if nothing changed (frozen
    /// or same content).
    pub fn inject(
        &mut self,
        block_id: &BlockId,
        content: &str,
        handler: &dyn EventHandler,
    ) -> Result<bool, WorkflowError> {
        self.apply(handler, |workflow, state| {
            match workflow.find_block(block_id) {
                Some((_, Block::AgentInject(_))) => Ok(state.blocks.resolve(block_id, content)),
                Some(_) => Err(WorkflowError::NotInjectable(block_id.clone())),
                None => Err(WorkflowError::UnknownBlock(block_id.clone())),
            }
        })
    }

    /// Add or replace a node. The workflow must be prepared again.
    pub fn add_node(
        &mut self,
        node: NodeDefinition,
        handler: &dyn EventHandler,
    ) -> Result<Option<NodeDefinition>, WorkflowError> {
        self.apply(handler, |workflow, state| {
            if state.is_running() {
                return Err(WorkflowError::WorkflowRunning);
            }
            let replaced = workflow.add_node(node);
            state.invalidate();
            Ok(replaced)
        })
    }

    /// Edit a node in place. The workflow must be prepared again.
    pub fn update_node(
        &mut self,
        node_id: &NodeId,
        updater: impl FnOnce(&mut NodeDefinition),
        handler: &dyn EventHandler,
    ) -> Result<(), WorkflowError> {
        self.apply(handler, |workflow, state| {
            if state.is_running() {
                return Err(WorkflowError::WorkflowRunning);
            }
            if !workflow.update_node(node_id, updater) {
                return Err(WorkflowError::UnknownNode(node_id.clone()));
            }
            state.invalidate();
            Ok(())
        })
    }

    /// Remove a node and cut references to it
    pub fn remove_node(
        &mut self,
        node_id: &NodeId,
        handler: &dyn EventHandler,
    ) -> Result<NodeDefinition, WorkflowError> {
        self.apply(handler, |workflow, state| remove_node(workflow, state, node_id))
    }
}
