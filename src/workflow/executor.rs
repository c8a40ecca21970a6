//! Sequential workflow execution
//!
//! `prepare` computes the order and seeds runtime state, `execute_node`
//! runs the node under the cursor, and `execute_workflow` loops until the
//! workflow stops running. Node output is pushed into every dependent's
//! reference blocks before the cursor moves on.

use super::definition::{NodeDefinition, NodePrompt, WorkflowDefinition};
use super::resolver::DependencyError;
use crate::runtime::{
    BlockStateMap, NodeStateMap, NodeStatus, StateError, WorkflowRuntimeState, WorkflowStatus,
};
use crate::textblock::{Block, BlockId, NodeId};
use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;
use std::ops::ControlFlow;
use thiserror::Error;

/// Errors from preparing or driving a workflow
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("unknown node '{0}'")]
    UnknownNode(NodeId),

    #[error("unknown block '{0}'")]
    UnknownBlock(BlockId),

    #[error("block '{0}' does not accept injected content")]
    NotInjectable(BlockId),

    #[error("node '{node}' is {status}; only failed nodes can be retried")]
    NotFailed { node: NodeId, status: NodeStatus },

    #[error("workflow is running")]
    WorkflowRunning,
}

/// Runs one node's LLM call. The error's display string becomes the node's
/// error message as is.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(
        &self,
        node_id: &NodeId,
        prompt: &NodePrompt,
        node: &NodeDefinition,
    ) -> anyhow::Result<String>;
}

#[async_trait]
impl<F, Fut> NodeExecutor for F
where
    F: Fn(NodeId, NodePrompt, NodeDefinition) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<String>> + Send,
{
    async fn execute(
        &self,
        node_id: &NodeId,
        prompt: &NodePrompt,
        node: &NodeDefinition,
    ) -> anyhow::Result<String> {
        (self)(node_id.clone(), prompt.clone(), node.clone()).await
    }
}

/// Compute the execution order and reset runtime state for a new run.
///
/// Frozen block states and injected agent content survive; every other
/// block restarts pending. Nodes whose inputs are already ready start
/// pending. On a dependency error the state is left untouched.
pub fn prepare(
    workflow: &WorkflowDefinition,
    state: &mut WorkflowRuntimeState,
) -> Result<(), WorkflowError> {
    if let Some((node_id, _)) = state
        .nodes
        .iter()
        .find(|(_, s)| s.status == NodeStatus::Running)
    {
        return Err(StateError::NodeRunning(node_id.clone()).into());
    }

    let order = workflow.validate()?;

    let mut blocks = BlockStateMap::default();
    for block in workflow
        .nodes
        .values()
        .flat_map(|node| node.prompt_lists())
        .flat_map(|list| list.blocks.iter())
    {
        let carried = state.blocks.get(block.id()).filter(|s| match block {
            Block::AgentInject(_) => true,
            Block::Virtual(_) => s.frozen,
            Block::Text(_) => false,
        });
        if let Some(carried) = carried {
            blocks.insert(block.id().clone(), carried.clone());
        } else if block.is_dynamic() {
            blocks.insert(block.id().clone(), Default::default());
        }
    }

    let mut nodes = NodeStateMap::default();
    for node_id in &order {
        nodes.reset(node_id)?;
        if workflow
            .get_node(node_id)
            .is_some_and(|node| node.is_ready(&blocks))
        {
            nodes.set_pending(node_id)?;
        }
    }

    tracing::info!(
        workflow = %workflow.id,
        nodes = order.len(),
        carried_blocks = blocks.iter().filter(|(_, s)| s.frozen).count(),
        "Prepared workflow"
    );

    *state = WorkflowRuntimeState {
        workflow_id: workflow.id.clone(),
        status: WorkflowStatus::Running,
        execution_order: order,
        current_index: 0,
        nodes,
        blocks,
        started_at: Some(Utc::now()),
        finished_at: None,
        error_message: None,
        failed_node: None,
    };
    finish_if_done(state);
    Ok(())
}

/// Run the node under the cursor.
///
/// No-op unless the workflow is running. A node that is already completed
/// (manual output or skip) is stepped over without calling `executor`. A
/// failing node halts the whole workflow with status `Error`.
pub async fn execute_node<E>(
    workflow: &WorkflowDefinition,
    state: &mut WorkflowRuntimeState,
    executor: &E,
) -> Result<(), WorkflowError>
where
    E: NodeExecutor + ?Sized,
{
    let Some(node) = begin_node(workflow, state)? else {
        return Ok(());
    };
    let prompt = node.prompt(&state.blocks);
    let result = executor.execute(&node.id, &prompt, node).await;
    finish_node(workflow, state, &node.id, result)
}

/// Prepare if needed, then execute nodes until the workflow stops running.
///
/// `on_progress` sees every intermediate state: once after preparing, once
/// when each node starts and once when it settles. Returning
/// `ControlFlow::Break` pauses the workflow at the next node boundary; the
/// value returned while a node is in flight is ignored.
pub async fn execute_workflow<E, F>(
    workflow: &WorkflowDefinition,
    state: &mut WorkflowRuntimeState,
    executor: &E,
    mut on_progress: F,
) -> Result<(), WorkflowError>
where
    E: NodeExecutor + ?Sized,
    F: FnMut(&WorkflowRuntimeState) -> ControlFlow<()>,
{
    if state.status != WorkflowStatus::Running {
        if let Err(err) = prepare(workflow, state) {
            if let WorkflowError::Dependency(dep) = &err {
                tracing::warn!(workflow = %workflow.id, error = %dep, "Workflow is invalid");
                state.invalidate();
                state.status = WorkflowStatus::Error;
                state.error_message = Some(dep.to_string());
                state.failed_node = None;
                let _ = on_progress(state);
            }
            return Err(err);
        }
        if on_progress(state).is_break() {
            pause(state);
            return Ok(());
        }
    }

    while state.status == WorkflowStatus::Running {
        if let Some(node) = begin_node(workflow, state)? {
            let _ = on_progress(state);
            let prompt = node.prompt(&state.blocks);
            let result = executor.execute(&node.id, &prompt, node).await;
            finish_node(workflow, state, &node.id, result)?;
        }
        if on_progress(state).is_break() {
            pause(state);
        }
    }

    Ok(())
}

/// Move the node under the cursor to running and return its definition.
/// Completed nodes are stepped over and yield `None`.
fn begin_node<'w>(
    workflow: &'w WorkflowDefinition,
    state: &mut WorkflowRuntimeState,
) -> Result<Option<&'w NodeDefinition>, WorkflowError> {
    if state.status != WorkflowStatus::Running {
        return Ok(None);
    }
    let Some(node_id) = state.current_node().cloned() else {
        return Ok(None);
    };
    let Some(node) = workflow.get_node(&node_id) else {
        halt(state, &node_id, format!("unknown node '{}'", node_id));
        return Err(WorkflowError::UnknownNode(node_id));
    };

    match state.nodes.status(&node_id) {
        NodeStatus::Completed => {
            tracing::debug!(node = %node_id, "Node already completed, stepping over");
            propagate(workflow, state, &node_id);
            advance(state);
            return Ok(None);
        }
        NodeStatus::Idle if node.is_ready(&state.blocks) => {
            state.nodes.set_pending(&node_id)?;
        }
        _ => {}
    }

    if let Err(err) = state.nodes.set_running(&node_id) {
        halt(state, &node_id, err.to_string());
        return Err(err.into());
    }

    tracing::info!(
        node = %node_id,
        name = %node.name,
        index = state.current_index,
        total = state.execution_order.len(),
        "Executing node"
    );
    Ok(Some(node))
}

/// Record the result of a running node
fn finish_node(
    workflow: &WorkflowDefinition,
    state: &mut WorkflowRuntimeState,
    node_id: &NodeId,
    result: anyhow::Result<String>,
) -> Result<(), WorkflowError> {
    match result {
        Ok(output) => {
            state.nodes.set_completed(node_id, output)?;
            tracing::info!(
                node = %node_id,
                duration_ms = state.nodes.get(node_id).and_then(|s| s.duration_ms()),
                "Node completed"
            );
            propagate(workflow, state, node_id);
            advance(state);
        }
        Err(err) => {
            let message = err.to_string();
            tracing::warn!(node = %node_id, error = %message, "Node failed");
            state.nodes.set_error(node_id, message.clone())?;
            for node in workflow.nodes.values() {
                for list in node.prompt_lists() {
                    list.fail_node_dependents(&mut state.blocks, node_id);
                }
            }
            halt(state, node_id, message);
        }
    }
    Ok(())
}

/// Push a completed node's output into every reference to it and promote
/// idle dependents that became ready. Returns the promoted nodes.
pub fn propagate(
    workflow: &WorkflowDefinition,
    state: &mut WorkflowRuntimeState,
    source: &NodeId,
) -> Vec<NodeId> {
    let Some(output) = state.nodes.output(source).map(str::to_owned) else {
        return Vec::new();
    };

    let mut promoted = Vec::new();
    for (node_id, node) in &workflow.nodes {
        if node.references(source).next().is_none() {
            continue;
        }
        for list in node.prompt_lists() {
            list.resolve_node_output(&mut state.blocks, source, &output);
        }
        if state.nodes.status(node_id) == NodeStatus::Idle
            && node.is_ready(&state.blocks)
            && state.nodes.set_pending(node_id).is_ok()
        {
            tracing::debug!(source = %source, node = %node_id, "Dependent ready");
            promoted.push(node_id.clone());
        }
    }
    promoted
}

/// Put a node back to idle and revert unfrozen references to it.
///
/// Dependents that were pending only because of this node drop back to
/// idle. The node itself is promoted again if its inputs are ready.
pub fn reset_node(
    workflow: &WorkflowDefinition,
    state: &mut WorkflowRuntimeState,
    node_id: &NodeId,
) -> Result<(), WorkflowError> {
    let node = workflow
        .get_node(node_id)
        .ok_or_else(|| WorkflowError::UnknownNode(node_id.clone()))?;
    state.nodes.reset(node_id)?;

    for (dependent_id, dependent) in &workflow.nodes {
        let mut changed = false;
        for list in dependent.prompt_lists() {
            changed |= list.reset_node_dependents(&mut state.blocks, node_id);
        }
        if changed
            && state.nodes.status(dependent_id) == NodeStatus::Pending
            && !dependent.is_ready(&state.blocks)
        {
            state.nodes.reset(dependent_id)?;
        }
    }

    if node.is_ready(&state.blocks) {
        state.nodes.set_pending(node_id)?;
    }
    Ok(())
}

/// Complete a node without running it and propagate the output.
///
/// If the node is under the cursor the cursor moves past it, and a halt
/// caused by this node is lifted.
pub fn override_node_output(
    workflow: &WorkflowDefinition,
    state: &mut WorkflowRuntimeState,
    node_id: &NodeId,
    output: String,
    skipped: bool,
) -> Result<(), WorkflowError> {
    if workflow.get_node(node_id).is_none() {
        return Err(WorkflowError::UnknownNode(node_id.clone()));
    }
    state.nodes.override_output(node_id, output, skipped)?;
    tracing::info!(node = %node_id, skipped, "Node output set manually");
    propagate(workflow, state, node_id);

    if state.current_node() != Some(node_id) {
        return Ok(());
    }
    if state.status == WorkflowStatus::Error && state.failed_node.as_ref() == Some(node_id) {
        state.status = WorkflowStatus::Paused;
        state.error_message = None;
        state.failed_node = None;
        state.finished_at = None;
    }
    if matches!(state.status, WorkflowStatus::Running | WorkflowStatus::Paused) {
        advance(state);
    }
    Ok(())
}

/// Remove a node from the definition along with its runtime state.
///
/// References to it in other nodes are cut (frozen ones kept as text) and
/// the cached order is dropped, so the workflow must be prepared again.
pub fn remove_node(
    workflow: &mut WorkflowDefinition,
    state: &mut WorkflowRuntimeState,
    node_id: &NodeId,
) -> Result<NodeDefinition, WorkflowError> {
    if state.is_running() {
        return Err(WorkflowError::WorkflowRunning);
    }
    let (removed, obsolete) = workflow
        .remove_node(node_id, &state.blocks)
        .ok_or_else(|| WorkflowError::UnknownNode(node_id.clone()))?;

    for block_id in &obsolete {
        state.blocks.remove(block_id);
    }
    state.nodes.remove(node_id);
    state.invalidate();

    tracing::info!(node = %node_id, detached_blocks = obsolete.len(), "Removed node");
    Ok(removed)
}

fn advance(state: &mut WorkflowRuntimeState) {
    state.current_index += 1;
    finish_if_done(state);
}

fn finish_if_done(state: &mut WorkflowRuntimeState) {
    if state.current_index >= state.execution_order.len() {
        state.status = WorkflowStatus::Completed;
        state.finished_at = Some(Utc::now());
        tracing::info!(
            workflow = %state.workflow_id,
            duration_ms = state.duration_ms(),
            "Workflow completed"
        );
    }
}

fn halt(state: &mut WorkflowRuntimeState, node_id: &NodeId, message: String) {
    state.status = WorkflowStatus::Error;
    state.error_message = Some(message);
    state.failed_node = Some(node_id.clone());
    state.finished_at = Some(Utc::now());
}

fn pause(state: &mut WorkflowRuntimeState) {
    if state.status == WorkflowStatus::Running {
        tracing::info!(workflow = %state.workflow_id, index = state.current_index, "Workflow paused");
        state.status = WorkflowStatus::Paused;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::BlockResolution;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Returns scripted outputs and records every call
    #[derive(Default)]
    struct Scripted {
        outputs: HashMap<&'static str, Result<&'static str, &'static str>>,
        calls: Mutex<Vec<(NodeId, NodePrompt)>>,
    }

    impl Scripted {
        fn new(outputs: &[(&'static str, Result<&'static str, &'static str>)]) -> Self {
            Self {
                outputs: outputs.iter().cloned().collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn called(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(id, _)| id.to_string())
                .collect()
        }
    }

    #[async_trait]
    impl NodeExecutor for Scripted {
        async fn execute(
            &self,
            node_id: &NodeId,
            prompt: &NodePrompt,
            _node: &NodeDefinition,
        ) -> anyhow::Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((node_id.clone(), prompt.clone()));
            match self.outputs.get(node_id.as_str()) {
                Some(Ok(output)) => Ok(output.to_string()),
                Some(Err(message)) => Err(anyhow::anyhow!("{}", message)),
                None => Ok(format!("out-{}", node_id)),
            }
        }
    }

    fn node(id: &str, user: Vec<Block>) -> NodeDefinition {
        NodeDefinition::new(id).with_id(id).with_user_prompt(user)
    }

    /// A has no inputs, B references A
    fn chain() -> WorkflowDefinition {
        WorkflowDefinition::new("chain").with_nodes([
            node("A", vec![Block::text("Say hi")]),
            node("B", vec![Block::text("Reply to: "), Block::reference("A")]),
        ])
    }

    fn reference_id(workflow: &WorkflowDefinition, node_id: &str) -> BlockId {
        workflow
            .get_node(&node_id.into())
            .and_then(|n| n.api_config.user_prompt.blocks.iter().find(|b| b.is_dynamic()))
            .map(|b| b.id().clone())
            .unwrap()
    }

    #[test]
    fn test_prepare_seeds_pending_nodes() {
        let wf = chain();
        let mut state = WorkflowRuntimeState::new(&wf.id);

        prepare(&wf, &mut state).unwrap();

        assert_eq!(state.status, WorkflowStatus::Running);
        assert_eq!(state.execution_order, vec![NodeId::from("A"), NodeId::from("B")]);
        assert_eq!(state.current_index, 0);
        assert_eq!(state.nodes.status(&"A".into()), NodeStatus::Pending);
        assert_eq!(state.nodes.status(&"B".into()), NodeStatus::Idle);
        assert_eq!(state.blocks.len(), 1);
    }

    #[tokio::test]
    async fn test_chain_completes() {
        let wf = chain();
        let mut state = WorkflowRuntimeState::new(&wf.id);
        let executor = Scripted::new(&[("A", Ok("hello")), ("B", Ok("world"))]);
        prepare(&wf, &mut state).unwrap();

        execute_node(&wf, &mut state, &executor).await.unwrap();
        let a = state.nodes.get(&"A".into()).unwrap();
        assert_eq!(a.status, NodeStatus::Completed);
        assert_eq!(a.output.as_deref(), Some("hello"));
        assert_eq!(state.nodes.status(&"B".into()), NodeStatus::Pending);
        let b = wf.get_node(&"B".into()).unwrap();
        assert_eq!(b.prompt(&state.blocks).user, "Reply to: hello");
        assert_eq!(state.status, WorkflowStatus::Running);

        execute_node(&wf, &mut state, &executor).await.unwrap();
        assert_eq!(state.nodes.output(&"B".into()), Some("world"));
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert!(state.finished_at.is_some());

        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls[1].1.user, "Reply to: hello");
    }

    #[tokio::test]
    async fn test_failure_halts_workflow() {
        let wf = chain();
        let mut state = WorkflowRuntimeState::new(&wf.id);
        let executor = Scripted::new(&[("A", Err("rate limited"))]);
        prepare(&wf, &mut state).unwrap();

        execute_node(&wf, &mut state, &executor).await.unwrap();

        let a = state.nodes.get(&"A".into()).unwrap();
        assert_eq!(a.status, NodeStatus::Error);
        assert_eq!(a.error_message.as_deref(), Some("rate limited"));
        assert_eq!(state.status, WorkflowStatus::Error);
        assert_eq!(state.error_message.as_deref(), Some("rate limited"));
        assert_eq!(state.failed_node, Some(NodeId::from("A")));
        assert_eq!(state.nodes.status(&"B".into()), NodeStatus::Idle);

        let b_ref = reference_id(&wf, "B");
        assert_eq!(state.blocks.get(&b_ref).unwrap().state, BlockResolution::Error);

        // Halted: nothing else runs
        execute_node(&wf, &mut state, &executor).await.unwrap();
        assert_eq!(executor.called(), vec!["A"]);
        assert_eq!(state.nodes.status(&"B".into()), NodeStatus::Idle);
    }

    #[tokio::test]
    async fn test_frozen_block_survives_upstream_reset() {
        let wf = chain();
        let mut state = WorkflowRuntimeState::new(&wf.id);
        let executor = Scripted::new(&[("A", Ok("x"))]);
        prepare(&wf, &mut state).unwrap();
        execute_node(&wf, &mut state, &executor).await.unwrap();

        let b_ref = reference_id(&wf, "B");
        state.blocks.freeze(&b_ref).unwrap();
        reset_node(&wf, &mut state, &"A".into()).unwrap();

        let block = state.blocks.get(&b_ref).unwrap();
        assert_eq!(block.state, BlockResolution::Resolved);
        assert_eq!(block.resolved_content.as_deref(), Some("x"));
        assert!(block.frozen);
        assert_eq!(state.nodes.status(&"A".into()), NodeStatus::Pending);
        assert_eq!(state.nodes.status(&"B".into()), NodeStatus::Pending);
    }

    #[tokio::test]
    async fn test_reset_demotes_unfrozen_dependents() {
        let wf = chain();
        let mut state = WorkflowRuntimeState::new(&wf.id);
        prepare(&wf, &mut state).unwrap();
        execute_node(&wf, &mut state, &Scripted::default()).await.unwrap();
        assert_eq!(state.nodes.status(&"B".into()), NodeStatus::Pending);

        reset_node(&wf, &mut state, &"A".into()).unwrap();

        assert_eq!(state.nodes.status(&"B".into()), NodeStatus::Idle);
        let b_ref = reference_id(&wf, "B");
        assert_eq!(state.blocks.get(&b_ref).unwrap().state, BlockResolution::Pending);
    }

    #[tokio::test]
    async fn test_prepare_carries_only_frozen_blocks() {
        let wf = WorkflowDefinition::new("fan").with_nodes([
            node("A", vec![]),
            node("B", vec![Block::reference("A")]),
            node("C", vec![Block::reference("A")]),
        ]);
        let mut state = WorkflowRuntimeState::new(&wf.id);
        execute_workflow(&wf, &mut state, &Scripted::new(&[("A", Ok("draft"))]), |_| {
            ControlFlow::Continue(())
        })
        .await
        .unwrap();

        let b_ref = reference_id(&wf, "B");
        let c_ref = reference_id(&wf, "C");
        state.blocks.freeze(&b_ref).unwrap();

        prepare(&wf, &mut state).unwrap();

        assert_eq!(state.blocks.get(&b_ref).unwrap().frozen_content(), Some("draft"));
        assert_eq!(state.blocks.get(&c_ref).unwrap().state, BlockResolution::Pending);
        assert_eq!(state.nodes.status(&"B".into()), NodeStatus::Pending);
        assert_eq!(state.nodes.status(&"C".into()), NodeStatus::Idle);
        assert!(state.nodes.output(&"A".into()).is_none());
    }

    #[test]
    fn test_prepare_keeps_injected_content() {
        let inject = Block::agent_inject("tone");
        let inject_id = inject.id().clone();
        let wf = WorkflowDefinition::new("inject").with_nodes([node("A", vec![inject])]);
        let mut state = WorkflowRuntimeState::new(&wf.id);
        state.blocks.resolve(&inject_id, "Be terse.");

        prepare(&wf, &mut state).unwrap();

        assert_eq!(wf.get_node(&"A".into()).unwrap().prompt(&state.blocks).user, "Be terse.");
    }

    #[test]
    fn test_prepare_rejects_invalid_graph_without_change() {
        let wf = WorkflowDefinition::new("cycle").with_nodes([
            node("A", vec![Block::reference("B")]),
            node("B", vec![Block::reference("A")]),
        ]);
        let mut state = WorkflowRuntimeState::new(&wf.id);
        let before = state.clone();

        let err = prepare(&wf, &mut state).unwrap_err();
        assert!(matches!(err, WorkflowError::Dependency(DependencyError::Cycle { .. })));
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_execute_workflow_reports_dependency_error() {
        let wf = WorkflowDefinition::new("missing")
            .with_nodes([node("A", vec![Block::reference("ghost")])]);
        let mut state = WorkflowRuntimeState::new(&wf.id);
        let executor = Scripted::default();
        let mut seen = Vec::new();

        let err = execute_workflow(&wf, &mut state, &executor, |s| {
            seen.push(s.status);
            ControlFlow::Continue(())
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            WorkflowError::Dependency(DependencyError::Missing { .. })
        ));
        assert_eq!(state.status, WorkflowStatus::Error);
        assert_eq!(
            state.error_message.as_deref(),
            Some("node 'A' references unknown node 'ghost'")
        );
        assert_eq!(seen, vec![WorkflowStatus::Error]);
        assert!(executor.called().is_empty());
    }

    #[tokio::test]
    async fn test_dependency_error_drops_previous_order() {
        let mut wf = chain();
        let mut state = WorkflowRuntimeState::new(&wf.id);
        let executor = Scripted::new(&[("A", Ok("hi")), ("B", Ok("hello"))]);
        execute_workflow(&wf, &mut state, &executor, |_| ControlFlow::Continue(()))
            .await
            .unwrap();
        assert_eq!(state.current_index, 2);

        wf.add_node(node("C", vec![Block::reference("ghost")]));
        execute_workflow(&wf, &mut state, &executor, |_| ControlFlow::Continue(()))
            .await
            .unwrap_err();

        assert_eq!(state.status, WorkflowStatus::Error);
        assert!(state.execution_order.is_empty());
        assert_eq!(state.current_index, 0);
        assert!(state.error_message.is_some());
    }

    #[tokio::test]
    async fn test_execute_workflow_reports_progress() {
        let wf = chain();
        let mut state = WorkflowRuntimeState::new(&wf.id);
        let mut snapshots = Vec::new();

        execute_workflow(&wf, &mut state, &Scripted::default(), |s| {
            snapshots.push(s.clone());
            ControlFlow::Continue(())
        })
        .await
        .unwrap();

        assert_eq!(state.status, WorkflowStatus::Completed);
        // prepared, then start and finish for each node
        assert_eq!(snapshots.len(), 5);
        assert_eq!(snapshots[1].nodes.status(&"A".into()), NodeStatus::Running);
        assert_eq!(snapshots[2].nodes.status(&"A".into()), NodeStatus::Completed);
        assert_eq!(snapshots[4].status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn test_break_pauses_at_node_boundary() {
        let wf = chain();
        let mut state = WorkflowRuntimeState::new(&wf.id);
        let executor = Scripted::default();
        let mut steps = 0;

        execute_workflow(&wf, &mut state, &executor, |_| {
            steps += 1;
            // stop requested while A is in flight
            if steps >= 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await
        .unwrap();

        assert_eq!(state.status, WorkflowStatus::Paused);
        assert_eq!(state.current_index, 1);
        assert_eq!(executor.called(), vec!["A"]);

        // resume
        state.status = WorkflowStatus::Running;
        execute_workflow(&wf, &mut state, &executor, |_| ControlFlow::Continue(()))
            .await
            .unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(executor.called(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_completed_node_is_stepped_over() {
        let wf = chain();
        let mut state = WorkflowRuntimeState::new(&wf.id);
        let executor = Scripted::default();
        prepare(&wf, &mut state).unwrap();

        override_node_output(&wf, &mut state, &"A".into(), "manual".into(), false).unwrap();
        assert_eq!(state.current_index, 1);

        execute_workflow(&wf, &mut state, &executor, |_| ControlFlow::Continue(()))
            .await
            .unwrap();

        assert_eq!(executor.called(), vec!["B"]);
        assert_eq!(executor.calls.lock().unwrap()[0].1.user, "Reply to: manual");
        assert_eq!(state.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn test_skip_clears_halt() {
        let wf = chain();
        let mut state = WorkflowRuntimeState::new(&wf.id);
        let executor = Scripted::new(&[("A", Err("boom"))]);
        prepare(&wf, &mut state).unwrap();
        execute_node(&wf, &mut state, &executor).await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Error);

        override_node_output(&wf, &mut state, &"A".into(), String::new(), true).unwrap();

        assert_eq!(state.status, WorkflowStatus::Paused);
        assert!(state.error_message.is_none());
        assert_eq!(state.current_index, 1);
        assert!(state.nodes.get(&"A".into()).unwrap().skipped);
        assert_eq!(state.nodes.status(&"B".into()), NodeStatus::Pending);
    }

    #[tokio::test]
    async fn test_closure_executor() {
        let wf = chain();
        let mut state = WorkflowRuntimeState::new(&wf.id);
        let executor = |id: NodeId, prompt: NodePrompt, _node: NodeDefinition| async move {
            Ok::<_, anyhow::Error>(format!("{}:{}", id, prompt.user.len()))
        };

        execute_workflow(&wf, &mut state, &executor, |_| ControlFlow::Continue(()))
            .await
            .unwrap();

        assert_eq!(state.nodes.output(&"A".into()), Some("A:6"));
        assert_eq!(state.status, WorkflowStatus::Completed);
    }

    #[test]
    fn test_remove_node_invalidates_order() {
        let mut wf = chain();
        let mut state = WorkflowRuntimeState::new(&wf.id);
        prepare(&wf, &mut state).unwrap();

        assert!(matches!(
            remove_node(&mut wf, &mut state, &"A".into()),
            Err(WorkflowError::WorkflowRunning)
        ));

        state.status = WorkflowStatus::Paused;
        let removed = remove_node(&mut wf, &mut state, &"A".into()).unwrap();
        assert_eq!(removed.id, NodeId::from("A"));
        assert_eq!(state.status, WorkflowStatus::Idle);
        assert!(state.execution_order.is_empty());
        assert!(state.blocks.is_empty());
        assert!(wf.get_node(&"B".into()).unwrap().dependencies().is_empty());

        assert!(matches!(
            remove_node(&mut wf, &mut state, &"A".into()),
            Err(WorkflowError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_empty_workflow_completes_on_prepare() {
        let wf = WorkflowDefinition::new("empty");
        let mut state = WorkflowRuntimeState::new(&wf.id);
        prepare(&wf, &mut state).unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
    }
}
