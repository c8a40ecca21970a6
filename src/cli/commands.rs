//! CLI command implementations
//!
//! Commands report through an [`OutputHandler`] and return the process exit
//! code: 0 on success, 1 on failure, 130 when a run was stopped by a signal.

use super::output::{OutputEvents, OutputHandler};
use crate::backend_executor::LlmNodeExecutor;
use crate::config::{FlowConfig, load_workflow_file};
use crate::runtime::{NodeStatus, WorkflowRuntimeState, WorkflowStatus};
use crate::signals::CancellationToken;
use crate::storage::SqliteStore;
use crate::workflow::{NodeExecutor, WorkflowDefinition, WorkflowRunner};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_INTERRUPTED: i32 = 130;

/// Run a workflow document against its configured LLM endpoints
pub async fn run_workflow(
    path: &Path,
    output_dir: Option<&Path>,
    config: &FlowConfig,
    cancel: &CancellationToken,
    handler: Arc<dyn OutputHandler>,
) -> Result<i32> {
    let workflow = match load_workflow_file(path) {
        Ok(wf) => wf,
        Err(e) => {
            handler.error(&format!("Failed to load workflow: {:#}", e));
            return Ok(EXIT_FAILED);
        }
    };

    let executor =
        LlmNodeExecutor::from_config(config).with_events(Arc::new(OutputEvents(handler.clone())));

    execute(workflow, &executor, output_dir, cancel, handler).await
}

/// Drive `workflow` to completion with `executor`, then report and save outputs
pub async fn execute<E>(
    workflow: WorkflowDefinition,
    executor: &E,
    output_dir: Option<&Path>,
    cancel: &CancellationToken,
    handler: Arc<dyn OutputHandler>,
) -> Result<i32>
where
    E: NodeExecutor + ?Sized,
{
    handler.info(&format!(
        "Running workflow '{}' ({} nodes)",
        workflow.name,
        workflow.nodes.len()
    ));

    let events = OutputEvents(handler.clone());
    let mut runner = WorkflowRunner::new(workflow);

    // Failures are already reported as workflow_error events
    if let Err(e) = runner.run(executor, cancel, &events).await {
        tracing::debug!(error = %e, "Workflow did not start");
        return Ok(EXIT_FAILED);
    }

    let (workflow, state) = runner.into_parts();

    if let Some(dir) = output_dir {
        let saved = save_outputs(dir, &workflow, &state)?;
        handler.info(&format!("Saved {} output(s) to {}", saved.len(), dir.display()));
    }

    match state.status {
        WorkflowStatus::Completed => {
            let last = state
                .execution_order
                .iter()
                .rev()
                .find_map(|id| state.nodes.output(id).filter(|o| !o.is_empty()));
            handler.result(true, last);
            Ok(EXIT_OK)
        }
        WorkflowStatus::Paused => {
            handler.info(&format!(
                "Stopped after {}/{} nodes",
                state.current_index,
                state.execution_order.len()
            ));
            Ok(EXIT_INTERRUPTED)
        }
        _ => {
            handler.result(false, None);
            Ok(EXIT_FAILED)
        }
    }
}

/// Write each produced output to `<dir>/<node id>.txt`.
///
/// Skipped nodes have nothing to save.
pub fn save_outputs(
    dir: &Path,
    workflow: &WorkflowDefinition,
    state: &WorkflowRuntimeState,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let mut saved = Vec::new();
    for node_id in workflow.nodes.keys() {
        let Some(node_state) = state.nodes.get(node_id) else {
            continue;
        };
        if node_state.status != NodeStatus::Completed || node_state.skipped {
            continue;
        }
        let Some(output) = node_state.output.as_deref() else {
            continue;
        };

        let path = dir.join(format!("{}.txt", file_stem(node_id.as_str())));
        std::fs::write(&path, output)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::debug!(node = %node_id, path = %path.display(), "Saved node output");
        saved.push(path);
    }

    Ok(saved)
}

fn file_stem(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Validate a workflow document without running it
pub fn validate_workflow(path: &Path, handler: &dyn OutputHandler) -> i32 {
    let workflow = match load_workflow_file(path) {
        Ok(wf) => wf,
        Err(e) => {
            handler.error(&format!("Failed to load workflow: {:#}", e));
            return EXIT_FAILED;
        }
    };

    match workflow.validate() {
        Ok(_) => {
            handler.info(&format!(
                "✓ Workflow '{}' is valid ({} nodes)",
                workflow.name,
                workflow.nodes.len()
            ));
            EXIT_OK
        }
        Err(e) => {
            handler.error(&format!("✗ Workflow '{}' is invalid: {}", workflow.name, e));
            EXIT_FAILED
        }
    }
}

/// Print the order nodes would execute in
pub fn print_order(path: &Path, handler: &dyn OutputHandler) -> i32 {
    let workflow = match load_workflow_file(path) {
        Ok(wf) => wf,
        Err(e) => {
            handler.error(&format!("Failed to load workflow: {:#}", e));
            return EXIT_FAILED;
        }
    };

    match workflow.validate() {
        Ok(order) => {
            let lines = order
                .iter()
                .enumerate()
                .map(|(i, id)| {
                    let name = workflow.get_node(id).map(|n| n.name.as_str()).unwrap_or("");
                    format!("{}. {} ({})", i + 1, name, id)
                })
                .collect::<Vec<_>>()
                .join("\n");
            handler.result(true, Some(&lines));
            EXIT_OK
        }
        Err(e) => {
            handler.error(&e.to_string());
            EXIT_FAILED
        }
    }
}

/// Open the configured database, or the default one
pub fn open_store(config: &FlowConfig) -> Result<SqliteStore> {
    let path = match config.storage_path() {
        Some(path) => path,
        None => SqliteStore::default_path()?,
    };
    SqliteStore::open(&path)
}

/// Store a workflow document in the database
pub fn import_workflow(path: &Path, store: &SqliteStore, handler: &dyn OutputHandler) -> Result<i32> {
    let workflow = match load_workflow_file(path) {
        Ok(wf) => wf,
        Err(e) => {
            handler.error(&format!("Failed to load workflow: {:#}", e));
            return Ok(EXIT_FAILED);
        }
    };

    if let Err(e) = workflow.validate() {
        handler.error(&format!("✗ Workflow '{}' is invalid: {}", workflow.name, e));
        return Ok(EXIT_FAILED);
    }

    store.save_workflow(&workflow)?;
    handler.info(&format!("✓ Imported '{}' as {}", workflow.name, workflow.id));
    Ok(EXIT_OK)
}

/// List stored workflows
pub fn list_workflows(store: &SqliteStore, handler: &dyn OutputHandler) -> Result<i32> {
    let workflows = store.list_workflows()?;
    if workflows.is_empty() {
        handler.info("(no workflows stored)");
        return Ok(EXIT_OK);
    }

    let lines = workflows
        .iter()
        .map(|wf| {
            format!(
                "{}  {} ({} nodes, updated {})",
                wf.id, wf.name, wf.node_count, wf.updated_at
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    handler.result(true, Some(&lines));
    Ok(EXIT_OK)
}

pub fn get_setting(store: &SqliteStore, key: &str, handler: &dyn OutputHandler) -> Result<i32> {
    let value: Option<serde_json::Value> = store.get(key)?;
    match value {
        Some(value) => {
            handler.result(true, Some(&value.to_string()));
            Ok(EXIT_OK)
        }
        None => {
            handler.error(&format!("Setting '{}' is not set", key));
            Ok(EXIT_FAILED)
        }
    }
}

/// Store a setting; `raw` must be a JSON value
pub fn set_setting(
    store: &SqliteStore,
    key: &str,
    raw: &str,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            handler.error(&format!("Value for '{}' is not valid JSON: {}", key, e));
            return Ok(EXIT_FAILED);
        }
    };

    store.save(key, &value)?;
    handler.info(&format!("✓ {} = {}", key, value));
    Ok(EXIT_OK)
}
