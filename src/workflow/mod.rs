//! Workflow execution engine for flowcabal
//!
//! This module handles:
//! - Node and workflow definitions (pure, serializable metadata)
//! - Dependency resolution into a topological execution order
//! - Sequential node execution with output propagation
//! - The command and event surface used by callers
//!
//! # Example
//!
//! ```ignore
//! use flowcabal::config::load_workflow_file;
//! use flowcabal::signals::CancellationToken;
//! use flowcabal::workflow::WorkflowRunner;
//!
//! let workflow = load_workflow_file(Path::new("story.json"))?;
//! let mut runner = WorkflowRunner::new(workflow);
//! runner.run(&executor, &CancellationToken::new(), &*handler).await?;
//!
//! for (id, state) in runner.state().nodes.iter() {
//!     println!("{id}: {}", state.status);
//! }
//! ```

mod definition;
mod events;
mod executor;
mod resolver;
mod runner;

pub use definition::{
    ApiConfiguration, NodeDefinition, NodeMap, NodePrompt, Position, WorkflowDefinition,
};
pub use events::{EngineEvent, EventHandler, diff};
pub use executor::{
    NodeExecutor, WorkflowError, execute_node, execute_workflow, override_node_output, prepare,
    propagate, remove_node, reset_node,
};
pub use resolver::{DependencyError, topological_sort};
pub use runner::WorkflowRunner;
