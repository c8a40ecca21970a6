//! Dependency-ordered execution of LLM call graphs.
//!
//! A workflow is a set of nodes whose prompts are lists of blocks. Virtual
//! blocks stand for another node's output; the engine orders nodes so every
//! referenced output exists before a prompt is rendered, and propagates each
//! result into the prompts that reference it.

pub mod backend_executor;
pub mod cli;
pub mod config;
pub mod logging;
pub mod runtime;
pub mod signals;
pub mod storage;
pub mod textblock;
pub mod workflow;
