//! CLI module for flowcabal
//!
//! This module provides:
//! - Command implementations (run, validate, order, import, settings)
//! - Output handlers (console, JSON, quiet)
//!
//! # Example
//!
//! ```ignore
//! use flowcabal::cli::{commands, output};
//!
//! let handler = output::create_handler(output::OutputMode::Console, false);
//! let exit_code = commands::run_workflow(path, None, &config, &cancel, handler).await?;
//! ```

pub mod commands;
pub mod output;

pub use commands::{
    execute, get_setting, import_workflow, list_workflows, open_store, print_order, run_workflow,
    save_outputs, set_setting, validate_workflow,
};
pub use output::{OutputEvents, OutputHandler, OutputMode, create_handler};
