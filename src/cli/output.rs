//! Output handlers for CLI commands
//!
//! Supports console (pretty), JSON lines, and quiet output modes.

use crate::runtime::NodeStatus;
use crate::workflow::{EngineEvent, EventHandler};
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Arc;

/// Output mode for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Console,
    Json,
    Quiet,
}

impl OutputMode {
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if json {
            Self::Json
        } else if quiet {
            Self::Quiet
        } else {
            Self::Console
        }
    }
}

/// Output handler trait
pub trait OutputHandler: Send + Sync {
    /// Engine event during a run
    fn event(&self, event: &EngineEvent);

    /// Informational line
    fn info(&self, message: &str);

    /// Failure that ends the command
    fn error(&self, message: &str);

    /// Write final result
    fn result(&self, success: bool, output: Option<&str>);
}

/// Adapts an output handler to the engine's event surface
#[derive(Clone)]
pub struct OutputEvents(pub Arc<dyn OutputHandler>);

impl EventHandler for OutputEvents {
    fn emit(&self, event: &EngineEvent) {
        self.0.event(event);
    }
}

/// Console output handler
pub struct ConsoleHandler {
    debug: bool,
}

impl ConsoleHandler {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    fn format_duration(ms: u64) -> String {
        if ms < 1000 {
            format!("{}ms", ms)
        } else {
            format!("{:.1}s", ms as f64 / 1000.0)
        }
    }

    /// One line for an event, or `None` if it is not shown
    fn render(&self, event: &EngineEvent) -> Option<String> {
        match event {
            EngineEvent::NodeState {
                node_id,
                status,
                error,
            } => match status {
                NodeStatus::Running => Some(format!("▶ {}", node_id)),
                NodeStatus::Completed => Some(format!("✓ {}", node_id)),
                NodeStatus::Error => Some(format!(
                    "✗ {}: {}",
                    node_id,
                    error.as_deref().unwrap_or("failed")
                )),
                _ if self.debug => Some(format!("[debug] {} is {}", node_id, status)),
                _ => None,
            },
            EngineEvent::BlockState {
                block_id, state, ..
            } if self.debug => Some(format!("[debug] block {} is {:?}", block_id, state)),
            EngineEvent::WorkflowState {
                status, progress, ..
            } if self.debug => Some(format!(
                "[debug] workflow {} ({:.0}%)",
                status,
                progress.unwrap_or(0.0) * 100.0
            )),
            EngineEvent::WorkflowDone { duration_ms, .. } => Some(match duration_ms {
                Some(ms) => format!(
                    "✓ Workflow completed in {}",
                    Self::format_duration(*ms)
                ),
                None => "✓ Workflow completed".to_string(),
            }),
            EngineEvent::WorkflowError { error, node_id, .. } => Some(match node_id {
                Some(node) => format!("✗ Workflow failed at '{}': {}", node, error),
                None => format!("✗ Workflow failed: {}", error),
            }),
            _ => None,
        }
    }
}

impl OutputHandler for ConsoleHandler {
    fn event(&self, event: &EngineEvent) {
        if let EngineEvent::NodeOutput {
            content,
            streaming: true,
            ..
        } = event
        {
            if self.debug {
                eprint!("{}", content);
                let _ = io::stderr().flush();
            }
            return;
        }

        if let Some(line) = self.render(event) {
            eprintln!("{}", line);
        }
    }

    fn info(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn error(&self, message: &str) {
        eprintln!("Error: {}", message);
    }

    fn result(&self, _success: bool, output: Option<&str>) {
        if let Some(out) = output {
            println!("{}", out);
        }
    }
}

/// JSON lines on stdout, one object per event
pub struct JsonHandler {
    pretty: bool,
}

impl JsonHandler {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn print_json<T: Serialize>(&self, value: &T) {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };

        if let Ok(s) = json {
            println!("{}", s);
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CliMessage<'a> {
    Info { message: &'a str },
    Error { error: &'a str },
    Result { success: bool, output: Option<&'a str> },
}

impl OutputHandler for JsonHandler {
    fn event(&self, event: &EngineEvent) {
        self.print_json(event);
    }

    fn info(&self, message: &str) {
        self.print_json(&CliMessage::Info { message });
    }

    fn error(&self, message: &str) {
        self.print_json(&CliMessage::Error { error: message });
    }

    fn result(&self, success: bool, output: Option<&str>) {
        self.print_json(&CliMessage::Result { success, output });
    }
}

/// Prints only the final output and errors
pub struct QuietHandler;

impl OutputHandler for QuietHandler {
    fn event(&self, _event: &EngineEvent) {}

    fn info(&self, _message: &str) {}

    fn error(&self, message: &str) {
        eprintln!("Error: {}", message);
    }

    fn result(&self, _success: bool, output: Option<&str>) {
        if let Some(out) = output {
            println!("{}", out);
        }
    }
}

/// Create an output handler based on mode
pub fn create_handler(mode: OutputMode, debug: bool) -> Arc<dyn OutputHandler> {
    match mode {
        OutputMode::Console => Arc::new(ConsoleHandler::new(debug)),
        OutputMode::Json => Arc::new(JsonHandler::new(false)),
        OutputMode::Quiet => Arc::new(QuietHandler),
    }
}
