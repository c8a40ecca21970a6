//! LLM backend for workflow nodes
//!
//! Talks to any OpenAI-compatible chat completions endpoint, streaming or
//! not, and adapts it to the engine's `NodeExecutor` capability.
//!
//! # Example
//!
//! ```ignore
//! use flowcabal::backend_executor::LlmNodeExecutor;
//! use flowcabal::config::FlowConfig;
//!
//! let config = FlowConfig::load(None)?;
//! let executor = LlmNodeExecutor::from_config(&config).with_events(handler.clone());
//!
//! runner.run(&executor, &cancel, &*handler).await?;
//! ```

mod http_backend;
mod node_executor;
mod streaming;
mod types;

pub use http_backend::{HttpBackend, api_error_message, build_request};
pub use node_executor::LlmNodeExecutor;
pub use streaming::{SseItem, SseLineParser};
pub use types::{
    BackendError, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, StreamChunk, Usage,
};
