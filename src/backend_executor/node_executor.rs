//! LLM-backed node execution

use super::http_backend::{HttpBackend, build_request};
use crate::config::{ApiConnection, FlowConfig};
use crate::textblock::NodeId;
use crate::workflow::{EngineEvent, EventHandler, NodeDefinition, NodeExecutor, NodePrompt};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Executes nodes against their configured chat completions endpoint.
///
/// Empty connection fields on a node fall back to `defaults`. Streamed
/// fragments are reported to the event handler as they arrive.
#[derive(Clone)]
pub struct LlmNodeExecutor {
    defaults: ApiConnection,
    timeout: Duration,
    events: Option<Arc<dyn EventHandler>>,
}

impl LlmNodeExecutor {
    pub fn new(defaults: ApiConnection, timeout: Duration) -> Self {
        Self {
            defaults,
            timeout,
            events: None,
        }
    }

    pub fn from_config(config: &FlowConfig) -> Self {
        Self::new(
            config
                .defaults
                .connection
                .or_defaults(&ApiConnection::builtin()),
            Duration::from_secs(config.defaults.timeout),
        )
    }

    /// Report streamed fragments to `handler`
    pub fn with_events(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.events = Some(handler);
        self
    }
}

#[async_trait]
impl NodeExecutor for LlmNodeExecutor {
    async fn execute(
        &self,
        node_id: &NodeId,
        prompt: &NodePrompt,
        node: &NodeDefinition,
    ) -> anyhow::Result<String> {
        let connection = node.api_config.connection.or_defaults(&self.defaults);
        let backend = HttpBackend::from_connection(&connection, self.timeout)?;
        let request = build_request(&connection, &node.api_config.parameters, prompt);

        tracing::debug!(
            node = %node_id,
            model = %request.model,
            messages = request.messages.len(),
            stream = request.stream,
            "Sending chat completion"
        );

        if !request.stream {
            let response = backend.chat_completion(&request).await?;
            return Ok(response.content());
        }

        let events = self.events.as_deref();
        let output = backend
            .chat_completion_stream(&request, |fragment| {
                if let Some(handler) = events {
                    handler.emit(&EngineEvent::NodeOutput {
                        node_id: node_id.clone(),
                        content: fragment.to_string(),
                        streaming: true,
                        done: false,
                    });
                }
            })
            .await?;
        Ok(output)
    }
}
