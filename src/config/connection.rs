//! Connection and generation parameters for OpenAI-compatible endpoints

use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Where and as whom to call the LLM.
///
/// Empty fields are filled from the configured defaults at execution time.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConnection {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub endpoint: String,

    /// Bearer token; empty means no Authorization header
    pub api_key: String,

    /// Model identifier
    pub model: String,
}

impl ApiConnection {
    /// The public OpenAI endpoint with the default model
    pub fn builtin() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            api_key: String::new(),
            model: DEFAULT_MODEL.into(),
        }
    }

    /// Fill empty fields from `defaults`
    pub fn or_defaults(&self, defaults: &ApiConnection) -> ApiConnection {
        fn pick(own: &str, fallback: &str) -> String {
            if own.trim().is_empty() {
                fallback.to_string()
            } else {
                own.to_string()
            }
        }

        ApiConnection {
            endpoint: pick(&self.endpoint, &defaults.endpoint),
            api_key: pick(&self.api_key, &defaults.api_key),
            model: pick(&self.model, &defaults.model),
        }
    }
}

/// Sampling and generation parameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiParameters {
    /// Sampling temperature (0-2)
    pub temperature: f32,

    pub max_tokens: u32,

    /// Nucleus sampling (0-1)
    pub top_p: f32,

    /// -2 to 2
    pub presence_penalty: f32,

    /// -2 to 2
    pub frequency_penalty: f32,

    pub stop_sequences: Vec<String>,

    /// Request a streamed response
    pub streaming: bool,
}

impl Default for ApiParameters {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 4096,
            top_p: 1.0,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            stop_sequences: Vec::new(),
            streaming: true,
        }
    }
}
