//! Client for OpenAI-compatible chat completion endpoints

use super::streaming::{SseItem, SseLineParser};
use super::types::{BackendError, ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use crate::config::{ApiConnection, ApiParameters};
use crate::workflow::NodePrompt;
use futures::StreamExt;
use std::time::{Duration, Instant};

/// HTTP client bound to one endpoint
#[derive(Debug, Clone)]
pub struct HttpBackend {
    /// Base URL for the API
    base_url: String,

    /// Bearer token, if any
    api_key: Option<String>,

    timeout: Duration,

    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into(),
            api_key: None,
            timeout,
            client,
        })
    }

    /// Client for a node's connection settings
    pub fn from_connection(
        connection: &ApiConnection,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        if connection.endpoint.trim().is_empty() {
            return Err(BackendError::config("endpoint is empty"));
        }
        let backend = Self::new(connection.endpoint.clone(), timeout)?;
        Ok(if connection.api_key.is_empty() {
            backend
        } else {
            backend.with_api_key(connection.api_key.clone())
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Build the chat completion URL
    fn chat_completion_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{}/chat/completions", base)
    }

    /// POST the request and check the status
    async fn send(&self, request: &ChatCompletionRequest) -> Result<reqwest::Response, BackendError> {
        let start = Instant::now();
        let mut http_request = self.client.post(self.chat_completion_url()).json(request);

        if let Some(ref key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", key));
        }

        let response = match tokio::time::timeout(self.timeout, http_request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(map_request_error(e, start.elapsed())),
            Err(_) => {
                return Err(BackendError::Timeout {
                    elapsed: start.elapsed(),
                });
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), body = %body, "Chat completion rejected");
        Err(BackendError::Api {
            status: status.as_u16(),
            message: api_error_message(status, &body),
        })
    }

    /// Non-streaming completion
    pub async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, BackendError> {
        let request = ChatCompletionRequest {
            stream: false,
            ..request.clone()
        };
        let response = self.send(&request).await?;
        response
            .json()
            .await
            .map_err(|e| BackendError::parse(format!("failed to parse response: {}", e)))
    }

    /// Streaming completion. `on_chunk` receives each content fragment as it
    /// arrives; the reassembled text is returned.
    pub async fn chat_completion_stream<F>(
        &self,
        request: &ChatCompletionRequest,
        mut on_chunk: F,
    ) -> Result<String, BackendError>
    where
        F: FnMut(&str) + Send,
    {
        let start = Instant::now();
        let request = ChatCompletionRequest {
            stream: true,
            ..request.clone()
        };
        let response = self.send(&request).await?;

        let mut parser = SseLineParser::new();
        let mut content = String::new();
        let mut stream = response.bytes_stream();

        'read: while let Some(bytes) = stream.next().await {
            let bytes = bytes.map_err(|e| map_request_error(e, start.elapsed()))?;
            for item in parser.feed(&bytes) {
                match item {
                    SseItem::Chunk(chunk) => {
                        if let Some(fragment) = chunk.content() {
                            content.push_str(fragment);
                            on_chunk(fragment);
                        }
                    }
                    SseItem::Done => break 'read,
                }
            }
        }
        if let Some(SseItem::Chunk(chunk)) = parser.finish() {
            if let Some(fragment) = chunk.content() {
                content.push_str(fragment);
                on_chunk(fragment);
            }
        }

        Ok(content)
    }
}

fn map_request_error(e: reqwest::Error, elapsed: Duration) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout { elapsed }
    } else if e.is_connect() {
        BackendError::network(format!("connection failed: {}", e))
    } else {
        BackendError::network(format!("request failed: {}", e))
    }
}

/// User-facing message for a failed response: the provider's
/// `error.message` when the body carries one, else the status text.
pub fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    let fallback = || format!("API error: {}", status.as_u16());

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(json) => json
            .pointer("/error/message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(fallback),
        Err(_) => status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(fallback),
    }
}

/// Request for one node. Blank prompts are left out, as is an empty stop list.
pub fn build_request(
    connection: &ApiConnection,
    parameters: &ApiParameters,
    prompt: &NodePrompt,
) -> ChatCompletionRequest {
    let mut messages = Vec::new();
    if !prompt.system.trim().is_empty() {
        messages.push(ChatMessage::system(prompt.system.clone()));
    }
    if !prompt.user.trim().is_empty() {
        messages.push(ChatMessage::user(prompt.user.clone()));
    }

    ChatCompletionRequest {
        model: connection.model.clone(),
        messages,
        max_tokens: parameters.max_tokens,
        temperature: parameters.temperature,
        top_p: parameters.top_p,
        presence_penalty: parameters.presence_penalty,
        frequency_penalty: parameters.frequency_penalty,
        stop: (!parameters.stop_sequences.is_empty()).then(|| parameters.stop_sequences.clone()),
        stream: parameters.streaming,
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    //! One-shot HTTP server standing in for a chat completions endpoint

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    pub fn http_response(status: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            content_type,
            body.len(),
            body
        )
    }

    /// Serve `response` to the first connection. Resolves to the raw request.
    pub async fn serve_once(response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];

            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);

                let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
                    continue;
                };
                let headers = String::from_utf8_lossy(&request[..end]).to_lowercase();
                let length = headers
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }

            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&request).into_owned()
        });

        (format!("http://{}/v1", addr), handle)
    }
}

#[cfg(test)]
mod tests {
    use super::test_server::{http_response, serve_once};
    use super::*;
    use reqwest::StatusCode;

    fn request(stream: bool) -> ChatCompletionRequest {
        build_request(
            &ApiConnection::builtin(),
            &ApiParameters {
                streaming: stream,
                ..Default::default()
            },
            &NodePrompt {
                system: "You are terse.".into(),
                user: "Say hello".into(),
            },
        )
    }

    #[test]
    fn test_chat_completion_url() {
        let backend = HttpBackend::new("https://api.example.com/v1", Duration::from_secs(5)).unwrap();
        assert_eq!(
            backend.chat_completion_url(),
            "https://api.example.com/v1/chat/completions"
        );

        // With trailing slash
        let backend = HttpBackend::new("https://api.example.com/v1/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            backend.chat_completion_url(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_from_connection() {
        let backend = HttpBackend::from_connection(
            &ApiConnection {
                api_key: "sk-test".into(),
                ..ApiConnection::builtin()
            },
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(backend.api_key.as_deref(), Some("sk-test"));

        let anonymous =
            HttpBackend::from_connection(&ApiConnection::builtin(), Duration::from_secs(5)).unwrap();
        assert!(anonymous.api_key.is_none());

        let no_endpoint = ApiConnection {
            endpoint: " ".into(),
            ..ApiConnection::builtin()
        };
        assert!(matches!(
            HttpBackend::from_connection(&no_endpoint, Duration::from_secs(5)),
            Err(BackendError::Config { .. })
        ));
    }

    #[test]
    fn test_api_error_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(
            api_error_message(StatusCode::UNAUTHORIZED, body),
            "Incorrect API key provided"
        );
        assert_eq!(
            api_error_message(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>"),
            "Bad Gateway"
        );
        assert_eq!(
            api_error_message(StatusCode::TOO_MANY_REQUESTS, r#"{"detail":"slow down"}"#),
            "API error: 429"
        );
    }

    #[test]
    fn test_build_request() {
        let params = ApiParameters {
            stop_sequences: vec!["THE END".into()],
            ..Default::default()
        };
        let prompt = NodePrompt {
            system: "   ".into(),
            user: "Continue the chapter".into(),
        };

        let req = build_request(&ApiConnection::builtin(), &params, &prompt);
        assert_eq!(req.model, "gpt-4o");
        assert_eq!(req.messages, vec![ChatMessage::user("Continue the chapter")]);
        assert_eq!(req.stop, Some(vec!["THE END".to_string()]));
        assert!(req.stream);

        let req = build_request(&ApiConnection::builtin(), &ApiParameters::default(), &prompt);
        assert!(req.stop.is_none());
    }

    #[tokio::test]
    async fn test_chat_completion() {
        let body = r#"{"id":"c1","choices":[{"message":{"content":"Hello!"},"finish_reason":"stop"}]}"#;
        let (url, server) = serve_once(http_response("200 OK", "application/json", body)).await;

        let backend = HttpBackend::new(url, Duration::from_secs(5))
            .unwrap()
            .with_api_key("sk-test");
        let response = backend.chat_completion(&request(true)).await.unwrap();
        assert_eq!(response.content(), "Hello!");

        let raw = server.await.unwrap();
        let lower = raw.to_lowercase();
        assert!(raw.starts_with("POST /v1/chat/completions"));
        assert!(lower.contains("authorization: bearer sk-test"));
        assert!(raw.contains(r#""stream":false"#));
        assert!(raw.contains(r#""role":"system""#));
    }

    #[tokio::test]
    async fn test_error_body_message() {
        let body = r#"{"error":{"message":"Rate limit reached"}}"#;
        let (url, server) = serve_once(http_response(
            "429 Too Many Requests",
            "application/json",
            body,
        ))
        .await;

        let backend = HttpBackend::new(url, Duration::from_secs(5)).unwrap();
        let err = backend.chat_completion(&request(false)).await.unwrap_err();
        assert!(matches!(err, BackendError::Api { status: 429, .. }));
        assert_eq!(err.to_string(), "Rate limit reached");

        let raw = server.await.unwrap();
        assert!(!raw.to_lowercase().contains("authorization"));
    }

    #[tokio::test]
    async fn test_chat_completion_stream() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Once \"}}]}\n\n",
            "data: {broken\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"upon\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let (url, server) = serve_once(http_response("200 OK", "text/event-stream", body)).await;

        let backend = HttpBackend::new(url, Duration::from_secs(5)).unwrap();
        let mut fragments = Vec::new();
        let content = backend
            .chat_completion_stream(&request(false), |f| fragments.push(f.to_string()))
            .await
            .unwrap();

        assert_eq!(content, "Once upon");
        assert_eq!(fragments, vec!["Once ", "upon"]);
        assert!(server.await.unwrap().contains(r#""stream":true"#));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = HttpBackend::new(format!("http://{}/v1", addr), Duration::from_secs(5)).unwrap();
        let err = backend.chat_completion(&request(false)).await.unwrap_err();
        assert!(matches!(err, BackendError::Network { .. }));
    }
}
