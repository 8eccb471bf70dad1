use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::sse::{SseEvent, SseParser};
use super::types::{ChatRequest, ChatResponse, Message, StreamChunk};
use super::LlmProvider;
use crate::config::{LlmConfig, RequestConfig};
use crate::error::{LlmError, LlmResult};

/// Characters buffered before a streaming flush.
const STREAM_FLUSH_CHARS: usize = 100;

/// Client for an OpenAI-compatible chat-completions API
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: Option<f64>,
    request_config: RequestConfig,
}

impl LlmClient {
    /// Create a new LLM client
    pub fn new(config: &LlmConfig, request_config: RequestConfig) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LlmError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the configured model name
    pub fn model(&self) -> &str {
        &self.model
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn build_request(&self, messages: Vec<Message>) -> ChatRequest {
        let request = ChatRequest::new(&self.model, messages);
        match self.temperature {
            Some(t) => request.with_temperature(t),
            None => request,
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }

    /// Run a chat completion with retries
    pub async fn chat(&self, request: ChatRequest) -> LlmResult<ChatResponse> {
        let url = self.completions_url();

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    model = %request.model,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying LLM request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &request).await {
                Ok(response) => {
                    info!(
                        model = %request.model,
                        latency_ms = start.elapsed().as_millis(),
                        "LLM call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    error!(
                        model = %request.model,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "LLM call failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(LlmError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single request (internal)
    async fn execute_request(&self, url: &str, request: &ChatRequest) -> LlmResult<ChatResponse> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Calling chat completions"
        );

        let response = self.send(self.client.post(url).json(request)).await?;

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }

    async fn send(&self, builder: RequestBuilder) -> LlmResult<Response> {
        let response = self.authorized(builder).send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout {
                    timeout_ms: self.request_config.timeout_ms,
                }
            } else {
                LlmError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        Ok(response)
    }

    /// Stream a chat completion into `sink`, flushing every
    /// [`STREAM_FLUSH_CHARS`] characters and once more at the end.
    pub async fn chat_stream(
        &self,
        request: ChatRequest,
        sink: mpsc::Sender<String>,
    ) -> LlmResult<()> {
        let url = self.completions_url();
        debug!(model = %request.model, "Starting streaming completion");

        let mut response = self
            .send(
                self.client
                    .post(&url)
                    .header("Accept", "text/event-stream")
                    .json(&request.streaming()),
            )
            .await?;

        let mut parser = SseParser::new();
        let mut buffer = String::new();

        'read: while let Some(chunk) = response.chunk().await.map_err(LlmError::Http)? {
            for event in parser.feed(&chunk) {
                if apply_event(event, &mut buffer) {
                    break 'read;
                }
                if should_flush(&buffer) {
                    flush(&sink, &mut buffer).await?;
                }
            }
        }

        if let Some(event) = parser.finish() {
            apply_event(event, &mut buffer);
        }
        if !buffer.is_empty() {
            flush(&sink, &mut buffer).await?;
        }

        debug!("Streaming completion finished");
        Ok(())
    }
}

/// Append an event's content to `buffer`; returns true when the stream ended.
fn apply_event(event: SseEvent, buffer: &mut String) -> bool {
    match event {
        SseEvent::Done => true,
        SseEvent::Data(data) => match serde_json::from_str::<StreamChunk>(&data) {
            Ok(chunk) => {
                if let Some(content) = chunk.content() {
                    buffer.push_str(content);
                }
                chunk.is_finished()
            }
            // some servers send raw text frames
            Err(_) => {
                buffer.push_str(&data);
                false
            }
        },
    }
}

fn should_flush(buffer: &str) -> bool {
    buffer.chars().count() >= STREAM_FLUSH_CHARS
}

async fn flush(sink: &mpsc::Sender<String>, buffer: &mut String) -> LlmResult<()> {
    sink.send(std::mem::take(buffer))
        .await
        .map_err(|_| LlmError::InvalidResponse {
            message: "stream receiver dropped".to_string(),
        })
}

#[async_trait]
impl LlmProvider for LlmClient {
    async fn generate(&self, messages: Vec<Message>) -> LlmResult<ChatResponse> {
        self.chat(self.build_request(messages)).await
    }

    async fn generate_stream(
        &self,
        messages: Vec<Message>,
        sink: mpsc::Sender<String>,
    ) -> LlmResult<()> {
        self.chat_stream(self.build_request(messages), sink).await
    }
}
