//! LLM access shared by all stage processors.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::{LlmError, StageError, StageResult};
use crate::llm::{LlmProvider, Message};

/// Shared LLM handle composed into each stage processor.
#[derive(Clone)]
pub struct StageCore {
    llm: Arc<dyn LlmProvider>,
}

impl StageCore {
    /// Create a core around the given provider.
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Get a reference to the LLM provider.
    #[inline]
    pub fn llm(&self) -> &dyn LlmProvider {
        self.llm.as_ref()
    }

    /// Clone the shared provider handle.
    pub fn llm_handle(&self) -> Arc<dyn LlmProvider> {
        Arc::clone(&self.llm)
    }

    /// Send a system prompt plus one user message and parse the JSON reply.
    ///
    /// Replies wrapped in markdown code fences are accepted.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        stage: &str,
        system_prompt: &str,
        user_message: String,
    ) -> StageResult<T> {
        let start = Instant::now();
        let messages = vec![Message::system(system_prompt), Message::user(user_message)];

        let response = self.llm.generate(messages).await?;
        let completion = response.first_content().ok_or(LlmError::EmptyResponse)?;

        let json = extract_json_from_completion(completion).map_err(|message| {
            warn!(stage, error = %message, "Stage reply contained no JSON");
            StageError::Parse { message }
        })?;

        let parsed = serde_json::from_str::<T>(json).map_err(|e| {
            warn!(
                stage,
                error = %e,
                preview = %completion.chars().take(200).collect::<String>(),
                "Failed to parse stage reply"
            );
            StageError::from(e)
        })?;

        debug!(
            stage,
            latency_ms = start.elapsed().as_millis(),
            "Stage reply parsed"
        );
        Ok(parsed)
    }
}

/// Serialize a value for inclusion in a prompt.
///
/// Serialization failures are logged and rendered as an error object so the
/// prompt still goes out.
pub(crate) fn to_prompt_json<T: Serialize>(value: &T, context: &str) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        warn!(error = %e, context = %context, "Failed to serialize prompt context");
        serde_json::json!({ "serialization_error": e.to_string() }).to_string()
    })
}

/// Extract JSON from a completion string, handling markdown code blocks.
///
/// Tries raw JSON first, then a ```json fence, then any ``` fence.
pub(crate) fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}
