//! LLM service access.
//!
//! Stages talk to the model through the [`LlmProvider`] trait; [`LlmClient`]
//! implements it against any OpenAI-compatible chat-completions endpoint
//! (llama.cpp, vLLM, hosted APIs).

mod client;
mod sse;
mod types;


pub use client::LlmClient;
pub use sse::{SseEvent, SseParser};
pub use types::*;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::LlmResult;

/// Request/response and token-streaming access to a language model.
///
/// Calls are cancelled cooperatively by dropping the returned future.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run a chat completion and return the full response.
    async fn generate(&self, messages: Vec<Message>) -> LlmResult<ChatResponse>;

    /// Stream completion text into `sink`.
    ///
    /// The sink is consumed; the channel closes when this call returns.
    async fn generate_stream(
        &self,
        messages: Vec<Message>,
        sink: mpsc::Sender<String>,
    ) -> LlmResult<()>;
}
