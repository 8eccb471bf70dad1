//! # Sequential Analysis
//!
//! A multi-stage LLM pipeline for investigating news articles for signs of
//! corruption. Each article runs through up to five stages:
//!
//! 1. **Surface Extraction**: entities, relationships and temporal facts
//! 2. **Deep Analysis**: implicit connections and suspicious patterns
//! 3. **Cross-Reference Validation**: consistency checks and evidence links
//! 4. **Hypothesis Generation**: testable hypotheses and open questions
//! 5. **Recursive Refinement**: consolidated findings and evidence chains
//!
//! Sessions run in the background and can be queried, re-scoped or
//! terminated while in flight.
//!
//! ## Architecture
//!
//! ```text
//! JSON-RPC client → RpcServer (stdio) → AnalysisController → StageProcessor
//!                                                                  ↓
//!                                          OpenAI-compatible LLM (HTTP)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sequential_analysis::{AnalysisController, Article, Config, LlmClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let llm = LlmClient::new(&config.llm, config.request.clone())?;
//!     let controller = AnalysisController::new(Arc::new(llm));
//!
//!     let article = Article::new("https://news.example/a", "Title", "Body text");
//!     let session = controller.start_analysis(article, config.analysis).await?;
//!     let finished = controller.wait_for_completion(&session.id).await?;
//!     println!("{}", serde_json::to_string_pretty(&finished)?);
//!     Ok(())
//! }
//! ```

/// Sessions, stages and the pipeline controller.
pub mod analysis;
/// Configuration loaded from the environment.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// OpenAI-compatible chat-completions client.
pub mod llm;
/// System prompts for the analysis stages.
pub mod prompts;
/// JSON-RPC server and request handling.
pub mod server;

pub use analysis::{AnalysisConfig, AnalysisController, AnalysisSession, Article, SessionStatus};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use llm::{LlmClient, LlmProvider};
pub use server::{AppState, RpcServer, SharedState};
