//! JSON-RPC command surface over stdio.
//!
//! - [`RpcServer`] reads newline-delimited requests and writes responses
//! - [`handle_method`] routes `analysis/*` methods to the controller
//! - [`AppState`] holds the configuration and the shared controller

mod handlers;
mod rpc;

pub use handlers::*;
pub use rpc::*;

use std::sync::Arc;

use crate::analysis::AnalysisController;
use crate::config::Config;
use crate::llm::LlmProvider;

/// Application state shared across handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Session registry and pipeline driver.
    pub controller: Arc<AnalysisController>,
}

impl AppState {
    /// Create state running the standard pipeline against `llm`.
    pub fn new(config: Config, llm: Arc<dyn LlmProvider>) -> Self {
        tracing::info!(
            depth = config.analysis.depth,
            max_stages = config.analysis.max_stages,
            confidence_threshold = config.analysis.confidence_threshold,
            "AppState initializing with analysis defaults"
        );

        Self::with_controller(config, Arc::new(AnalysisController::new(llm)))
    }

    /// Create state around an existing controller.
    pub fn with_controller(config: Config, controller: Arc<AnalysisController>) -> Self {
        Self { config, controller }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
