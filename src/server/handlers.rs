use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::SharedState;
use crate::analysis::{AnalysisConfig, AnalysisSession, Article, SessionStatus};
use crate::error::{RpcError, RpcResult};

/// Route an `analysis/*` method to its handler.
pub async fn handle_method(
    state: &SharedState,
    method: &str,
    params: Option<Value>,
) -> RpcResult<Value> {
    info!(method = %method, "Routing request");

    match method {
        "analysis/start" => handle_start(state, params).await,
        "analysis/get" => handle_get(state, params).await,
        "analysis/terminate" => handle_terminate(state, params).await,
        "analysis/updateDepth" => handle_update_depth(state, params).await,
        "analysis/list" => handle_list(state).await,
        "analysis/cleanup" => handle_cleanup(state, params).await,
        _ => Err(RpcError::UnknownMethod {
            method: method.to_string(),
        }),
    }
}

// ============================================================================
// Parameter and result types
// ============================================================================

/// Parameters for `analysis/start`.
#[derive(Debug, Deserialize)]
pub struct StartParams {
    /// Article to analyze; a missing id is generated.
    pub article: Article,
    /// Overrides applied on top of the server's default analysis config.
    #[serde(default)]
    pub config: Option<Value>,
}

/// Parameters naming one session.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParams {
    /// Session identifier.
    pub session_id: String,
}

/// Parameters for `analysis/updateDepth`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDepthParams {
    /// Session identifier.
    pub session_id: String,
    /// New depth.
    pub depth: u32,
}

/// Parameters for `analysis/cleanup`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupParams {
    /// Remove finished sessions older than this many seconds.
    pub max_age_secs: u64,
}

/// Result of `analysis/terminate`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateResponse {
    /// Session identifier.
    pub session_id: String,
    /// Status after the call.
    pub status: SessionStatus,
}

/// Result of `analysis/list`.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    /// Session snapshots, oldest first.
    pub sessions: Vec<AnalysisSession>,
}

/// Result of `analysis/cleanup`.
#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    /// Number of sessions removed.
    pub removed: usize,
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_start(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    let params: StartParams = parse_params("analysis/start", params)?;

    let mut article = params.article;
    if article.content.trim().is_empty() {
        return Err(RpcError::InvalidParameters {
            method: "analysis/start".to_string(),
            message: "article content cannot be empty".to_string(),
        });
    }
    if article.id.trim().is_empty() {
        article.id = Uuid::new_v4().to_string();
    }

    let config = merge_config(&state.config.analysis, params.config)?;
    let session = state.controller.start_analysis(article, config).await?;

    serde_json::to_value(session).map_err(RpcError::Json)
}

async fn handle_get(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    execute_handler("analysis/get", params, |p: SessionParams| async move {
        state.controller.get_session(&p.session_id).await
    })
    .await
}

async fn handle_terminate(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    execute_handler("analysis/terminate", params, |p: SessionParams| async move {
        state
            .controller
            .terminate_session(&p.session_id)
            .await
            .map(|session| TerminateResponse {
                session_id: session.id,
                status: session.status,
            })
    })
    .await
}

async fn handle_update_depth(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    execute_handler(
        "analysis/updateDepth",
        params,
        |p: UpdateDepthParams| async move {
            state.controller.update_depth(&p.session_id, p.depth).await
        },
    )
    .await
}

async fn handle_list(state: &SharedState) -> RpcResult<Value> {
    let sessions = state.controller.list_sessions().await;
    serde_json::to_value(ListResponse { sessions }).map_err(RpcError::Json)
}

async fn handle_cleanup(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    let params: CleanupParams = parse_params("analysis/cleanup", params)?;
    let removed = state
        .controller
        .cleanup_sessions(Duration::from_secs(params.max_age_secs))
        .await;
    serde_json::to_value(CleanupResponse { removed }).map_err(RpcError::Json)
}

// ============================================================================
// Helper functions
// ============================================================================

/// Apply caller overrides to the default config; unspecified fields keep
/// their server-side values.
pub(crate) fn merge_config(
    base: &AnalysisConfig,
    overrides: Option<Value>,
) -> RpcResult<AnalysisConfig> {
    let overrides = match overrides {
        None | Some(Value::Null) => return Ok(base.clone()),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(RpcError::InvalidParameters {
                method: "analysis/start".to_string(),
                message: "config must be an object".to_string(),
            })
        }
    };

    let mut merged = serde_json::to_value(base)?;
    if let Value::Object(fields) = &mut merged {
        fields.extend(overrides);
    }

    serde_json::from_value(merged).map_err(|e| RpcError::InvalidParameters {
        method: "analysis/start".to_string(),
        message: format!("invalid config: {}", e),
    })
}

/// Helper to parse params with consistent error handling
fn parse_params<T: serde::de::DeserializeOwned>(
    method: &str,
    params: Option<Value>,
) -> RpcResult<T> {
    match params {
        Some(p) => serde_json::from_value(p).map_err(|e| RpcError::InvalidParameters {
            method: method.to_string(),
            message: e.to_string(),
        }),
        None => Err(RpcError::InvalidParameters {
            method: method.to_string(),
            message: "Missing params".to_string(),
        }),
    }
}

/// Parse params, run a controller operation and serialize its result.
async fn execute_handler<P, R, F, Fut>(method: &str, params: Option<Value>, operation: F) -> RpcResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = crate::error::AnalysisResult<R>>,
{
    let params: P = parse_params(method, params)?;
    let result = operation(params).await?;
    serde_json::to_value(result).map_err(RpcError::Json)
}
