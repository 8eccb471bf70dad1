use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// LLM service errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("No response from LLM")]
    EmptyResponse,

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors returned synchronously by the analysis controller
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid analysis config: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Session {session_id} is not running (status: {status})")]
    SessionNotRunning { session_id: String, status: String },
}

/// Errors raised while a stage processor runs.
///
/// These are recorded on the stage record and surface to callers only as a
/// `failed` session status.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Stage {stage} requires {required} previous result(s), found {found}")]
    MissingPreviousResults {
        stage: String,
        required: usize,
        found: usize,
    },

    #[error("LLM generation failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Failed to parse LLM response: {message}")]
    Parse { message: String },

    #[error("Stage timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
}

/// JSON-RPC transport errors
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown method: {method}")]
    UnknownMethod { method: String },

    #[error("Invalid parameters for {method}: {message}")]
    InvalidParameters { method: String, message: String },

    #[error("Execution failed: {0}")]
    ExecutionFailed(#[from] AnalysisError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RpcError {
    /// JSON-RPC 2.0 error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            RpcError::InvalidRequest { .. } => -32600,
            RpcError::UnknownMethod { .. } => -32601,
            RpcError::InvalidParameters { .. } => -32602,
            RpcError::ExecutionFailed(AnalysisError::InvalidConfig { .. }) => -32602,
            RpcError::ExecutionFailed(AnalysisError::SessionNotFound { .. }) => -32004,
            RpcError::ExecutionFailed(AnalysisError::SessionNotRunning { .. }) => -32009,
            RpcError::Json(_) => -32603,
        }
    }
}

impl From<serde_json::Error> for StageError {
    fn from(err: serde_json::Error) -> Self {
        StageError::Parse {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Result type alias for controller operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Result type alias for stage processing
pub type StageResult<T> = Result<T, StageError>;

/// Result type alias for JSON-RPC handling
pub type RpcResult<T> = Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(err.to_string(), "LLM unavailable: server down (retries: 3)");

        let err = LlmError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = LlmError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");

        assert_eq!(LlmError::EmptyResponse.to_string(), "No response from LLM");
    }

    #[test]
    fn test_analysis_error_display() {
        let err = AnalysisError::InvalidConfig {
            field: "depth".to_string(),
            reason: "must be between 2 and 10".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid analysis config: depth - must be between 2 and 10"
        );

        let err = AnalysisError::SessionNotFound {
            session_id: "sess-123".to_string(),
        };
        assert_eq!(err.to_string(), "Session not found: sess-123");

        let err = AnalysisError::SessionNotRunning {
            session_id: "sess-1".to_string(),
            status: "completed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Session sess-1 is not running (status: completed)"
        );
    }

    #[test]
    fn test_stage_error_display() {
        let err = StageError::MissingPreviousResults {
            stage: "Deep Analysis".to_string(),
            required: 1,
            found: 0,
        };
        assert_eq!(
            err.to_string(),
            "Stage Deep Analysis requires 1 previous result(s), found 0"
        );

        let err = StageError::TimedOut { timeout_ms: 250 };
        assert_eq!(err.to_string(), "Stage timed out after 250ms");

        let err: StageError = LlmError::EmptyResponse.into();
        assert_eq!(err.to_string(), "LLM generation failed: No response from LLM");
    }

    #[test]
    fn test_stage_error_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: StageError = json_err.into();
        assert!(matches!(err, StageError::Parse { .. }));
        assert!(err.to_string().starts_with("Failed to parse LLM response"));
    }

    #[test]
    fn test_rpc_error_display() {
        let err = RpcError::UnknownMethod {
            method: "analysis/unknown".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown method: analysis/unknown");

        let err = RpcError::InvalidParameters {
            method: "analysis/get".to_string(),
            message: "missing sessionId".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid parameters for analysis/get: missing sessionId"
        );
    }

    #[test]
    fn test_analysis_error_conversion_to_rpc_error() {
        let err: RpcError = AnalysisError::SessionNotFound {
            session_id: "x".to_string(),
        }
        .into();
        assert!(matches!(err, RpcError::ExecutionFailed(_)));
        assert!(err.to_string().contains("Session not found"));
    }

    #[test]
    fn test_rpc_error_codes() {
        let not_found: RpcError = AnalysisError::SessionNotFound {
            session_id: "x".to_string(),
        }
        .into();
        assert_eq!(not_found.code(), -32004);

        let not_running: RpcError = AnalysisError::SessionNotRunning {
            session_id: "x".to_string(),
            status: "failed".to_string(),
        }
        .into();
        assert_eq!(not_running.code(), -32009);

        let invalid: RpcError = AnalysisError::InvalidConfig {
            field: "depth".to_string(),
            reason: "too deep".to_string(),
        }
        .into();
        assert_eq!(invalid.code(), -32602);

        let unknown = RpcError::UnknownMethod {
            method: "x".to_string(),
        };
        assert_eq!(unknown.code(), -32601);
    }

    #[test]
    fn test_llm_error_conversion_to_app_error() {
        let app_err: AppError = LlmError::Timeout { timeout_ms: 1000 }.into();
        assert!(matches!(app_err, AppError::Llm(_)));
    }

    #[test]
    fn test_analysis_error_conversion_to_app_error() {
        let app_err: AppError = AnalysisError::SessionNotFound {
            session_id: "test-123".to_string(),
        }
        .into();
        assert!(matches!(app_err, AppError::Analysis(_)));
    }
}
