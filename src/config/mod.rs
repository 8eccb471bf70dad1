use std::env;
use std::str::FromStr;

use crate::analysis::AnalysisConfig;
use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub analysis: AnalysisConfig,
}

/// LLM service configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f64>,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let llm = LlmConfig {
            base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            api_key: env::var("LLM_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "local-model".to_string()),
            temperature: parse_var("LLM_TEMPERATURE"),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let defaults = RequestConfig::default();
        let request = RequestConfig {
            timeout_ms: parse_var("REQUEST_TIMEOUT_MS").unwrap_or(defaults.timeout_ms),
            max_retries: parse_var("MAX_RETRIES").unwrap_or(defaults.max_retries),
            retry_delay_ms: parse_var("RETRY_DELAY_MS").unwrap_or(defaults.retry_delay_ms),
        };

        let base = AnalysisConfig::default();
        let analysis = AnalysisConfig {
            depth: parse_var("ANALYSIS_DEPTH").unwrap_or(base.depth),
            max_stages: parse_var("ANALYSIS_MAX_STAGES").unwrap_or(base.max_stages),
            confidence_threshold: parse_var("ANALYSIS_CONFIDENCE_THRESHOLD")
                .unwrap_or(base.confidence_threshold),
            timeout_per_stage_ms: parse_var("ANALYSIS_STAGE_TIMEOUT_MS")
                .unwrap_or(base.timeout_per_stage_ms),
            enable_cross_reference: parse_var("ANALYSIS_ENABLE_CROSS_REFERENCE")
                .unwrap_or(base.enable_cross_reference),
            enable_hypotheses: parse_var("ANALYSIS_ENABLE_HYPOTHESES")
                .unwrap_or(base.enable_hypotheses),
        };

        analysis.validate().map_err(|e| AppError::Config {
            message: format!("default analysis config: {}", e),
        })?;

        Ok(Config {
            llm,
            logging,
            request,
            analysis,
        })
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            max_retries: 2,
            retry_delay_ms: 1000,
        }
    }
}
