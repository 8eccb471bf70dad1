//! Per-session analysis configuration and its validation rules.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AnalysisError, AnalysisResult};

/// Minimum accepted analysis depth.
pub const MIN_DEPTH: u32 = 2;
/// Maximum accepted analysis depth.
pub const MAX_DEPTH: u32 = 10;
/// Number of stages the pipeline defines.
pub const PIPELINE_STAGES: u32 = 5;

/// Configuration for one analysis session.
///
/// Immutable once the session starts, except `depth`, which may be updated
/// while the session is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    /// Upper bound on how many stages execute (2-10).
    #[serde(default = "default_depth")]
    pub depth: u32,
    /// Total stages defined by the pipeline.
    #[serde(default = "default_max_stages")]
    pub max_stages: u32,
    /// Minimum per-stage confidence required to continue (0.0-1.0).
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Wall-clock budget for one stage, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_per_stage_ms: u64,
    /// Run the cross-reference validation stage.
    #[serde(default = "default_true")]
    pub enable_cross_reference: bool,
    /// Run the hypothesis generation stage.
    #[serde(default = "default_true")]
    pub enable_hypotheses: bool,
}

fn default_depth() -> u32 {
    3
}

fn default_max_stages() -> u32 {
    PIPELINE_STAGES
}

fn default_confidence_threshold() -> f64 {
    0.6
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            depth: default_depth(),
            max_stages: default_max_stages(),
            confidence_threshold: default_confidence_threshold(),
            timeout_per_stage_ms: default_timeout_ms(),
            enable_cross_reference: true,
            enable_hypotheses: true,
        }
    }
}

impl AnalysisConfig {
    /// Per-stage deadline as a [`Duration`].
    pub fn timeout_per_stage(&self) -> Duration {
        Duration::from_millis(self.timeout_per_stage_ms)
    }

    /// Number of stages eligible to run given `depth`, `max_stages` and the
    /// number of available processors.
    pub fn stage_limit(&self, available: usize) -> usize {
        (self.depth.min(self.max_stages) as usize).min(available)
    }

    /// Validate the configuration before a session is created.
    pub fn validate(&self) -> AnalysisResult<()> {
        validate_depth(self.depth)?;

        if self.max_stages == 0 || self.max_stages > PIPELINE_STAGES {
            return Err(invalid(
                "maxStages",
                format!("must be between 1 and {}", PIPELINE_STAGES),
            ));
        }

        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(invalid(
                "confidenceThreshold",
                "must be between 0.0 and 1.0",
            ));
        }

        if self.timeout_per_stage_ms == 0 {
            return Err(invalid("timeoutPerStageMs", "must be greater than zero"));
        }

        Ok(())
    }

    /// Set the analysis depth (not validated until [`validate`](Self::validate)).
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Set the confidence gate, clamped to 0.0-1.0.
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the per-stage deadline.
    pub fn with_timeout_per_stage(mut self, timeout: Duration) -> Self {
        self.timeout_per_stage_ms = timeout.as_millis() as u64;
        self
    }

    /// Enable or disable cross-reference validation.
    pub fn with_cross_reference(mut self, enabled: bool) -> Self {
        self.enable_cross_reference = enabled;
        self
    }

    /// Enable or disable hypothesis generation.
    pub fn with_hypotheses(mut self, enabled: bool) -> Self {
        self.enable_hypotheses = enabled;
        self
    }
}

/// Check a depth value against the accepted range.
pub fn validate_depth(depth: u32) -> AnalysisResult<()> {
    if !(MIN_DEPTH..=MAX_DEPTH).contains(&depth) {
        return Err(invalid(
            "depth",
            format!("must be between {} and {}, got {}", MIN_DEPTH, MAX_DEPTH, depth),
        ));
    }
    Ok(())
}

fn invalid(field: &str, reason: impl Into<String>) -> AnalysisError {
    AnalysisError::InvalidConfig {
        field: field.to_string(),
        reason: reason.into(),
    }
}
