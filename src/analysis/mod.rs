//! Sequential multi-stage article analysis.
//!
//! An [`AnalysisController`] owns a registry of [`AnalysisSession`]s. Starting
//! a session spawns a task that feeds the article through the stage
//! processors in [`stages`] one at a time, enforcing the session's depth,
//! per-stage timeout and confidence gate. Sessions stay queryable and
//! cancellable while that task runs.

mod config;
mod controller;
mod evidence;
pub mod stages;
mod types;

pub use config::{validate_depth, AnalysisConfig, MAX_DEPTH, MIN_DEPTH, PIPELINE_STAGES};
pub use controller::AnalysisController;
pub use evidence::{
    resolve_citations, CrossReference, CrossReferenceType, Evidence, EvidenceChain, EvidenceType,
    Hypothesis, HypothesisStatus,
};
pub use stages::{default_processors, StageKind, StageOutput, StageProcessor};
pub use types::{
    AnalysisSession, AnalysisStage, Article, EntityMention, ExtractedEntity,
    ExtractedRelationship, ExtractionResult, SessionStatus, StageStatus,
};
