//! Stage processors.
//!
//! The pipeline runs five processors in fixed order:
//! - [`SurfaceExtractionStage`]: entities, relationships and time references
//! - [`DeepAnalysisStage`]: roles, motivations and corruption patterns
//! - [`CrossReferenceStage`]: consistency checks across earlier stages
//! - [`HypothesisGenerationStage`]: candidate explanations and open questions
//! - [`RecursiveRefinementStage`]: final synthesis
//!
//! All processors share LLM access through [`StageCore`].

mod core;
mod cross_reference;
mod deep;
mod hypothesis;
mod refinement;
mod surface;

pub use self::core::*;
pub use cross_reference::*;
pub use deep::*;
pub use hypothesis::*;
pub use refinement::*;
pub use surface::*;

use async_trait::async_trait;
use std::sync::Arc;

use super::config::AnalysisConfig;
use super::evidence::{CrossReference, Evidence, EvidenceChain, Hypothesis};
use super::types::{AnalysisSession, AnalysisStage, Article, ExtractionResult};
use crate::error::StageResult;
use crate::llm::LlmProvider;

/// The five pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    SurfaceExtraction,
    DeepAnalysis,
    CrossReference,
    HypothesisGeneration,
    RecursiveRefinement,
}

impl StageKind {
    /// All stages in pipeline order.
    pub const ALL: [StageKind; 5] = [
        StageKind::SurfaceExtraction,
        StageKind::DeepAnalysis,
        StageKind::CrossReference,
        StageKind::HypothesisGeneration,
        StageKind::RecursiveRefinement,
    ];

    /// Display name recorded on stage records.
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::SurfaceExtraction => "Surface Extraction",
            StageKind::DeepAnalysis => "Deep Analysis",
            StageKind::CrossReference => "Cross-Reference Validation",
            StageKind::HypothesisGeneration => "Hypothesis Generation",
            StageKind::RecursiveRefinement => "Recursive Refinement",
        }
    }

    /// Human-readable description recorded on stage records.
    pub fn description(&self) -> &'static str {
        match self {
            StageKind::SurfaceExtraction => {
                "Extract basic entities, relationships, and temporal information from the article"
            }
            StageKind::DeepAnalysis => {
                "Analyze entity roles, relationship strengths, motivations, and patterns"
            }
            StageKind::CrossReference => {
                "Check internal consistency, identify conflicts, and validate against known patterns"
            }
            StageKind::HypothesisGeneration => {
                "Generate possible explanations, identify missing information, and suggest follow-up investigations"
            }
            StageKind::RecursiveRefinement => {
                "Perform additional refinement and synthesis of all previous analysis"
            }
        }
    }

    /// Whether the configuration lets this stage run.
    pub fn is_enabled(&self, config: &AnalysisConfig) -> bool {
        match self {
            StageKind::CrossReference => config.enable_cross_reference,
            StageKind::HypothesisGeneration => config.enable_hypotheses,
            _ => true,
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Records a stage contributes to the session besides its own stage record.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    pub evidence: Vec<Evidence>,
    pub hypotheses: Vec<Hypothesis>,
    pub cross_references: Vec<CrossReference>,
    pub evidence_chains: Vec<EvidenceChain>,
}

impl StageOutput {
    /// Output with nothing to append.
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether there is nothing to append.
    pub fn is_empty(&self) -> bool {
        self.evidence.is_empty()
            && self.hypotheses.is_empty()
            && self.cross_references.is_empty()
            && self.evidence_chains.is_empty()
    }
}

/// One unit of work in the pipeline.
///
/// Implementations fill in the `stage` record (results, confidence,
/// insights, questions) and return what should be appended to the session.
/// `session` is a read-only snapshot taken when the stage started.
#[async_trait]
pub trait StageProcessor: Send + Sync {
    /// Which pipeline stage this processor implements.
    fn kind(&self) -> StageKind;

    /// Display name.
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Description.
    fn description(&self) -> &'static str {
        self.kind().description()
    }

    /// Run the stage.
    async fn process(
        &self,
        session: &AnalysisSession,
        stage: &mut AnalysisStage,
        article: &Article,
        previous_results: &[ExtractionResult],
    ) -> StageResult<StageOutput>;
}

/// The standard five-stage pipeline sharing one LLM provider.
pub fn default_processors(llm: Arc<dyn LlmProvider>) -> Vec<Arc<dyn StageProcessor>> {
    let core = StageCore::new(llm);
    let processors: [Arc<dyn StageProcessor>; 5] = [
        Arc::new(SurfaceExtractionStage::new(core.clone())),
        Arc::new(DeepAnalysisStage::new(core.clone())),
        Arc::new(CrossReferenceStage::new(core.clone())),
        Arc::new(HypothesisGenerationStage::new(core.clone())),
        Arc::new(RecursiveRefinementStage::new(core)),
    ];
    processors.into()
}
