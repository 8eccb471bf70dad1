use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use super::{to_prompt_json, StageCore, StageKind, StageOutput, StageProcessor};
use crate::analysis::evidence::{Evidence, EvidenceChain, Hypothesis};
use crate::analysis::types::{
    AnalysisSession, AnalysisStage, Article, ExtractedEntity, ExtractedRelationship,
    ExtractionResult,
};
use crate::error::StageResult;
use crate::prompts::RECURSIVE_REFINEMENT_PROMPT;

/// Stage 5: final synthesis over everything gathered so far.
///
/// Also chains each hypothesis to the evidence it rests on.
#[derive(Clone)]
pub struct RecursiveRefinementStage {
    core: StageCore,
}

#[derive(Debug, Default, Deserialize)]
struct ConfidenceAssessment {
    #[serde(default)]
    overall_confidence: Option<f64>,
    #[serde(default)]
    data_quality: Option<String>,
    #[serde(default)]
    evidence_strength: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefinementReply {
    #[serde(default)]
    final_entities: Vec<ExtractedEntity>,
    #[serde(default)]
    final_relationships: Vec<ExtractedRelationship>,
    #[serde(default)]
    key_insights: Vec<String>,
    #[serde(default)]
    corruption_indicators: BTreeMap<String, Vec<serde_json::Value>>,
    #[serde(default)]
    confidence_assessment: ConfidenceAssessment,
    #[serde(default)]
    next_steps: Vec<String>,
    #[serde(default)]
    confidence: f64,
}

#[derive(Serialize)]
struct RefinementContext<'a> {
    previous_results: &'a [ExtractionResult],
    hypotheses: &'a [Hypothesis],
    evidence: &'a [Evidence],
}

impl RecursiveRefinementStage {
    pub fn new(core: StageCore) -> Self {
        Self { core }
    }

    fn assessment_line(assessment: &ConfidenceAssessment) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(overall) = assessment.overall_confidence {
            parts.push(format!("overall {}", overall));
        }
        if let Some(quality) = &assessment.data_quality {
            parts.push(format!("data quality {}", quality));
        }
        if let Some(strength) = &assessment.evidence_strength {
            parts.push(format!("evidence strength {}", strength));
        }
        if parts.is_empty() {
            None
        } else {
            Some(format!("Confidence assessment: {}", parts.join(", ")))
        }
    }
}

#[async_trait]
impl StageProcessor for RecursiveRefinementStage {
    fn kind(&self) -> StageKind {
        StageKind::RecursiveRefinement
    }

    async fn process(
        &self,
        session: &AnalysisSession,
        stage: &mut AnalysisStage,
        article: &Article,
        previous_results: &[ExtractionResult],
    ) -> StageResult<StageOutput> {
        let context = RefinementContext {
            previous_results,
            hypotheses: &session.hypotheses,
            evidence: &session.evidence,
        };
        let user_message = format!(
            "Complete analysis so far:\n{}\n\nOriginal article:\n{}",
            to_prompt_json(&context, "refinement.context"),
            article.content
        );

        let reply: RefinementReply = self
            .core
            .complete_json(self.name(), RECURSIVE_REFINEMENT_PROMPT, user_message)
            .await?;

        let evidence_chains: Vec<EvidenceChain> = session
            .hypotheses
            .iter()
            .filter_map(|h| EvidenceChain::from_hypothesis(h, &session.evidence))
            .collect();

        let indicator_count: usize = reply.corruption_indicators.values().map(Vec::len).sum();

        info!(
            insights = reply.key_insights.len(),
            indicators = indicator_count,
            chains = evidence_chains.len(),
            confidence = reply.confidence,
            "Recursive refinement completed"
        );

        let mut insights = reply.key_insights;
        if let Some(line) = Self::assessment_line(&reply.confidence_assessment) {
            insights.push(line);
        }
        if indicator_count > 0 {
            let categories: Vec<&str> = reply
                .corruption_indicators
                .iter()
                .filter(|(_, items)| !items.is_empty())
                .map(|(name, _)| name.as_str())
                .collect();
            insights.push(format!(
                "Found {} corruption indicators ({})",
                indicator_count,
                categories.join(", ")
            ));
        }
        insights.extend(reply.next_steps.into_iter().map(|s| format!("Next step: {}", s)));

        stage.insights = insights;
        stage.confidence = reply.confidence;
        stage.results = Some(ExtractionResult {
            entities: reply.final_entities,
            relationships: reply.final_relationships,
            confidence: reply.confidence,
        });

        Ok(StageOutput {
            evidence_chains,
            ..StageOutput::default()
        })
    }
}
