use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::cross_reference::evidence_digest;
use super::{to_prompt_json, StageCore, StageKind, StageOutput, StageProcessor};
use crate::analysis::evidence::{resolve_citations, Hypothesis};
use crate::analysis::types::{AnalysisSession, AnalysisStage, Article, ExtractionResult};
use crate::error::{StageError, StageResult};
use crate::prompts::HYPOTHESIS_GENERATION_PROMPT;

/// Stage 4: candidate explanations, information gaps and follow-up questions.
#[derive(Clone)]
pub struct HypothesisGenerationStage {
    core: StageCore,
}

#[derive(Debug, Deserialize)]
struct ProposedHypothesis {
    #[serde(default)]
    id: Option<String>,
    description: String,
    #[serde(rename = "type", default)]
    hypothesis_type: Option<String>,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    supporting_evidence: Vec<String>,
    #[serde(default)]
    contradicting_evidence: Vec<String>,
    #[serde(default)]
    required_evidence: Vec<String>,
    #[serde(default)]
    implications: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct HypothesisReply {
    #[serde(default)]
    hypotheses: Vec<ProposedHypothesis>,
    #[serde(default)]
    missing_information: Vec<serde_json::Value>,
    #[serde(default)]
    follow_up_questions: Vec<String>,
    #[serde(default)]
    confidence: f64,
}

impl HypothesisGenerationStage {
    pub fn new(core: StageCore) -> Self {
        Self { core }
    }

    fn build_hypothesis(
        stage: u32,
        session: &AnalysisSession,
        proposed: ProposedHypothesis,
    ) -> Hypothesis {
        let evidence = resolve_citations(&proposed.supporting_evidence, &session.evidence);
        let mut hypothesis = Hypothesis::new(stage, proposed.description, proposed.confidence)
            .with_evidence(evidence)
            .with_metadata("supportingEvidence", json!(proposed.supporting_evidence))
            .with_metadata("contradictingEvidence", json!(proposed.contradicting_evidence))
            .with_metadata("requiredEvidence", json!(proposed.required_evidence))
            .with_metadata("implications", json!(proposed.implications));

        if let Some(kind) = proposed.hypothesis_type {
            hypothesis = hypothesis.with_metadata("hypothesisType", json!(kind));
        }
        if let Some(source_id) = proposed.id {
            hypothesis = hypothesis.with_metadata("sourceId", json!(source_id));
        }
        hypothesis
    }
}

#[async_trait]
impl StageProcessor for HypothesisGenerationStage {
    fn kind(&self) -> StageKind {
        StageKind::HypothesisGeneration
    }

    async fn process(
        &self,
        session: &AnalysisSession,
        stage: &mut AnalysisStage,
        article: &Article,
        previous_results: &[ExtractionResult],
    ) -> StageResult<StageOutput> {
        let latest = previous_results
            .last()
            .ok_or_else(|| StageError::MissingPreviousResults {
                stage: self.name().to_string(),
                required: 1,
                found: 0,
            })?;

        let user_message = format!(
            "Analysis so far:\n{}\n\nEvidence (cite by id):\n{}\n\nOriginal article:\n{}",
            to_prompt_json(&previous_results, "hypothesis.previous"),
            evidence_digest(&session.evidence),
            article.content
        );

        let reply: HypothesisReply = self
            .core
            .complete_json(self.name(), HYPOTHESIS_GENERATION_PROMPT, user_message)
            .await?;

        let hypotheses: Vec<Hypothesis> = reply
            .hypotheses
            .into_iter()
            .map(|h| Self::build_hypothesis(stage.stage, session, h))
            .collect();

        info!(
            hypotheses = hypotheses.len(),
            gaps = reply.missing_information.len(),
            questions = reply.follow_up_questions.len(),
            "Hypothesis generation completed"
        );

        let mut insights = vec![
            format!("Generated {} hypotheses", hypotheses.len()),
            format!(
                "Identified {} information gaps",
                reply.missing_information.len()
            ),
        ];
        insights.extend(reply.follow_up_questions.iter().cloned());

        stage.insights = insights;
        stage.questions = reply.follow_up_questions;
        stage.confidence = reply.confidence;
        stage.results = Some(latest.clone());

        Ok(StageOutput {
            hypotheses,
            ..StageOutput::default()
        })
    }
}
