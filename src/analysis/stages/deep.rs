use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{to_prompt_json, StageCore, StageKind, StageOutput, StageProcessor};
use crate::analysis::evidence::{Evidence, EvidenceType};
use crate::analysis::types::{
    AnalysisSession, AnalysisStage, Article, ExtractedEntity, ExtractedRelationship,
    ExtractionResult,
};
use crate::error::{StageError, StageResult};
use crate::prompts::DEEP_ANALYSIS_PROMPT;

/// Stage 2: roles, motivations and corruption patterns behind the surface facts.
#[derive(Clone)]
pub struct DeepAnalysisStage {
    core: StageCore,
}

#[derive(Debug, Deserialize)]
struct DeepAnalysisReply {
    #[serde(default)]
    entities: Vec<ExtractedEntity>,
    #[serde(default)]
    relationships: Vec<ExtractedRelationship>,
    #[serde(default)]
    insights: Vec<String>,
    #[serde(default)]
    patterns: Vec<String>,
    #[serde(default)]
    confidence: f64,
}

impl DeepAnalysisStage {
    pub fn new(core: StageCore) -> Self {
        Self { core }
    }
}

#[async_trait]
impl StageProcessor for DeepAnalysisStage {
    fn kind(&self) -> StageKind {
        StageKind::DeepAnalysis
    }

    async fn process(
        &self,
        _session: &AnalysisSession,
        stage: &mut AnalysisStage,
        article: &Article,
        previous_results: &[ExtractionResult],
    ) -> StageResult<StageOutput> {
        let previous = previous_results
            .last()
            .ok_or_else(|| StageError::MissingPreviousResults {
                stage: self.name().to_string(),
                required: 1,
                found: 0,
            })?;

        let user_message = format!(
            "Previous extraction:\n{}\n\nOriginal article:\n{}",
            to_prompt_json(previous, "deep_analysis.previous"),
            article.content
        );

        let reply: DeepAnalysisReply = self
            .core
            .complete_json(self.name(), DEEP_ANALYSIS_PROMPT, user_message)
            .await?;

        let evidence: Vec<Evidence> = reply
            .patterns
            .iter()
            .map(|pattern| {
                Evidence::new(EvidenceType::Pattern, stage.stage, self.name(), pattern)
                    .with_confidence(reply.confidence)
            })
            .collect();

        info!(
            article_id = %article.id,
            patterns = reply.patterns.len(),
            confidence = reply.confidence,
            "Deep analysis completed"
        );

        stage.insights = reply
            .insights
            .into_iter()
            .chain(reply.patterns)
            .collect();
        stage.confidence = reply.confidence;
        stage.results = Some(ExtractionResult {
            entities: reply.entities,
            relationships: reply.relationships,
            confidence: reply.confidence,
        });

        Ok(StageOutput {
            evidence,
            ..StageOutput::default()
        })
    }
}
