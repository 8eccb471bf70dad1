use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use super::{StageCore, StageKind, StageOutput, StageProcessor};
use crate::analysis::evidence::{Evidence, EvidenceType};
use crate::analysis::types::{
    AnalysisSession, AnalysisStage, Article, ExtractedEntity, ExtractionResult,
};
use crate::error::StageResult;
use crate::prompts::SURFACE_EXTRACTION_PROMPT;

/// Stage 1: pull entities and relationships straight out of the article.
#[derive(Clone)]
pub struct SurfaceExtractionStage {
    core: StageCore,
}

impl SurfaceExtractionStage {
    pub fn new(core: StageCore) -> Self {
        Self { core }
    }

    fn build_user_message(article: &Article) -> String {
        format!(
            "Extract entities and relationships from this article.\n\nTitle: {}\nURL: {}\n\nContent:\n{}",
            article.title, article.url, article.content
        )
    }

    fn entity_evidence(stage: u32, source: &str, entity: &ExtractedEntity) -> Evidence {
        let context = entity
            .mentions
            .first()
            .map(|m| m.context.clone())
            .or_else(|| {
                entity
                    .properties
                    .get("description")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_default();

        Evidence::new(EvidenceType::Entity, stage, source, &entity.name)
            .with_entity(&entity.id)
            .with_context(context)
            .with_confidence(entity.confidence)
            .with_metadata("entityType", serde_json::json!(entity.entity_type))
    }
}

#[async_trait]
impl StageProcessor for SurfaceExtractionStage {
    fn kind(&self) -> StageKind {
        StageKind::SurfaceExtraction
    }

    async fn process(
        &self,
        _session: &AnalysisSession,
        stage: &mut AnalysisStage,
        article: &Article,
        _previous_results: &[ExtractionResult],
    ) -> StageResult<StageOutput> {
        let mut result: ExtractionResult = self
            .core
            .complete_json(
                self.name(),
                SURFACE_EXTRACTION_PROMPT,
                Self::build_user_message(article),
            )
            .await?;

        let now = Utc::now();
        for entity in &mut result.entities {
            entity.article_id = Some(article.id.clone());
            entity.extracted_at = Some(now);
        }
        for relationship in &mut result.relationships {
            relationship.article_id = Some(article.id.clone());
            relationship.extracted_at = Some(now);
        }

        let mut evidence: Vec<Evidence> = result
            .entities
            .iter()
            .map(|entity| Self::entity_evidence(stage.stage, self.name(), entity))
            .collect();

        for relationship in &result.relationships {
            let name_of = |id: &str| {
                result
                    .entities
                    .iter()
                    .find(|e| e.id == id)
                    .map(|e| e.name.clone())
                    .unwrap_or_else(|| id.to_string())
            };
            let text = format!(
                "{} {} {}",
                name_of(&relationship.from_id),
                relationship.relationship_type,
                name_of(&relationship.to_id)
            );
            evidence.push(
                Evidence::new(EvidenceType::Relationship, stage.stage, self.name(), text)
                    .with_entity(&relationship.from_id)
                    .with_context(&relationship.context)
                    .with_confidence(relationship.confidence)
                    .with_metadata("relationshipId", serde_json::json!(relationship.id))
                    .with_metadata("toId", serde_json::json!(relationship.to_id)),
            );
        }

        info!(
            article_id = %article.id,
            entities = result.entities.len(),
            relationships = result.relationships.len(),
            confidence = result.confidence,
            "Surface extraction completed"
        );

        stage.insights = vec![
            format!(
                "Extracted {} entities and {} relationships",
                result.entities.len(),
                result.relationships.len()
            ),
            "Initial extraction complete with basic entity recognition".to_string(),
        ];
        stage.confidence = result.confidence;
        stage.results = Some(result);

        Ok(StageOutput {
            evidence,
            ..StageOutput::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::stages::test_support::{
        article, core_failing, core_replying, session, stage_record,
    };
    use crate::error::StageError;
    use pretty_assertions::assert_eq;

    const REPLY: &str = r#"{
        "entities": [
            {"id": "e1", "type": "person", "name": "Jane Doe", "properties": {"role": "minister"},
             "confidence": 0.9, "mentions": [{"text": "Jane Doe", "context": "Minister Jane Doe awarded"}]},
            {"id": "e2", "type": "organization", "name": "Acme Corp", "properties": {"description": "contractor"},
             "confidence": 0.8, "mentions": []}
        ],
        "relationships": [
            {"id": "r1", "type": "payment", "fromId": "e1", "toId": "e2", "confidence": 0.7,
             "context": "awarded a $2M contract"}
        ],
        "confidence": 0.85
    }"#;

    #[tokio::test]
    async fn test_surface_extraction_populates_stage_and_evidence() {
        let processor = SurfaceExtractionStage::new(core_replying(REPLY));
        let session = session();
        let mut stage = stage_record(StageKind::SurfaceExtraction, 1);

        let output = processor
            .process(&session, &mut stage, &session.article, &[])
            .await
            .unwrap();

        assert!((stage.confidence - 0.85).abs() < f64::EPSILON);
        assert_eq!(
            stage.insights,
            vec![
                "Extracted 2 entities and 1 relationships".to_string(),
                "Initial extraction complete with basic entity recognition".to_string(),
            ]
        );

        let result = stage.results.as_ref().unwrap();
        assert!(result
            .entities
            .iter()
            .all(|e| e.article_id.as_deref() == Some(session.article.id.as_str())));
        assert!(result.relationships[0].extracted_at.is_some());

        assert_eq!(output.evidence.len(), 3);
        let jane = &output.evidence[0];
        assert_eq!(jane.evidence_type, EvidenceType::Entity);
        assert_eq!(jane.stage, 1);
        assert_eq!(jane.entity_id.as_deref(), Some("e1"));
        assert_eq!(jane.context, "Minister Jane Doe awarded");
        assert_eq!(output.evidence[1].context, "contractor");

        let payment = &output.evidence[2];
        assert_eq!(payment.evidence_type, EvidenceType::Relationship);
        assert_eq!(payment.text, "Jane Doe payment Acme Corp");
        assert!(output.hypotheses.is_empty());
    }

    #[tokio::test]
    async fn test_surface_extraction_parse_failure() {
        let processor = SurfaceExtractionStage::new(core_replying("not json at all"));
        let session = session();
        let mut stage = stage_record(StageKind::SurfaceExtraction, 1);

        let err = processor
            .process(&session, &mut stage, &article(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Parse { .. }));
        assert!(stage.results.is_none());
    }

    #[tokio::test]
    async fn test_surface_extraction_llm_failure() {
        let processor = SurfaceExtractionStage::new(core_failing());
        let session = session();
        let mut stage = stage_record(StageKind::SurfaceExtraction, 1);

        let err = processor
            .process(&session, &mut stage, &session.article, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Llm(_)));
    }
}
