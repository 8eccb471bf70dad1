use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{to_prompt_json, StageCore, StageKind, StageOutput, StageProcessor};
use crate::analysis::evidence::{CrossReference, CrossReferenceType, Evidence};
use crate::analysis::types::{
    AnalysisSession, AnalysisStage, Article, ExtractedEntity, ExtractedRelationship,
    ExtractionResult,
};
use crate::error::StageResult;
use crate::prompts::CROSS_REFERENCE_PROMPT;

/// Confidence reported when there is too little to compare.
const SKIPPED_VALIDATION_CONFIDENCE: f64 = 0.8;

/// Stage 3: check earlier stages against each other and link related evidence.
///
/// Needs at least two earlier results. With fewer it passes the latest
/// result through unchanged instead of failing.
#[derive(Clone)]
pub struct CrossReferenceStage {
    core: StageCore,
}

#[derive(Debug, Default, Deserialize)]
struct ValidationScores {
    #[serde(default)]
    consistency_score: f64,
}

#[derive(Debug, Deserialize)]
struct ProposedReference {
    #[serde(rename = "type", default)]
    reference_type: String,
    #[serde(default)]
    from_id: String,
    #[serde(default)]
    to_id: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    strength: f64,
}

#[derive(Debug, Deserialize)]
struct CrossReferenceReply {
    #[serde(default)]
    validation_results: ValidationScores,
    #[serde(default)]
    issues_found: Vec<serde_json::Value>,
    #[serde(default)]
    cross_references: Vec<ProposedReference>,
    #[serde(default)]
    validated_entities: Vec<ExtractedEntity>,
    #[serde(default)]
    validated_relationships: Vec<ExtractedRelationship>,
    #[serde(default)]
    confidence: f64,
}

/// Evidence as shown to the model: enough to cite by id.
#[derive(Serialize)]
struct EvidenceDigest<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    evidence_type: &'a str,
    stage: u32,
    text: &'a str,
}

pub(crate) fn evidence_digest(evidence: &[Evidence]) -> String {
    let digest: Vec<EvidenceDigest<'_>> = evidence
        .iter()
        .map(|e| EvidenceDigest {
            id: &e.id,
            evidence_type: e.evidence_type.as_str(),
            stage: e.stage,
            text: &e.text,
        })
        .collect();
    to_prompt_json(&digest, "evidence_digest")
}

impl CrossReferenceStage {
    pub fn new(core: StageCore) -> Self {
        Self { core }
    }

    fn accept_reference(
        session: &AnalysisSession,
        proposed: ProposedReference,
    ) -> Option<CrossReference> {
        let reference_type = match proposed.reference_type.parse::<CrossReferenceType>() {
            Ok(t) => t,
            Err(e) => {
                debug!(error = %e, "Dropping cross-reference with unknown type");
                return None;
            }
        };

        if proposed.from_id == proposed.to_id
            || session.find_evidence(&proposed.from_id).is_none()
            || session.find_evidence(&proposed.to_id).is_none()
        {
            debug!(
                from_id = %proposed.from_id,
                to_id = %proposed.to_id,
                "Dropping cross-reference to unknown evidence"
            );
            return None;
        }

        Some(CrossReference::new(
            reference_type,
            proposed.from_id,
            proposed.to_id,
            proposed.description,
            proposed.strength,
        ))
    }
}

#[async_trait]
impl StageProcessor for CrossReferenceStage {
    fn kind(&self) -> StageKind {
        StageKind::CrossReference
    }

    async fn process(
        &self,
        session: &AnalysisSession,
        stage: &mut AnalysisStage,
        article: &Article,
        previous_results: &[ExtractionResult],
    ) -> StageResult<StageOutput> {
        if previous_results.len() < 2 {
            info!(
                found = previous_results.len(),
                "Skipping cross-reference validation, not enough earlier stages"
            );
            stage.results = previous_results.last().cloned();
            stage.confidence = SKIPPED_VALIDATION_CONFIDENCE;
            stage.insights =
                vec!["Cross-reference validation skipped - insufficient previous stages".to_string()];
            return Ok(StageOutput::none());
        }

        let user_message = format!(
            "Analysis stages to validate:\n{}\n\nEvidence collected so far:\n{}\n\nOriginal article:\n{}",
            to_prompt_json(&previous_results, "cross_reference.previous"),
            evidence_digest(&session.evidence),
            article.content
        );

        let reply: CrossReferenceReply = self
            .core
            .complete_json(self.name(), CROSS_REFERENCE_PROMPT, user_message)
            .await?;

        let proposed = reply.cross_references.len();
        let cross_references: Vec<CrossReference> = reply
            .cross_references
            .into_iter()
            .filter_map(|r| Self::accept_reference(session, r))
            .collect();

        info!(
            consistency = reply.validation_results.consistency_score,
            issues = reply.issues_found.len(),
            proposed,
            accepted = cross_references.len(),
            "Cross-reference validation completed"
        );

        stage.insights = vec![
            format!(
                "Consistency score: {}",
                reply.validation_results.consistency_score
            ),
            format!("Found {} validation issues", reply.issues_found.len()),
            "Cross-reference validation completed".to_string(),
        ];
        stage.confidence = reply.confidence;
        stage.results = Some(ExtractionResult {
            entities: reply.validated_entities,
            relationships: reply.validated_relationships,
            confidence: reply.confidence,
        });

        Ok(StageOutput {
            cross_references,
            ..StageOutput::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::evidence::EvidenceType;
    use crate::analysis::stages::test_support::{core_replying, core_unused, session, stage_record};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_cross_reference_degrades_with_one_previous_result() {
        let processor = CrossReferenceStage::new(core_unused());
        let session = session();
        let mut stage = stage_record(StageKind::CrossReference, 3);
        let previous = vec![ExtractionResult {
            confidence: 0.4,
            ..ExtractionResult::default()
        }];

        let output = processor
            .process(&session, &mut stage, &session.article, &previous)
            .await
            .unwrap();

        assert!(output.is_empty());
        assert!((stage.confidence - 0.8).abs() < f64::EPSILON);
        assert_eq!(stage.results.as_ref(), previous.last());
        assert_eq!(
            stage.insights,
            vec!["Cross-reference validation skipped - insufficient previous stages".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cross_reference_keeps_only_known_evidence_links() {
        let mut session = session();
        let a = Evidence::new(EvidenceType::Entity, 1, "Surface Extraction", "Jane Doe");
        let b = Evidence::new(EvidenceType::Pattern, 2, "Deep Analysis", "nepotism");
        session.evidence = vec![a.clone(), b.clone()];

        let reply = serde_json::json!({
            "validation_results": {"consistency_score": 0.9, "fact_check_score": 0.8},
            "issues_found": [{"type": "timeline_error", "description": "dates differ", "severity": "low"}],
            "cross_references": [
                {"type": "supports", "from_id": a.id, "to_id": b.id, "description": "same actor", "strength": 0.7},
                {"type": "relate", "from_id": a.id, "to_id": "ghost", "description": "", "strength": 0.5},
                {"type": "sideways", "from_id": a.id, "to_id": b.id, "description": "", "strength": 0.5}
            ],
            "validated_entities": [],
            "validated_relationships": [],
            "confidence": 0.77
        })
        .to_string();

        let processor = CrossReferenceStage::new(core_replying(&reply));
        let mut stage = stage_record(StageKind::CrossReference, 3);
        let previous = vec![ExtractionResult::default(), ExtractionResult::default()];

        let output = processor
            .process(&session, &mut stage, &session.article, &previous)
            .await
            .unwrap();

        assert_eq!(output.cross_references.len(), 1);
        let link = &output.cross_references[0];
        assert_eq!(link.reference_type, CrossReferenceType::Support);
        assert_eq!(link.from_id, a.id);
        assert_eq!(link.to_id, b.id);

        assert_eq!(
            stage.insights,
            vec![
                "Consistency score: 0.9".to_string(),
                "Found 1 validation issues".to_string(),
                "Cross-reference validation completed".to_string(),
            ]
        );
        assert!((stage.confidence - 0.77).abs() < f64::EPSILON);
    }

    #[test]
    fn test_evidence_digest_lists_ids() {
        let e = Evidence::new(EvidenceType::Entity, 1, "Surface Extraction", "Acme Corp");
        let digest = evidence_digest(std::slice::from_ref(&e));
        assert!(digest.contains(&e.id));
        assert!(digest.contains("\"type\": \"entity\""));
    }
}
