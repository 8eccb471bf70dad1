//! Session, stage and extraction data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::config::AnalysisConfig;
use super::evidence::{CrossReference, Evidence, EvidenceChain, Hypothesis};

/// Input article, read-only for the whole pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Article identifier.
    #[serde(default)]
    pub id: String,
    /// Source URL.
    #[serde(default)]
    pub url: String,
    /// Article title.
    #[serde(default)]
    pub title: String,
    /// Cleaned article text.
    pub content: String,
    /// Free-form metadata from the scraper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Article {
    /// Create an article with a generated id.
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url: url.into(),
            title: title.into(),
            content: content.into(),
            metadata: None,
        }
    }
}

/// Entity extracted from an article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedEntity {
    pub id: String,
    #[serde(rename = "type", default)]
    pub entity_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub mentions: Vec<EntityMention>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_at: Option<DateTime<Utc>>,
}

/// A mention of an entity in the article text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub context: String,
}

/// Relationship between two extracted entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRelationship {
    pub id: String,
    #[serde(rename = "type", default)]
    pub relationship_type: String,
    #[serde(default)]
    pub from_id: String,
    #[serde(default)]
    pub to_id: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_at: Option<DateTime<Utc>>,
}

/// Structured output every stage consumes and produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub relationships: Vec<ExtractedRelationship>,
    #[serde(default)]
    pub confidence: f64,
}

/// Models sometimes echo placeholders ("same_as_before") where a list is
/// expected; anything that is not a list of mentions becomes empty.
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Terminated,
    Failed,
}

impl SessionStatus {
    /// Get the status as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Terminated => "terminated",
            SessionStatus::Failed => "failed",
        }
    }

    /// Terminal states are absorbing.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a single stage record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StageStatus {
    /// Get the status as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Record of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStage {
    /// 1-based position in the pipeline.
    pub stage: u32,
    pub name: String,
    pub description: String,
    pub status: StageStatus,
    /// Meaningful only when `status == completed`.
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<ExtractionResult>,
    pub insights: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisStage {
    fn blank(stage: u32, name: &str, description: &str, status: StageStatus) -> Self {
        Self {
            stage,
            name: name.to_string(),
            description: description.to_string(),
            status,
            confidence: 0.0,
            results: None,
            insights: Vec::new(),
            questions: Vec::new(),
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// A record for a stage that is about to execute.
    pub fn running(stage: u32, name: &str, description: &str) -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Self::blank(stage, name, description, StageStatus::Running)
        }
    }

    /// A record for a stage that will not execute.
    pub fn skipped(stage: u32, name: &str, description: &str, reason: impl Into<String>) -> Self {
        let mut record = Self::blank(stage, name, description, StageStatus::Skipped);
        record.insights.push(reason.into());
        record
    }

    /// Mark the stage completed.
    pub fn complete(&mut self) {
        self.status = StageStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the stage failed with `error`.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = StageStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }
}

/// One end-to-end analysis run over one article.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSession {
    pub id: String,
    pub article: Article,
    pub config: AnalysisConfig,
    pub stages: Vec<AnalysisStage>,
    pub evidence: Vec<Evidence>,
    pub hypotheses: Vec<Hypothesis>,
    pub cross_references: Vec<CrossReference>,
    pub evidence_chains: Vec<EvidenceChain>,
    /// Results of completed stages, in stage order.
    pub results: Vec<ExtractionResult>,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisSession {
    /// Create a running session with no stage records.
    pub fn new(article: Article, config: AnalysisConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            article,
            config,
            stages: Vec::new(),
            evidence: Vec::new(),
            hypotheses: Vec::new(),
            cross_references: Vec::new(),
            evidence_chains: Vec::new(),
            results: Vec::new(),
            status: SessionStatus::Running,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Refresh `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Append a stage record.
    pub fn push_stage(&mut self, stage: AnalysisStage) {
        self.stages.push(stage);
        self.touch();
    }

    /// Replace the most recent stage record.
    pub(crate) fn replace_last_stage(&mut self, stage: AnalysisStage) {
        if let Some(last) = self.stages.last_mut() {
            *last = stage;
        }
        self.touch();
    }

    /// Move to a terminal status. Returns false if already terminal.
    pub(crate) fn finish(&mut self, status: SessionStatus, error: Option<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.error = error;
        let now = Utc::now();
        self.completed_at = Some(now);
        self.updated_at = now;
        true
    }

    /// Stages that actually executed (anything but `skipped`).
    pub fn executed_stages(&self) -> impl Iterator<Item = &AnalysisStage> {
        self.stages
            .iter()
            .filter(|s| s.status != StageStatus::Skipped)
    }

    /// Most recent completed stage result.
    pub fn latest_result(&self) -> Option<&ExtractionResult> {
        self.results.last()
    }

    /// Look up an evidence item by id.
    pub fn find_evidence(&self, id: &str) -> Option<&Evidence> {
        self.evidence.iter().find(|e| e.id == id)
    }

    /// Look up a hypothesis by id.
    pub fn find_hypothesis(&self, id: &str) -> Option<&Hypothesis> {
        self.hypotheses.iter().find(|h| h.id == id)
    }

    /// Hypotheses that rest on the given evidence.
    pub fn hypotheses_citing<'a>(&'a self, evidence_id: &'a str) -> impl Iterator<Item = &'a Hypothesis> {
        self.hypotheses
            .iter()
            .filter(move |h| h.evidence.iter().any(|id| id == evidence_id))
    }

    /// Cross-references touching the given evidence on either end.
    pub fn cross_references_for<'a>(
        &'a self,
        evidence_id: &'a str,
    ) -> impl Iterator<Item = &'a CrossReference> {
        self.cross_references
            .iter()
            .filter(move |r| r.from_id == evidence_id || r.to_id == evidence_id)
    }
}
