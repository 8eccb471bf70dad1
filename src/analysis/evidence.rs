//! Evidence, hypotheses and the links between them.
//!
//! These are plain records. Sessions hold them in append-only lists; only the
//! controller appends, in the same critical section that commits the stage
//! that produced them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of evidence item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    /// An extracted entity.
    Entity,
    /// An extracted relationship.
    Relationship,
    /// A recognized corruption pattern.
    Pattern,
    /// A derived conclusion.
    Inference,
}

impl EvidenceType {
    /// Get the type as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceType::Entity => "entity",
            EvidenceType::Relationship => "relationship",
            EvidenceType::Pattern => "pattern",
            EvidenceType::Inference => "inference",
        }
    }
}

impl std::fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An atomic, attributable fact surfaced during analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub id: String,
    #[serde(rename = "type")]
    pub evidence_type: EvidenceType,
    /// Stage that produced this item.
    pub stage: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub text: String,
    pub context: String,
    /// Stage name or external reference.
    pub source: String,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Evidence {
    /// Create evidence with a generated id.
    pub fn new(
        evidence_type: EvidenceType,
        stage: u32,
        source: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            evidence_type,
            stage,
            entity_id: None,
            text: text.into(),
            context: String::new(),
            source: source.into(),
            confidence: 0.0,
            created_at: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Attach the entity this evidence is about.
    pub fn with_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the surrounding context.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Set the confidence, clamped to 0.0-1.0.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Status of a hypothesis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisStatus {
    #[default]
    Proposed,
    Supported,
    Refuted,
    Uncertain,
}

/// A candidate explanation resting on one or more evidence items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hypothesis {
    pub id: String,
    /// Stage that produced this hypothesis.
    pub stage: u32,
    pub description: String,
    /// Ids of the evidence this hypothesis rests on.
    pub evidence: Vec<String>,
    pub confidence: f64,
    pub status: HypothesisStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Hypothesis {
    /// Create a proposed hypothesis with a generated id.
    pub fn new(stage: u32, description: impl Into<String>, confidence: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            stage,
            description: description.into(),
            evidence: Vec::new(),
            confidence: clamp_unit(confidence),
            status: HypothesisStatus::Proposed,
            created_at: now,
            updated_at: now,
            metadata: serde_json::Map::new(),
        }
    }

    /// Set the supporting evidence ids.
    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// An ordered sequence of connected evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceChain {
    pub id: String,
    pub description: String,
    /// Ordered evidence ids.
    pub evidence: Vec<String>,
    /// Aggregate strength (0.0-1.0).
    pub strength: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EvidenceChain {
    /// Chain the evidence a hypothesis rests on.
    ///
    /// Strength is the hypothesis confidence scaled by the mean confidence of
    /// the evidence that could be found. Returns `None` when none of the
    /// hypothesis's evidence is known.
    pub fn from_hypothesis(hypothesis: &Hypothesis, evidence: &[Evidence]) -> Option<Self> {
        let linked: Vec<&Evidence> = hypothesis
            .evidence
            .iter()
            .filter_map(|id| evidence.iter().find(|e| &e.id == id))
            .collect();

        if linked.is_empty() {
            return None;
        }

        let mean = linked.iter().map(|e| e.confidence).sum::<f64>() / linked.len() as f64;
        let now = Utc::now();

        Some(Self {
            id: Uuid::new_v4().to_string(),
            description: hypothesis.description.clone(),
            evidence: linked.iter().map(|e| e.id.clone()).collect(),
            strength: clamp_unit(hypothesis.confidence * mean),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Kind of link between two evidence items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossReferenceType {
    Support,
    Contradict,
    Relate,
}

impl std::str::FromStr for CrossReferenceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "support" | "supports" => Ok(CrossReferenceType::Support),
            "contradict" | "contradicts" => Ok(CrossReferenceType::Contradict),
            "relate" | "relates" | "related" => Ok(CrossReferenceType::Relate),
            _ => Err(format!("Unknown cross-reference type: {}", s)),
        }
    }
}

/// A typed relation between two evidence items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossReference {
    pub id: String,
    #[serde(rename = "type")]
    pub reference_type: CrossReferenceType,
    pub from_id: String,
    pub to_id: String,
    pub description: String,
    pub strength: f64,
    pub created_at: DateTime<Utc>,
}

impl CrossReference {
    /// Create a cross-reference with a generated id.
    pub fn new(
        reference_type: CrossReferenceType,
        from_id: impl Into<String>,
        to_id: impl Into<String>,
        description: impl Into<String>,
        strength: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            reference_type,
            from_id: from_id.into(),
            to_id: to_id.into(),
            description: description.into(),
            strength: clamp_unit(strength),
            created_at: Utc::now(),
        }
    }
}

/// Map free-text citations onto evidence ids.
///
/// A citation matches an item when it equals the item's id or, ignoring
/// case, its text. Unmatched citations are dropped; duplicates collapse.
pub fn resolve_citations(citations: &[String], evidence: &[Evidence]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for citation in citations {
        let needle = citation.trim();
        let found = evidence
            .iter()
            .find(|e| e.id == needle || e.text.eq_ignore_ascii_case(needle));
        if let Some(item) = found {
            if !ids.contains(&item.id) {
                ids.push(item.id.clone());
            }
        }
    }
    ids
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
