use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// How a chunk should steer the response tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityTier {
    #[default]
    General,
    Sensitive,
    Emergency,
}

impl SeverityTier {
    /// Parse the loose tier labels knowledge files carry.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "emergency" | "critical" | "urgent" => Self::Emergency,
            "sensitive" | "mental_health" => Self::Sensitive,
            _ => Self::General,
        }
    }
}

/// Safety metadata attached to a chunk at ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyFields {
    pub contraindications: Vec<String>,
    pub red_flags: Vec<String>,
    pub severity_tier: SeverityTier,
    pub call_emergency: bool,
    pub emergency_number: Option<String>,
}

/// One unit of medical knowledge. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: String,
    pub title: String,
    /// Turkish title, when the source provides one.
    #[serde(default)]
    pub title_l1: Option<String>,
    pub body: String,
    pub category: String,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    #[serde(default)]
    pub embedding: Vec<f32>,
    pub source_name: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub safety: SafetyFields,
}

/// A cited source for one turn. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedSource {
    pub chunk_id: String,
    pub relevance_score: f32,
    pub title: String,
    pub source_name: String,
    pub category: String,
}

/// A scored chunk as seen inside the pipeline, before citation filtering.
#[derive(Debug, Clone)]
pub struct RankedChunk<'kb> {
    pub chunk: &'kb KnowledgeChunk,
    /// Final score in [0, 1].
    pub relevance: f32,
    /// Cosine part of the score, without keyword boost.
    pub semantic: f32,
    pub keyword_hits: usize,
    /// Insertion position in the knowledge base.
    pub position: usize,
}

impl RankedChunk<'_> {
    pub fn to_source(&self) -> RetrievedSource {
        RetrievedSource {
            chunk_id: self.chunk.id.clone(),
            relevance_score: self.relevance,
            title: self.chunk.title.clone(),
            source_name: self.chunk.source_name.clone(),
            category: self.chunk.category.clone(),
        }
    }
}

/// Similarity for backends that report a distance: `1 / (1 + d)`, three
/// decimals.
pub fn relevance_from_distance(distance: f32) -> f32 {
    let score = 1.0 / (1.0 + distance.max(0.0));
    (score * 1000.0).round() / 1000.0
}
