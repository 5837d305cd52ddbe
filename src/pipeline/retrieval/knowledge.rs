//! Append-only knowledge base with an exact-keyword inverted index.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;

use super::embedder::{l2_normalize, EmbeddingModel};
use super::types::{KnowledgeChunk, SafetyFields, SeverityTier};
use super::RetrievalError;
use crate::pipeline::text::word_spans;

/// Words that carry no retrieval signal in either language.
const STOP_WORDS: &[&str] = &[
    "bir", "bu", "ile", "için", "ve", "de", "da", "ne", "nasıl", "hakkında", "bilgi", "nedir",
    "ilacı", "ilaç", "alabilir", "miyim", "var", "the", "a", "an", "is", "what", "how", "about",
    "drug", "drugs", "medicine", "medication", "can", "you", "give", "information", "tell",
    "me", "and", "for", "with",
];

const MIN_TERM_CHARS: usize = 3;

/// Folded query terms worth looking up: stop words and very short tokens
/// are dropped, duplicates collapse.
pub fn search_terms(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    word_spans(text)
        .into_iter()
        .map(|w| w.folded)
        .filter(|t| t.chars().count() >= MIN_TERM_CHARS && !STOP_WORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Token → chunk positions.
#[derive(Debug, Default)]
pub struct KeywordIndex {
    postings: HashMap<String, Vec<usize>>,
}

impl KeywordIndex {
    fn insert(&mut self, token: String, position: usize) {
        let list = self.postings.entry(token).or_default();
        if list.last() != Some(&position) {
            list.push(position);
        }
    }

    /// Positions of chunks indexed under an exact folded token.
    pub fn lookup(&self, token: &str) -> &[usize] {
        self.postings.get(token).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct query terms each chunk contains.
    pub fn hits_for(&self, terms: &[String]) -> HashMap<usize, usize> {
        let mut hits = HashMap::new();
        for term in terms {
            for &pos in self.lookup(term) {
                *hits.entry(pos).or_insert(0) += 1;
            }
        }
        hits
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }
}

/// Immutable-after-ingestion store the retriever reads from.
#[derive(Debug, Default)]
pub struct KnowledgeBase {
    chunks: Vec<KnowledgeChunk>,
    index: KeywordIndex,
    dimension: Option<usize>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[KnowledgeChunk] {
        &self.chunks
    }

    pub fn get(&self, position: usize) -> Option<&KnowledgeChunk> {
        self.chunks.get(position)
    }

    pub fn index(&self) -> &KeywordIndex {
        &self.index
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Chunk count per category.
    pub fn categories(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for chunk in &self.chunks {
            *counts.entry(chunk.category.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Append one embedded chunk. The embedding is normalized here so that
    /// search can use a plain dot product.
    pub fn append(&mut self, mut chunk: KnowledgeChunk) -> Result<usize, RetrievalError> {
        if chunk.embedding.is_empty() {
            return Err(RetrievalError::KnowledgeBaseLoad(format!(
                "chunk {} has no embedding",
                chunk.id
            )));
        }
        match self.dimension {
            Some(expected) if expected != chunk.embedding.len() => {
                return Err(RetrievalError::DimensionMismatch {
                    expected,
                    actual: chunk.embedding.len(),
                });
            }
            None => self.dimension = Some(chunk.embedding.len()),
            _ => {}
        }
        l2_normalize(&mut chunk.embedding);

        let position = self.chunks.len();
        let mut tokens = BTreeSet::new();
        for keyword in &chunk.keywords {
            tokens.extend(word_spans(keyword).into_iter().map(|w| w.folded));
        }
        for title in std::iter::once(&chunk.title).chain(chunk.title_l1.iter()) {
            tokens.extend(search_terms(title));
        }
        for token in tokens {
            self.index.insert(token, position);
        }

        self.chunks.push(chunk);
        Ok(position)
    }

    /// Load a JSON list of knowledge records, embedding any record that
    /// arrives without a vector. Returns the number of chunks appended.
    pub fn load_json(
        &mut self,
        path: &Path,
        embedder: &dyn EmbeddingModel,
    ) -> Result<usize, RetrievalError> {
        let raw = std::fs::read_to_string(path)?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("knowledge");
        self.load_json_str(&raw, stem, embedder)
    }

    pub fn load_json_str(
        &mut self,
        raw: &str,
        id_prefix: &str,
        embedder: &dyn EmbeddingModel,
    ) -> Result<usize, RetrievalError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let serde_json::Value::Array(items) = value else {
            return Err(RetrievalError::KnowledgeBaseLoad(
                "knowledge file root must be a list".to_string(),
            ));
        };

        let mut loaded = 0;
        for (i, item) in items.into_iter().enumerate() {
            let record: KnowledgeRecord = match serde_json::from_value(item) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(item = i, error = %e, "Skipping malformed knowledge record");
                    continue;
                }
            };
            let mut chunk = record.into_chunk(id_prefix, i);
            if chunk.embedding.is_empty() {
                chunk.embedding = embedder.embed(&embedding_text(&chunk))?;
            }
            self.append(chunk)?;
            loaded += 1;
        }

        tracing::info!(loaded, total = self.len(), "Knowledge base loaded");
        Ok(loaded)
    }
}

/// Text the embedder sees for a chunk: titles, category, body.
pub fn embedding_text(chunk: &KnowledgeChunk) -> String {
    let mut title = chunk.title.clone();
    if let Some(l1) = chunk.title_l1.as_deref().filter(|t| *t != chunk.title) {
        title.push_str(" / ");
        title.push_str(l1);
    }
    format!(
        "Title: {title}\nCategory: {}\nContent: {}",
        chunk.category, chunk.body
    )
}

#[derive(Debug, Deserialize)]
struct KnowledgeRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    title_tr: Option<String>,
    #[serde(default, alias = "body", alias = "text")]
    content: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    source_name: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    keywords_en: Vec<String>,
    #[serde(default)]
    keywords_tr: Vec<String>,
    #[serde(default)]
    typos_tr: Vec<String>,
    #[serde(default)]
    safety_level: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    call_emergency: serde_json::Value,
    #[serde(default)]
    emergency_number: Option<String>,
    #[serde(default)]
    contraindications: Vec<String>,
    #[serde(default)]
    red_flags: Vec<String>,
    #[serde(default)]
    embedding: Vec<f32>,
}

impl KnowledgeRecord {
    fn into_chunk(self, id_prefix: &str, position: usize) -> KnowledgeChunk {
        let category = self
            .category
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "general".to_string());
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("{id_prefix}_{category}_{position}"));

        let keywords = self
            .keywords
            .into_iter()
            .chain(self.keywords_en)
            .chain(self.keywords_tr)
            .chain(self.typos_tr)
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        let call_emergency = truthy(&self.call_emergency);
        let mut tier = self
            .safety_level
            .as_deref()
            .map(SeverityTier::from_label)
            .unwrap_or_default();
        if tier == SeverityTier::General
            && (call_emergency
                || self
                    .severity
                    .as_deref()
                    .map(SeverityTier::from_label)
                    == Some(SeverityTier::Emergency))
        {
            tier = SeverityTier::Emergency;
        }

        KnowledgeChunk {
            id,
            title: self.title,
            title_l1: self.title_tr.filter(|t| !t.trim().is_empty()),
            body: self.content,
            category,
            keywords,
            embedding: self.embedding,
            source_name: self
                .source_name
                .or(self.source)
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
            source_url: self.source_url.filter(|u| !u.trim().is_empty()),
            safety: SafetyFields {
                contraindications: self.contraindications,
                red_flags: self.red_flags,
                severity_tier: tier,
                call_emergency,
                emergency_number: self.emergency_number.filter(|n| !n.trim().is_empty()),
            },
        }
    }
}

/// Knowledge files write booleans as `true`, `"true"`, `"yes"` or `1`.
fn truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        serde_json::Value::String(s) => {
            matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1" | "evet")
        }
        _ => false,
    }
}
