//! Deterministic embedders and a small knowledge file for tests.

use super::embedder::l2_normalize;
use super::{EmbeddingModel, KnowledgeBase, RetrievalError};

const TOPICS: &[&str] = &["headache", "fever", "knee", "chest", "anxiety"];

/// One dimension per topic word plus a small constant, so a query
/// about a topic lands on chunks about the same topic.
pub struct TopicEmbedder;

impl EmbeddingModel for TopicEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let lower = text.to_lowercase();
        let mut vec: Vec<f32> = TOPICS
            .iter()
            .map(|t| lower.matches(t).count() as f32)
            .collect();
        vec.push(0.05);
        l2_normalize(&mut vec);
        Ok(vec)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        TOPICS.len() + 1
    }

    fn name(&self) -> &str {
        "topic"
    }
}

/// Every call fails as if the embedding service were down.
pub struct DownEmbedder;

impl EmbeddingModel for DownEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, RetrievalError> {
        Err(RetrievalError::EmbeddingFailed("connection refused".into()))
    }

    fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Err(RetrievalError::EmbeddingFailed("connection refused".into()))
    }

    fn dimension(&self) -> usize {
        TOPICS.len() + 1
    }

    fn name(&self) -> &str {
        "down"
    }
}

pub const KNOWLEDGE: &str = r#"[
    {"id": "headache_1", "title": "Headache", "title_tr": "Baş ağrısı",
     "content": "A headache is pain in the head. Rest and fluids help most tension headache cases.",
     "category": "general", "source_name": "MedlinePlus", "keywords_en": ["headache"]},
    {"id": "headache_2", "title": "Migraine",
     "content": "Migraine is a recurring headache, often with nausea.",
     "category": "general", "source_name": "NHS"},
    {"id": "fever_1", "title": "Fever", "content": "Fever is a raised body temperature.",
     "category": "general", "source_name": "NHS"},
    {"id": "knee_1", "title": "Knee injury",
     "content": "A knee injury that stops you bearing weight needs assessment.",
     "category": "musculoskeletal", "source_name": "NHS"},
    {"id": "chest_1", "title": "Chest pain",
     "content": "Chest pain can be a heart attack.", "category": "emergency",
     "source_name": "NHS", "safety_level": "emergency", "call_emergency": true,
     "emergency_number": "112"}
]"#;

/// [`KNOWLEDGE`] embedded with [`TopicEmbedder`].
pub fn topic_knowledge_base() -> KnowledgeBase {
    let mut kb = KnowledgeBase::new();
    kb.load_json_str(KNOWLEDGE, "kb", &TopicEmbedder)
        .expect("fixture knowledge loads");
    kb
}
