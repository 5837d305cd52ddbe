use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use super::RetrievalError;
use crate::pipeline::generation::OllamaClient;
use crate::pipeline::text::word_spans;

/// Dimension of the offline hashing embedder.
pub const EMBEDDING_DIM: usize = 384;

/// Query embedding cache defaults.
pub const EMBEDDING_CACHE_CAPACITY: usize = 500;
pub const EMBEDDING_CACHE_TTL: Duration = Duration::from_secs(300);

/// Embedding model abstraction.
pub trait EmbeddingModel: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError>;
    fn dimension(&self) -> usize;
    fn name(&self) -> &str;
}

/// Allow `Box<dyn EmbeddingModel>` to be used as `&impl EmbeddingModel`.
impl EmbeddingModel for Box<dyn EmbeddingModel> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        (**self).embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Scale a vector to unit length in place. Zero vectors stay zero.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in vec.iter_mut() {
            *val /= norm;
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Offline hashing embedder
// ═══════════════════════════════════════════════════════════

/// Bag-of-words feature hashing over case-folded tokens.
///
/// Texts that share words land close together, which is enough for keyword
/// heavy medical snippets when no embedding service is configured.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: EMBEDDING_DIM,
        }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingModel for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        Ok(hashed_vector(text, self.dimension))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Ok(texts
            .iter()
            .map(|t| hashed_vector(t, self.dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing-bow"
    }
}

fn hashed_vector(text: &str, dim: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dim];
    for word in word_spans(text) {
        let hash = fnv1a(word.folded.as_bytes());
        let slot = (hash % dim as u64) as usize;
        // High bit picks the sign.
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        vec[slot] += sign;
    }
    l2_normalize(&mut vec);
    vec
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

// ═══════════════════════════════════════════════════════════
// Ollama embedder
// ═══════════════════════════════════════════════════════════

/// Embeddings from a local Ollama `/api/embeddings` endpoint.
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
    dimension: usize,
}

impl OllamaEmbedder {
    /// Probe the model once to learn its dimension.
    pub fn connect(client: OllamaClient, model: &str) -> Result<Self, RetrievalError> {
        let probe = client
            .embed(model, "dimension probe")
            .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;
        if probe.is_empty() {
            return Err(RetrievalError::EmbeddingFailed(format!(
                "model {model} returned an empty embedding"
            )));
        }
        tracing::info!(model, dimension = probe.len(), "Embedding model ready");
        Ok(Self {
            client,
            model: model.to_string(),
            dimension: probe.len(),
        })
    }
}

impl EmbeddingModel for OllamaEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let mut vec = self
            .client
            .embed(&self.model, text)
            .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;
        if vec.len() != self.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                actual: vec.len(),
            });
        }
        l2_normalize(&mut vec);
        Ok(vec)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ═══════════════════════════════════════════════════════════
// Query cache
// ═══════════════════════════════════════════════════════════

struct CacheEntry {
    vector: Vec<f32>,
    inserted: Instant,
}

/// Caches single-text embeddings by SHA-256 of the normalized text.
pub struct CachedEmbedder<E: EmbeddingModel> {
    inner: E,
    entries: Mutex<HashMap<String, CacheEntry>>,
    capacity: usize,
    ttl: Duration,
}

impl<E: EmbeddingModel> CachedEmbedder<E> {
    pub fn new(inner: E) -> Self {
        Self::with_limits(inner, EMBEDDING_CACHE_CAPACITY, EMBEDDING_CACHE_TTL)
    }

    pub fn with_limits(inner: E, capacity: usize, ttl: Duration) -> Self {
        Self {
            inner,
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn cached_len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    fn cache_key(text: &str) -> String {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        let digest = Sha256::digest(normalized.as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl<E: EmbeddingModel> EmbeddingModel for CachedEmbedder<E> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let key = Self::cache_key(text);
        if let Ok(entries) = self.entries.lock() {
            if let Some(hit) = entries.get(&key) {
                if hit.inserted.elapsed() < self.ttl {
                    return Ok(hit.vector.clone());
                }
            }
        }

        let vector = self.inner.embed(text)?;

        if let Ok(mut entries) = self.entries.lock() {
            let ttl = self.ttl;
            entries.retain(|_, e| e.inserted.elapsed() < ttl);
            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.inserted)
                    .map(|(k, _)| k.clone());
                if let Some(k) = oldest {
                    entries.remove(&k);
                }
            }
            entries.insert(
                key,
                CacheEntry {
                    vector: vector.clone(),
                    inserted: Instant::now(),
                },
            );
        }
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        self.inner.embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
