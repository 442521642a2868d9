//! In-memory vector index using brute-force cosine similarity

use super::{ChunkMetadata, RetrievedChunk, VectorIndex, VectorQuery};
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// A document in a seed file
#[derive(Debug, Clone, Deserialize)]
pub struct SeedDocument {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub professor: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone)]
struct IndexRecord {
    id: String,
    vector: Vec<f32>,
    metadata: ChunkMetadata,
}

/// Vector index held entirely in process memory
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    records: Vec<IndexRecord>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a record
    pub fn upsert(&mut self, id: impl Into<String>, vector: Vec<f32>, metadata: ChunkMetadata) {
        let id = id.into();
        match self.records.iter_mut().find(|r| r.id == id) {
            Some(existing) => {
                existing.vector = vector;
                existing.metadata = metadata;
            }
            None => self.records.push(IndexRecord { id, vector, metadata }),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Embed and index a batch of documents
    pub async fn from_documents(docs: Vec<SeedDocument>, embedder: &dyn Embedder) -> Result<Self> {
        let texts: Vec<String> = docs.iter().map(|d| d.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;

        let mut index = Self::new();
        for (doc, vector) in docs.into_iter().zip(vectors) {
            let id = doc.id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let metadata = ChunkMetadata {
                text: Some(doc.text),
                professor: doc.professor,
                extra: doc.extra,
            };
            index.upsert(id, vector, metadata);
        }
        Ok(index)
    }

    /// Load a JSON array of documents from disk
    pub async fn from_seed_file(path: &str, embedder: &dyn Embedder) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| AppError::Configuration {
            message: format!("Failed to read seed file {}: {}", path, e),
        })?;
        let docs: Vec<SeedDocument> = serde_json::from_str(&raw)?;
        tracing::info!(path, documents = docs.len(), "Seeding in-memory vector index");
        Self::from_documents(docs, embedder).await
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn query(&self, query: &VectorQuery) -> Result<Vec<RetrievedChunk>> {
        let mut scored: Vec<RetrievedChunk> = self
            .records
            .iter()
            .filter(|r| query.filter.as_ref().map_or(true, |f| f.matches(&r.metadata)))
            .map(|r| RetrievedChunk {
                id: r.id.clone(),
                score: cosine_similarity(&query.vector, &r.vector),
                metadata: if query.include_metadata {
                    r.metadata.clone()
                } else {
                    ChunkMetadata::default()
                },
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(query.top_k);
        Ok(scored)
    }

    fn provider_name(&self) -> &str {
        "memory"
    }
}
