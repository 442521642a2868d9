//! Vector index abstraction
//!
//! Provides:
//! - Retrieved chunk types shared by the whole pipeline
//! - Pinecone data-plane client
//! - In-memory cosine index for development and tests

mod memory;
mod pinecone;

pub use memory::{InMemoryIndex, SeedDocument};
pub use pinecone::PineconeIndex;

use crate::config::VectorIndexConfig;
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Metadata stored alongside each indexed chunk
///
/// `text` is optional: records without usable text still come back from
/// queries and every consumer must tolerate that.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub professor: Option<String>,

    /// Any other attributes, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChunkMetadata {
    /// Build from a raw metadata object, tolerating non-string `text`/`professor`
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        let mut take_str = |key: &str| match map.remove(key) {
            Some(Value::String(s)) => Some(s),
            Some(other) => {
                map.insert(key.to_string(), other);
                None
            }
            None => None,
        };
        let text = take_str("text");
        let professor = take_str("professor");
        Self {
            text,
            professor,
            extra: map,
        }
    }

    /// String value of a metadata attribute, used for equality filters
    pub fn get_str(&self, field: &str) -> Option<&str> {
        match field {
            "text" => self.text.as_deref(),
            "professor" => self.professor.as_deref(),
            other => self.extra.get(other).and_then(Value::as_str),
        }
    }
}

/// A nearest-neighbour match returned by the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

impl RetrievedChunk {
    /// Trimmed chunk text, `None` when absent or blank
    pub fn text(&self) -> Option<&str> {
        self.metadata
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Equality constraint on a single metadata attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub field: String,
    pub value: String,
}

impl MetadataFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        metadata.get_str(&self.field) == Some(self.value.as_str())
    }
}

/// Parameters of one nearest-neighbour query
#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub include_metadata: bool,
    pub filter: Option<MetadataFilter>,
}

/// Common trait for vector index backends
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top-K matches in descending similarity order
    async fn query(&self, query: &VectorQuery) -> Result<Vec<RetrievedChunk>>;

    /// Backend name for logs and metrics
    fn provider_name(&self) -> &str;
}

/// Create a vector index based on configuration
pub async fn create_vector_index(
    config: &VectorIndexConfig,
    embedder: Arc<dyn Embedder>,
) -> Result<Arc<dyn VectorIndex>> {
    match config.provider.as_str() {
        "pinecone" => Ok(Arc::new(PineconeIndex::new(config)?)),
        "memory" => {
            let index = match config.seed_path.as_deref() {
                Some(path) => InMemoryIndex::from_seed_file(path, embedder.as_ref()).await?,
                None => InMemoryIndex::new(),
            };
            tracing::info!(records = index.len(), "In-memory vector index ready");
            Ok(Arc::new(index))
        }
        other => Err(AppError::Configuration {
            message: format!("Unknown vector index provider: {}", other),
        }),
    }
}
