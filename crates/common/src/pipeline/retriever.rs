//! Query embedding plus vector search

use crate::embeddings::Embedder;
use crate::errors::Result;
use crate::vector::{MetadataFilter, RetrievedChunk, VectorIndex, VectorQuery};
use std::sync::Arc;

/// Embeds a query and searches the vector index, optionally filtered on one
/// metadata attribute.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    filter_field: String,
    no_filter_sentinel: String,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        filter_field: impl Into<String>,
        no_filter_sentinel: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            index,
            filter_field: filter_field.into(),
            no_filter_sentinel: no_filter_sentinel.into(),
        }
    }

    /// Equality filter for a caller value; blank or sentinel values mean none
    pub fn build_filter(&self, value: Option<&str>) -> Option<MetadataFilter> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        if value == self.no_filter_sentinel {
            return None;
        }
        Some(MetadataFilter::eq(self.filter_field.as_str(), value))
    }

    /// Matches in the index's native order (descending similarity)
    #[tracing::instrument(skip(self, query), fields(index = self.index.provider_name()))]
    pub async fn retrieve(
        &self,
        query: &str,
        filter: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let vector = self.embedder.embed(query).await?;

        let request = VectorQuery {
            vector,
            top_k,
            include_metadata: true,
            filter: self.build_filter(filter),
        };

        let chunks = self.index.query(&request).await?;
        tracing::debug!(matches = chunks.len(), "Vector search completed");
        Ok(chunks)
    }
}
