//! ProfRAG Common Library
//!
//! Core of the professor-question answering service:
//! - RAG pipeline (memory, reformulation, retrieval, reranking, generation)
//! - Embedding, completion and vector index adapters
//! - Professor name lookup
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod vector;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use pipeline::{HistoryTurn, PipelineResult, RagPipeline};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// Default chat completion model
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo";
