//! RAG pipeline core
//!
//! One request flows through:
//! - Memory check (periodic conversation summary)
//! - Query reformulation
//! - Vector retrieval
//! - LLM reranking
//! - Context-grounded answer generation
//!
//! The pipeline holds no state between requests; all memory is re-derived
//! from the caller-supplied history.

mod generator;
mod memory;
mod orchestrator;
mod reformulator;
mod reranker;
mod retriever;

#[cfg(test)]
pub(crate) mod test_support;

pub use generator::{build_context, AnswerGenerator, GeneratedAnswer};
pub use memory::{build_transcript, should_summarize, with_memory_context, MemorySummarizer};
pub use orchestrator::RagPipeline;
pub use reformulator::QueryReformulator;
pub use reranker::{build_rerank_prompt, parse_positions, select_positions, RerankParseError, Reranker};
pub use retriever::Retriever;

use serde::{Deserialize, Serialize};

/// One past exchange, oldest first in a history slice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub user: String,
    pub bot: String,
}

impl HistoryTurn {
    pub fn new(user: impl Into<String>, bot: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            bot: bot.into(),
        }
    }
}

/// Terminal output of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub answer: String,

    /// Memory summary, present only when the cadence fired
    pub summary: Option<String>,

    /// True when the answer is the fixed insufficient-information reply
    pub insufficient_context: bool,
}
