//! LLM-judged reranking of retrieved chunks
//!
//! The model is shown every chunk text under its 1-based position in the
//! retrieval order and answers with a comma-separated list of positions,
//! most relevant first. Neither a failed completion call nor output that
//! does not parse fails the request: the reranker falls back to the first
//! `top_n` chunks in retrieval order.

use crate::errors::Result;
use crate::llm::{ChatMessage, CompletionClient};
use crate::metrics;
use crate::vector::RetrievedChunk;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Why a reranker response could not be used
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RerankParseError {
    #[error("reranker returned an empty response")]
    Empty,

    #[error("reranker returned a non-numeric position {token:?}")]
    InvalidToken { token: String },

    #[error("reranker named no position within 1..={available}")]
    NoUsablePositions { available: usize },
}

impl RerankParseError {
    fn reason(&self) -> &'static str {
        match self {
            RerankParseError::Empty => "empty",
            RerankParseError::InvalidToken { .. } => "invalid_token",
            RerankParseError::NoUsablePositions { .. } => "out_of_range",
        }
    }
}

/// Prompt enumerating chunk texts by original 1-based position.
///
/// Chunks without text are left out but keep their position number, so
/// positions always address the original sequence.
pub fn build_rerank_prompt(query: &str, chunks: &[RetrievedChunk], top_n: usize) -> String {
    let mut prompt = format!(
        "You are ranking review excerpts by how well they help answer a question.\n\n\
        Question: {}\n\n\
        Excerpts:\n",
        query
    );

    for (i, chunk) in chunks.iter().enumerate() {
        if let Some(text) = chunk.text() {
            prompt.push_str(&format!("\n{}. {}\n", i + 1, text));
        }
    }

    prompt.push_str(&format!(
        "\nReturn the numbers of the {} most relevant excerpts, most relevant first, \
        as a comma-separated list (for example: 3,1,2). Return only the numbers.",
        top_n
    ));
    prompt
}

/// Parse a comma-separated list of integers.
///
/// Any blank or non-numeric token fails the whole response.
pub fn parse_positions(output: &str) -> std::result::Result<Vec<i64>, RerankParseError> {
    let output = output.trim();
    if output.is_empty() {
        return Err(RerankParseError::Empty);
    }

    output
        .split(',')
        .map(|token| {
            let token = token.trim();
            token.parse::<i64>().map_err(|_| RerankParseError::InvalidToken {
                token: token.to_string(),
            })
        })
        .collect()
}

/// Pick chunks by 1-based position, in the order given.
///
/// Out-of-range positions are dropped and repeats keep their first
/// occurrence; the result holds at most `top_n` chunks.
pub fn select_positions(
    chunks: &[RetrievedChunk],
    positions: &[i64],
    top_n: usize,
) -> std::result::Result<Vec<RetrievedChunk>, RerankParseError> {
    let mut seen = HashSet::new();
    let selected: Vec<RetrievedChunk> = positions
        .iter()
        .filter_map(|&p| p.checked_sub(1).and_then(|i| usize::try_from(i).ok()))
        .filter(|&idx| idx < chunks.len())
        .filter(|&idx| seen.insert(idx))
        .take(top_n)
        .map(|idx| chunks[idx].clone())
        .collect();

    if selected.is_empty() {
        return Err(RerankParseError::NoUsablePositions {
            available: chunks.len(),
        });
    }
    Ok(selected)
}

/// Reorders and trims retrieved chunks using one completion call
pub struct Reranker {
    llm: Arc<dyn CompletionClient>,
}

impl Reranker {
    pub fn new(llm: Arc<dyn CompletionClient>) -> Self {
        Self { llm }
    }

    /// Up to `top_n` chunks, always a subsequence of `chunks` by identity
    #[tracing::instrument(skip(self, query, chunks), fields(candidates = chunks.len()))]
    pub async fn rerank(
        &self,
        query: &str,
        chunks: Vec<RetrievedChunk>,
        top_n: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        if chunks.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }

        let has_text = chunks.iter().any(|c| c.text().is_some());
        if chunks.len() == 1 || !has_text {
            tracing::debug!("Nothing to rank, keeping retrieval order");
            return Ok(first_n(chunks, top_n));
        }

        let prompt = build_rerank_prompt(query, &chunks, top_n);
        let output = match self.llm.complete(&[ChatMessage::user(prompt)]).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(error = %e, "Reranker completion failed, keeping retrieval order");
                metrics::record_rerank_fallback("adapter");
                return Ok(first_n(chunks, top_n));
            }
        };

        let parsed = parse_positions(&output).and_then(|p| select_positions(&chunks, &p, top_n));
        match parsed {
            Ok(selected) => {
                tracing::debug!(kept = selected.len(), "Reranked chunks");
                Ok(selected)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    response_len = output.len(),
                    "Could not parse reranker output, keeping retrieval order"
                );
                metrics::record_rerank_fallback(e.reason());
                Ok(first_n(chunks, top_n))
            }
        }
    }
}

fn first_n(mut chunks: Vec<RetrievedChunk>, top_n: usize) -> Vec<RetrievedChunk> {
    chunks.truncate(top_n);
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{chunk, ids, numbered_chunks, ScriptedCompletion};

    fn reranker(replies: &[&str]) -> (Reranker, Arc<ScriptedCompletion>) {
        let llm = Arc::new(ScriptedCompletion::new(replies.iter().copied()));
        (Reranker::new(llm.clone()), llm)
    }

    #[test]
    fn test_parse_positions() {
        assert_eq!(parse_positions("3,1,2"), Ok(vec![3, 1, 2]));
        assert_eq!(parse_positions(" 2 , 5 ,1\n"), Ok(vec![2, 5, 1]));
        assert_eq!(parse_positions("   "), Err(RerankParseError::Empty));
        assert!(matches!(
            parse_positions("2, three, 1"),
            Err(RerankParseError::InvalidToken { token }) if token == "three"
        ));
        assert!(parse_positions("1,2,").is_err());
        assert!(parse_positions("The most relevant are 1 and 2").is_err());
    }

    #[test]
    fn test_prompt_keeps_original_positions() {
        let chunks = vec![
            chunk("a", Some("Lectures are clear")),
            chunk("b", None),
            chunk("c", Some("  ")),
            chunk("d", Some("Exams are brutal")),
        ];
        let prompt = build_rerank_prompt("Is Smith hard?", &chunks, 3);

        assert!(prompt.contains("Question: Is Smith hard?"));
        assert!(prompt.contains("\n1. Lectures are clear\n"));
        assert!(prompt.contains("\n4. Exams are brutal\n"));
        assert!(!prompt.contains("\n2. "));
        assert!(!prompt.contains("\n3. "));
        assert!(prompt.contains("3 most relevant"));
    }

    #[test]
    fn test_select_drops_out_of_range_and_repeats() {
        let chunks = numbered_chunks(3);
        let selected = select_positions(&chunks, &[99, 2, 0, -4, 2, 3], 3).unwrap();
        assert_eq!(ids(&selected), vec!["c2", "c3"]);
    }

    #[test]
    fn test_select_with_no_usable_position_fails() {
        let chunks = numbered_chunks(3);
        assert_eq!(
            select_positions(&chunks, &[7, 8], 3),
            Err(RerankParseError::NoUsablePositions { available: 3 })
        );
    }

    #[tokio::test]
    async fn test_rerank_honours_model_order() {
        let (reranker, llm) = reranker(&["5, 2, 6"]);
        let result = reranker.rerank("q", numbered_chunks(6), 3).await.unwrap();

        assert_eq!(ids(&result), vec!["c5", "c2", "c6"]);
        assert_eq!(llm.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_rerank_truncates_to_top_n() {
        let (reranker, _) = reranker(&["4,3,2,1"]);
        let result = reranker.rerank("q", numbered_chunks(6), 2).await.unwrap();
        assert_eq!(ids(&result), vec!["c4", "c3"]);
    }

    #[tokio::test]
    async fn test_rerank_falls_back_on_malformed_output() {
        for reply in ["", "none of them", "1, two, 3", "[1, 2, 3]"] {
            let (reranker, _) = reranker(&[reply]);
            let result = reranker.rerank("q", numbered_chunks(6), 3).await.unwrap();
            assert_eq!(ids(&result), vec!["c1", "c2", "c3"], "reply {:?}", reply);
        }
    }

    #[tokio::test]
    async fn test_rerank_out_of_range_position_is_dropped() {
        let (reranker, _) = reranker(&["99, 3, 1"]);
        let result = reranker.rerank("q", numbered_chunks(3), 3).await.unwrap();
        assert_eq!(ids(&result), vec!["c3", "c1"]);
    }

    #[tokio::test]
    async fn test_rerank_output_is_subset_of_input() {
        let input = numbered_chunks(6);
        for reply in ["6,6,1", "2", "0,1,2,3,4,5,6,7", "x", "3,2"] {
            let (reranker, _) = reranker(&[reply]);
            let result = reranker.rerank("q", input.clone(), 3).await.unwrap();
            assert!(result.len() <= 3);
            assert!(result.iter().all(|c| input.contains(c)));
        }
    }

    #[tokio::test]
    async fn test_rerank_empty_input_skips_model() {
        let (reranker, llm) = reranker(&[]);
        let result = reranker.rerank("q", Vec::new(), 3).await.unwrap();
        assert!(result.is_empty());
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rerank_without_any_text_skips_model() {
        let (reranker, llm) = reranker(&[]);
        let chunks = vec![chunk("a", None), chunk("b", Some("")), chunk("c", None), chunk("d", None)];
        let result = reranker.rerank("q", chunks, 3).await.unwrap();
        assert_eq!(ids(&result), vec!["a", "b", "c"]);
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rerank_adapter_failure_keeps_retrieval_order() {
        let llm = Arc::new(ScriptedCompletion::new(Vec::<String>::new()).then_fail());
        let reranker = Reranker::new(llm.clone());
        let result = reranker.rerank("q", numbered_chunks(4), 3).await.unwrap();
        assert_eq!(ids(&result), vec!["c1", "c2", "c3"]);
        assert_eq!(llm.calls().len(), 1);
    }
}
