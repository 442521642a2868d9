//! Conversation memory summarization

use super::HistoryTurn;
use crate::errors::Result;
use crate::llm::{ChatMessage, CompletionClient};
use std::sync::Arc;

/// Whether a history of `history_len` turns hits a summary checkpoint.
///
/// Fires every `interval` turns, never before the first full interval.
pub fn should_summarize(history_len: usize, interval: usize) -> bool {
    interval > 0 && history_len >= interval && history_len % interval == 0
}

/// Render turns as a chronological `User:` / `Assistant:` transcript
pub fn build_transcript(turns: &[HistoryTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("User: {}\nAssistant: {}", t.user, t.bot))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Prepend a memory summary to the user's question
pub fn with_memory_context(summary: &str, question: &str) -> String {
    format!("Context: {}\n\nNow answer this:\n{}", summary, question)
}

/// Condenses earlier turns into a short factual summary
pub struct MemorySummarizer {
    llm: Arc<dyn CompletionClient>,
}

impl MemorySummarizer {
    pub fn new(llm: Arc<dyn CompletionClient>) -> Self {
        Self { llm }
    }

    /// Summarize the given turns. Whatever the model returns is accepted.
    #[tracing::instrument(skip_all, fields(turns = history.len()))]
    pub async fn summarize(&self, history: &[HistoryTurn]) -> Result<String> {
        let prompt = format!(
            "Summarize the following conversation between a student and a chatbot into a few key points. \
            Keep it factual and concise.\n\n\
            Conversation:\n{}\n\n\
            Summary:",
            build_transcript(history)
        );

        let summary = self.llm.complete(&[ChatMessage::user(prompt)]).await?;
        Ok(summary.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::ScriptedCompletion;

    #[test]
    fn test_cadence_fires_on_multiples_of_three() {
        for len in [0, 1, 2, 4, 5, 7, 8] {
            assert!(!should_summarize(len, 3), "length {} must not summarize", len);
        }
        for len in [3, 6, 9, 12] {
            assert!(should_summarize(len, 3), "length {} must summarize", len);
        }
    }

    #[test]
    fn test_cadence_with_zero_interval_never_fires() {
        assert!(!should_summarize(0, 0));
        assert!(!should_summarize(3, 0));
    }

    #[test]
    fn test_transcript_format() {
        let turns = vec![
            HistoryTurn::new("Who teaches CS101?", "Professor Smith."),
            HistoryTurn::new("Is she strict?", "Reviews say yes."),
        ];
        assert_eq!(
            build_transcript(&turns),
            "User: Who teaches CS101?\nAssistant: Professor Smith.\n\n\
             User: Is she strict?\nAssistant: Reviews say yes."
        );
        assert_eq!(build_transcript(&[]), "");
    }

    #[test]
    fn test_memory_context_prefix() {
        assert_eq!(
            with_memory_context("Student asked about Smith.", "What about exams?"),
            "Context: Student asked about Smith.\n\nNow answer this:\nWhat about exams?"
        );
    }

    #[tokio::test]
    async fn test_summarize_sends_transcript_and_trims() {
        let llm = Arc::new(ScriptedCompletion::new(["  - Smith is strict\n- Exams are hard \n"]));
        let summarizer = MemorySummarizer::new(llm.clone());

        let summary = summarizer
            .summarize(&[HistoryTurn::new("Is Smith strict?", "Yes.")])
            .await
            .unwrap();

        assert_eq!(summary, "- Smith is strict\n- Exams are hard");
        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0][0].content.contains("User: Is Smith strict?\nAssistant: Yes."));
    }
}
