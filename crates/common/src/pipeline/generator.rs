//! Context-grounded answer generation

use crate::errors::Result;
use crate::llm::{ChatMessage, CompletionClient};
use crate::metrics;
use crate::vector::RetrievedChunk;
use std::sync::Arc;

/// Answer text, tagged with whether the model was consulted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedAnswer {
    /// Model output grounded on at least one chunk
    Grounded(String),
    /// No usable context; the fixed reply was returned without a model call
    InsufficientContext(String),
}

impl GeneratedAnswer {
    pub fn text(&self) -> &str {
        match self {
            GeneratedAnswer::Grounded(text) | GeneratedAnswer::InsufficientContext(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            GeneratedAnswer::Grounded(text) | GeneratedAnswer::InsufficientContext(text) => text,
        }
    }

    pub fn is_insufficient_context(&self) -> bool {
        matches!(self, GeneratedAnswer::InsufficientContext(_))
    }
}

/// Join chunk texts in order, skipping chunks with no usable text
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .filter_map(RetrievedChunk::text)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn answer_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful assistant. Use the context below to answer the question. \
        If the answer is not contained in the context, say that you don't know. \
        Do not make up information.\n\n\
        Context:\n{}\n\n\
        Question:\n{}\n\n\
        Answer:",
        context, question
    )
}

pub struct AnswerGenerator {
    llm: Arc<dyn CompletionClient>,
    insufficient_message: String,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn CompletionClient>, insufficient_message: impl Into<String>) -> Self {
        Self {
            llm,
            insufficient_message: insufficient_message.into(),
        }
    }

    /// Answer `question` from the chunk texts alone.
    ///
    /// An empty context short-circuits to the configured insufficient-information
    /// reply and never reaches the model.
    #[tracing::instrument(skip_all, fields(chunks = chunks.len()))]
    pub async fn generate(&self, question: &str, chunks: &[RetrievedChunk]) -> Result<GeneratedAnswer> {
        let context = build_context(chunks);
        if context.trim().is_empty() {
            tracing::info!("No usable context, returning insufficient-information reply");
            metrics::record_insufficient_context();
            return Ok(GeneratedAnswer::InsufficientContext(
                self.insufficient_message.clone(),
            ));
        }

        let answer = self
            .llm
            .complete(&[ChatMessage::user(answer_prompt(&context, question))])
            .await?;

        Ok(GeneratedAnswer::Grounded(answer.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::pipeline::test_support::{chunk, numbered_chunks, ScriptedCompletion};

    const SORRY: &str = "I'm sorry, I don't have enough information to answer that question.";

    #[test]
    fn test_context_skips_missing_text() {
        let chunks = vec![
            chunk("a", Some("Fair grader.")),
            chunk("b", None),
            chunk("c", Some("   ")),
            chunk("d", Some("Lots of homework.")),
        ];
        assert_eq!(build_context(&chunks), "Fair grader.\n\nLots of homework.");
        assert_eq!(build_context(&[]), "");
    }

    #[tokio::test]
    async fn test_generate_grounds_prompt_on_context() {
        let llm = Arc::new(ScriptedCompletion::new([" Smith's exams are hard. "]));
        let generator = AnswerGenerator::new(llm.clone(), SORRY);

        let answer = generator
            .generate("Are Smith's exams hard?", &numbered_chunks(2))
            .await
            .unwrap();

        assert_eq!(answer, GeneratedAnswer::Grounded("Smith's exams are hard.".into()));
        assert!(!answer.is_insufficient_context());

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Context:\nreview 1\n\nreview 2\n\n"));
        assert!(prompts[0].contains("Question:\nAre Smith's exams hard?\n\nAnswer:"));
        assert!(prompts[0].contains("say that you don't know"));
    }

    #[tokio::test]
    async fn test_generate_without_context_skips_model() {
        let llm = Arc::new(ScriptedCompletion::new(Vec::<String>::new()));
        let generator = AnswerGenerator::new(llm.clone(), SORRY);

        for chunks in [vec![], vec![chunk("a", None), chunk("b", Some("\n"))]] {
            let answer = generator.generate("Anything?", &chunks).await.unwrap();
            assert!(answer.is_insufficient_context());
            assert_eq!(answer.text(), SORRY);
        }
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_generate_propagates_adapter_failure() {
        let llm = Arc::new(ScriptedCompletion::new(Vec::<String>::new()).then_fail());
        let generator = AnswerGenerator::new(llm, SORRY);

        let err = generator.generate("q", &numbered_chunks(1)).await.unwrap_err();
        assert!(matches!(err, AppError::CompletionError { .. }));
    }
}
