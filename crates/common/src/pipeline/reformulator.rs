//! Query reformulation for retrieval recall

use crate::errors::Result;
use crate::llm::{ChatMessage, CompletionClient};
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You are an assistant that reformulates user questions into \
    well-reasoned queries for research or academic purposes.";

/// Rewrites a question into a reasoning-oriented search query.
///
/// The rewrite feeds retrieval and reranking only; the answer prompt keeps
/// the caller's question.
pub struct QueryReformulator {
    llm: Arc<dyn CompletionClient>,
}

impl QueryReformulator {
    pub fn new(llm: Arc<dyn CompletionClient>) -> Self {
        Self { llm }
    }

    #[tracing::instrument(skip_all)]
    pub async fn reformulate(&self, question: &str) -> Result<String> {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Break this question into a clear reasoning chain for better search: '{}'",
                question
            )),
        ];

        let rewritten = self.llm.complete(&messages).await?;
        Ok(rewritten.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::llm::Role;
    use crate::pipeline::test_support::ScriptedCompletion;

    #[tokio::test]
    async fn test_reformulate_returns_trimmed_model_output() {
        let llm = Arc::new(ScriptedCompletion::new([
            "\n  Which courses does Professor Smith teach, and how do students rate their difficulty?  ",
        ]));
        let reformulator = QueryReformulator::new(llm.clone());

        let query = reformulator.reformulate("Is Professor Smith hard?").await.unwrap();

        assert_eq!(
            query,
            "Which courses does Professor Smith teach, and how do students rate their difficulty?"
        );
        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].role, Role::System);
        assert!(calls[0][1].content.contains("'Is Professor Smith hard?'"));
    }

    #[tokio::test]
    async fn test_reformulate_propagates_adapter_failure() {
        let llm = Arc::new(ScriptedCompletion::new(Vec::<String>::new()).then_fail());
        let reformulator = QueryReformulator::new(llm);

        let err = reformulator.reformulate("anything").await.unwrap_err();
        assert!(matches!(err, AppError::CompletionError { .. }));
    }
}
