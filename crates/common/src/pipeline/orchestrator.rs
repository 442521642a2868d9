//! End-to-end request pipeline

use super::{
    should_summarize, with_memory_context, AnswerGenerator, HistoryTurn, MemorySummarizer,
    PipelineResult, QueryReformulator, Reranker, Retriever,
};
use crate::config::{AppConfig, PipelineConfig};
use crate::embeddings::{create_embedder, Embedder};
use crate::errors::Result;
use crate::llm::{create_completion_client, CompletionClient};
use crate::metrics::{self, StageTimer};
use crate::vector::{create_vector_index, VectorIndex};
use std::future::Future;
use std::sync::Arc;

/// Wires the five stages over shared adapters.
///
/// Stages run strictly in sequence. Any adapter failure aborts the run and
/// is returned unchanged, except inside the reranker, which degrades to
/// retrieval order.
pub struct RagPipeline {
    config: PipelineConfig,
    summarizer: MemorySummarizer,
    reformulator: QueryReformulator,
    retriever: Retriever,
    reranker: Reranker,
    generator: AnswerGenerator,
}

impl RagPipeline {
    pub fn new(
        config: PipelineConfig,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        llm: Arc<dyn CompletionClient>,
    ) -> Self {
        let retriever = Retriever::new(
            embedder,
            index,
            config.filter_field.as_str(),
            config.no_filter_sentinel.as_str(),
        );
        let generator = AnswerGenerator::new(llm.clone(), config.insufficient_context_message.as_str());

        Self {
            summarizer: MemorySummarizer::new(llm.clone()),
            reformulator: QueryReformulator::new(llm.clone()),
            reranker: Reranker::new(llm),
            retriever,
            generator,
            config,
        }
    }

    /// Build adapters from configuration and wire the pipeline
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let index = create_vector_index(&config.vector_index, embedder.clone()).await?;
        let llm = create_completion_client(&config.llm)?;

        tracing::info!(
            embedder = embedder.model_name(),
            index = index.provider_name(),
            llm = llm.model_name(),
            "RAG pipeline initialized"
        );

        Ok(Self::new(config.pipeline.clone(), embedder, index, llm))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Answer one question given the prior conversation.
    ///
    /// When the history length hits the summary cadence, every turn except the
    /// newest is summarized and the summary is prefixed to the question. The
    /// reformulated query drives retrieval and reranking; the answer prompt
    /// receives the (possibly memory-prefixed) question.
    #[tracing::instrument(skip(self, question, history), fields(history_len = history.len()))]
    pub async fn run(
        &self,
        question: &str,
        history: &[HistoryTurn],
        filter: Option<&str>,
    ) -> Result<PipelineResult> {
        let mut question = question.to_string();
        let mut summary = None;

        if should_summarize(history.len(), self.config.summary_interval) {
            let earlier = &history[..history.len() - 1];
            let text = timed("memory", self.summarizer.summarize(earlier)).await?;
            metrics::record_memory_summary();
            question = with_memory_context(&text, &question);
            summary = Some(text);
        }

        let query = timed("reformulate", self.reformulator.reformulate(&question)).await?;
        tracing::debug!(query = %query, "Reformulated query");

        let candidates = timed(
            "retrieve",
            self.retriever.retrieve(&query, filter, self.config.retrieve_top_k),
        )
        .await?;

        let top = timed(
            "rerank",
            self.reranker.rerank(&query, candidates, self.config.rerank_top_n),
        )
        .await?;

        let answer = timed("generate", self.generator.generate(&question, &top)).await?;

        Ok(PipelineResult {
            insufficient_context: answer.is_insufficient_context(),
            answer: answer.into_text(),
            summary,
        })
    }
}

async fn timed<T, F>(stage: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let timer = StageTimer::start(stage);
    let result = fut.await;
    let elapsed_ms = timer.finish(result.is_ok());

    match &result {
        Ok(_) => tracing::debug!(stage, elapsed_ms, "Stage completed"),
        Err(e) => tracing::warn!(stage, elapsed_ms, error = %e, "Stage failed"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbedder;
    use crate::errors::AppError;
    use crate::pipeline::test_support::{numbered_chunks, RecordingIndex, ScriptedCompletion};
    use crate::vector::{MetadataFilter, RetrievedChunk};

    fn pipeline(
        chunks: Vec<RetrievedChunk>,
        replies: &[&str],
    ) -> (RagPipeline, Arc<ScriptedCompletion>, Arc<RecordingIndex>) {
        let llm = Arc::new(ScriptedCompletion::new(replies.iter().copied()));
        let index = Arc::new(RecordingIndex::new(chunks));
        let pipeline = RagPipeline::new(
            PipelineConfig::default(),
            Arc::new(MockEmbedder::new(8)),
            index.clone(),
            llm.clone(),
        );
        (pipeline, llm, index)
    }

    fn history(n: usize) -> Vec<HistoryTurn> {
        (1..=n)
            .map(|i| HistoryTurn::new(format!("question {}", i), format!("answer {}", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_professor_question_end_to_end() {
        let (pipeline, llm, index) = pipeline(
            numbered_chunks(10),
            &["Smith grading difficulty", "2, 4, 6", "Smith is a tough grader."],
        );

        let result = pipeline
            .run("Is Professor Smith a tough grader?", &[], Some("Smith"))
            .await
            .unwrap();

        assert_eq!(result.answer, "Smith is a tough grader.");
        assert_eq!(result.summary, None);
        assert!(!result.insufficient_context);

        let queries = index.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].top_k, 6);
        assert_eq!(queries[0].filter, Some(MetadataFilter::eq("professor", "Smith")));

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[1].contains("Question: Smith grading difficulty"));
        assert!(prompts[1].contains("\n6. review 6\n"));
        assert!(!prompts[1].contains("\n7. "));
        assert!(prompts[2].contains("Context:\nreview 2\n\nreview 4\n\nreview 6\n\n"));
        assert!(prompts[2].contains("Question:\nIs Professor Smith a tough grader?\n"));
        assert!(!prompts[2].contains("Smith grading difficulty"));
    }

    #[tokio::test]
    async fn test_sentinel_professor_searches_everything() {
        let (pipeline, _, index) = pipeline(numbered_chunks(6), &["q", "1,2,3", "a"]);
        pipeline.run("Who is easiest?", &[], Some("Unknown")).await.unwrap();
        assert_eq!(index.queries()[0].filter, None);
    }

    #[tokio::test]
    async fn test_no_summary_off_cadence() {
        for len in [0, 1, 2, 4, 5] {
            let (pipeline, llm, _) = pipeline(numbered_chunks(6), &["q", "1,2,3", "answer"]);
            let result = pipeline.run("Next?", &history(len), None).await.unwrap();

            assert_eq!(result.summary, None, "history length {}", len);
            assert_eq!(llm.calls().len(), 3, "history length {}", len);
        }
    }

    #[tokio::test]
    async fn test_summary_on_cadence() {
        for len in [3, 6, 9] {
            let (pipeline, llm, _) =
                pipeline(numbered_chunks(6), &["the summary", "q", "1,2,3", "answer"]);
            let result = pipeline.run("Next?", &history(len), None).await.unwrap();

            assert_eq!(result.summary.as_deref(), Some("the summary"), "history length {}", len);
            assert_eq!(llm.calls().len(), 4, "history length {}", len);

            let prompts = llm.prompts();
            assert!(prompts[0].contains(&format!("User: question {}", len - 1)));
            assert!(!prompts[0].contains(&format!("User: question {}\n", len)));
        }
    }

    #[tokio::test]
    async fn test_summary_prefixes_question() {
        let (pipeline, llm, _) =
            pipeline(numbered_chunks(6), &["Asked about Smith.", "q", "1", "answer"]);
        pipeline.run("What about exams?", &history(3), None).await.unwrap();

        let prompts = llm.prompts();
        let augmented = "Context: Asked about Smith.\n\nNow answer this:\nWhat about exams?";
        assert!(prompts[1].contains(augmented));
        assert!(prompts[3].contains(&format!("Question:\n{}\n", augmented)));
    }

    #[tokio::test]
    async fn test_empty_retrieval_returns_insufficient_context() {
        let (pipeline, llm, _) = pipeline(Vec::new(), &["q"]);
        let result = pipeline.run("Anything?", &[], None).await.unwrap();

        assert!(result.insufficient_context);
        assert_eq!(
            result.answer,
            "I'm sorry, I don't have enough information to answer that question."
        );
        assert_eq!(llm.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_rerank_output_still_answers() {
        let (pipeline, llm, _) = pipeline(numbered_chunks(6), &["q", "I think 2", "answer"]);
        let result = pipeline.run("Q?", &[], None).await.unwrap();

        assert_eq!(result.answer, "answer");
        assert!(llm.prompts()[2].contains("Context:\nreview 1\n\nreview 2\n\nreview 3\n\n"));
    }

    #[tokio::test]
    async fn test_rerank_completion_failure_still_answers() {
        let llm = Arc::new(ScriptedCompletion::new(["q"]).then_fail().then("answer"));
        let pipeline = RagPipeline::new(
            PipelineConfig::default(),
            Arc::new(MockEmbedder::new(8)),
            Arc::new(RecordingIndex::new(numbered_chunks(6))),
            llm.clone(),
        );

        let result = pipeline.run("Q?", &[], None).await.unwrap();

        assert_eq!(result.answer, "answer");
        assert_eq!(llm.calls().len(), 3);
        assert!(llm.prompts()[2].contains("Context:\nreview 1\n\nreview 2\n\nreview 3\n\n"));
    }

    #[tokio::test]
    async fn test_index_failure_aborts_run() {
        let llm = Arc::new(ScriptedCompletion::new(["q"]));
        let pipeline = RagPipeline::new(
            PipelineConfig::default(),
            Arc::new(MockEmbedder::new(8)),
            Arc::new(RecordingIndex::failing()),
            llm.clone(),
        );

        let err = pipeline.run("Q?", &[], None).await.unwrap_err();
        assert!(matches!(err, AppError::VectorIndexError { .. }));
        assert_eq!(llm.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_completion_failure_aborts_run() {
        let (pipeline, _, index) = pipeline(numbered_chunks(6), &[]);
        let err = pipeline.run("Q?", &[], None).await.unwrap_err();

        assert!(matches!(err, AppError::CompletionError { .. }));
        assert!(index.queries().is_empty());
    }

    #[tokio::test]
    async fn test_offline_config_builds_pipeline() {
        let pipeline = RagPipeline::from_config(&AppConfig::offline()).await.unwrap();
        let result = pipeline.run("Hello?", &[], None).await.unwrap();
        assert!(result.insufficient_context);
    }
}
