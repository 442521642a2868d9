//! Test doubles for the pipeline's external adapters

use crate::errors::{AppError, Result};
use crate::llm::{ChatMessage, CompletionClient};
use crate::vector::{ChunkMetadata, RetrievedChunk, VectorIndex, VectorQuery};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Completion client returning queued replies in order and recording every call
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Option<String>>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedCompletion {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Some(r.into())).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a reply after the ones already scripted
    pub fn then(self, reply: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Some(reply.into()));
        self
    }

    /// Queue an adapter failure as the next reply
    pub fn then_fail(self) -> Self {
        self.replies.lock().unwrap().push_back(None);
        self
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }

    /// Content of the last message of every call, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| c.last().map(|m| m.content.clone()).unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());
        match self.replies.lock().unwrap().pop_front() {
            Some(Some(reply)) => Ok(reply),
            Some(None) => Err(AppError::CompletionError {
                message: "scripted failure".to_string(),
            }),
            None => Err(AppError::CompletionError {
                message: "script exhausted".to_string(),
            }),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Vector index returning a fixed chunk list and recording queries
pub struct RecordingIndex {
    chunks: Vec<RetrievedChunk>,
    fail: bool,
    queries: Mutex<Vec<VectorQuery>>,
}

impl RecordingIndex {
    pub fn new(chunks: Vec<RetrievedChunk>) -> Self {
        Self {
            chunks,
            fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            chunks: Vec::new(),
            fail: true,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<VectorQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorIndex for RecordingIndex {
    async fn query(&self, query: &VectorQuery) -> Result<Vec<RetrievedChunk>> {
        self.queries.lock().unwrap().push(query.clone());
        if self.fail {
            return Err(AppError::VectorIndexError {
                message: "index unavailable".to_string(),
            });
        }
        Ok(self.chunks.iter().take(query.top_k).cloned().collect())
    }

    fn provider_name(&self) -> &str {
        "recording"
    }
}

/// Chunk with the given id and optional text
pub fn chunk(id: &str, text: Option<&str>) -> RetrievedChunk {
    RetrievedChunk {
        id: id.to_string(),
        score: 0.9,
        metadata: ChunkMetadata {
            text: text.map(str::to_string),
            ..ChunkMetadata::default()
        },
    }
}

/// `n` chunks with ids `c1..cn` and text `review n`
pub fn numbered_chunks(n: usize) -> Vec<RetrievedChunk> {
    (1..=n)
        .map(|i| {
            let text = format!("review {}", i);
            let mut c = chunk(&format!("c{}", i), Some(text.as_str()));
            c.score = 1.0 - i as f32 * 0.1;
            c
        })
        .collect()
}

pub fn ids(chunks: &[RetrievedChunk]) -> Vec<&str> {
    chunks.iter().map(|c| c.id.as_str()).collect()
}
