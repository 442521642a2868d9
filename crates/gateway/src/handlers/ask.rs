//! Question answering handler

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

use crate::AppState;
use profrag_common::{
    errors::{AppError, Result},
    metrics::RequestMetrics,
    pipeline::HistoryTurn,
};

/// Ask request
#[derive(Debug, Deserialize, Validate)]
pub struct AskRequest {
    #[validate(length(min = 1, max = 4000))]
    pub question: String,

    /// Prior turns, oldest first
    #[serde(default)]
    #[validate(length(max = 100))]
    pub history: Vec<HistoryTurn>,

    /// Professor to restrict retrieval to; "Unknown" searches everything
    #[serde(default = "default_professor")]
    pub professor: String,
}

fn default_professor() -> String { "Unknown".to_string() }

/// Ask response
#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub summary: Option<String>,
    pub insufficient_context: bool,
}

/// Run the RAG pipeline for one question
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>> {
    let start = Instant::now();
    let request_metrics = RequestMetrics::start("POST", "/rag/ask");

    let result = answer(&state, request).await;

    let status = match &result {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    };
    request_metrics.finish(status);

    let response = result?;
    tracing::info!(
        latency_ms = start.elapsed().as_millis() as u64,
        summarized = response.summary.is_some(),
        insufficient_context = response.insufficient_context,
        "Question answered"
    );
    Ok(Json(response))
}

async fn answer(state: &AppState, request: AskRequest) -> Result<AskResponse> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    if request.question.trim().is_empty() {
        return Err(AppError::Validation {
            message: "question must not be blank".to_string(),
            field: Some("question".to_string()),
        });
    }

    let result = state
        .pipeline
        .run(&request.question, &request.history, Some(request.professor.as_str()))
        .await?;

    Ok(AskResponse {
        answer: result.answer,
        summary: result.summary,
        insufficient_context: result.insufficient_context,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request: AskRequest = serde_json::from_str(r#"{"question": "Is Smith fair?"}"#).unwrap();
        assert_eq!(request.professor, "Unknown");
        assert!(request.history.is_empty());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_request_history_shape() {
        let request: AskRequest = serde_json::from_str(
            r#"{"question": "And exams?", "history": [{"user": "Is Smith fair?", "bot": "Mostly."}], "professor": "Smith"}"#,
        )
        .unwrap();
        assert_eq!(request.history, vec![HistoryTurn::new("Is Smith fair?", "Mostly.")]);
        assert_eq!(request.professor, "Smith");
    }

    #[test]
    fn test_request_limits() {
        let empty: AskRequest = serde_json::from_str(r#"{"question": ""}"#).unwrap();
        assert!(empty.validate().is_err());

        let long = AskRequest {
            question: "x".repeat(4001),
            history: Vec::new(),
            professor: default_professor(),
        };
        assert!(long.validate().is_err());

        let deep = AskRequest {
            question: "q".to_string(),
            history: vec![HistoryTurn::new("u", "b"); 101],
            professor: default_professor(),
        };
        assert!(deep.validate().is_err());
    }
}
