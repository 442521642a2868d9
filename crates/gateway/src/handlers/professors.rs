//! Professor directory handler

use axum::{extract::State, Json};

use crate::AppState;
use profrag_common::errors::{AppError, Result};

/// Names a client may pass as the `professor` filter of `/rag/ask`
pub async fn list_professors(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    let store = state.professors.as_ref().ok_or_else(|| AppError::ServiceUnavailable {
        message: "professor directory is not configured".to_string(),
    })?;

    let names = store.list_professors().await?;
    tracing::debug!(count = names.len(), "Listed professors");
    Ok(Json(names))
}
