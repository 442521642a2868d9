//! Pinecone data-plane client
//!
//! Queries go to `https://{host}/query`. When only an index name is
//! configured, the host is resolved once through the control plane.

use super::{ChunkMetadata, RetrievedChunk, VectorIndex, VectorQuery};
use crate::config::VectorIndexConfig;
use crate::errors::{AppError, Result};
use crate::retry::{self, with_retry};
use async_trait::async_trait;
use backoff::Error as BackoffError;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::sync::OnceCell;

const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";
const SERVICE: &str = "vector_index";

/// Pinecone vector index
pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    index_name: Option<String>,
    namespace: Option<String>,
    host: OnceCell<String>,
    timeout: Duration,
    retry_budget: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct DescribeIndexResponse {
    host: String,
}

impl PineconeIndex {
    pub fn new(config: &VectorIndexConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "Pinecone API key required".to_string(),
        })?;
        if config.host.is_none() && config.index_name.is_none() {
            return Err(AppError::Configuration {
                message: "Pinecone host or index name required".to_string(),
            });
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let host = OnceCell::new();
        if let Some(explicit) = config.host.as_deref() {
            // A freshly created cell always accepts its first value
            let _ = host.set(normalize_host(explicit));
        }

        if let Some(environment) = config.environment.as_deref() {
            tracing::debug!(environment, "Pinecone environment configured");
        }

        Ok(Self {
            client,
            api_key,
            index_name: config.index_name.clone(),
            namespace: config.namespace.clone(),
            host,
            timeout,
            retry_budget: Duration::from_millis(config.retry_budget_ms),
        })
    }

    async fn host(&self) -> Result<&str> {
        let host = self
            .host
            .get_or_try_init(|| self.describe_index())
            .await?;
        Ok(host.as_str())
    }

    /// Resolve the data-plane host for the configured index name
    async fn describe_index(&self) -> Result<String> {
        let name = self.index_name.as_deref().ok_or_else(|| AppError::Configuration {
            message: "Pinecone index name required to resolve host".to_string(),
        })?;

        let described = with_retry(SERVICE, self.retry_budget, || self.send_describe(name)).await?;

        tracing::info!(index = name, host = %described.host, "Resolved Pinecone host");
        Ok(normalize_host(&described.host))
    }

    async fn send_describe(
        &self,
        name: &str,
    ) -> std::result::Result<DescribeIndexResponse, BackoffError<AppError>> {
        let response = self
            .client
            .get(format!("{}/indexes/{}", CONTROL_PLANE_URL, name))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| retry::send_error(SERVICE, self.timeout, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(upstream_status_error(
                status,
                format!("describe_index {} failed with {}: {}", name, status, body),
            ));
        }

        response.json().await.map_err(|e| {
            BackoffError::permanent(AppError::VectorIndexError {
                message: format!("Failed to parse describe_index response: {}", e),
            })
        })
    }

    async fn send_query(
        &self,
        host: &str,
        request: &QueryRequest<'_>,
    ) -> std::result::Result<QueryResponse, BackoffError<AppError>> {
        let response = self
            .client
            .post(format!("{}/query", host))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| retry::send_error(SERVICE, self.timeout, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(upstream_status_error(
                status,
                format!("Query failed with {}: {}", status, body),
            ));
        }

        response.json().await.map_err(|e| {
            BackoffError::permanent(AppError::VectorIndexError {
                message: format!("Failed to parse query response: {}", e),
            })
        })
    }
}

/// 429 and 5xx are retried, anything else fails the call
fn upstream_status_error(status: StatusCode, message: String) -> BackoffError<AppError> {
    retry::status_error(status, AppError::VectorIndexError { message })
}

/// Pinecone filter expression for an equality constraint
fn filter_expression(query: &VectorQuery) -> Option<Value> {
    query.filter.as_ref().map(|f| {
        let mut expr = Map::new();
        expr.insert(f.field.clone(), json!({ "$eq": f.value }));
        Value::Object(expr)
    })
}

fn normalize_host(host: &str) -> String {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    #[tracing::instrument(skip(self, query), fields(top_k = query.top_k, filtered = query.filter.is_some()))]
    async fn query(&self, query: &VectorQuery) -> Result<Vec<RetrievedChunk>> {
        let host = self.host().await?;

        let request = QueryRequest {
            vector: &query.vector,
            top_k: query.top_k,
            include_metadata: query.include_metadata,
            include_values: false,
            filter: filter_expression(query),
            namespace: self.namespace.as_deref(),
        };

        let parsed =
            with_retry(SERVICE, self.retry_budget, || self.send_query(host, &request)).await?;

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| RetrievedChunk {
                id: m.id,
                score: m.score,
                metadata: m.metadata.map(ChunkMetadata::from_map).unwrap_or_default(),
            })
            .collect())
    }

    fn provider_name(&self) -> &str {
        "pinecone"
    }
}
