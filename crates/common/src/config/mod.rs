//! Configuration management for ProfRAG services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Legacy deployment variables (OPENAI_API_KEY, PINECONE_*, DATABASE_URL)
//! - Default values

use crate::errors::AppError;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Relational store listing professor names
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chat completion service configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Vector index configuration
    #[serde(default)]
    pub vector_index: VectorIndexConfig,

    /// RAG pipeline tuning
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL. `/professors` is disabled when unset.
    pub url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_openai_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,

    /// Total time budget for adapter-internal retries (0 disables retries)
    #[serde(default = "default_retry_budget")]
    pub retry_budget_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Completion provider: openai, mock
    #[serde(default = "default_openai_provider")]
    pub provider: String,

    pub api_key: Option<String>,

    pub api_base: Option<String>,

    /// Chat model
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sampling temperature (unset means provider default)
    pub temperature: Option<f32>,

    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_retry_budget")]
    pub retry_budget_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorIndexConfig {
    /// Vector index provider: pinecone, memory
    #[serde(default = "default_index_provider")]
    pub provider: String,

    pub api_key: Option<String>,

    /// Index name, used to resolve the data-plane host
    pub index_name: Option<String>,

    /// Legacy Pinecone environment (informational, logged at startup)
    pub environment: Option<String>,

    /// Explicit data-plane host, skips host resolution
    pub host: Option<String>,

    /// Namespace to query
    pub namespace: Option<String>,

    /// JSON documents to load into the in-memory index
    pub seed_path: Option<String>,

    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,

    /// Total time budget for adapter-internal retries (0 disables retries)
    #[serde(default = "default_retry_budget")]
    pub retry_budget_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Chunks fetched from the vector index per request
    #[serde(default = "default_retrieve_top_k")]
    pub retrieve_top_k: usize,

    /// Chunks kept after reranking
    #[serde(default = "default_rerank_top_n")]
    pub rerank_top_n: usize,

    /// Memory summarization cadence, in history turns
    #[serde(default = "default_summary_interval")]
    pub summary_interval: usize,

    /// Filter value meaning "search everything"
    #[serde(default = "default_no_filter_sentinel")]
    pub no_filter_sentinel: String,

    /// Metadata attribute the request filter applies to
    #[serde(default = "default_filter_field")]
    pub filter_field: String,

    /// Fixed reply when no retrieved chunk carries text
    #[serde(default = "default_insufficient_context_message")]
    pub insufficient_context_message: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log filter directive (e.g. "info", "profrag_common=debug")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name recorded on every request span
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_request_timeout() -> u64 { 60 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_connect_timeout() -> u64 { 10 }
fn default_openai_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_llm_model() -> String { crate::DEFAULT_COMPLETION_MODEL.to_string() }
fn default_upstream_timeout() -> u64 { 30 }
fn default_retry_budget() -> u64 { 2_000 }
fn default_index_provider() -> String { "pinecone".to_string() }
fn default_retrieve_top_k() -> usize { 6 }
fn default_rerank_top_n() -> usize { 3 }
fn default_summary_interval() -> usize { 3 }
fn default_no_filter_sentinel() -> String { "Unknown".to_string() }
fn default_filter_field() -> String { "professor".to_string() }
fn default_insufficient_context_message() -> String {
    "I'm sorry, I don't have enough information to answer that question.".to_string()
}
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "profrag".to_string() }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_openai_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_upstream_timeout(),
            retry_budget_ms: default_retry_budget(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_openai_provider(),
            api_key: None,
            api_base: None,
            model: default_llm_model(),
            temperature: None,
            timeout_secs: default_upstream_timeout(),
            retry_budget_ms: default_retry_budget(),
        }
    }
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            provider: default_index_provider(),
            api_key: None,
            index_name: None,
            environment: None,
            host: None,
            namespace: None,
            seed_path: None,
            timeout_secs: default_upstream_timeout(),
            retry_budget_ms: default_retry_budget(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retrieve_top_k: default_retrieve_top_k(),
            rerank_top_n: default_rerank_top_n(),
            summary_interval: default_summary_interval(),
            no_filter_sentinel: default_no_filter_sentinel(),
            filter_field: default_filter_field(),
            insufficient_context_message: default_insufficient_context_message(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files, environment and legacy variables
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Self = config.try_deserialize()?;
        config.apply_legacy_env(|key| dotenvy::var(key).ok());
        Ok(config)
    }

    /// Fill unset keys from the plain legacy variables (`OPENAI_API_KEY`, `PINECONE_*`, `DATABASE_URL`).
    ///
    /// Structured `APP__*` keys always win.
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.embedding.api_key.get_or_insert_with(|| key.clone());
            self.llm.api_key.get_or_insert(key);
        }
        if self.vector_index.api_key.is_none() {
            self.vector_index.api_key = non_empty("PINECONE_API_KEY");
        }
        if self.vector_index.index_name.is_none() {
            self.vector_index.index_name = non_empty("PINECONE_INDEX");
        }
        if self.vector_index.environment.is_none() {
            self.vector_index.environment = non_empty("PINECONE_ENVIRONMENT");
        }
        if self.database.url.is_none() {
            self.database.url = non_empty("DATABASE_URL");
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        let p = &self.pipeline;
        if p.rerank_top_n == 0 {
            return Err(configuration("pipeline.rerank_top_n must be at least 1"));
        }
        if p.retrieve_top_k < p.rerank_top_n {
            return Err(configuration(
                "pipeline.retrieve_top_k must not be smaller than pipeline.rerank_top_n",
            ));
        }
        if p.summary_interval == 0 {
            return Err(configuration("pipeline.summary_interval must be at least 1"));
        }
        if self.embedding.provider == "openai" && self.embedding.api_key.is_none() {
            return Err(configuration("embedding.api_key is required for the openai provider"));
        }
        if self.llm.provider == "openai" && self.llm.api_key.is_none() {
            return Err(configuration("llm.api_key is required for the openai provider"));
        }
        if self.vector_index.provider == "pinecone" {
            if self.vector_index.api_key.is_none() {
                return Err(configuration("vector_index.api_key is required for pinecone"));
            }
            if self.vector_index.host.is_none() && self.vector_index.index_name.is_none() {
                return Err(configuration(
                    "vector_index.host or vector_index.index_name is required for pinecone",
                ));
            }
        }
        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Offline configuration: mock embedder, mock completions, in-memory index
    pub fn offline() -> Self {
        let mut config = Self::default();
        config.embedding.provider = "mock".to_string();
        config.llm.provider = "mock".to_string();
        config.vector_index.provider = "memory".to_string();
        config
    }
}

fn configuration(message: &str) -> AppError {
    AppError::Configuration {
        message: message.to_string(),
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            vector_index: VectorIndexConfig::default(),
            pipeline: PipelineConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
