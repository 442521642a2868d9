//! ProfRAG API Gateway
//!
//! The HTTP entry point for professor questions.
//! Handles:
//! - Question answering over the RAG pipeline
//! - Professor directory lookup
//! - Rate limiting
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    body::Body,
    http::Request,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use profrag_common::{
    config::{AppConfig, ObservabilityConfig},
    db::{DbPool, ProfessorStore, SqlProfessorStore},
    errors::Result,
    metrics,
    RagPipeline,
};
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{signal, sync::oneshot};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<RagPipeline>,
    /// Absent when no database URL is configured
    pub professors: Option<Arc<dyn ProfessorStore>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.observability);

    info!(
        service = %config.observability.service_name,
        "Starting ProfRAG API Gateway v{}",
        profrag_common::VERSION
    );

    config.validate().map_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        e
    })?;
    let config = Arc::new(config);

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        install_metrics_exporter(&config.observability)?;
    }
    metrics::register_metrics();

    let pipeline = Arc::new(RagPipeline::from_config(&config).await?);

    let professors: Option<Arc<dyn ProfessorStore>> = match config.database.url {
        Some(_) => {
            let db = DbPool::new(&config.database).await?;
            Some(Arc::new(SqlProfessorStore::new(db)))
        }
        None => {
            info!("No database configured, /professors disabled");
            None
        }
    };

    // Create app state
    let state = AppState {
        config: config.clone(),
        pipeline,
        professors,
    };

    // Build the router
    let app = create_router(state)?;

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (started_tx, started_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = started_tx.send(());
        })
        .into_future();

    run_with_drain_deadline(
        server,
        async {
            let _ = started_rx.await;
        },
        config.shutdown_timeout(),
    )
    .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn install_metrics_exporter(config: &ObservabilityConfig) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            metrics::LATENCY_BUCKETS,
        )?
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Result<Router> {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let mut api_routes = Router::new()
        .route("/rag/ask", post(handlers::ask::ask))
        .route("/professors", get(handlers::professors::list_professors));

    if state.config.rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(&state.config.rate_limit)?;
        api_routes = api_routes.layer(axum::middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit::rate_limit_middleware,
        ));
    }

    // Health endpoints are never rate limited
    let health_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready));

    let timeout = TimeoutLayer::new(state.config.request_timeout());
    let service = state.config.observability.service_name.clone();
    let trace = TraceLayer::new_for_http()
        .make_span_with(move |request: &Request<Body>| request_span(&service, request));

    // Compose the app
    Ok(Router::new()
        .merge(health_routes)
        .merge(api_routes)
        .layer(timeout)
        .layer(trace)
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state))
}

fn request_span(service: &str, request: &Request<Body>) -> tracing::Span {
    tracing::info_span!(
        "request",
        service = %service,
        method = %request.method(),
        uri = %request.uri(),
    )
}

/// Drive `server` until it exits. Once `shutdown_started` resolves, in-flight
/// requests get at most `drain` to finish before we stop waiting.
async fn run_with_drain_deadline<S, F>(
    server: S,
    shutdown_started: F,
    drain: Duration,
) -> std::io::Result<()>
where
    S: Future<Output = std::io::Result<()>>,
    F: Future<Output = ()>,
{
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result,
        _ = shutdown_started => {}
    }

    match tokio::time::timeout(drain, &mut server).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                drain_secs = drain.as_secs(),
                "Connections still open after shutdown timeout, exiting"
            );
            Ok(())
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
