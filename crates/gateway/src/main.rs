//! Shmulik API Gateway
//!
//! HTTP front end for the chat assistant.
//! Handles:
//! - Opening the vector index (building it from the documents when missing)
//! - Wiring the retriever, generation workflow and conversation sessions
//! - Request routing, timeouts and CORS
//! - Observability (logging, metrics, request ids)

mod handlers;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use shmulik_common::{
    config::AppConfig,
    context::{ConversationManager, GenerationSettings, GenerationWorkflow, HistoryPolicy},
    embeddings::{create_embedder, Embedder},
    errors::AppError,
    index::{IndexSpec, VectorIndex},
    llm::ChatCompletionClient,
    metrics,
    observability::init_tracing,
    retrieval::Retriever,
};
use shmulik_ingestion::build_index;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub conversations: Arc<ConversationManager>,
    pub index: Arc<VectorIndex>,
    /// Whether a persisted or freshly built index backs `index`
    pub index_loaded: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.observability);

    info!("Starting Shmulik API Gateway v{}", shmulik_common::VERSION);

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        prometheus_builder()?
            .with_http_listener(metrics_addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Metrics exporter listening on {}", metrics_addr);
    }
    metrics::register_metrics();

    let config = Arc::new(config);
    let state = build_state(config.clone()).await?;

    let sweeper = spawn_session_sweeper(
        state.conversations.clone(),
        Duration::from_secs(config.server.session_sweep_interval_secs),
    );

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// Prometheus builder with explicit buckets for the latency histograms
fn prometheus_builder() -> anyhow::Result<PrometheusBuilder> {
    let mut builder = PrometheusBuilder::new();
    for (name, buckets) in metrics::histogram_buckets() {
        builder = builder
            .set_buckets_for_metric(Matcher::Full(name), buckets)
            .context("Invalid histogram buckets")?;
    }
    Ok(builder)
}

/// Wire the embedding provider, index, language model and sessions
async fn build_state(config: Arc<AppConfig>) -> anyhow::Result<AppState> {
    let embedder = create_embedder(&config.embedding).context("Failed to create embedder")?;
    info!(
        model = embedder.model_name(),
        dimension = embedder.dimension(),
        "Embedding provider ready"
    );

    let (index, index_loaded) = open_index(&config, embedder.clone()).await?;
    let index = Arc::new(index);
    metrics::set_index_entries(index.len().await);

    let model = Arc::new(ChatCompletionClient::new(&config.llm).context("Failed to create LLM client")?);
    let retriever = Arc::new(Retriever::new(embedder, index.clone(), &config.retrieval));
    let workflow = Arc::new(GenerationWorkflow::new(
        retriever,
        model,
        GenerationSettings::from_config(&config.llm, &config.conversation),
    ));
    let conversations = Arc::new(ConversationManager::new(
        workflow,
        HistoryPolicy::from(&config.conversation),
    ));

    Ok(AppState {
        config,
        conversations,
        index,
        index_loaded,
    })
}

/// Open the persisted index. A missing index is built from the configured
/// documents when `documents.build_on_startup` is set; an incompatible one
/// stops start-up.
async fn open_index(
    config: &AppConfig,
    embedder: Arc<dyn Embedder>,
) -> anyhow::Result<(VectorIndex, bool)> {
    let spec = IndexSpec {
        embedding_model: embedder.model_name().to_string(),
        dimension: embedder.dimension(),
        chunking: config.chunking.clone(),
    };

    match VectorIndex::open(&config.index.path, spec.clone()).await {
        Ok(index) => Ok((index, true)),
        Err(AppError::IndexNotFound { path }) if config.documents.build_on_startup => {
            warn!(path = %path, "No vector index found, building from documents");
            match build_index(config, embedder, &config.documents.paths, true).await {
                Ok((index, report)) => {
                    info!(
                        documents = report.documents.len(),
                        failed = report.failures.len(),
                        entries = report.index_entries,
                        "Vector index built"
                    );
                    Ok((index, true))
                }
                Err(e) => {
                    error!(error = %e, "Index build failed, serving without documents");
                    Ok((VectorIndex::new(&config.index.path, spec), false))
                }
            }
        }
        Err(AppError::IndexNotFound { path }) => {
            warn!(path = %path, "No vector index found; run `ingest` to build one");
            Ok((VectorIndex::new(&config.index.path, spec), false))
        }
        Err(e) => {
            Err(e).context("Vector index cannot be used with this configuration; rebuild it with `ingest --recreate`")
        }
    }
}

/// Periodically drop idle sessions
fn spawn_session_sweeper(
    conversations: Arc<ConversationManager>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            conversations.evict_idle().await;
        }
    })
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let timeout = TimeoutLayer::new(state.config.request_timeout());

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/chat", post(handlers::chat::chat))
        .route(
            "/sessions/{id}",
            get(handlers::sessions::get_session).delete(handlers::sessions::reset_session),
        )
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
