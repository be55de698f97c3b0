mod app;
mod completion;
mod config;
mod cors;
mod embedding;
mod error;
mod models;
mod parser;
mod rag;
mod routes;
mod storage;
mod vector_store;

#[cfg(test)]
mod test_support;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use app::AppState;
use completion::openai::OpenAICompletionModel;
use config::{config_path_from_env, load_settings_from_path};
use embedding::openai::OpenAIEmbeddingModel;
use embedding::EmbeddingModel;
use vector_store::flat::FlatIndexStore;
use vector_store::VectorStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting RAG agent backend...");

    // Load configuration.
    let config_path = config_path_from_env();
    let settings = load_settings_from_path(&config_path)?;
    info!(
        "Configuration loaded from {}: host={}, port={}, source={}",
        config_path.display(),
        settings.host,
        settings.port,
        settings.source_path.display()
    );

    // Initialize vector store; a broken index on disk is logged, not fatal.
    let vector_store: Arc<dyn VectorStore> = Arc::new(FlatIndexStore::new(&settings.data_dir));
    if let Err(e) = vector_store.initialize().await {
        warn!("Could not load existing index: {e}; call /ingest to rebuild it");
    }

    // Initialize embedding model.
    let embedding_model = Arc::new(OpenAIEmbeddingModel::new(
        &settings.embedding_model,
        &settings.openai_api_key,
        &settings.openai_base_url,
        settings.vector_dimensions,
        settings.embedding_batch_size,
    ));
    info!(
        "Embedding model initialized: {} ({} dimensions)",
        settings.embedding_model,
        embedding_model.dimensions()
    );

    // Initialize completion model.
    let completion_model = Arc::new(OpenAICompletionModel::new(
        &settings.completion_model,
        &settings.openai_api_key,
        &settings.openai_base_url,
    ));
    info!("Completion model initialized: {}", settings.completion_model);

    let cors = cors::cors_layer(&settings.allowed_origins);
    info!("CORS allowed origins: {:?}", settings.allowed_origins);

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;

    // Build application state.
    let state = Arc::new(AppState::new(
        settings,
        vector_store,
        embedding_model,
        completion_model,
    ));

    // Build router.
    let app = routes::build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server.
    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on unix (pod termination).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("SIGTERM handler failed: {e}");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
    info!("Shutdown signal received");
}
