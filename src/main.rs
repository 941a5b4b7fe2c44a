use std::sync::Arc;

use psyche::api::{self, app_state::AppState};
use psyche::config::loader::ConfigLoader;
use psyche::config::LoggingConfig;
use psyche::index::{create_embedding_model, create_vector_index};
use psyche::agents::OpenAiChatModel;
use psyche::observability::{create_observability_router, ObservabilityState};
use psyche::services::orchestrator::SessionOrchestrator;
use psyche::services::training::TrainingRunner;
use psyche::storage::create_store;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_logging(config: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "psyche.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            if config.structured {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .json()
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .init();
            }
            Some(guard)
        }
        None => {
            if config.structured {
                tracing_subscriber::fmt().with_env_filter(filter).json().init();
            } else {
                tracing_subscriber::fmt().with_env_filter(filter).init();
            }
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::load()?;
    ConfigLoader::validate(&config)?;
    let _log_guard = init_logging(&config.logging);
    info!("Starting Psyche...");
    info!("Configuration loaded successfully");

    let store = create_store(&config.storage)?;
    info!("Storage initialized (backend: {})", config.storage.backend);

    let embedding = create_embedding_model(&config.embedding)?;
    info!(
        "Embedding model initialized: {} (backend: {})",
        config.embedding.model_name, config.embedding.backend
    );

    let index = create_vector_index(config.embedding.dimension);
    info!("Vector index initialized");

    let llm = Arc::new(OpenAiChatModel::new(&config.llm)?);
    info!("Chat model client initialized: {}", config.llm.model_name);

    let observability_state = Arc::new(ObservabilityState::new(
        env!("CARGO_PKG_VERSION").to_string(),
    ));

    let orchestrator = Arc::new(SessionOrchestrator::new(
        store.clone(),
        index,
        embedding,
        llm,
        config.counseling.clone(),
        config.llm.max_retries,
        observability_state.metrics.clone(),
    ));
    info!("Session orchestrator initialized");

    let training = Arc::new(TrainingRunner::new(
        orchestrator.clone(),
        config.counseling.workers,
    ));
    info!(
        "Training runner initialized ({} workers)",
        config.counseling.workers
    );

    let app_state = AppState::new(orchestrator, store, training);
    let api_router = api::create_router(app_state);
    let router = create_observability_router(observability_state).merge(api_router);
    info!("API router created with observability endpoints");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
