//! Process entry point: load configuration, wire collaborators, bind the
//! HTTP server. Grounded in `backend/src/main.rs`'s `FmtSubscriber` +
//! `#[tokio::main]` bootstrap shape.

use std::process::ExitCode;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

use crucible::broker::Broker;
use crucible::config::Config;
use crucible::inference::OllamaShapedClient;
use crucible::prompt::FilesystemPromptSource;
use crucible::state::AppState;
use crucible::templates::{TemplateStore, FALLBACK_TEMPLATE_ID};
use crucible::trace::TraceStore;

#[derive(Debug, Error)]
enum StartupError {
    #[error("failed to open trace store: {0}")]
    Store(#[from] sqlx::Error),
    #[error("failed to load prompt templates: {0}")]
    Prompts(#[from] crucible::prompt::PromptSourceError),
    #[error("failed to index reasoning templates: {0}")]
    Templates(anyhow::Error),
    #[error("failed to bind HTTP listener on {0}: {1}")]
    Bind(String, std::io::Error),
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    let level = config.logging.level.parse().unwrap_or(tracing::Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("tracing subscriber already set");
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "startup failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), StartupError> {
    info!("starting crucible");

    let trace_store = Arc::new(TraceStore::open(&config.store.database_url).await?);

    let inference: Arc<dyn crucible::inference::InferenceClient> = Arc::new(OllamaShapedClient::new(
        config.backend.base_url.clone(),
        config.backend.hard_ceiling,
    ));

    let template_store = Arc::new(TemplateStore::new(
        trace_store.pool(),
        inference.clone(),
        config.roles.embedding_model.clone(),
    ));
    template_store.migrate().await.map_err(StartupError::Templates)?;
    ensure_fallback_template_seeded(&config);
    let indexed = template_store
        .reindex(&config.retrieval.template_dirs)
        .await
        .map_err(StartupError::Templates)?;
    info!(count = indexed, "reasoning templates indexed");

    let prompts = Arc::new(FilesystemPromptSource::load(&config.prompts.prompts_dir)?);

    let broker = Broker::new(
        config.concurrency.broker_replay_capacity,
        config.concurrency.broker_idle_ttl,
    );
    broker.spawn_idle_sweeper().await;

    let state = Arc::new(AppState {
        debate_slots: Arc::new(Semaphore::new(config.concurrency.max_concurrent_debates)),
        queue_depth: Arc::new(AtomicUsize::new(0)),
        inference,
        templates: template_store,
        traces: trace_store,
        prompts,
        broker,
        config,
    });

    let router = crucible::api::build_router(state.clone());
    let bind_address = state.config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .map_err(|e| StartupError::Bind(bind_address.clone(), e))?;
    info!(address = %bind_address, "listening");

    axum::serve(listener, router).await.map_err(StartupError::Serve)?;
    Ok(())
}

/// Copy the built-in fallback template into the first configured template
/// directory if nothing there already parses to the fallback id, so
/// `search` never returns an empty result on first run (SPEC_FULL §4.2).
fn ensure_fallback_template_seeded(config: &Config) {
    let Some(first_dir) = config.retrieval.template_dirs.first() else { return };
    let target = first_dir.join("general-reasoning.md");
    if target.exists() {
        return;
    }
    let seed = include_str!("../templates_seed/general-reasoning.md");
    if std::fs::create_dir_all(first_dir).is_err() {
        return;
    }
    if let Err(e) = std::fs::write(&target, seed) {
        tracing::warn!(error = %e, "failed to seed fallback template, continuing without it");
    } else {
        tracing::debug!(id = FALLBACK_TEMPLATE_ID, "seeded fallback template");
    }
}
