//! Shared test harness: wires a real `TraceStore`/`TemplateStore` against a
//! temp-file SQLite database (in-memory URLs don't share state across the
//! pool's multiple connections) and a `FakeInferenceClient` standing in for
//! the local backend.

use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use crucible::broker::Broker;
use crucible::config::Config;
use crucible::inference::testing::{FakeInferenceClient, ScriptedReply};
use crucible::inference::InferenceClient;
use crucible::prompt::FilesystemPromptSource;
use crucible::state::AppState;
use crucible::templates::TemplateStore;
use crucible::trace::TraceStore;
use tempfile::TempDir;
use tokio::sync::Semaphore;

pub struct Harness {
    pub state: Arc<AppState>,
    // Keeps the backing temp dir/file alive for the harness's lifetime.
    _tempdir: TempDir,
}

pub async fn build(replies: Vec<ScriptedReply>) -> Harness {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let db_path = tempdir.path().join("crucible-test.db");
    let template_dir = tempdir.path().join("templates");
    std::fs::create_dir_all(&template_dir).expect("create template dir");
    std::fs::write(
        template_dir.join("general-reasoning.md"),
        include_str!("../../templates_seed/general-reasoning.md"),
    )
    .expect("seed template");

    let database_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let traces = Arc::new(TraceStore::open(&database_url).await.expect("open trace store"));

    let inference: Arc<dyn InferenceClient> = Arc::new(FakeInferenceClient::new(replies));

    let templates = Arc::new(TemplateStore::new(traces.pool(), inference.clone(), "fake-embed".to_string()));
    templates.migrate().await.expect("migrate templates");
    templates.reindex(&[template_dir.clone()]).await.expect("reindex templates");

    let prompts_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("prompts");
    let prompts = Arc::new(FilesystemPromptSource::load(&prompts_dir).expect("load prompts"));

    let broker = Broker::new(64, Duration::from_secs(60));

    let mut config = Config::from_env();
    config.store.database_url = database_url;
    config.retrieval.template_dirs = vec![template_dir];
    config.prompts.prompts_dir = prompts_dir;
    config.concurrency.max_concurrent_debates = 2;
    config.concurrency.queue_capacity = 4;

    let state = Arc::new(AppState {
        config,
        inference,
        templates,
        traces,
        prompts,
        broker,
        debate_slots: Arc::new(Semaphore::new(2)),
        queue_depth: Arc::new(AtomicUsize::new(0)),
    });

    Harness { state, _tempdir: tempdir }
}
