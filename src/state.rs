//! Shared application state, grounded in the `AppState` shape of
//! `crates/mira-server/src/web/state.rs`: one struct of `Arc`-wrapped
//! collaborators handed to every handler via axum's `State` extractor.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::broker::Broker;
use crate::config::Config;
use crate::inference::InferenceClient;
use crate::prompt::PromptSource;
use crate::templates::TemplateStore;
use crate::trace::TraceStore;

pub struct AppState {
    pub config: Config,
    pub inference: Arc<dyn InferenceClient>,
    pub templates: Arc<TemplateStore>,
    pub traces: Arc<TraceStore>,
    pub prompts: Arc<dyn PromptSource>,
    pub broker: Arc<Broker>,
    /// Global concurrency cap on simultaneously running debates (spec.md §5).
    pub debate_slots: Arc<Semaphore>,
    /// Count of debates admitted but still waiting on a slot. Bounded by
    /// `config.concurrency.queue_capacity`; exceeding it rejects with Busy.
    pub queue_depth: Arc<AtomicUsize>,
}
