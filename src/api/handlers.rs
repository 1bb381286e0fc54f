//! Thin HTTP handlers (spec.md §4.7): validate, register with the broker,
//! spawn the orchestrator, translate errors. No debate logic lives here.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::orchestrator::{self, DebateConfig, DebateDeps, DebateEvent};
use crate::state::AppState;
use crate::trace::ListFilter;

use super::error::{ApiError, ApiResult};
use super::types::*;

const MAX_QUERY_CHARS: usize = 4000;
const MIN_QUERY_CHARS: usize = 1;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let backend_ok = state.inference.list_models().await.is_ok();
    let templates = state.templates.list().await.len();
    Json(HealthResponse {
        status: if backend_ok { "ok" } else { "degraded" },
        backend: backend_ok,
        version: env!("CARGO_PKG_VERSION"),
        templates,
    })
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<crate::inference::ModelInfo>>> {
    let models = state.inference.list_models().await?;
    Ok(Json(models))
}

fn apply_overrides(base: DebateConfig, overrides: Option<DebateConfigOverride>) -> DebateConfig {
    let Some(o) = overrides else { return base };
    DebateConfig {
        min_rounds: o.min_rounds.unwrap_or(base.min_rounds),
        max_rounds: o.max_rounds.unwrap_or(base.max_rounds),
        early_stop_score: o.early_stop_score.unwrap_or(base.early_stop_score),
        proposer_model: o.proposer_model.unwrap_or(base.proposer_model),
        skeptic_model: o.skeptic_model.unwrap_or(base.skeptic_model),
        synthesizer_model: o.synthesizer_model.unwrap_or(base.synthesizer_model),
        proposer_temp: o.proposer_temp.unwrap_or(base.proposer_temp),
        skeptic_temp: o.skeptic_temp.unwrap_or(base.skeptic_temp),
        synthesizer_temp: o.synthesizer_temp.unwrap_or(base.synthesizer_temp),
        rag_top_k: o.rag_top_k.unwrap_or(base.rag_top_k),
        similarity_floor: o.similarity_floor.unwrap_or(base.similarity_floor),
        per_call_timeout: base.per_call_timeout,
    }
}

fn validate_config(config: &DebateConfig) -> ApiResult<()> {
    if config.min_rounds < 1 || config.max_rounds < config.min_rounds {
        return Err(ApiError::validation("maxRounds must be >= minRounds >= 1"));
    }
    if !(1..=10).contains(&config.early_stop_score) {
        return Err(ApiError::validation("earlyStopScore must be in 1..=10"));
    }
    for (name, temp) in [
        ("proposerTemp", config.proposer_temp),
        ("skepticTemp", config.skeptic_temp),
        ("synthesizerTemp", config.synthesizer_temp),
    ] {
        if !(0.0..=2.0).contains(&temp) {
            return Err(ApiError::validation(format!("{name} must be in [0,2]")));
        }
    }
    if config.rag_top_k < 1 {
        return Err(ApiError::validation("ragTopK must be >= 1"));
    }
    if !(0.0..=1.0).contains(&config.similarity_floor) {
        return Err(ApiError::validation("similarityFloor must be in [0,1]"));
    }
    Ok(())
}

pub async fn start_reason(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReasonRequest>,
) -> ApiResult<Json<ReasonResponse>> {
    if req.query.chars().count() < MIN_QUERY_CHARS || req.query.chars().count() > MAX_QUERY_CHARS {
        return Err(ApiError::validation(format!(
            "query must be {MIN_QUERY_CHARS}..{MAX_QUERY_CHARS} characters"
        )));
    }

    let config = apply_overrides(state.config.default_debate_config(), req.config);
    validate_config(&config)?;

    let queue_capacity = state.config.concurrency.queue_capacity;
    let depth = state.queue_depth.fetch_add(1, Ordering::SeqCst);
    if depth >= queue_capacity {
        state.queue_depth.fetch_sub(1, Ordering::SeqCst);
        return Err(ApiError::busy(5));
    }

    let trace_id = orchestrator::new_trace_id();
    let publisher = state.broker.register(trace_id.clone()).await?;

    let deps = DebateDeps {
        inference: state.inference.clone(),
        templates: state.templates.clone(),
        traces: state.traces.clone(),
        prompts: state.prompts.clone(),
        embedding_model: state.config.roles.embedding_model.clone(),
    };
    let query = req.query.clone();
    let config_for_response = DebateConfigView::from(&config);
    let state_for_task = state.clone();
    let trace_id_for_task = trace_id.clone();

    tokio::spawn(async move {
        let permit = state_for_task.debate_slots.clone().acquire_owned().await;
        state_for_task.queue_depth.fetch_sub(1, Ordering::SeqCst);
        let _permit = match permit {
            Ok(p) => p,
            Err(_) => {
                warn!("debate semaphore closed, aborting debate");
                publisher.fail().await;
                return;
            }
        };

        let cancel = CancellationToken::new();
        let mut events = orchestrator::run(trace_id_for_task.clone(), query, config, deps, cancel);
        let mut completed = false;
        while let Some(event) = events.next().await {
            if matches!(event, DebateEvent::Completed { .. }) {
                completed = true;
            }
            publisher.publish(event).await;
        }
        if completed {
            publisher.complete().await;
        } else {
            publisher.fail().await;
        }
        info!(trace_id = %trace_id_for_task, "debate task finished");
    });

    Ok(Json(ReasonResponse { trace_id, config: config_for_response }))
}

pub async fn stream_reason(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>> {
    let (replay, live) = state.broker.subscribe(&id).await?;

    let replay_stream = stream::iter(replay.into_iter().map(to_sse_event));
    let combined: std::pin::Pin<Box<dyn Stream<Item = Result<Event, std::convert::Infallible>> + Send>> =
        match live {
            Some(receiver) => {
                let live_stream = tokio_stream::wrappers::BroadcastStream::new(receiver)
                    .filter_map(|res| async move { res.ok() })
                    .map(to_sse_event);
                Box::pin(replay_stream.chain(live_stream))
            }
            None => Box::pin(replay_stream),
        };

    Ok(Sse::new(combined).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: DebateEvent) -> Result<Event, std::convert::Infallible> {
    Ok(Event::default().json_data(&event).unwrap_or_else(|_| Event::default().data("{}")))
}

pub async fn list_traces(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListTracesQuery>,
) -> ApiResult<Json<ListTracesResponse>> {
    let filter = ListFilter {
        limit: q.limit.unwrap_or(20),
        offset: q.offset.unwrap_or(0),
        min_quality: q.min_quality,
        search_text: q.search,
    };
    let traces = state.traces.list(&filter).await?;
    let stats = state.traces.stats().await?;
    Ok(Json(ListTracesResponse {
        traces: traces.into_iter().map(TraceSummaryView::from).collect(),
        stats,
    }))
}

pub async fn get_trace(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TraceResponse>> {
    let trace = state.traces.get(&id).await?.ok_or_else(|| ApiError::not_found(format!("trace {id} not found")))?;
    Ok(Json(TraceResponse(trace)))
}

pub async fn rate_trace(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RateRequest>,
) -> ApiResult<impl IntoResponse> {
    if !(1..=10).contains(&req.rating) {
        return Err(ApiError::validation("rating must be in 1..=10"));
    }
    state.traces.rate(&id, req.rating).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}
