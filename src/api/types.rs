//! Request/response DTOs for the HTTP surface (spec.md §6).

use serde::{Deserialize, Serialize};

use crate::trace::{DebateTrace, Stats, TraceSummary};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateConfigOverride {
    pub min_rounds: Option<u8>,
    pub max_rounds: Option<u8>,
    pub early_stop_score: Option<u8>,
    pub proposer_model: Option<String>,
    pub skeptic_model: Option<String>,
    pub synthesizer_model: Option<String>,
    pub proposer_temp: Option<f32>,
    pub skeptic_temp: Option<f32>,
    pub synthesizer_temp: Option<f32>,
    pub rag_top_k: Option<usize>,
    pub similarity_floor: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub query: String,
    pub config: Option<DebateConfigOverride>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonResponse {
    pub trace_id: String,
    pub config: DebateConfigView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateConfigView {
    pub min_rounds: u8,
    pub max_rounds: u8,
    pub early_stop_score: u8,
    pub proposer_model: String,
    pub skeptic_model: String,
    pub synthesizer_model: String,
    pub proposer_temp: f32,
    pub skeptic_temp: f32,
    pub synthesizer_temp: f32,
    pub rag_top_k: usize,
    pub similarity_floor: f32,
}

impl From<&crate::orchestrator::DebateConfig> for DebateConfigView {
    fn from(c: &crate::orchestrator::DebateConfig) -> Self {
        Self {
            min_rounds: c.min_rounds,
            max_rounds: c.max_rounds,
            early_stop_score: c.early_stop_score,
            proposer_model: c.proposer_model.clone(),
            skeptic_model: c.skeptic_model.clone(),
            synthesizer_model: c.synthesizer_model.clone(),
            proposer_temp: c.proposer_temp,
            skeptic_temp: c.skeptic_temp,
            synthesizer_temp: c.synthesizer_temp,
            rag_top_k: c.rag_top_k,
            similarity_floor: c.similarity_floor,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: bool,
    pub version: &'static str,
    pub templates: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListTracesQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(rename = "minQuality")]
    pub min_quality: Option<u8>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListTracesResponse {
    pub traces: Vec<TraceSummaryView>,
    pub stats: Stats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSummaryView {
    pub id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub query: String,
    pub total_rounds: u32,
    pub early_stopped: bool,
    pub auto_score: Option<u8>,
    pub user_rating: Option<u8>,
}

impl From<TraceSummary> for TraceSummaryView {
    fn from(s: TraceSummary) -> Self {
        Self {
            id: s.id,
            created_at: s.created_at,
            query: s.query,
            total_rounds: s.total_rounds,
            early_stopped: s.early_stopped,
            auto_score: s.auto_score,
            user_rating: s.user_rating,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TraceResponse(pub DebateTrace);

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub rating: u8,
}

