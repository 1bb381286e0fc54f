//! Trace Store (C3) — atomic persistence of debate traces.
//!
//! Grounded in `backend/src/patterns/storage.rs`'s SQLite-row-per-record
//! shape (Unix-timestamp columns parsed via `parse_timestamp`, hand-rolled
//! `CREATE TABLE IF NOT EXISTS` rather than `sqlx::migrate!`), extended with
//! a single `sqlx::Transaction` per `save` so a trace and its rounds commit
//! or roll back together.

mod schema;

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, warn};

/// One completed Proposer/Skeptic exchange.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub round: u32,
    pub proposer_text: String,
    pub skeptic_text: String,
    pub proposer_duration_ms: u64,
    pub skeptic_duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub total_ms: u64,
    pub rag_ms: u64,
    pub rounds_ms: Vec<u64>,
    pub synthesis_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsUsed {
    pub proposer: String,
    pub skeptic: String,
    pub synthesizer: String,
    pub embedding: String,
}

/// The durable record of a completed debate (spec.md §3 `DebateTrace`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateTrace {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub query: String,
    pub templates_used: Vec<String>,
    pub rounds: Vec<Round>,
    pub final_answer: String,
    pub early_stopped: bool,
    pub auto_score: Option<u8>,
    pub user_rating: Option<u8>,
    pub models: ModelsUsed,
    pub timing: Timing,
}

impl DebateTrace {
    pub fn total_rounds(&self) -> u32 {
        self.rounds.len() as u32
    }
}

#[derive(Debug, Clone)]
pub struct TraceSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub query: String,
    pub total_rounds: u32,
    pub early_stopped: bool,
    pub auto_score: Option<u8>,
    pub user_rating: Option<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub limit: i64,
    pub offset: i64,
    pub min_quality: Option<u8>,
    pub search_text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub count: i64,
    pub mean_quality: Option<f64>,
    pub candidates_count: i64,
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace {0} already exists")]
    Duplicate(String),
    #[error("trace {0} not found")]
    NotFound(String),
    #[error("invalid rating {0}, must be in 1..=10")]
    InvalidRating(u8),
    #[error("trace violates invariants: {0}")]
    InvariantViolation(String),
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Embedded, single-writer trace store over a `sqlx::SqlitePool` opened with
/// WAL journaling (§4.3 / §9 "single-writer store").
pub struct TraceStore {
    pool: SqlitePool,
}

impl TraceStore {
    pub async fn open(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Expose the underlying pool for the Template Store's `templates` table.
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        schema::run(&self.pool).await
    }

    /// Persist a trace and all its rounds atomically. Violates I3 to call
    /// this more than once for the same id; the second call fails with
    /// `Duplicate` via the primary-key conflict.
    pub async fn save(&self, trace: &DebateTrace) -> Result<(), TraceError> {
        validate_invariants(trace)?;

        let mut tx = self.pool.begin().await?;

        let existing: Option<String> = sqlx::query_scalar("SELECT id FROM traces WHERE id = ?")
            .bind(&trace.id)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(TraceError::Duplicate(trace.id.clone()));
        }

        let rounds_ms_json = serde_json::to_string(&trace.timing.rounds_ms).unwrap_or_default();
        let templates_json = serde_json::to_string(&trace.templates_used).unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO traces (
                id, created_at, query, templates_used, final_answer, early_stopped,
                auto_score, user_rating, proposer_model, skeptic_model, synthesizer_model,
                embedding_model, total_ms, rag_ms, rounds_ms, synthesis_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&trace.id)
        .bind(trace.created_at.timestamp())
        .bind(&trace.query)
        .bind(templates_json)
        .bind(&trace.final_answer)
        .bind(trace.early_stopped)
        .bind(trace.auto_score.map(|s| s as i64))
        .bind(trace.user_rating.map(|s| s as i64))
        .bind(&trace.models.proposer)
        .bind(&trace.models.skeptic)
        .bind(&trace.models.synthesizer)
        .bind(&trace.models.embedding)
        .bind(trace.timing.total_ms as i64)
        .bind(trace.timing.rag_ms as i64)
        .bind(rounds_ms_json)
        .bind(trace.timing.synthesis_ms as i64)
        .execute(&mut *tx)
        .await?;

        for round in &trace.rounds {
            sqlx::query(
                r#"
                INSERT INTO rounds (trace_id, round, proposer_text, skeptic_text, proposer_duration_ms, skeptic_duration_ms)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&trace.id)
            .bind(round.round as i64)
            .bind(&round.proposer_text)
            .bind(&round.skeptic_text)
            .bind(round.proposer_duration_ms as i64)
            .bind(round.skeptic_duration_ms as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(trace_id = %trace.id, rounds = trace.rounds.len(), "trace persisted");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<DebateTrace>, TraceError> {
        let row = sqlx::query_as::<_, schema::TraceRow>("SELECT * FROM traces WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };

        let round_rows = sqlx::query_as::<_, schema::RoundRow>(
            "SELECT * FROM rounds WHERE trace_id = ? ORDER BY round ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(row.into_trace(round_rows)))
    }

    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<TraceSummary>, TraceError> {
        let mut sql = String::from(
            "SELECT id, created_at, query, auto_score, user_rating, \
             (SELECT COUNT(*) FROM rounds r WHERE r.trace_id = traces.id) as total_rounds, \
             early_stopped FROM traces WHERE 1=1",
        );
        if filter.min_quality.is_some() {
            sql.push_str(" AND (auto_score >= ? OR user_rating >= ?)");
        }
        if filter.search_text.is_some() {
            sql.push_str(" AND query LIKE ?");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query_as::<_, schema::SummaryRow>(&sql);
        if let Some(q) = filter.min_quality {
            query = query.bind(q as i64).bind(q as i64);
        }
        if let Some(ref text) = filter.search_text {
            query = query.bind(format!("%{text}%"));
        }
        query = query.bind(filter.limit).bind(filter.offset);

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(schema::SummaryRow::into_summary).collect())
    }

    pub async fn rate(&self, id: &str, score: u8) -> Result<(), TraceError> {
        if !(1..=10).contains(&score) {
            return Err(TraceError::InvalidRating(score));
        }
        let result = sqlx::query("UPDATE traces SET user_rating = ? WHERE id = ?")
            .bind(score as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(TraceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn finetune_candidates(&self, q: u8) -> Result<Vec<TraceSummary>, TraceError> {
        self.list(&ListFilter {
            limit: i64::MAX,
            offset: 0,
            min_quality: Some(q),
            search_text: None,
        })
        .await
    }

    pub async fn stats(&self) -> Result<Stats, TraceError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM traces")
            .fetch_one(&self.pool)
            .await?;
        let mean_quality: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(COALESCE(user_rating, auto_score)) FROM traces \
             WHERE user_rating IS NOT NULL OR auto_score IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        let candidates_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM traces WHERE auto_score >= 8 OR user_rating >= 8")
                .fetch_one(&self.pool)
                .await?;
        Ok(Stats { count, mean_quality, candidates_count })
    }
}

fn validate_invariants(trace: &DebateTrace) -> Result<(), TraceError> {
    let total = trace.total_rounds();
    for (i, round) in trace.rounds.iter().enumerate() {
        if round.round != (i as u32) + 1 {
            return Err(TraceError::InvariantViolation(format!(
                "round numbers must be contiguous from 1, found {} at index {i}",
                round.round
            )));
        }
    }
    if trace.timing.rounds_ms.len() as u32 != total {
        return Err(TraceError::InvariantViolation(
            "timing.roundsMs length must equal totalRounds".to_string(),
        ));
    }
    Ok(())
}

pub fn parse_timestamp(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(|| {
        warn!(ts, "invalid stored timestamp, falling back to epoch");
        DateTime::UNIX_EPOCH
    })
}

pub type SharedTraceStore = Arc<TraceStore>;
