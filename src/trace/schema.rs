//! Hand-rolled idempotent DDL, matching the "no migration framework" shape
//! used throughout `patterns/storage.rs` and `advisory/session.rs`.

use sqlx::{FromRow, SqlitePool};

use super::{parse_timestamp, DebateTrace, ModelsUsed, Round, Timing, TraceSummary};

pub async fn run(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS traces (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            query TEXT NOT NULL,
            templates_used TEXT NOT NULL,
            final_answer TEXT NOT NULL,
            early_stopped INTEGER NOT NULL,
            auto_score INTEGER,
            user_rating INTEGER,
            proposer_model TEXT NOT NULL,
            skeptic_model TEXT NOT NULL,
            synthesizer_model TEXT NOT NULL,
            embedding_model TEXT NOT NULL,
            total_ms INTEGER NOT NULL,
            rag_ms INTEGER NOT NULL,
            rounds_ms TEXT NOT NULL,
            synthesis_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rounds (
            trace_id TEXT NOT NULL REFERENCES traces(id),
            round INTEGER NOT NULL,
            proposer_text TEXT NOT NULL,
            skeptic_text TEXT NOT NULL,
            proposer_duration_ms INTEGER NOT NULL,
            skeptic_duration_ms INTEGER NOT NULL,
            PRIMARY KEY (trace_id, round)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', '1')",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(FromRow)]
pub struct TraceRow {
    pub id: String,
    pub created_at: i64,
    pub query: String,
    pub templates_used: String,
    pub final_answer: String,
    pub early_stopped: bool,
    pub auto_score: Option<i64>,
    pub user_rating: Option<i64>,
    pub proposer_model: String,
    pub skeptic_model: String,
    pub synthesizer_model: String,
    pub embedding_model: String,
    pub total_ms: i64,
    pub rag_ms: i64,
    pub rounds_ms: String,
    pub synthesis_ms: i64,
}

impl TraceRow {
    pub fn into_trace(self, round_rows: Vec<RoundRow>) -> DebateTrace {
        let rounds_ms: Vec<u64> = serde_json::from_str(&self.rounds_ms).unwrap_or_default();
        let templates_used: Vec<String> =
            serde_json::from_str(&self.templates_used).unwrap_or_default();

        DebateTrace {
            id: self.id,
            created_at: parse_timestamp(self.created_at),
            query: self.query,
            templates_used,
            rounds: round_rows.into_iter().map(RoundRow::into_round).collect(),
            final_answer: self.final_answer,
            early_stopped: self.early_stopped,
            auto_score: self.auto_score.map(|s| s as u8),
            user_rating: self.user_rating.map(|s| s as u8),
            models: ModelsUsed {
                proposer: self.proposer_model,
                skeptic: self.skeptic_model,
                synthesizer: self.synthesizer_model,
                embedding: self.embedding_model,
            },
            timing: Timing {
                total_ms: self.total_ms as u64,
                rag_ms: self.rag_ms as u64,
                rounds_ms,
                synthesis_ms: self.synthesis_ms as u64,
            },
        }
    }
}

#[derive(FromRow)]
pub struct RoundRow {
    pub trace_id: String,
    pub round: i64,
    pub proposer_text: String,
    pub skeptic_text: String,
    pub proposer_duration_ms: i64,
    pub skeptic_duration_ms: i64,
}

impl RoundRow {
    fn into_round(self) -> Round {
        Round {
            round: self.round as u32,
            proposer_text: self.proposer_text,
            skeptic_text: self.skeptic_text,
            proposer_duration_ms: self.proposer_duration_ms as u64,
            skeptic_duration_ms: self.skeptic_duration_ms as u64,
        }
    }
}

#[derive(FromRow)]
pub struct SummaryRow {
    pub id: String,
    pub created_at: i64,
    pub query: String,
    pub auto_score: Option<i64>,
    pub user_rating: Option<i64>,
    pub total_rounds: i64,
    pub early_stopped: bool,
}

impl SummaryRow {
    pub fn into_summary(self) -> TraceSummary {
        TraceSummary {
            id: self.id,
            created_at: parse_timestamp(self.created_at),
            query: self.query,
            total_rounds: self.total_rounds as u32,
            early_stopped: self.early_stopped,
            auto_score: self.auto_score.map(|s| s as u8),
            user_rating: self.user_rating.map(|s| s as u8),
        }
    }
}
