// src/config/mod.rs
// Environment-sourced configuration, split by concern the way
// `config/{server,llm,...}.rs` split the old Mira config tree.

mod helpers;

use std::path::PathBuf;
use std::time::Duration;

use crate::orchestrator::DebateConfig;

/// Server bind configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: helpers::env_or("CRUCIBLE_HOST", "127.0.0.1"),
            port: helpers::env_usize("CRUCIBLE_PORT", 8787) as u16,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Inference backend configuration (C1).
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub hard_ceiling: Duration,
}

impl BackendConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: helpers::env_or("CRUCIBLE_BACKEND_URL", "http://127.0.0.1:11434"),
            timeout: Duration::from_secs(helpers::env_u64("CRUCIBLE_BACKEND_TIMEOUT_SECS", 60)),
            hard_ceiling: Duration::from_secs(helpers::env_u64(
                "CRUCIBLE_BACKEND_HARD_CEILING_SECS",
                300,
            )),
        }
    }
}

/// Per-role model and temperature configuration.
#[derive(Debug, Clone)]
pub struct RolesConfig {
    pub proposer_model: String,
    pub skeptic_model: String,
    pub synthesizer_model: String,
    pub embedding_model: String,
    pub proposer_temp: f32,
    pub skeptic_temp: f32,
    pub synthesizer_temp: f32,
    pub min_rounds: u8,
    pub max_rounds: u8,
    pub early_stop_score: u8,
}

impl RolesConfig {
    pub fn from_env() -> Self {
        Self {
            proposer_model: helpers::env_or("CRUCIBLE_PROPOSER_MODEL", "llama3"),
            skeptic_model: helpers::env_or("CRUCIBLE_SKEPTIC_MODEL", "llama3"),
            synthesizer_model: helpers::env_or("CRUCIBLE_SYNTHESIZER_MODEL", "llama3"),
            embedding_model: helpers::env_or("CRUCIBLE_EMBEDDING_MODEL", "nomic-embed-text"),
            proposer_temp: helpers::env_f32("CRUCIBLE_PROPOSER_TEMP", 0.7),
            skeptic_temp: helpers::env_f32("CRUCIBLE_SKEPTIC_TEMP", 0.5),
            synthesizer_temp: helpers::env_f32("CRUCIBLE_SYNTHESIZER_TEMP", 0.3),
            min_rounds: helpers::env_u8("CRUCIBLE_MIN_ROUNDS", 1),
            max_rounds: helpers::env_u8("CRUCIBLE_MAX_ROUNDS", 4),
            early_stop_score: helpers::env_u8("CRUCIBLE_EARLY_STOP_SCORE", 8),
        }
    }
}

/// Retrieval (RAG) configuration.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub template_dirs: Vec<PathBuf>,
    pub rag_top_k: usize,
    pub similarity_floor: f32,
}

impl RetrievalConfig {
    pub fn from_env() -> Self {
        let dirs = helpers::env_or("CRUCIBLE_TEMPLATE_DIRS", "./templates");
        Self {
            template_dirs: dirs.split(':').map(PathBuf::from).collect(),
            rag_top_k: helpers::env_usize("CRUCIBLE_RAG_TOP_K", 3),
            similarity_floor: helpers::env_f32("CRUCIBLE_SIMILARITY_FLOOR", 0.2),
        }
    }
}

/// Prompt source configuration (C4).
#[derive(Debug, Clone)]
pub struct PromptsConfig {
    pub prompts_dir: PathBuf,
}

impl PromptsConfig {
    pub fn from_env() -> Self {
        Self {
            prompts_dir: PathBuf::from(helpers::env_or("CRUCIBLE_PROMPTS_DIR", "./prompts")),
        }
    }
}

/// Trace store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: helpers::env_or("CRUCIBLE_DATABASE_URL", "sqlite://./crucible.db"),
        }
    }
}

/// Global concurrency cap + admission queue.
#[derive(Debug, Clone)]
pub struct ConcurrencyConfig {
    pub max_concurrent_debates: usize,
    pub queue_capacity: usize,
    pub broker_idle_ttl: Duration,
    pub broker_replay_capacity: usize,
}

impl ConcurrencyConfig {
    pub fn from_env() -> Self {
        Self {
            max_concurrent_debates: helpers::env_usize("CRUCIBLE_MAX_CONCURRENT_DEBATES", 2),
            queue_capacity: helpers::env_usize("CRUCIBLE_QUEUE_CAPACITY", 16),
            broker_idle_ttl: Duration::from_secs(helpers::env_u64(
                "CRUCIBLE_BROKER_IDLE_TTL_SECS",
                300,
            )),
            broker_replay_capacity: helpers::env_usize("CRUCIBLE_BROKER_REPLAY_CAPACITY", 4096),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self {
            level: helpers::env_or("CRUCIBLE_LOG_LEVEL", "info"),
        }
    }
}

/// Top-level configuration tree, assembled once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub roles: RolesConfig,
    pub retrieval: RetrievalConfig,
    pub prompts: PromptsConfig,
    pub store: StoreConfig,
    pub concurrency: ConcurrencyConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            backend: BackendConfig::from_env(),
            roles: RolesConfig::from_env(),
            retrieval: RetrievalConfig::from_env(),
            prompts: PromptsConfig::from_env(),
            store: StoreConfig::from_env(),
            concurrency: ConcurrencyConfig::from_env(),
            logging: LoggingConfig::from_env(),
        }
    }

    /// Build the default `DebateConfig` a `/api/reason` request falls back to
    /// when it supplies no per-request overrides.
    pub fn default_debate_config(&self) -> DebateConfig {
        DebateConfig {
            min_rounds: self.roles.min_rounds,
            max_rounds: self.roles.max_rounds,
            early_stop_score: self.roles.early_stop_score,
            proposer_model: self.roles.proposer_model.clone(),
            skeptic_model: self.roles.skeptic_model.clone(),
            synthesizer_model: self.roles.synthesizer_model.clone(),
            proposer_temp: self.roles.proposer_temp,
            skeptic_temp: self.roles.skeptic_temp,
            synthesizer_temp: self.roles.synthesizer_temp,
            rag_top_k: self.retrieval.rag_top_k,
            similarity_floor: self.retrieval.similarity_floor,
            per_call_timeout: self.backend.timeout,
        }
    }
}
