//! A trivial prompt-loader interface, giving the orchestrator's "prompts are
//! opaque strings from a prompt source" contract a concrete, swappable shape
//! without hardcoding prompt text into Rust source.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptSourceError {
    #[error("prompt file for role {0} not found under {1}")]
    Missing(String, String),
    #[error("failed to read prompt file: {0}")]
    Io(#[from] std::io::Error),
}

pub trait PromptSource: Send + Sync {
    fn proposer(&self) -> &str;
    fn skeptic(&self) -> &str;
    fn synthesizer(&self) -> &str;
    fn scorer(&self) -> &str;
}

/// Loads `{proposer,skeptic,synthesizer,scorer}.txt` once from a directory
/// at startup.
pub struct FilesystemPromptSource {
    prompts: HashMap<&'static str, String>,
}

const ROLES: [&str; 4] = ["proposer", "skeptic", "synthesizer", "scorer"];

impl FilesystemPromptSource {
    pub fn load(dir: &Path) -> Result<Self, PromptSourceError> {
        let mut prompts = HashMap::new();
        for role in ROLES {
            let path: PathBuf = dir.join(format!("{role}.txt"));
            if !path.exists() {
                return Err(PromptSourceError::Missing(
                    role.to_string(),
                    dir.display().to_string(),
                ));
            }
            prompts.insert(role, std::fs::read_to_string(path)?.trim().to_string());
        }
        Ok(Self { prompts })
    }
}

impl PromptSource for FilesystemPromptSource {
    fn proposer(&self) -> &str {
        &self.prompts["proposer"]
    }
    fn skeptic(&self) -> &str {
        &self.prompts["skeptic"]
    }
    fn synthesizer(&self) -> &str {
        &self.prompts["synthesizer"]
    }
    fn scorer(&self) -> &str {
        &self.prompts["scorer"]
    }
}
