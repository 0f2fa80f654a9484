//! Runtime configuration for live pipeline runs.

use std::path::PathBuf;

use crate::error::AppError;

pub const MODEL_DEFAULT: &str = "gemini-2.5-flash-lite";
pub const MODEL_PREVIEW: &str = "gemini-3-flash-preview";
pub const MODEL_JUDGE: &str = "gemini-3-pro-preview";
pub const MODEL_JUDGE_FALLBACK: &str = "gemini-1.5-pro";

pub const DEFAULT_DB_PATH: &str = "data/slopstopper.db";

/// How long an IN_PROGRESS claim may sit before the sweep reclaims it.
/// Sized to outlive a full retry ladder (3 x 120s provider timeout plus
/// 40s of backoff) with margin.
pub const CLAIM_STALENESS_SECS: u64 = 600;

/// Resolved settings for commands that call the provider.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub api_key: String,
    pub model: String,
}

impl Config {
    /// Load from environment and CLI flags. A missing API key is a fatal
    /// precondition: the batch must abort before anything is claimed.
    pub fn load(db_path: PathBuf, model: String) -> Result<Self, AppError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                AppError::FatalPrecondition("GEMINI_API_KEY is not set".to_string())
            })?;

        Ok(Self {
            db_path,
            api_key,
            model,
        })
    }
}
