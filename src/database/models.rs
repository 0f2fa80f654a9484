use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a record. Stored as TEXT; `InProgress` is a
/// transient claim marker and must never survive a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Pending,
    InProgress,
    Analyzed,
    Error,
    Skipped,
}

impl Default for RecordStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Analyzed => write!(f, "ANALYZED"),
            Self::Error => write!(f, "ERROR"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

impl From<String> for RecordStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PENDING" => Self::Pending,
            "IN_PROGRESS" => Self::InProgress,
            "ANALYZED" => Self::Analyzed,
            "ERROR" => Self::Error,
            "SKIPPED" => Self::Skipped,
            _ => Self::Pending,
        }
    }
}

/// Whether transcript text has been attached to a record. The core never
/// fetches transcripts; it only consumes text an external collaborator
/// already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptStatus {
    Missing,
    Fetched,
    Unavailable,
}

impl Default for TranscriptStatus {
    fn default() -> Self {
        Self::Missing
    }
}

impl std::fmt::Display for TranscriptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Fetched => write!(f, "fetched"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

impl From<String> for TranscriptStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "fetched" => Self::Fetched,
            "unavailable" => Self::Unavailable,
            _ => Self::Missing,
        }
    }
}

/// One content item and its full lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub title: String,
    pub url: String,
    pub channel_name: String,
    pub channel_url: String,
    pub watched_at: Option<DateTime<Utc>>,
    pub transcript_text: Option<String>,
    pub transcript_status: TranscriptStatus,
    pub status: RecordStatus,
    pub error_detail: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub model_used: Option<String>,
    pub schema_version: Option<String>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub estimated_cost: Option<f64>,
    pub safety_score: Option<i64>,
    pub primary_genre: Option<String>,
    pub is_slop: Option<bool>,
    pub is_brainrot: Option<bool>,
    pub is_short: Option<bool>,
    pub analysis_payload: Option<String>,
    pub added_at: String,
}

/// Metadata captured from one raw history entry, ready to upsert.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub id: String,
    pub title: String,
    pub url: String,
    pub channel_name: String,
    pub channel_url: String,
    pub watched_at: Option<DateTime<Utc>>,
}

/// Provenance and derived indices persisted atomically with the
/// IN_PROGRESS → ANALYZED transition.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub analysis_payload: String,
    pub safety_score: i64,
    pub primary_genre: String,
    pub is_slop: bool,
    pub is_brainrot: bool,
    pub is_short: bool,
    pub model_used: String,
    pub schema_version: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub estimated_cost: f64,
}

/// Counts returned by one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Per-resolution counts for one analysis batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub analyzed: usize,
    pub errored: usize,
    /// Claim lost to another orchestration, or cancelled before claiming.
    pub skipped: usize,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub estimated_cost: f64,
}
