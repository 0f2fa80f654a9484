//! Watch-history ingestion.
//!
//! Converts raw Takeout-style history entries into record-store upserts.
//! Ingestion is idempotent and commutative: the same or overlapping input,
//! in any order, converges on the same store state. Nothing is silently
//! dropped: entries that cannot yield a canonical id become SKIPPED rows
//! with a reason. No network or provider calls happen here.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;

use crate::database::{Database, IngestReport, NewRecord};
use crate::error::AppError;

/// One raw entry from a watch-history export.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "titleUrl", default)]
    pub title_url: String,
    #[serde(default)]
    pub subtitles: Vec<Subtitle>,
    #[serde(default)]
    pub time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Subtitle {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Canonical video id: the `v=` query parameter of the watch URL.
pub fn extract_video_id(url: &str) -> Option<String> {
    let start = url.find("v=")? + 2;
    let rest = &url[start..];
    let end = rest.find(['&', '#']).unwrap_or(rest.len());
    let id = &rest[..end];
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Deterministic id for entries that have no canonical one, so the same
/// malformed entry maps to the same SKIPPED row on every run.
fn fallback_id(entry: &HistoryEntry) -> String {
    if !entry.title_url.is_empty() {
        format!("raw:{}", entry.title_url)
    } else {
        format!("raw:{}:{}", entry.time, entry.title)
    }
}

fn parse_time(time: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(time)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Classify one entry: metadata ready to upsert, or a skip reason.
fn classify(entry: &HistoryEntry) -> Result<NewRecord, AppError> {
    if entry.header != "YouTube" {
        return Err(AppError::MalformedEntry(format!(
            "unsupported header `{}`",
            entry.header
        )));
    }

    let id = extract_video_id(&entry.title_url)
        .ok_or_else(|| AppError::MalformedEntry("no parseable video id in URL".to_string()))?;

    let title = entry
        .title
        .strip_prefix("Watched ")
        .unwrap_or(&entry.title)
        .to_string();

    let (channel_name, channel_url) = entry
        .subtitles
        .first()
        .map(|s| {
            (
                s.name.clone().unwrap_or_default(),
                s.url.clone().unwrap_or_default(),
            )
        })
        .unwrap_or_default();

    Ok(NewRecord {
        id,
        title,
        url: entry.title_url.clone(),
        channel_name,
        channel_url,
        watched_at: parse_time(&entry.time),
    })
}

/// Upsert a batch of history entries, returning per-resolution counts.
pub fn ingest_entries(db: &Database, entries: &[HistoryEntry]) -> Result<IngestReport, AppError> {
    let mut report = IngestReport::default();

    for entry in entries {
        match classify(entry) {
            Ok(rec) => {
                if db.upsert_record(&rec)? {
                    report.inserted += 1;
                } else {
                    report.updated += 1;
                }
            }
            Err(e) => {
                db.insert_skipped(&fallback_id(entry), &entry.title, &entry.title_url, &e.to_string())?;
                report.skipped += 1;
            }
        }
    }

    tracing::info!(
        inserted = report.inserted,
        updated = report.updated,
        skipped = report.skipped,
        "Ingestion complete"
    );

    Ok(report)
}

/// Load and ingest a watch-history JSON export.
pub fn ingest_file(db: &Database, path: &Path) -> Result<IngestReport, AppError> {
    let data = std::fs::read_to_string(path)?;
    let entries: Vec<HistoryEntry> = serde_json::from_str(&data)?;
    tracing::info!(total = entries.len(), file = %path.display(), "Loaded history entries");
    ingest_entries(db, &entries)
}
