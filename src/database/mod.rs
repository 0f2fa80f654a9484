pub mod models;

#[cfg(test)]
mod tests;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub use models::*;

/// Timestamps are stored as fixed-width RFC 3339 UTC strings so that
/// string comparison in SQL matches chronological order.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The record store: one row per distinct content item, keyed by the
/// canonical video id. The `status` column is the sole coordination
/// mechanism between orchestrations: every cross-process handoff goes
/// through a conditional UPDATE on it, never read-then-write.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA cache_size=10000;
            PRAGMA temp_store=MEMORY;
        ",
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL DEFAULT '',
                channel_name TEXT NOT NULL DEFAULT '',
                channel_url TEXT NOT NULL DEFAULT '',
                watched_at TEXT,
                transcript_text TEXT,
                transcript_status TEXT NOT NULL DEFAULT 'missing',
                status TEXT NOT NULL DEFAULT 'PENDING',
                error_detail TEXT,
                claimed_at TEXT,
                model_used TEXT,
                schema_version TEXT,
                input_tokens INTEGER,
                output_tokens INTEGER,
                estimated_cost REAL,
                safety_score INTEGER,
                primary_genre TEXT,
                is_slop INTEGER,
                is_brainrot INTEGER,
                analysis_payload TEXT,
                added_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_records_status
                ON records(status);
            CREATE INDEX IF NOT EXISTS idx_records_status_watched
                ON records(status, watched_at DESC);
        "#,
        )?;

        // Migration: is_short denormalized flag (idempotent)
        let _ = conn.execute("ALTER TABLE records ADD COLUMN is_short INTEGER", []);
        // Ignore error if column already exists

        Ok(())
    }

    // =========================================================================
    // Ingestion upserts
    // =========================================================================

    /// Insert a new PENDING record, or merge metadata into an existing
    /// one. Returns true if a row was inserted.
    ///
    /// The merge only touches mutable metadata, and is commutative so
    /// that entry order within a run never changes the final state:
    /// `watched_at` takes the maximum of old and new, and non-empty
    /// title/channel values win only when they arrive with a strictly
    /// newer `watched_at` (or fill a still-empty field). `status`,
    /// `analysis_payload`, and the derived indices are never written
    /// here.
    pub fn upsert_record(&self, rec: &NewRecord) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let watched = rec.watched_at.map(fmt_ts);

        let inserted = conn.execute(
            "INSERT INTO records (id, title, url, channel_name, channel_url, watched_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'PENDING')
             ON CONFLICT(id) DO NOTHING",
            params![
                rec.id,
                rec.title,
                rec.url,
                rec.channel_name,
                rec.channel_url,
                watched
            ],
        )?;

        if inserted == 1 {
            return Ok(true);
        }

        // All CASE expressions see the pre-update row, so the metadata
        // comparisons and the watched_at MAX use the same stored value.
        conn.execute(
            "UPDATE records SET
                title = CASE WHEN ?2 <> '' AND (title = ''
                    OR (?5 IS NOT NULL AND (watched_at IS NULL OR ?5 > watched_at)))
                    THEN ?2 ELSE title END,
                channel_name = CASE WHEN ?3 <> '' AND (channel_name = ''
                    OR (?5 IS NOT NULL AND (watched_at IS NULL OR ?5 > watched_at)))
                    THEN ?3 ELSE channel_name END,
                channel_url = CASE WHEN ?4 <> '' AND (channel_url = ''
                    OR (?5 IS NOT NULL AND (watched_at IS NULL OR ?5 > watched_at)))
                    THEN ?4 ELSE channel_url END,
                watched_at = CASE
                    WHEN ?5 IS NULL THEN watched_at
                    WHEN watched_at IS NULL THEN ?5
                    WHEN ?5 > watched_at THEN ?5
                    ELSE watched_at
                END
             WHERE id = ?1",
            params![rec.id, rec.title, rec.channel_name, rec.channel_url, watched],
        )?;

        Ok(false)
    }

    /// Record a malformed entry as SKIPPED under a deterministic fallback
    /// id so the same bad entry never produces two rows.
    pub fn insert_skipped(&self, id: &str, title: &str, url: &str, reason: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO records (id, title, url, status, error_detail)
             VALUES (?1, ?2, ?3, 'SKIPPED', ?4)
             ON CONFLICT(id) DO NOTHING",
            params![id, title, url, reason],
        )?;
        Ok(())
    }

    // =========================================================================
    // Claim protocol
    // =========================================================================

    /// Atomically claim a PENDING record for exclusive processing.
    /// Compare-and-swap on `status`: at most one caller gets `true`.
    pub fn claim(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE records SET status = 'IN_PROGRESS', claimed_at = ?2
             WHERE id = ?1 AND status = 'PENDING'",
            params![id, fmt_ts(now)],
        )?;
        Ok(count == 1)
    }

    /// Crash-recovery sweep: revert IN_PROGRESS claims older than
    /// `threshold` back to PENDING. Returns the number reclaimed.
    pub fn sweep_stale_claims(
        &self,
        now: DateTime<Utc>,
        threshold: std::time::Duration,
    ) -> Result<usize> {
        let cutoff = fmt_ts(now - chrono::Duration::from_std(threshold)?);
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE records SET status = 'PENDING', claimed_at = NULL
             WHERE status = 'IN_PROGRESS' AND claimed_at < ?1",
            params![cutoff],
        )?;
        if count > 0 {
            tracing::info!("Reclaimed {} stale IN_PROGRESS records", count);
        }
        Ok(count)
    }

    /// Persist a successful analysis: payload, derived indices, and
    /// provenance land together with the IN_PROGRESS → ANALYZED
    /// transition in a single UPDATE. Returns false if the record was
    /// no longer IN_PROGRESS (claim lost to a sweep).
    pub fn mark_analyzed(&self, id: &str, outcome: &AnalysisOutcome) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE records SET
                status = 'ANALYZED',
                error_detail = NULL,
                claimed_at = NULL,
                analysis_payload = ?2,
                safety_score = ?3,
                primary_genre = ?4,
                is_slop = ?5,
                is_brainrot = ?6,
                is_short = ?7,
                model_used = ?8,
                schema_version = ?9,
                input_tokens = ?10,
                output_tokens = ?11,
                estimated_cost = ?12
             WHERE id = ?1 AND status = 'IN_PROGRESS'",
            params![
                id,
                outcome.analysis_payload,
                outcome.safety_score,
                outcome.primary_genre,
                outcome.is_slop,
                outcome.is_brainrot,
                outcome.is_short,
                outcome.model_used,
                outcome.schema_version,
                outcome.input_tokens,
                outcome.output_tokens,
                outcome.estimated_cost,
            ],
        )?;
        Ok(count == 1)
    }

    /// Resolve a claimed record to ERROR, capturing the failure detail.
    pub fn mark_error(&self, id: &str, detail: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE records SET status = 'ERROR', error_detail = ?2, claimed_at = NULL
             WHERE id = ?1 AND status = 'IN_PROGRESS'",
            params![id, detail],
        )?;
        Ok(count == 1)
    }

    /// Explicit operator reset: ANALYZED/ERROR records go back to PENDING
    /// with payload, indices, and provenance cleared. This is the only
    /// path out of ANALYZED.
    pub fn requeue(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "UPDATE records SET
                status = 'PENDING',
                error_detail = NULL,
                claimed_at = NULL,
                analysis_payload = NULL,
                safety_score = NULL,
                primary_genre = NULL,
                is_slop = NULL,
                is_brainrot = NULL,
                is_short = NULL,
                model_used = NULL,
                schema_version = NULL,
                input_tokens = NULL,
                output_tokens = NULL,
                estimated_cost = NULL
             WHERE id IN ({}) AND status IN ('ANALYZED', 'ERROR')",
            placeholders
        );
        let count = conn.execute(&sql, rusqlite::params_from_iter(ids.iter()))?;
        Ok(count)
    }

    // =========================================================================
    // Transcript attachment (written by the external fetcher, read here)
    // =========================================================================

    pub fn attach_transcript(&self, id: &str, text: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE records SET transcript_text = ?2, transcript_status = 'fetched'
             WHERE id = ?1",
            params![id, text],
        )?;
        Ok(())
    }

    // =========================================================================
    // Selection queries
    // =========================================================================

    /// PENDING record ids, most recently watched first, capped at `limit`.
    /// The ordering applies to selection only; completion order within a
    /// batch is unconstrained.
    pub fn pending_ids(&self, limit: Option<i64>) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let sql = "SELECT id FROM records WHERE status = 'PENDING'
                   ORDER BY watched_at IS NULL, watched_at DESC
                   LIMIT ?1";
        let mut stmt = conn.prepare(sql)?;
        let ids = stmt
            .query_map(params![limit.unwrap_or(-1)], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    pub fn get_record(&self, id: &str) -> Result<Option<Record>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, url, channel_name, channel_url, watched_at,
                    transcript_text, transcript_status, status, error_detail,
                    claimed_at, model_used, schema_version, input_tokens,
                    output_tokens, estimated_cost, safety_score, primary_genre,
                    is_slop, is_brainrot, is_short, analysis_payload, added_at
             FROM records WHERE id = ?1",
        )?;

        let record = stmt
            .query_row(params![id], |row| {
                Ok(Record {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    url: row.get(2)?,
                    channel_name: row.get(3)?,
                    channel_url: row.get(4)?,
                    watched_at: parse_ts(row.get::<_, Option<String>>(5)?),
                    transcript_text: row.get(6)?,
                    transcript_status: row.get::<_, String>(7)?.into(),
                    status: row.get::<_, String>(8)?.into(),
                    error_detail: row.get(9)?,
                    claimed_at: parse_ts(row.get::<_, Option<String>>(10)?),
                    model_used: row.get(11)?,
                    schema_version: row.get(12)?,
                    input_tokens: row.get(13)?,
                    output_tokens: row.get(14)?,
                    estimated_cost: row.get(15)?,
                    safety_score: row.get(16)?,
                    primary_genre: row.get(17)?,
                    is_slop: row.get::<_, Option<i64>>(18)?.map(|v| v != 0),
                    is_brainrot: row.get::<_, Option<i64>>(19)?.map(|v| v != 0),
                    is_short: row.get::<_, Option<i64>>(20)?.map(|v| v != 0),
                    analysis_payload: row.get(21)?,
                    added_at: row.get(22)?,
                })
            })
            .optional()?;

        Ok(record)
    }

    /// Per-status row counts, for batch and ingest reporting.
    pub fn status_counts(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM records GROUP BY status ORDER BY status")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }
}

fn parse_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
