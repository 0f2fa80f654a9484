use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration as StdDuration;
use tempfile::TempDir;

fn setup_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path).unwrap();
    (db, temp_dir)
}

fn pending_record(id: &str) -> NewRecord {
    NewRecord {
        id: id.to_string(),
        title: format!("Video {}", id),
        url: format!("https://youtube.com/watch?v={}", id),
        channel_name: "Channel".to_string(),
        channel_url: "https://youtube.com/channel/c".to_string(),
        watched_at: Some(Utc::now()),
    }
}

fn outcome(model: &str) -> AnalysisOutcome {
    AnalysisOutcome {
        analysis_payload: r#"{"verdict":{"action":"Approve"}}"#.to_string(),
        safety_score: 90,
        primary_genre: "Education_STEM".to_string(),
        is_slop: false,
        is_brainrot: false,
        is_short: false,
        model_used: model.to_string(),
        schema_version: "v1".to_string(),
        input_tokens: 100,
        output_tokens: 40,
        estimated_cost: 0.000026,
    }
}

#[test]
fn test_schema_init_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path).unwrap();
    db.upsert_record(&pending_record("a")).unwrap();
    drop(db);

    // Re-opening runs init_schema and the is_short migration again
    let db = Database::new(&db_path).unwrap();
    assert!(db.get_record("a").unwrap().is_some());
}

#[test]
fn test_claim_is_exclusive_across_threads() {
    let (db, _temp) = setup_test_db();
    db.upsert_record(&pending_record("contested")).unwrap();

    let db = std::sync::Arc::new(db);
    let wins = std::sync::Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let db = db.clone();
            let wins = wins.clone();
            std::thread::spawn(move || {
                if db.claim("contested", Utc::now()).unwrap() {
                    wins.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(wins.load(Ordering::SeqCst), 1);
    let rec = db.get_record("contested").unwrap().unwrap();
    assert_eq!(rec.status, RecordStatus::InProgress);
    assert!(rec.claimed_at.is_some());
}

#[test]
fn test_claim_fails_for_non_pending() {
    let (db, _temp) = setup_test_db();
    db.upsert_record(&pending_record("a")).unwrap();
    assert!(db.claim("a", Utc::now()).unwrap());
    assert!(!db.claim("a", Utc::now()).unwrap());
    assert!(!db.claim("never-ingested", Utc::now()).unwrap());

    db.mark_error("a", "boom").unwrap();
    assert!(!db.claim("a", Utc::now()).unwrap());
}

#[test]
fn test_sweep_reclaims_only_stale_claims() {
    let (db, _temp) = setup_test_db();
    db.upsert_record(&pending_record("stale")).unwrap();
    db.upsert_record(&pending_record("fresh")).unwrap();

    let now = Utc::now();
    assert!(db.claim("stale", now - chrono::Duration::seconds(700)).unwrap());
    assert!(db.claim("fresh", now - chrono::Duration::seconds(30)).unwrap());

    let reclaimed = db
        .sweep_stale_claims(now, StdDuration::from_secs(600))
        .unwrap();
    assert_eq!(reclaimed, 1);

    let stale = db.get_record("stale").unwrap().unwrap();
    assert_eq!(stale.status, RecordStatus::Pending);
    assert!(stale.claimed_at.is_none());

    let fresh = db.get_record("fresh").unwrap().unwrap();
    assert_eq!(fresh.status, RecordStatus::InProgress);
}

#[test]
fn test_mark_analyzed_persists_everything_atomically() {
    let (db, _temp) = setup_test_db();
    db.upsert_record(&pending_record("a")).unwrap();
    assert!(db.claim("a", Utc::now()).unwrap());

    assert!(db.mark_analyzed("a", &outcome("gemini-2.5-flash-lite")).unwrap());

    let rec = db.get_record("a").unwrap().unwrap();
    assert_eq!(rec.status, RecordStatus::Analyzed);
    assert!(rec.claimed_at.is_none());
    assert!(rec.analysis_payload.is_some());
    assert_eq!(rec.safety_score, Some(90));
    assert_eq!(rec.primary_genre.as_deref(), Some("Education_STEM"));
    assert_eq!(rec.is_slop, Some(false));
    assert_eq!(rec.is_short, Some(false));
    assert_eq!(rec.model_used.as_deref(), Some("gemini-2.5-flash-lite"));
    assert_eq!(rec.schema_version.as_deref(), Some("v1"));
    assert_eq!(rec.input_tokens, Some(100));
    assert_eq!(rec.output_tokens, Some(40));
}

#[test]
fn test_mark_analyzed_requires_live_claim() {
    let (db, _temp) = setup_test_db();
    db.upsert_record(&pending_record("a")).unwrap();

    // Never claimed: the conditional update must not fire
    assert!(!db.mark_analyzed("a", &outcome("m")).unwrap());
    let rec = db.get_record("a").unwrap().unwrap();
    assert_eq!(rec.status, RecordStatus::Pending);
    assert!(rec.analysis_payload.is_none());

    // Claim swept out from under the worker
    assert!(db.claim("a", Utc::now() - chrono::Duration::seconds(700)).unwrap());
    db.sweep_stale_claims(Utc::now(), StdDuration::from_secs(600))
        .unwrap();
    assert!(!db.mark_analyzed("a", &outcome("m")).unwrap());
}

#[test]
fn test_mark_error_captures_detail() {
    let (db, _temp) = setup_test_db();
    db.upsert_record(&pending_record("a")).unwrap();
    assert!(db.claim("a", Utc::now()).unwrap());
    assert!(db.mark_error("a", "provider returned 500").unwrap());

    let rec = db.get_record("a").unwrap().unwrap();
    assert_eq!(rec.status, RecordStatus::Error);
    assert_eq!(rec.error_detail.as_deref(), Some("provider returned 500"));
    assert!(rec.claimed_at.is_none());
}

#[test]
fn test_reingest_never_regresses_analyzed_record() {
    let (db, _temp) = setup_test_db();
    db.upsert_record(&pending_record("a")).unwrap();
    assert!(db.claim("a", Utc::now()).unwrap());
    assert!(db.mark_analyzed("a", &outcome("m")).unwrap());

    // Same entry arrives again with fresher metadata
    let mut again = pending_record("a");
    again.title = "Updated Title".to_string();
    again.watched_at = Some(Utc::now() + chrono::Duration::hours(1));
    let inserted = db.upsert_record(&again).unwrap();
    assert!(!inserted);

    let rec = db.get_record("a").unwrap().unwrap();
    assert_eq!(rec.status, RecordStatus::Analyzed);
    assert!(rec.analysis_payload.is_some());
    assert_eq!(rec.title, "Updated Title");
}

#[test]
fn test_upsert_older_entry_never_overwrites_newer_metadata() {
    let (db, _temp) = setup_test_db();
    let now = Utc::now();

    let mut newer = pending_record("a");
    newer.title = "New Title".to_string();
    newer.channel_name = "New Channel".to_string();
    newer.watched_at = Some(now);
    db.upsert_record(&newer).unwrap();

    let mut older = pending_record("a");
    older.title = "Old Title".to_string();
    older.channel_name = "Old Channel".to_string();
    older.watched_at = Some(now - chrono::Duration::days(30));
    db.upsert_record(&older).unwrap();

    let rec = db.get_record("a").unwrap().unwrap();
    assert_eq!(rec.title, "New Title");
    assert_eq!(rec.channel_name, "New Channel");
    assert_eq!(rec.watched_at.map(fmt_ts), Some(fmt_ts(now)));
}

#[test]
fn test_upsert_fills_empty_fields_regardless_of_recency() {
    let (db, _temp) = setup_test_db();

    let mut bare = pending_record("a");
    bare.title = String::new();
    bare.channel_name = String::new();
    bare.watched_at = Some(Utc::now());
    db.upsert_record(&bare).unwrap();

    // Older entry, but the stored fields are still empty
    let mut older = pending_record("a");
    older.watched_at = Some(Utc::now() - chrono::Duration::days(30));
    db.upsert_record(&older).unwrap();

    let rec = db.get_record("a").unwrap().unwrap();
    assert_eq!(rec.title, "Video a");
    assert_eq!(rec.channel_name, "Channel");
}

#[test]
fn test_upsert_keeps_existing_metadata_when_new_is_empty() {
    let (db, _temp) = setup_test_db();
    db.upsert_record(&pending_record("a")).unwrap();

    let sparse = NewRecord {
        id: "a".to_string(),
        title: String::new(),
        url: "https://youtube.com/watch?v=a".to_string(),
        channel_name: String::new(),
        channel_url: String::new(),
        watched_at: None,
    };
    db.upsert_record(&sparse).unwrap();

    let rec = db.get_record("a").unwrap().unwrap();
    assert_eq!(rec.title, "Video a");
    assert_eq!(rec.channel_name, "Channel");
    assert!(rec.watched_at.is_some());
}

#[test]
fn test_requeue_clears_outcome_and_restores_pending() {
    let (db, _temp) = setup_test_db();
    for id in ["done", "failed", "untouched"] {
        db.upsert_record(&pending_record(id)).unwrap();
    }
    assert!(db.claim("done", Utc::now()).unwrap());
    assert!(db.mark_analyzed("done", &outcome("m")).unwrap());
    assert!(db.claim("failed", Utc::now()).unwrap());
    assert!(db.mark_error("failed", "boom").unwrap());

    let ids: Vec<String> = ["done", "failed", "untouched", "ghost"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    // PENDING and unknown ids are not eligible
    assert_eq!(db.requeue(&ids).unwrap(), 2);

    for id in ["done", "failed"] {
        let rec = db.get_record(id).unwrap().unwrap();
        assert_eq!(rec.status, RecordStatus::Pending);
        assert!(rec.analysis_payload.is_none());
        assert!(rec.error_detail.is_none());
        assert!(rec.safety_score.is_none());
        assert!(rec.model_used.is_none());
        assert!(rec.estimated_cost.is_none());
    }
}

#[test]
fn test_pending_ids_ordering_and_limit() {
    let (db, _temp) = setup_test_db();
    let base = Utc::now();
    for (id, offset) in [("old", 300), ("new", 0), ("mid", 100)] {
        let mut rec = pending_record(id);
        rec.watched_at = Some(base - chrono::Duration::days(offset));
        db.upsert_record(&rec).unwrap();
    }
    let mut undated = pending_record("undated");
    undated.watched_at = None;
    db.upsert_record(&undated).unwrap();

    // A record in another state never appears
    let mut done = pending_record("done");
    done.watched_at = Some(base + chrono::Duration::days(1));
    db.upsert_record(&done).unwrap();
    assert!(db.claim("done", Utc::now()).unwrap());

    let all = db.pending_ids(None).unwrap();
    assert_eq!(all, vec!["new", "mid", "old", "undated"]);

    let top2 = db.pending_ids(Some(2)).unwrap();
    assert_eq!(top2, vec!["new", "mid"]);
}

#[test]
fn test_attach_transcript() {
    let (db, _temp) = setup_test_db();
    db.upsert_record(&pending_record("a")).unwrap();
    db.attach_transcript("a", "hello class").unwrap();

    let rec = db.get_record("a").unwrap().unwrap();
    assert_eq!(rec.transcript_status, TranscriptStatus::Fetched);
    assert_eq!(rec.transcript_text.as_deref(), Some("hello class"));
}

#[test]
fn test_status_counts() {
    let (db, _temp) = setup_test_db();
    for id in ["a", "b", "c"] {
        db.upsert_record(&pending_record(id)).unwrap();
    }
    assert!(db.claim("a", Utc::now()).unwrap());
    assert!(db.mark_error("a", "boom").unwrap());
    db.insert_skipped("raw:junk", "junk", "", "unsupported header").unwrap();

    let counts = db.status_counts().unwrap();
    assert_eq!(
        counts,
        vec![
            ("ERROR".to_string(), 1),
            ("PENDING".to_string(), 2),
            ("SKIPPED".to_string(), 1),
        ]
    );
}

#[test]
fn test_fmt_ts_is_fixed_width_and_order_preserving() {
    let early = Utc::now();
    let late = early + chrono::Duration::seconds(90);
    let (a, b) = (fmt_ts(early), fmt_ts(late));
    assert_eq!(a.len(), b.len());
    assert!(a < b);
    assert!(a.ends_with('Z'));
}
