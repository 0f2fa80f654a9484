//! Analysis orchestration.
//!
//! Selects candidate records, claims them through the store's
//! compare-and-swap protocol, invokes the provider with retry, validates
//! the response, and persists the outcome. Correct under both sequential
//! and concurrent execution, and across separate processes: record status
//! is the only coordination mechanism, never an in-memory lock.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::CLAIM_STALENESS_SECS;
use crate::database::{AnalysisOutcome, BatchSummary, Database, Record, TranscriptStatus};
use crate::error::AppError;
use crate::pricing;
use crate::prompts::{build_prompt, SCHEMA_VERSION, SYSTEM_INSTRUCTION_V1};
use crate::provider::{extract_json_from_response, AnalysisProvider};
use crate::schema::{self, VideoFormat};

/// Which PENDING records one batch processes.
#[derive(Debug, Clone)]
pub enum SelectionPolicy {
    /// Explicit id set. Records not currently PENDING simply fail the
    /// claim and are skipped.
    Ids(Vec<String>),
    /// The N most recently watched PENDING records.
    Limit(i64),
    /// Every PENDING record.
    AllPending,
}

/// How one record's processing resolved within a batch.
enum Resolution {
    Analyzed {
        input_tokens: i64,
        output_tokens: i64,
        cost: f64,
    },
    Errored,
    /// Claim lost to another orchestration, or cancelled mid-flight
    /// (left IN_PROGRESS for the staleness sweep).
    Skipped,
}

pub struct Orchestrator {
    db: Arc<Database>,
    provider: Arc<dyn AnalysisProvider>,
    model: String,
    workers: usize,
}

impl Orchestrator {
    pub fn new(
        db: Arc<Database>,
        provider: Arc<dyn AnalysisProvider>,
        model: impl Into<String>,
        workers: usize,
    ) -> Self {
        Self {
            db,
            provider,
            model: model.into(),
            workers: workers.clamp(1, 20),
        }
    }

    /// Run one batch. Per-record failures are contained and resolved to
    /// ERROR; only setup failures (store access during selection) abort.
    pub async fn run(
        &self,
        policy: SelectionPolicy,
        cancel: CancellationToken,
    ) -> Result<BatchSummary, AppError> {
        // Crash-recovery sweep: anything claimed by a run that died gets
        // its PENDING status back before selection.
        self.db
            .sweep_stale_claims(Utc::now(), Duration::from_secs(CLAIM_STALENESS_SECS))?;

        let ids = match policy {
            SelectionPolicy::Ids(ids) => ids,
            SelectionPolicy::Limit(n) => self.db.pending_ids(Some(n))?,
            SelectionPolicy::AllPending => self.db.pending_ids(None)?,
        };

        let mut summary = BatchSummary::default();
        if ids.is_empty() {
            tracing::info!("No records selected, nothing to do");
            return Ok(summary);
        }

        tracing::info!(
            selected = ids.len(),
            workers = self.workers,
            model = %self.model,
            "Starting analysis batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks: JoinSet<Result<Resolution, AppError>> = JoinSet::new();
        let mut submitted = 0usize;

        for id in &ids {
            if cancel.is_cancelled() {
                tracing::info!("Cancel requested, not claiming further records");
                break;
            }
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            submitted += 1;

            let db = self.db.clone();
            let provider = self.provider.clone();
            let model = self.model.clone();
            let record_cancel = cancel.clone();
            let id = id.clone();
            tasks.spawn(async move {
                let result = process_record(db, provider, &model, &id, record_cancel).await;
                drop(permit);
                result
            });
        }

        // Records never submitted (cancellation) were not claimed and
        // stay PENDING; count them so the summary adds up.
        summary.skipped += ids.len() - submitted;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(Resolution::Analyzed {
                    input_tokens,
                    output_tokens,
                    cost,
                })) => {
                    summary.analyzed += 1;
                    summary.input_tokens += input_tokens;
                    summary.output_tokens += output_tokens;
                    summary.estimated_cost += cost;
                }
                Ok(Ok(Resolution::Errored)) => summary.errored += 1,
                Ok(Ok(Resolution::Skipped)) => summary.skipped += 1,
                Ok(Err(e)) => {
                    tracing::error!("Record task failed against the store: {}", e);
                    summary.errored += 1;
                }
                Err(e) => {
                    tracing::error!("Record task panicked: {}", e);
                    summary.errored += 1;
                }
            }
        }

        tracing::info!(
            analyzed = summary.analyzed,
            errored = summary.errored,
            skipped = summary.skipped,
            input_tokens = summary.input_tokens,
            output_tokens = summary.output_tokens,
            cost = format!("${:.6}", summary.estimated_cost),
            "Batch complete"
        );

        Ok(summary)
    }
}

/// Claim → invoke → validate → account → persist, for one record.
///
/// Returns `Err` only for store access failures; provider and validation
/// failures resolve the record to ERROR and return `Ok(Errored)`.
async fn process_record(
    db: Arc<Database>,
    provider: Arc<dyn AnalysisProvider>,
    model: &str,
    id: &str,
    cancel: CancellationToken,
) -> Result<Resolution, AppError> {
    // Step 1: claim. Losing the CAS means another orchestration holds
    // (or already finished) this record.
    if !db.claim(id, Utc::now())? {
        tracing::debug!(id, "Claim lost, skipping");
        return Ok(Resolution::Skipped);
    }

    let Some(record) = db.get_record(id)? else {
        // Claimed then vanished; the store never deletes, so treat as a
        // store-level fault.
        return Err(AppError::NotFound(id.to_string()));
    };

    // Step 2: build the request.
    let prompt = prompt_for(&record);

    // Step 3: invoke with retry. A cancellation drops the in-flight
    // future and leaves the record IN_PROGRESS with its claim timestamp,
    // reclaimable by the next run's staleness sweep.
    let invocation = tokio::select! {
        _ = cancel.cancelled() => {
            tracing::info!(id, "Cancelled mid-flight, leaving claim for the sweep");
            return Ok(Resolution::Skipped);
        }
        result = invoke_with_retry(provider.as_ref(), &prompt, model) => result,
    };

    let response = match invocation {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(id, "Provider invocation failed: {}", e);
            return resolve_error(&db, id, &e);
        }
    };

    // Step 4: validate. A violation is terminal for this attempt:
    // malformed output is a model/prompt defect, not transience.
    let payload = match extract_json_from_response(&response.text) {
        Some(v) => v,
        None => {
            let e = AppError::SchemaViolation {
                field: "$".to_string(),
                reason: "no JSON object in provider output".to_string(),
            };
            return resolve_error(&db, id, &e);
        }
    };
    let analysis = match schema::validate(&payload) {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(id, "Provider output rejected: {}", e);
            return resolve_error(&db, id, &e);
        }
    };

    // Step 5: account, then persist everything in one atomic update.
    let cost = match pricing::estimate_cost(model, response.input_tokens, response.output_tokens) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(id, "Cost accounting failed: {}", e);
            return resolve_error(&db, id, &e);
        }
    };

    let outcome = AnalysisOutcome {
        // The raw validated payload is stored, preserving any extra
        // fields the provider included beyond the contract.
        analysis_payload: payload.to_string(),
        safety_score: analysis.risk_assessment.safety_score,
        primary_genre: analysis.content_taxonomy.primary_genre.as_str().to_string(),
        is_slop: analysis.cognitive_nutrition.is_slop,
        is_brainrot: analysis.cognitive_nutrition.is_brainrot,
        is_short: analysis.video_metadata.format == VideoFormat::ShortVertical,
        model_used: model.to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        input_tokens: response.input_tokens,
        output_tokens: response.output_tokens,
        estimated_cost: cost,
    };

    if !db.mark_analyzed(id, &outcome)? {
        // The sweep reclaimed our stale-looking claim while the provider
        // call ran long. The other orchestration owns the record now.
        tracing::warn!(id, "Claim was reclaimed before persist, discarding result");
        return Ok(Resolution::Skipped);
    }

    tracing::info!(
        id,
        action = analysis.verdict.action.as_str(),
        tokens = format!("{}/{}", response.input_tokens, response.output_tokens),
        cost = format!("${:.6}", cost),
        "Analyzed"
    );

    Ok(Resolution::Analyzed {
        input_tokens: response.input_tokens,
        output_tokens: response.output_tokens,
        cost,
    })
}

/// Resolve a claimed record to ERROR. If the conditional update misses,
/// the staleness sweep already reclaimed the record and another
/// orchestration owns it, so the failure is not ours to count.
fn resolve_error(db: &Database, id: &str, e: &AppError) -> Result<Resolution, AppError> {
    if db.mark_error(id, &e.to_string())? {
        Ok(Resolution::Errored)
    } else {
        tracing::warn!(id, "Claim was reclaimed before the failure could be recorded");
        Ok(Resolution::Skipped)
    }
}

fn prompt_for(record: &Record) -> String {
    let transcript = if record.transcript_status == TranscriptStatus::Fetched {
        record.transcript_text.as_deref()
    } else {
        None
    };
    build_prompt(&record.title, &record.url, &record.channel_name, transcript)
}

/// Invoke the provider, retrying transient transport failures with
/// backoff. Schema problems never reach this layer; non-transient
/// transport errors (auth, bad request) fail immediately.
async fn invoke_with_retry(
    provider: &dyn AnalysisProvider,
    prompt: &str,
    model: &str,
) -> Result<crate::provider::ProviderResponse, AppError> {
    let backoff_delays = [2u64, 8, 30];

    for attempt in 0..3usize {
        match provider.analyze(SYSTEM_INSTRUCTION_V1, prompt, model).await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_transient() && attempt < 2 => {
                let delay = backoff_delays[attempt];
                tracing::warn!(
                    "Provider attempt {} failed, retrying in {}s: {}",
                    attempt + 1,
                    delay,
                    e
                );
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }
            Err(e) if e.is_transient() => {
                return Err(AppError::Transport {
                    detail: format!("3 attempts exhausted, last error: {}", e),
                    transient: false,
                });
            }
            Err(e) => return Err(e),
        }
    }

    unreachable!()
}
