//! Side-by-side model comparison with an LLM judge.
//!
//! Runs one record through two candidate models, then asks a stronger
//! judge model which verdict is better calibrated. Purely diagnostic:
//! nothing here claims the record or writes to the store, so a comparison
//! can run concurrently with analysis batches.

use serde_json::Value;
use std::sync::Arc;

use crate::config::MODEL_JUDGE_FALLBACK;
use crate::database::{Database, Record, TranscriptStatus};
use crate::error::AppError;
use crate::prompts::{build_prompt, SYSTEM_INSTRUCTION_V1};
use crate::provider::{extract_json_from_response, AnalysisProvider};
use crate::schema;

/// One candidate model's verdict, with the tokens it spent.
#[derive(Debug)]
pub struct CandidateVerdict {
    pub model: String,
    pub payload: Value,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

/// Everything one comparison produced.
#[derive(Debug)]
pub struct Comparison {
    pub record_id: String,
    pub verdict_a: CandidateVerdict,
    pub verdict_b: CandidateVerdict,
    pub judge_model: String,
    pub judgement: String,
}

const JUDGE_SYSTEM_INSTRUCTION: &str = "You are a senior content-safety reviewer. \
You will be shown the analysis instructions given to two AI models, the video they \
analyzed, and both of their verdicts. Judge which verdict is better calibrated: \
more accurate visual grounding, more defensible risk flags, and a more sensible \
final action. Answer with the winner (A, B, or Tie) followed by a short rationale.";

pub struct Comparator {
    db: Arc<Database>,
    provider: Arc<dyn AnalysisProvider>,
}

impl Comparator {
    pub fn new(db: Arc<Database>, provider: Arc<dyn AnalysisProvider>) -> Self {
        Self { db, provider }
    }

    /// Compare `model_a` against `model_b` on one stored record, then ask
    /// `judge_model` for a ruling. The record's status and payload are
    /// never touched.
    pub async fn run(
        &self,
        record_id: &str,
        model_a: &str,
        model_b: &str,
        judge_model: &str,
    ) -> Result<Comparison, AppError> {
        let record = self
            .db
            .get_record(record_id)?
            .ok_or_else(|| AppError::NotFound(record_id.to_string()))?;

        let prompt = prompt_for(&record);

        tracing::info!(id = record_id, model_a, model_b, "Running comparison passes");
        let verdict_a = self.candidate_pass(&prompt, model_a).await?;
        let verdict_b = self.candidate_pass(&prompt, model_b).await?;

        let judge_prompt = build_judge_prompt(&prompt, &verdict_a, &verdict_b);

        // The judge is a preview model; fall back to the stable one rather
        // than losing the two candidate verdicts already paid for.
        let (judge_used, judgement) = match self
            .provider
            .analyze(JUDGE_SYSTEM_INSTRUCTION, &judge_prompt, judge_model)
            .await
        {
            Ok(response) => (judge_model.to_string(), response.text),
            Err(e) => {
                tracing::warn!(
                    "Judge model {} failed ({}), falling back to {}",
                    judge_model,
                    e,
                    MODEL_JUDGE_FALLBACK
                );
                let response = self
                    .provider
                    .analyze(JUDGE_SYSTEM_INSTRUCTION, &judge_prompt, MODEL_JUDGE_FALLBACK)
                    .await?;
                (MODEL_JUDGE_FALLBACK.to_string(), response.text)
            }
        };

        Ok(Comparison {
            record_id: record_id.to_string(),
            verdict_a,
            verdict_b,
            judge_model: judge_used,
            judgement,
        })
    }

    /// One non-persisting analysis pass. The candidate's output still has
    /// to pass the same validation the real pipeline applies, so the
    /// comparison judges verdicts, not formatting luck.
    async fn candidate_pass(&self, prompt: &str, model: &str) -> Result<CandidateVerdict, AppError> {
        let response = self
            .provider
            .analyze(SYSTEM_INSTRUCTION_V1, prompt, model)
            .await?;

        let payload =
            extract_json_from_response(&response.text).ok_or_else(|| AppError::SchemaViolation {
                field: "$".to_string(),
                reason: format!("no JSON object in {} output", model),
            })?;
        schema::validate(&payload)?;

        Ok(CandidateVerdict {
            model: model.to_string(),
            payload,
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
        })
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

fn build_judge_prompt(prompt: &str, a: &CandidateVerdict, b: &CandidateVerdict) -> String {
    format!(
        "### ANALYSIS INSTRUCTIONS GIVEN TO BOTH MODELS\n{}\n\n\
         ### VIDEO\n{}\n\
         ### VERDICT A (model: {})\n{}\n\n\
         ### VERDICT B (model: {})\n{}\n\n\
         Which verdict is better calibrated?\n",
        SYSTEM_INSTRUCTION_V1,
        prompt,
        a.model,
        a.payload,
        b.model,
        b.payload,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::NewRecord;
    use crate::provider::ProviderResponse;
    use crate::schema::sample_verdict_json;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn setup_test_db() -> (Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        (Arc::new(db), temp_dir)
    }

    fn seed_record(db: &Database, id: &str) {
        db.upsert_record(&NewRecord {
            id: id.to_string(),
            title: "Robot Build".to_string(),
            url: format!("https://youtube.com/watch?v={}", id),
            channel_name: "STEM Lab".to_string(),
            channel_url: String::new(),
            watched_at: None,
        })
        .unwrap();
    }

    /// Records which models were asked; answers verdicts for candidates
    /// and a ruling for the judge. Models listed in `failing` error out.
    struct RoutingProvider {
        models_seen: Mutex<Vec<String>>,
        failing: Vec<String>,
    }

    impl RoutingProvider {
        fn new(failing: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                models_seen: Mutex::new(Vec::new()),
                failing: failing.iter().map(|s| s.to_string()).collect(),
            })
        }
    }

    #[async_trait]
    impl AnalysisProvider for RoutingProvider {
        async fn analyze(
            &self,
            system: &str,
            _prompt: &str,
            model: &str,
        ) -> Result<ProviderResponse, AppError> {
            self.models_seen.lock().unwrap().push(model.to_string());
            if self.failing.iter().any(|m| m == model) {
                return Err(AppError::Transport {
                    detail: format!("model {} unavailable", model),
                    transient: true,
                });
            }
            let text = if system == SYSTEM_INSTRUCTION_V1 {
                sample_verdict_json().to_string()
            } else {
                "A. Better grounded flags.".to_string()
            };
            Ok(ProviderResponse {
                text,
                input_tokens: 200,
                output_tokens: 80,
            })
        }
    }

    #[tokio::test]
    async fn test_comparison_never_touches_record_state() {
        let (db, _temp) = setup_test_db();
        seed_record(&db, "cmp1");

        let provider = RoutingProvider::new(&[]);
        let comparator = Comparator::new(db.clone(), provider.clone());
        let result = comparator
            .run("cmp1", "gemini-2.5-flash-lite", "gemini-3-flash-preview", "gemini-3-pro-preview")
            .await
            .unwrap();

        assert_eq!(result.judgement, "A. Better grounded flags.");
        assert_eq!(result.judge_model, "gemini-3-pro-preview");
        assert_eq!(
            *provider.models_seen.lock().unwrap(),
            vec!["gemini-2.5-flash-lite", "gemini-3-flash-preview", "gemini-3-pro-preview"]
        );

        // Record untouched: still PENDING, nothing persisted
        let rec = db.get_record("cmp1").unwrap().unwrap();
        assert_eq!(rec.status.to_string(), "PENDING");
        assert!(rec.analysis_payload.is_none());
        assert!(rec.model_used.is_none());
    }

    #[tokio::test]
    async fn test_judge_falls_back_to_stable_model() {
        let (db, _temp) = setup_test_db();
        seed_record(&db, "cmp2");

        let provider = RoutingProvider::new(&["gemini-3-pro-preview"]);
        let comparator = Comparator::new(db, provider.clone());
        let result = comparator
            .run("cmp2", "gemini-2.5-flash-lite", "gemini-3-flash-preview", "gemini-3-pro-preview")
            .await
            .unwrap();

        assert_eq!(result.judge_model, MODEL_JUDGE_FALLBACK);
        let seen = provider.models_seen.lock().unwrap();
        assert_eq!(seen.last().map(String::as_str), Some(MODEL_JUDGE_FALLBACK));
    }

    #[tokio::test]
    async fn test_unknown_record_is_an_error() {
        let (db, _temp) = setup_test_db();
        let comparator = Comparator::new(db, RoutingProvider::new(&[]));
        let err = comparator
            .run("ghost", "a-model", "b-model", "judge")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
