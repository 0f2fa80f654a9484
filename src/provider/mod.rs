//! Analysis provider integration.
//!
//! Calls the Gemini REST API to produce one structured verdict per
//! request. A single call is one attempt; the orchestrator owns the
//! retry ladder, so everything here either succeeds or reports a typed
//! transport error with its transience.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::AppError;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// One provider response, with the token usage the accountant needs.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

/// Seam between the orchestrator and the external analysis capability.
/// Production uses [`GeminiClient`]; tests substitute a mock.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(
        &self,
        system_instruction: &str,
        prompt: &str,
        model: &str,
    ) -> Result<ProviderResponse, AppError>;
}

/// Gemini client for making API calls
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Result<Self, AppError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()?,
            base_url: GEMINI_BASE_URL.to_string(),
            api_key: api_key.to_string(),
        })
    }

    #[allow(dead_code)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }
}

#[async_trait]
impl AnalysisProvider for GeminiClient {
    async fn analyze(
        &self,
        system_instruction: &str,
        prompt: &str,
        model: &str,
    ) -> Result<ProviderResponse, AppError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        let request = GenerateRequest {
            system_instruction: Content {
                parts: vec![Part {
                    text: system_instruction.to_string(),
                }],
            },
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature: 0.3,
            },
        };

        tracing::debug!(model, prompt_len = prompt.len(), "Sending provider request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 429 and 5xx are worth another attempt; other 4xx cannot
            // succeed on retry.
            return Err(AppError::Transport {
                detail: format!("provider returned {}: {}", status, body),
                transient: status.as_u16() == 429 || status.is_server_error(),
            });
        }

        let result: GenerateResponse = response.json().await?;

        let text = result
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| AppError::Transport {
                detail: "no candidates in provider response".to_string(),
                transient: false,
            })?;

        let usage = result.usage_metadata.unwrap_or_default();

        tracing::debug!(
            chars = text.len(),
            input_tokens = usage.prompt_token_count,
            output_tokens = usage.candidates_token_count,
            "Provider response received"
        );

        Ok(ProviderResponse {
            text,
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        })
    }
}

/// Extract JSON from provider text (handles markdown code blocks)
pub fn extract_json_from_response(response: &str) -> Option<serde_json::Value> {
    let trimmed = response.trim();

    // Try direct parse first
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return Some(json);
    }

    // Try to extract from markdown code block
    if let Some(start) = trimmed.find("```json") {
        let after_marker = &trimmed[start + 7..];
        if let Some(end) = after_marker.find("```") {
            let json_str = &after_marker[..end].trim();
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(json_str) {
                return Some(json);
            }
        }
    }

    // Try to find a JSON object embedded in prose
    if let Some(start) = trimmed.find('{') {
        let mut depth = 0;
        let mut end = start;
        for (i, c) in trimmed[start..].char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = start + i + 1;
                        break;
                    }
                }
                _ => {}
            }
        }
        if end > start {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&trimmed[start..end]) {
                return Some(json);
            }
        }
    }

    None
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: i64,
    #[serde(default)]
    candidates_token_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_direct() {
        let json = extract_json_from_response(r#"{"name": "test"}"#);
        assert!(json.is_some());
    }

    #[test]
    fn test_extract_json_markdown_block() {
        let json = extract_json_from_response(
            r#"Here's the verdict:
```json
{"summary": "fine"}
```
"#,
        );
        assert_eq!(json.unwrap()["summary"], "fine");
    }

    #[test]
    fn test_extract_json_embedded_in_prose() {
        let json =
            extract_json_from_response(r#"The analysis is: {"value": 42} and that's it."#);
        assert_eq!(json.unwrap()["value"], 42);
    }

    #[test]
    fn test_extract_json_none_for_garbage() {
        assert!(extract_json_from_response("no json here at all").is_none());
    }
}
