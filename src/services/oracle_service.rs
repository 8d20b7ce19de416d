use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use reqwest::StatusCode;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AiErrorCode, AppError, AppResult};
use crate::models::oracle::{OracleRequest, SuggestionOracle};
use crate::models::suggestion::RawCandidate;
use crate::services::prompt_templates::{build_suggestion_payload, suggestion_system_prompt};
use crate::utils::redact::redact_sensitive_data;

pub const ENV_API_KEY: &str = "DAYWEAVE_ORACLE_API_KEY";
pub const ENV_BASE_URL: &str = "DAYWEAVE_ORACLE_BASE_URL";
pub const ENV_MODEL: &str = "DAYWEAVE_ORACLE_MODEL";
pub const ENV_TIMEOUT_SECS: &str = "DAYWEAVE_ORACLE_TIMEOUT_SECS";

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
const DEFAULT_MODEL: &str = "deepseek-chat";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const SUGGESTIONS_KEY: &str = "task_suggestions";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub http_timeout: StdDuration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            http_timeout: StdDuration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl OracleConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let api_key = std::env::var(ENV_API_KEY)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let base_url = std::env::var(ENV_BASE_URL)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(defaults.base_url);
        let model = std::env::var(ENV_MODEL)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(defaults.model);
        let http_timeout = match std::env::var(ENV_TIMEOUT_SECS) {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => StdDuration::from_secs(secs),
                _ => {
                    warn!(
                        target: "app::oracle",
                        value = %raw,
                        "ignoring invalid oracle timeout"
                    );
                    defaults.http_timeout
                }
            },
            Err(_) => defaults.http_timeout,
        };

        Self {
            api_key,
            base_url,
            model,
            http_timeout,
        }
    }
}

/// Build the oracle configured by the environment. Without an API key every
/// call fails with `MissingApiKey`.
pub fn oracle_from_config(config: &OracleConfig) -> AppResult<Arc<dyn SuggestionOracle>> {
    match &config.api_key {
        Some(api_key) => {
            let oracle = HttpSuggestionOracle::try_new(config, api_key.clone())?;
            info!(target: "app::oracle", model = %config.model, "suggestion oracle configured");
            Ok(Arc::new(oracle))
        }
        None => {
            warn!(target: "app::oracle", "no oracle API key configured");
            Ok(Arc::new(UnconfiguredOracle))
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredOracle;

#[async_trait::async_trait]
impl SuggestionOracle for UnconfiguredOracle {
    async fn suggest(&self, _request: &OracleRequest) -> AppResult<Vec<RawCandidate>> {
        Err(AppError::ai(
            AiErrorCode::MissingApiKey,
            "suggestion oracle API key is not configured",
        ))
    }
}

/// Oracle backed by an OpenAI-compatible chat-completions endpoint.
///
/// Each `suggest` call makes exactly one HTTP request; retrying is a user
/// decision made through a new request.
pub struct HttpSuggestionOracle {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl HttpSuggestionOracle {
    pub fn try_new(config: &OracleConfig, api_key: String) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Some(StdDuration::from_secs(90)))
            .build()
            .map_err(|err| AppError::other(format!("failed to build oracle HTTP client: {err}")))?;

        let base_url = config.base_url.trim_end_matches('/');
        let endpoint = format!("{base_url}/v1/chat/completions");

        Ok(Self {
            client,
            api_key,
            endpoint,
            model: config.model.clone(),
        })
    }

    fn build_request_body(&self, payload: &JsonValue) -> JsonValue {
        let user_content = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
        json!({
            "model": self.model,
            "temperature": 0.7,
            "top_p": 0.9,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": suggestion_system_prompt() },
                { "role": "user", "content": user_content }
            ]
        })
    }

    async fn invoke(&self, request: &OracleRequest) -> AppResult<Vec<RawCandidate>> {
        let correlation_id = Uuid::new_v4().to_string();
        let payload = build_suggestion_payload(request);
        let sanitized = serde_json::to_string(&redact_sensitive_data(&payload))
            .unwrap_or_else(|_| "\"<redacted>\"".to_string());

        debug!(
            target: "app::oracle",
            correlation_id = %correlation_id,
            payload = %sanitized,
            "invoking suggestion oracle"
        );

        let start = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.build_request_body(&payload))
            .send()
            .await
            .map_err(|err| error_from_reqwest(err, &correlation_id))?;

        let status = response.status();
        let latency_ms = start.elapsed().as_millis();
        if !status.is_success() {
            warn!(
                target: "app::oracle",
                correlation_id = %correlation_id,
                status = status.as_u16(),
                latency_ms,
                "oracle returned non-success status"
            );
            return Err(map_http_error(status, &correlation_id));
        }

        let body: JsonValue = response.json().await.map_err(|err| {
            AppError::ai_with_details(
                AiErrorCode::InvalidResponse,
                "failed to decode oracle response body",
                Some(correlation_id.as_str()),
                Some(json!({ "reason": err.to_string() })),
            )
        })?;

        let content = body
            .pointer("/choices/0/message/content")
            .and_then(|value| value.as_str())
            .ok_or_else(|| {
                AppError::ai_with_details(
                    AiErrorCode::InvalidResponse,
                    "oracle response is missing message content",
                    Some(correlation_id.as_str()),
                    Some(json!({ "reason": "missing_message_content" })),
                )
            })?;

        let parsed = parse_content(content, &correlation_id)?;
        let candidates = decode_candidates(&parsed, &correlation_id)?;

        debug!(
            target: "app::oracle",
            correlation_id = %correlation_id,
            latency_ms,
            candidates = candidates.len(),
            "oracle responded"
        );

        Ok(candidates)
    }
}

#[async_trait::async_trait]
impl SuggestionOracle for HttpSuggestionOracle {
    async fn suggest(&self, request: &OracleRequest) -> AppResult<Vec<RawCandidate>> {
        self.invoke(request).await
    }
}

/// Decode the message content, tolerating a surrounding markdown fence.
pub fn parse_content(content: &str, correlation_id: &str) -> AppResult<JsonValue> {
    let trimmed = content.trim();
    let cleaned = if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```JSON")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    };

    serde_json::from_str(cleaned).map_err(|err| {
        AppError::ai_with_details(
            AiErrorCode::InvalidResponse,
            format!("oracle content is not JSON: {err}"),
            Some(correlation_id),
            Some(json!({ "reason": "invalid_json" })),
        )
    })
}

/// Accepts a bare array of suggestions or an object wrapping one under
/// `task_suggestions`. Entries that are not objects become empty candidates
/// so they are reported as unparsable instead of failing the whole call.
pub fn decode_candidates(value: &JsonValue, correlation_id: &str) -> AppResult<Vec<RawCandidate>> {
    let items = match value {
        JsonValue::Array(items) => items,
        JsonValue::Object(map) => match map.get(SUGGESTIONS_KEY) {
            Some(JsonValue::Array(items)) => items,
            _ => {
                return Err(AppError::ai_with_details(
                    AiErrorCode::InvalidResponse,
                    "oracle response has no task_suggestions list",
                    Some(correlation_id),
                    Some(json!({ "reason": "missing_task_suggestions" })),
                ))
            }
        },
        _ => {
            return Err(AppError::ai_with_details(
                AiErrorCode::InvalidResponse,
                "oracle response is neither a list nor an object",
                Some(correlation_id),
                Some(json!({ "reason": "unexpected_shape" })),
            ))
        }
    };

    Ok(items.iter().map(candidate_from_value).collect())
}

fn candidate_from_value(value: &JsonValue) -> RawCandidate {
    let field = |names: &[&str]| {
        names
            .iter()
            .find_map(|name| value.get(*name).and_then(JsonValue::as_str))
            .map(str::to_string)
    };

    RawCandidate {
        task: field(&["task", "title"]),
        priority: field(&["priority"]),
        reason: field(&["reason"]),
    }
}

pub fn map_http_error(status: StatusCode, correlation_id: &str) -> AppError {
    let (code, message) = match status {
        StatusCode::UNAUTHORIZED => (
            AiErrorCode::MissingApiKey,
            "oracle API key is invalid or unauthorized".to_string(),
        ),
        StatusCode::FORBIDDEN => (
            AiErrorCode::Forbidden,
            "oracle API key lacks permission".to_string(),
        ),
        StatusCode::TOO_MANY_REQUESTS => (
            AiErrorCode::RateLimited,
            "oracle rate limit reached, try again later".to_string(),
        ),
        status if status.is_server_error() => (
            AiErrorCode::OracleUnavailable,
            format!("oracle is temporarily unavailable (status {})", status.as_u16()),
        ),
        StatusCode::BAD_REQUEST => (
            AiErrorCode::InvalidRequest,
            "oracle rejected the request format".to_string(),
        ),
        StatusCode::NOT_FOUND => (
            AiErrorCode::InvalidRequest,
            "oracle endpoint not found".to_string(),
        ),
        status => (
            AiErrorCode::Unknown,
            format!("oracle returned status {}", status.as_u16()),
        ),
    };

    AppError::ai_with_details(code, message, Some(correlation_id), None)
}

fn error_from_reqwest(err: reqwest::Error, correlation_id: &str) -> AppError {
    if err.is_timeout() {
        AppError::ai_with_details(
            AiErrorCode::HttpTimeout,
            "oracle request timed out",
            Some(correlation_id),
            None,
        )
    } else if err.is_connect() {
        AppError::ai_with_details(
            AiErrorCode::OracleUnavailable,
            "could not connect to the oracle",
            Some(correlation_id),
            None,
        )
    } else if let Some(status) = err.status() {
        map_http_error(status, correlation_id)
    } else {
        AppError::ai_with_details(
            AiErrorCode::Unknown,
            format!("oracle request failed: {err}"),
            Some(correlation_id),
            None,
        )
    }
}

pub mod testing {
    use super::*;

    pub fn map_http_error(status: StatusCode) -> AppError {
        super::map_http_error(status, "test-correlation-id")
    }

    /// One oracle call against `base_url` with a throwaway key.
    pub async fn suggest_via_http(
        base_url: &str,
        timeout: StdDuration,
        request: &OracleRequest,
    ) -> AppResult<Vec<RawCandidate>> {
        let config = OracleConfig {
            api_key: Some("test-key".to_string()),
            base_url: base_url.to_string(),
            model: DEFAULT_MODEL.to_string(),
            http_timeout: timeout,
        };
        let oracle = HttpSuggestionOracle::try_new(&config, "test-key".to_string())?;
        oracle.suggest(request).await
    }
}
