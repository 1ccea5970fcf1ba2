//! Transports: deliver one classification request, return the raw envelope.
//!
//! A transport performs exactly one attempt and sorts failures into three
//! classes ([`TransportError`]). Retrying is the caller's job
//! ([`crate::pipeline::llm`]), which keeps the backoff policy testable with
//! a fake transport.
//!
//! Two implementations ship:
//!
//! - [`AnthropicTransport`]: direct Messages-API call over `reqwest`. HTTP
//!   status codes map precisely onto the failure classes.
//! - [`ProviderTransport`]: any `edgequake-llm` provider. Replies are wrapped
//!   in a Messages-style envelope so the parser sees one format.

use crate::config::ClassifierConfig;
use crate::error::{ClassifierError, TransportError};
use crate::pipeline::encode::{EncodedImage, EncodedPayload};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LlmError, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Status codes treated as temporary server trouble (529 = overloaded).
const TRANSIENT_STATUSES: [u16; 5] = [500, 502, 503, 504, 529];

/// Longest slice of an error body kept in diagnostics.
const MAX_ERROR_BODY: usize = 300;

/// Everything a transport needs for one attempt.
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub system: String,
    pub prompt: String,
    pub images: Vec<EncodedImage>,
}

impl ClassificationRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>, payload: &EncodedPayload) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            images: payload.images().to_vec(),
        }
    }
}

/// One remote attempt.
#[async_trait]
pub trait ClassificationTransport: Send + Sync {
    /// Send the request; `Ok` carries the response body verbatim.
    async fn send(&self, request: &ClassificationRequest) -> Result<String, TransportError>;
}

/// Build the transport named by `config.provider_name`.
pub fn transport_from_config(
    config: &ClassifierConfig,
) -> Result<Arc<dyn ClassificationTransport>, ClassifierError> {
    if config.provider_name.eq_ignore_ascii_case("anthropic") {
        Ok(Arc::new(AnthropicTransport::from_config(config)?))
    } else {
        Ok(Arc::new(ProviderTransport::from_config(config)?))
    }
}

// ── Anthropic ────────────────────────────────────────────────────────────

pub struct AnthropicTransport {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
}

impl AnthropicTransport {
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ClassifierError::MissingApiKey {
                provider: "anthropic".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| ClassifierError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Messages-API body: prompt text first, then the pages in order.
    fn request_body(&self, request: &ClassificationRequest) -> Value {
        let mut content = vec![json!({ "type": "text", "text": request.prompt })];
        content.extend(request.images.iter().map(|img| {
            json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": img.mime_type,
                    "data": img.data,
                }
            })
        }));

        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "system": request.system,
            "messages": [{ "role": "user", "content": content }],
        })
    }
}

#[async_trait]
impl ClassificationTransport for AnthropicTransport {
    async fn send(&self, request: &ClassificationRequest) -> Result<String, TransportError> {
        debug!(
            "POST {} with {} image(s), model {}",
            self.api_url,
            request.images.len(),
            self.model
        );

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let body = response.text().await.map_err(classify_reqwest_error)?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(classify_status(status.as_u16(), retry_after, &body))
        }
    }
}

/// Map a non-success HTTP status onto a failure class.
pub fn classify_status(status: u16, retry_after_secs: Option<u64>, body: &str) -> TransportError {
    let detail = format!("HTTP {}: {}", status, truncate(body.trim(), MAX_ERROR_BODY));
    if status == 429 {
        TransportError::RateLimited {
            detail,
            retry_after_secs,
        }
    } else if TRANSIENT_STATUSES.contains(&status) {
        TransportError::Transient {
            status: Some(status),
            detail,
        }
    } else {
        TransportError::Fatal { detail }
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() || e.is_connect() || e.is_body() {
        TransportError::Transient {
            status: None,
            detail: e.to_string(),
        }
    } else {
        TransportError::Fatal {
            detail: e.to_string(),
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

// ── edgequake-llm providers ──────────────────────────────────────────────

pub struct ProviderTransport {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl ProviderTransport {
    pub fn new(provider: Arc<dyn LLMProvider>, max_tokens: usize, temperature: f32) -> Self {
        Self {
            provider,
            options: CompletionOptions {
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
                ..Default::default()
            },
        }
    }

    /// Instantiate `config.provider_name` through [`ProviderFactory`].
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let provider = ProviderFactory::create_llm_provider(&config.provider_name, &config.model)
            .map_err(|e| ClassifierError::ProviderNotConfigured {
                provider: config.provider_name.clone(),
                hint: format!("{e}"),
            })?;
        Ok(Self::new(provider, config.max_tokens, config.temperature))
    }
}

#[async_trait]
impl ClassificationTransport for ProviderTransport {
    async fn send(&self, request: &ClassificationRequest) -> Result<String, TransportError> {
        let images = request.images.iter().map(EncodedImage::to_image_data).collect();
        let messages = vec![
            ChatMessage::system(request.system.as_str()),
            ChatMessage::user_with_images(request.prompt.as_str(), images),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| classify_provider_error(&e))?;

        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(json!({ "content": [{ "type": "text", "text": response.content }] }).to_string())
    }
}

/// Sort a provider error into a failure class.
///
/// Typed variants map directly. Catch-all variants (`ApiError`,
/// `ProviderError`, `Unknown`) only carry a message, so their class comes
/// from [`classify_error_message`].
pub fn classify_provider_error(error: &LlmError) -> TransportError {
    let detail = error.to_string();
    match error {
        LlmError::RateLimited(_) => TransportError::RateLimited {
            detail,
            retry_after_secs: None,
        },
        LlmError::Timeout | LlmError::NetworkError(_) => TransportError::Transient {
            status: None,
            detail,
        },
        LlmError::ApiError(msg) | LlmError::ProviderError(msg) | LlmError::Unknown(msg) => {
            classify_error_message(msg)
        }
        LlmError::InvalidRequest(_)
        | LlmError::AuthError(_)
        | LlmError::TokenLimitExceeded { .. }
        | LlmError::ModelNotFound(_)
        | LlmError::SerializationError(_)
        | LlmError::ConfigError(_)
        | LlmError::NotSupported(_) => TransportError::Fatal { detail },
        #[allow(unreachable_patterns)]
        _ => TransportError::Fatal { detail },
    }
}

/// HTTP status codes that stand alone as a word, e.g. `503` but not `5030`.
static STATUS_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([1-5][0-9]{2})\b").unwrap());

/// Classify an untyped provider message by the status code or wording in it.
pub fn classify_error_message(message: &str) -> TransportError {
    let lower = message.to_ascii_lowercase();
    let detail = message.to_string();
    let status = STATUS_CODE
        .captures_iter(message)
        .filter_map(|c| c[1].parse::<u16>().ok())
        .find(|code| *code == 429 || TRANSIENT_STATUSES.contains(code));

    if status == Some(429)
        || ["rate limit", "rate_limit", "too many requests"]
            .iter()
            .any(|k| lower.contains(k))
    {
        return TransportError::RateLimited {
            detail,
            retry_after_secs: None,
        };
    }

    if status.is_some()
        || ["timed out", "overloaded", "temporarily unavailable", "service unavailable"]
            .iter()
            .any(|k| lower.contains(k))
    {
        return TransportError::Transient { status, detail };
    }

    TransportError::Fatal { detail }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> EncodedPayload {
        EncodedPayload::from_entries(vec![
            Some(EncodedImage {
                page_index: 0,
                mime_type: "image/jpeg".into(),
                data: "AAAA".into(),
            }),
            Some(EncodedImage {
                page_index: 1,
                mime_type: "image/jpeg".into(),
                data: "BBBB".into(),
            }),
        ])
    }

    fn anthropic() -> AnthropicTransport {
        let config = ClassifierConfig::builder().api_key("sk-test").build().unwrap();
        AnthropicTransport::from_config(&config).unwrap()
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            classify_status(429, Some(30), "slow down"),
            TransportError::RateLimited {
                retry_after_secs: Some(30),
                ..
            }
        ));
        for code in [500, 502, 503, 504, 529] {
            assert!(
                matches!(
                    classify_status(code, None, ""),
                    TransportError::Transient { status: Some(c), .. } if c == code
                ),
                "{code}"
            );
        }
        for code in [400, 401, 403, 404, 413] {
            assert!(matches!(
                classify_status(code, None, "{}"),
                TransportError::Fatal { .. }
            ));
        }
    }

    #[test]
    fn error_body_is_truncated() {
        let body = "x".repeat(1000);
        match classify_status(400, None, &body) {
            TransportError::Fatal { detail } => assert!(detail.chars().count() < 320),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn provider_error_variants_map_to_classes() {
        assert!(matches!(
            classify_provider_error(&LlmError::RateLimited("slow down".into())),
            TransportError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_provider_error(&LlmError::Timeout),
            TransportError::Transient { status: None, .. }
        ));
        assert!(matches!(
            classify_provider_error(&LlmError::NetworkError("connection reset".into())),
            TransportError::Transient { status: None, .. }
        ));
        assert!(matches!(
            classify_provider_error(&LlmError::AuthError("invalid api key".into())),
            TransportError::Fatal { .. }
        ));
        assert!(matches!(
            classify_provider_error(&LlmError::TokenLimitExceeded { max: 4096, got: 5000 }),
            TransportError::Fatal { .. }
        ));
    }

    #[test]
    fn invalid_request_with_large_numbers_is_fatal() {
        let msg = "max_tokens 5000 exceeds model limit 4096";
        assert!(matches!(
            classify_provider_error(&LlmError::InvalidRequest(msg.into())),
            TransportError::Fatal { .. }
        ));
        assert!(matches!(
            classify_provider_error(&LlmError::ApiError(msg.into())),
            TransportError::Fatal { .. }
        ));
    }

    #[test]
    fn untyped_messages_use_whole_status_codes() {
        assert!(matches!(
            classify_error_message("429 Too Many Requests"),
            TransportError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_error_message("server returned 503: busy"),
            TransportError::Transient { status: Some(503), .. }
        ));
        assert!(matches!(
            classify_error_message("request id 15029 failed with 400"),
            TransportError::Fatal { .. }
        ));
        assert!(matches!(
            classify_provider_error(&LlmError::ProviderError("model is overloaded".into())),
            TransportError::Transient { status: None, .. }
        ));
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let config = ClassifierConfig::default();
        assert!(matches!(
            AnthropicTransport::from_config(&config),
            Err(ClassifierError::MissingApiKey { .. })
        ));
    }

    #[test]
    fn request_body_orders_text_then_images() {
        let t = anthropic();
        let req = ClassificationRequest::new("sys", "classify this", &payload());
        let body = t.request_body(&req);

        assert_eq!(body["system"], "sys");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["messages"][0]["role"], "user");
        let content = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["source"]["data"], "AAAA");
        assert_eq!(content[2]["source"]["data"], "BBBB");
        assert_eq!(content[2]["source"]["media_type"], "image/jpeg");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transient() {
        let config = ClassifierConfig::builder()
            .api_key("sk-test")
            .api_url("http://127.0.0.1:9/v1/messages")
            .api_timeout_secs(5)
            .build()
            .unwrap();
        let t = AnthropicTransport::from_config(&config).unwrap();
        let err = t
            .send(&ClassificationRequest::new("sys", "p", &payload()))
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "{err:?}");
    }
}
