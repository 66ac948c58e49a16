use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use super::request::{extract_error_message, extract_text, extract_usage, sanitize_header_value};
use super::request_builder::{build_chat_request, RequestSettings};
use super::types::{ChatTurn, Completion};
use crate::config::AppConfig;
use crate::error::{AppError, ServiceError, ServiceErrorKind};
use crate::utils::{log_debug, log_info, truncate_for_log};

/// The remote completion call. Implementations must not retry; a failure is
/// reported once and the caller decides what to show instead.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[ChatTurn],
        max_tokens: u32,
    ) -> Result<Completion, ServiceError>;
}

/// OpenAI-compatible chat completions over HTTP.
pub struct HttpCompletionService {
    client: reqwest::Client,
    provider_id: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    top_p: f64,
}

fn parse_body_to_value(text: &str) -> Value {
    if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
    }
}

impl HttpCompletionService {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let api_key = config.require_api_key()?.to_string();
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            provider_id: config.provider_id.clone(),
            base_url: config.base_url.clone(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
        })
    }

    fn settings(&self) -> RequestSettings<'_> {
        RequestSettings {
            provider_id: &self.provider_id,
            base_url: &self.base_url,
            api_key: &self.api_key,
            model_name: &self.model,
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }
}

#[async_trait]
impl CompletionService for HttpCompletionService {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[ChatTurn],
        max_tokens: u32,
    ) -> Result<Completion, ServiceError> {
        let built = build_chat_request(&self.settings(), system_prompt, messages, max_tokens);

        let mut header_map = HeaderMap::new();
        for (key, value) in &built.headers {
            match (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(header_value)) => {
                    header_map.insert(name, header_value);
                }
                _ => {
                    return Err(ServiceError::new(
                        ServiceErrorKind::AuthError,
                        format!("invalid header {}={}", key, sanitize_header_value(key, value)),
                    ));
                }
            }
        }

        log_info(
            "completion",
            format!(
                "POST {} model={} messages={} max_tokens={}",
                built.url,
                self.model,
                messages.len(),
                max_tokens
            ),
        );

        let response = self
            .client
            .post(&built.url)
            .headers(header_map)
            .json(&built.body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let data = parse_body_to_value(&text);

        log_debug(
            "completion",
            format!("status={} body={}", status, truncate_for_log(&text, 256)),
        );

        if !status.is_success() {
            let detail = extract_error_message(&data)
                .unwrap_or_else(|| format!("provider returned status {}", status));
            return Err(ServiceError::new(
                ServiceErrorKind::from_status(status.as_u16()),
                detail,
            ));
        }

        let reply = extract_text(&data).ok_or_else(|| {
            ServiceError::new(ServiceErrorKind::ServerError, "empty response from provider")
        })?;

        Ok(Completion {
            text: reply,
            usage: extract_usage(&data),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_api_key() {
        let config = AppConfig::default();
        assert!(matches!(
            HttpCompletionService::from_config(&config),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_from_config_with_key() {
        let config = AppConfig {
            api_key: "sk-test".to_string(),
            provider_id: "groq".to_string(),
            ..AppConfig::default()
        };
        let service = HttpCompletionService::from_config(&config).unwrap();
        assert_eq!(service.settings().provider_id, "groq");
        assert_eq!(service.settings().api_key, "sk-test");
    }

    #[test]
    fn test_parse_body_to_value() {
        assert_eq!(parse_body_to_value("  "), Value::Null);
        assert_eq!(parse_body_to_value("oops"), Value::String("oops".to_string()));
        assert!(parse_body_to_value(r#"{"a":1}"#).is_object());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let config = AppConfig {
            api_key: "sk-test".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_ms: 2_000,
            ..AppConfig::default()
        };
        let service = HttpCompletionService::from_config(&config).unwrap();
        let err = service
            .complete("system", &[ChatTurn::new("user", "hi")], 16)
            .await
            .unwrap_err();
        assert!(matches!(
            err.kind,
            ServiceErrorKind::NetworkError | ServiceErrorKind::Timeout
        ));
    }
}
