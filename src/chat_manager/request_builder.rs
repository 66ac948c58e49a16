use std::collections::HashMap;

use serde_json::Value;

use super::provider_adapter::adapter_for;
use super::request::normalize_headers;
use super::types::ChatTurn;

pub struct BuiltRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

/// Sampling and routing settings for one completion request.
#[derive(Debug, Clone)]
pub struct RequestSettings<'a> {
    pub provider_id: &'a str,
    pub base_url: &'a str,
    pub api_key: &'a str,
    pub model_name: &'a str,
    pub temperature: f64,
    pub top_p: f64,
}

/// Build a provider-specific chat request (endpoint, headers, body).
pub fn build_chat_request(
    settings: &RequestSettings<'_>,
    system_prompt: &str,
    messages: &[ChatTurn],
    max_tokens: u32,
) -> BuiltRequest {
    let adapter = adapter_for(settings.provider_id);

    BuiltRequest {
        url: adapter.endpoint(settings.base_url),
        headers: normalize_headers(settings.api_key),
        body: adapter.body(
            settings.model_name,
            system_prompt,
            messages,
            settings.temperature,
            settings.top_p,
            max_tokens,
        ),
    }
}
