use serde_json::{Map, Value};
use std::collections::HashMap;

use super::types::UsageSummary;
use crate::utils::SERVICE;

pub fn chat_completions_endpoint(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        format!("{}/chat/completions", trimmed)
    } else {
        format!("{}/v1/chat/completions", trimmed)
    }
}

pub fn normalize_headers(api_key: &str) -> HashMap<String, String> {
    let mut out: HashMap<String, String> = HashMap::new();
    out.insert("Authorization".into(), format!("Bearer {}", api_key));
    out.insert("Content-Type".into(), "application/json".into());
    out.insert("Accept".into(), "application/json".into());
    out.insert("User-Agent".into(), format!("{}/{}", SERVICE, env!("CARGO_PKG_VERSION")));
    out
}

/// Mask credentials before header values reach the logs.
pub fn sanitize_header_value(key: &str, value: &str) -> String {
    let lowered = key.to_ascii_lowercase();
    if lowered.contains("authorization")
        || lowered.contains("api-key")
        || lowered.contains("apikey")
        || lowered.contains("secret")
        || lowered.contains("token")
    {
        "***".into()
    } else {
        value.to_string()
    }
}

pub fn extract_text(data: &Value) -> Option<String> {
    match data {
        Value::String(s) => {
            if s.contains("data:") {
                let mut collected = String::new();
                for raw in s.lines() {
                    let line = raw.trim();
                    let Some(payload) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let payload = payload.trim();
                    if payload.is_empty() || payload == "[DONE]" {
                        continue;
                    }
                    if let Ok(json) = serde_json::from_str::<Value>(payload) {
                        if let Some(piece) = extract_text(&json) {
                            collected.push_str(&piece);
                        }
                    }
                }
                if !collected.is_empty() {
                    return Some(collected);
                }
            }
            Some(s.clone()).filter(|s| !s.trim().is_empty())
        }
        Value::Object(map) => {
            if let Some(Value::Array(choices)) = map.get("choices") {
                for choice in choices {
                    for key in ["message", "delta"] {
                        if let Some(text) = choice.get(key).and_then(extract_message_content) {
                            return Some(text);
                        }
                    }
                    if let Some(text) = choice.get("text").and_then(join_text_fragments) {
                        return Some(text);
                    }
                }
            }
            if let Some(text) = map.get("message").and_then(extract_message_content) {
                return Some(text);
            }
            map.get("content").and_then(join_text_fragments)
        }
        _ => None,
    }
}

fn extract_message_content(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => map.get("content").and_then(join_text_fragments),
        _ => join_text_fragments(value),
    }
}

fn join_text_fragments(value: &Value) -> Option<String> {
    let mut buffer = String::new();
    collect_text_fragments(value, &mut buffer);
    if buffer.trim().is_empty() {
        None
    } else {
        Some(buffer)
    }
}

fn collect_text_fragments(value: &Value, acc: &mut String) {
    match value {
        Value::String(s) => acc.push_str(s),
        Value::Array(items) => {
            for item in items {
                collect_text_fragments(item, acc);
            }
        }
        Value::Object(map) => {
            for key in ["text", "content", "value"] {
                if let Some(inner) = map.get(key) {
                    collect_text_fragments(inner, acc);
                    return;
                }
            }
        }
        _ => {}
    }
}

pub fn extract_usage(data: &Value) -> Option<UsageSummary> {
    match data {
        Value::Object(map) => {
            if let Some(Value::Object(usage)) = map.get("usage") {
                if let Some(summary) = usage_from_map(usage) {
                    return Some(summary);
                }
            }
            usage_from_map(map)
        }
        _ => None,
    }
}

fn usage_from_map(map: &Map<String, Value>) -> Option<UsageSummary> {
    fn take_first(map: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
        keys.iter()
            .filter_map(|key| map.get(*key))
            .find_map(parse_token_value)
    }

    let prompt_tokens = take_first(map, &["prompt_tokens", "input_tokens"]);
    let completion_tokens = take_first(map, &["completion_tokens", "output_tokens"]);
    let total_tokens = take_first(map, &["total_tokens"]).or_else(|| {
        match (prompt_tokens, completion_tokens) {
            (Some(p), Some(c)) => Some(p + c),
            _ => None,
        }
    });

    if prompt_tokens.is_none() && completion_tokens.is_none() && total_tokens.is_none() {
        None
    } else {
        Some(UsageSummary {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        })
    }
}

fn parse_token_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(num) => num.as_u64(),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }
}

pub fn extract_error_message(data: &Value) -> Option<String> {
    match data {
        Value::Object(map) => {
            if let Some(err) = map.get("error") {
                if let Some(Value::String(message)) = err.get("message") {
                    return Some(message.trim().to_string()).filter(|s| !s.is_empty());
                }
                if let Some(text) = join_text_fragments(err) {
                    return Some(text.trim().to_string());
                }
            }
            if let Some(Value::String(message)) = map.get("message") {
                return Some(message.trim().to_string()).filter(|s| !s.is_empty());
            }
            None
        }
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        _ => None,
    }
}
