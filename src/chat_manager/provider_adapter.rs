use serde_json::{json, Value};

use super::types::ChatTurn;

pub trait ProviderAdapter {
    fn endpoint(&self, base_url: &str) -> String;
    fn body(
        &self,
        model_name: &str,
        system_prompt: &str,
        messages: &[ChatTurn],
        temperature: f64,
        top_p: f64,
        max_tokens: u32,
    ) -> Value;
}

pub struct OpenAIAdapter;
pub struct GroqAdapter;

fn openai_messages(system_prompt: &str, messages: &[ChatTurn]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(json!({ "role": "system", "content": system_prompt }));
    for msg in messages {
        out.push(json!({ "role": msg.role, "content": msg.content }));
    }
    out
}

impl ProviderAdapter for OpenAIAdapter {
    fn endpoint(&self, base_url: &str) -> String {
        super::request::chat_completions_endpoint(base_url)
    }

    fn body(
        &self,
        model_name: &str,
        system_prompt: &str,
        messages: &[ChatTurn],
        temperature: f64,
        top_p: f64,
        max_tokens: u32,
    ) -> Value {
        json!({
            "model": model_name,
            "messages": openai_messages(system_prompt, messages),
            "stream": false,
            "temperature": temperature,
            "top_p": top_p,
            "max_tokens": max_tokens,
        })
    }
}

impl ProviderAdapter for GroqAdapter {
    fn endpoint(&self, base_url: &str) -> String {
        let trimmed = base_url.trim_end_matches('/');
        if trimmed.ends_with("/openai/v1") {
            format!("{}/chat/completions", trimmed)
        } else if trimmed.ends_with("/openai") {
            format!("{}/v1/chat/completions", trimmed)
        } else {
            format!("{}/openai/v1/chat/completions", trimmed)
        }
    }

    fn body(
        &self,
        model_name: &str,
        system_prompt: &str,
        messages: &[ChatTurn],
        temperature: f64,
        top_p: f64,
        max_tokens: u32,
    ) -> Value {
        // Groq is OpenAI-compatible for our purposes
        OpenAIAdapter.body(model_name, system_prompt, messages, temperature, top_p, max_tokens)
    }
}

pub fn adapter_for(provider_id: &str) -> Box<dyn ProviderAdapter + Send + Sync> {
    match provider_id {
        "groq" => Box::new(GroqAdapter),
        _ => Box::new(OpenAIAdapter),
    }
}
