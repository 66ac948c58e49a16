use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::service::CompletionService;
use super::types::{ChatTurn, Completion, UsageSummary};
use crate::error::{ServiceError, ServiceErrorKind};

pub(crate) const DEFAULT_SCRIPTED_REPLY: &str = "好的。";

/// Completion service that plays back a script and records what it was sent.
pub(crate) struct ScriptedService {
    script: Mutex<VecDeque<Result<String, ServiceError>>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    last_max_tokens: AtomicU32,
    last_request: Mutex<Option<(String, Vec<ChatTurn>)>>,
}

impl ScriptedService {
    pub(crate) fn replying(replies: &[&str]) -> Self {
        Self::with_script(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub(crate) fn failing(kind: ServiceErrorKind) -> Self {
        Self::with_script(vec![Err(ServiceError::new(kind, "scripted failure"))])
    }

    pub(crate) fn with_script(script: Vec<Result<String, ServiceError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            last_max_tokens: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls that were running at the same time.
    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn last_max_tokens(&self) -> u32 {
        self.last_max_tokens.load(Ordering::SeqCst)
    }

    pub(crate) fn last_system_prompt(&self) -> Option<String> {
        self.last_request
            .lock()
            .unwrap()
            .as_ref()
            .map(|(prompt, _)| prompt.clone())
    }

    pub(crate) fn last_messages(&self) -> Vec<ChatTurn> {
        self.last_request
            .lock()
            .unwrap()
            .as_ref()
            .map(|(_, turns)| turns.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionService for ScriptedService {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[ChatTurn],
        max_tokens: u32,
    ) -> Result<Completion, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_max_tokens.store(max_tokens, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some((system_prompt.to_string(), messages.to_vec()));

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        // Suspend mid-call so other tasks get a chance to overlap with this one.
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(DEFAULT_SCRIPTED_REPLY.to_string()));

        next.map(|text| Completion {
            text,
            usage: Some(UsageSummary {
                prompt_tokens: Some(10),
                completion_tokens: Some(2),
                total_tokens: Some(12),
            }),
        })
    }
}
