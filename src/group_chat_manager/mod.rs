pub mod context;
pub mod continuity;
pub mod keywords;
pub mod selection;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use self::context::ContextStore;
use self::continuity::ContinuityEngine;
use self::selection::{select_speaker, SelectionReason, SelectionResult};
use crate::chat_manager::messages::build_chat_turns;
use crate::chat_manager::normalizer;
use crate::chat_manager::prompts::build_system_prompt;
use crate::chat_manager::service::CompletionService;
use crate::chat_manager::types::{GroupDefinition, HistoryMessage, Roster, UsageSummary};
use crate::chat_manager::{fallback_reply, require_text};
use crate::error::AppError;
use crate::utils::{log_info, log_warn, truncate_for_log};

pub use self::selection::ScoredCandidate;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupReply {
    pub chosen_persona: String,
    pub reply: String,
    pub used_fallback: bool,
    pub selection: SelectionReason,
    pub request_id: String,
    pub usage: Option<UsageSummary>,
}

/// Group chat turns: pick who speaks, ask the model, record the turn.
pub struct GroupChatManager {
    roster: Arc<Roster>,
    store: Arc<ContextStore>,
    continuity: ContinuityEngine,
    completion: Arc<dyn CompletionService>,
    rng: Mutex<StdRng>,
    default_max_tokens: u32,
}

impl GroupChatManager {
    pub fn new(
        roster: Arc<Roster>,
        completion: Arc<dyn CompletionService>,
        default_max_tokens: u32,
    ) -> Self {
        Self::with_rng(roster, completion, default_max_tokens, StdRng::from_entropy())
    }

    /// Same as `new` with an explicit random source, for reproducible draws.
    pub fn with_rng(
        roster: Arc<Roster>,
        completion: Arc<dyn CompletionService>,
        default_max_tokens: u32,
        rng: StdRng,
    ) -> Self {
        let store = Arc::new(ContextStore::new(roster.clone()));
        let continuity = ContinuityEngine::new(roster.clone(), store.clone());
        Self {
            roster,
            store,
            continuity,
            completion,
            rng: Mutex::new(rng),
            default_max_tokens,
        }
    }

    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn group(&self, group_id: &str) -> Result<&GroupDefinition, AppError> {
        self.roster
            .group(group_id)
            .ok_or_else(|| AppError::InvalidInput(format!("unknown group: {}", group_id)))
    }

    /// Keep the active speaker when the conversation carries on, otherwise
    /// run selection over the group.
    fn choose_speaker(
        &self,
        user_id: &str,
        group: &GroupDefinition,
        message: &str,
        history: &[HistoryMessage],
    ) -> Result<SelectionResult, AppError> {
        let verdict = self.continuity.verdict(user_id, &group.id, message);
        if verdict.continues() {
            if let Some(current) = self.continuity.continuation_speaker(user_id, &group.id) {
                if group.has_member(&current) {
                    log_info(
                        "group_chat",
                        format!("keeping {} ({})", current, verdict.as_str()),
                    );
                    return Ok(SelectionResult {
                        persona_id: current,
                        reason: SelectionReason::Continued,
                        scores: Vec::new(),
                    });
                }
            }
        }

        let result = select_speaker(&self.roster, group, message, history, &mut *self.rng())?;
        match result.reason {
            SelectionReason::Scored => {
                let table = result
                    .scores
                    .iter()
                    .map(|c| format!("{}={:.0}", c.persona_id, c.score))
                    .collect::<Vec<_>>()
                    .join(" ");
                log_info(
                    "group_chat",
                    format!(
                        "selected {} by score ({}) continuity={}",
                        result.persona_id,
                        table,
                        verdict.as_str()
                    ),
                );
            }
            _ => log_info(
                "group_chat",
                format!("selected {} by {}", result.persona_id, result.reason.as_str()),
            ),
        }
        Ok(result)
    }

    pub async fn process_group_message(
        &self,
        user_id: &str,
        group_id: &str,
        message: &str,
        history: &[HistoryMessage],
    ) -> Result<GroupReply, AppError> {
        let user_id = require_text("user id", user_id)?;
        let group_id = require_text("group id", group_id)?;
        let message = require_text("message", message)?;
        let group = self.group(group_id)?;

        let gate = self.store.turn_gate(user_id, group_id);
        let _turn = gate.lock().await;

        let request_id = Uuid::new_v4().to_string();
        let selection = self.choose_speaker(user_id, group, message, history)?;
        let persona = self.roster.persona(&selection.persona_id).ok_or_else(|| {
            AppError::SelectionExhausted(format!(
                "selected persona {} is not in the roster",
                selection.persona_id
            ))
        })?;
        let member = group.member(&persona.id);

        let system_prompt = build_system_prompt(&self.roster, persona, Some(group), message, history);
        let turns = build_chat_turns(history, &persona.id, message, true);
        let max_tokens = member
            .and_then(|m| m.max_reply_tokens)
            .or(persona.max_reply_tokens)
            .unwrap_or(self.default_max_tokens);

        let (reply, used_fallback, usage) =
            match self.completion.complete(&system_prompt, &turns, max_tokens).await {
                Ok(completion) => {
                    let reply = normalizer::enforce_with_rng(&completion.text, persona, &mut *self.rng());
                    (reply, false, completion.usage)
                }
                Err(err) => {
                    log_warn(
                        "group_chat",
                        format!(
                            "request_id={} completion failed for {}: {}; using fallback",
                            request_id, persona.id, err
                        ),
                    );
                    (fallback_reply(persona), true, None)
                }
            };

        self.store.update(user_id, group_id, &persona.id, message);

        log_info(
            "group_chat",
            format!(
                "request_id={} user={} group={} speaker={} fallback={} reply={}",
                request_id,
                user_id,
                group_id,
                persona.id,
                used_fallback,
                truncate_for_log(&reply, 40)
            ),
        );

        Ok(GroupReply {
            chosen_persona: persona.id.clone(),
            reply,
            used_fallback,
            selection: selection.reason,
            request_id,
            usage,
        })
    }

    /// Waits for any in-flight turn of the same conversation before dropping it.
    pub async fn reset_context(&self, user_id: &str, group_id: &str) -> bool {
        let gate = self.store.turn_gate(user_id, group_id);
        let removed = {
            let _turn = gate.lock().await;
            self.store.reset(user_id, group_id)
        };
        drop(gate);
        self.store.prune_gate(user_id, group_id);
        log_info(
            "group_chat",
            format!("reset user={} group={} removed={}", user_id, group_id, removed),
        );
        removed
    }

    pub fn reset_user(&self, user_id: &str) -> usize {
        let removed = self.store.reset_user(user_id);
        log_info(
            "group_chat",
            format!("reset user={} contexts={}", user_id, removed),
        );
        removed
    }
}

// ============================================================================
// Tests
// ============================================================================
