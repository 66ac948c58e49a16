pub mod cache;
pub mod messages;
pub mod normalizer;
pub mod prompts;
pub mod provider_adapter;
pub mod request;
pub mod request_builder;
pub mod service;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod mock_service;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use self::cache::{cache_key, ResponseCache};
use self::messages::build_chat_turns;
use self::prompts::build_system_prompt;
use self::service::CompletionService;
use self::types::{HistoryMessage, Persona, Roster, UsageSummary};
use crate::error::AppError;
use crate::utils::{log_info, log_warn, truncate_for_log};

/// Reply of a one-on-one persona chat.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterReply {
    pub persona: String,
    pub reply: String,
    pub used_fallback: bool,
    pub cached: bool,
    pub usage: Option<UsageSummary>,
}

/// Stock reply used when the completion call fails for this turn.
pub fn fallback_reply(persona: &Persona) -> String {
    persona
        .fallback_replies
        .first()
        .cloned()
        .unwrap_or_else(|| format!("（{}暂时没法回应，请稍后再试。）", persona.id))
}

/// Reject blank identifiers and messages before any state is touched.
pub fn require_text<'a>(field: &str, value: &'a str) -> Result<&'a str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(trimmed)
}

pub struct ChatManager {
    roster: Arc<Roster>,
    completion: Arc<dyn CompletionService>,
    cache: ResponseCache,
    rng: Mutex<StdRng>,
    default_max_tokens: u32,
}

impl ChatManager {
    pub fn new(
        roster: Arc<Roster>,
        completion: Arc<dyn CompletionService>,
        cache_ttl: Duration,
        default_max_tokens: u32,
    ) -> Self {
        Self::with_rng(
            roster,
            completion,
            cache_ttl,
            default_max_tokens,
            StdRng::from_entropy(),
        )
    }

    /// Same as `new` with an explicit random source for the reply normalizer.
    pub fn with_rng(
        roster: Arc<Roster>,
        completion: Arc<dyn CompletionService>,
        cache_ttl: Duration,
        default_max_tokens: u32,
        rng: StdRng,
    ) -> Self {
        Self {
            roster,
            completion,
            cache: ResponseCache::new(cache_ttl),
            rng: Mutex::new(rng),
            default_max_tokens,
        }
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub async fn process_character_message(
        &self,
        user_id: &str,
        persona_id: &str,
        message: &str,
        history: &[HistoryMessage],
    ) -> Result<CharacterReply, AppError> {
        let user_id = require_text("user id", user_id)?;
        let persona_id = require_text("persona id", persona_id)?;
        let message = require_text("message", message)?;
        let persona = self
            .roster
            .persona(persona_id)
            .ok_or_else(|| AppError::InvalidInput(format!("unknown persona: {}", persona_id)))?;

        let key = cache_key(&persona.id, history, message);
        if let Some(reply) = self.cache.get(&key) {
            log_info(
                "chat",
                format!("cache hit user={} persona={}", user_id, persona.id),
            );
            return Ok(CharacterReply {
                persona: persona.id.clone(),
                reply,
                used_fallback: false,
                cached: true,
                usage: None,
            });
        }

        let system_prompt = build_system_prompt(&self.roster, persona, None, message, history);
        let turns = build_chat_turns(history, &persona.id, message, false);
        let max_tokens = persona.max_reply_tokens.unwrap_or(self.default_max_tokens);

        match self.completion.complete(&system_prompt, &turns, max_tokens).await {
            Ok(completion) => {
                let reply = normalizer::enforce_with_rng(&completion.text, persona, &mut *self.rng());
                log_info(
                    "chat",
                    format!(
                        "user={} persona={} reply={}",
                        user_id,
                        persona.id,
                        truncate_for_log(&reply, 40)
                    ),
                );
                self.cache.insert(key, reply.clone());
                Ok(CharacterReply {
                    persona: persona.id.clone(),
                    reply,
                    used_fallback: false,
                    cached: false,
                    usage: completion.usage,
                })
            }
            Err(err) => {
                log_warn(
                    "chat",
                    format!(
                        "completion failed user={} persona={}: {}; using fallback",
                        user_id, persona.id, err
                    ),
                );
                Ok(CharacterReply {
                    persona: persona.id.clone(),
                    reply: fallback_reply(persona),
                    used_fallback: true,
                    cached: false,
                    usage: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock_service::ScriptedService;
    use super::storage::default_roster;
    use super::*;
    use crate::error::ServiceErrorKind;

    fn manager(service: Arc<ScriptedService>) -> ChatManager {
        ChatManager::new(default_roster(), service, Duration::from_secs(60), 512)
    }

    #[tokio::test]
    async fn test_reply_is_cached_on_success() {
        let service = Arc::new(ScriptedService::replying(&["  我在铺子里。  "]));
        let chat = manager(service.clone());

        let first = chat
            .process_character_message("u1", "吴邪", "你在哪", &[])
            .await
            .unwrap();
        assert_eq!(first.reply, "我在铺子里。");
        assert!(!first.cached);
        assert!(first.usage.is_some());

        let second = chat
            .process_character_message("u1", "吴邪", "你在哪", &[])
            .await
            .unwrap();
        assert!(second.cached);
        assert_eq!(second.reply, "我在铺子里。");
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_uses_fallback_and_is_not_cached() {
        let service = Arc::new(ScriptedService::failing(ServiceErrorKind::RateLimited));
        let chat = manager(service.clone());

        let reply = chat
            .process_character_message("u1", "王胖子", "吃了吗", &[])
            .await
            .unwrap();
        assert!(reply.used_fallback);
        assert_eq!(reply.reply, "胖爷我刚才走神了，你再说一遍？");
        assert!(chat.cache().is_empty());

        let retry = chat
            .process_character_message("u1", "王胖子", "吃了吗", &[])
            .await
            .unwrap();
        assert!(!retry.used_fallback);
        assert_eq!(service.calls(), 2);
    }

    #[tokio::test]
    async fn test_terse_persona_is_normalized_and_capped() {
        let service = Arc::new(ScriptedService::replying(&[
            "😀这是一个测试的超长句子完全超过限制长度看看会不会正确截断处理",
        ]));
        let chat = manager(service.clone());

        let reply = chat
            .process_character_message("u1", "张起灵", "你去哪", &[])
            .await
            .unwrap();
        assert!(reply.reply.chars().count() <= 21);
        assert!(!reply.reply.contains('😀'));
        assert_eq!(service.last_max_tokens(), 60);
    }

    #[tokio::test]
    async fn test_seeded_rng_makes_stock_phrase_reproducible() {
        let mut picked = Vec::new();
        for _ in 0..2 {
            let service = Arc::new(ScriptedService::replying(&["😀😀😀"]));
            let chat = ChatManager::with_rng(
                default_roster(),
                service,
                Duration::from_secs(60),
                512,
                StdRng::seed_from_u64(11),
            );
            let reply = chat
                .process_character_message("u1", "张起灵", "说话", &[])
                .await
                .unwrap();
            assert!(normalizer::TERSE_STOCK_PHRASES.contains(&reply.reply.as_str()));
            picked.push(reply.reply);
        }
        assert_eq!(picked[0], picked[1]);
    }

    #[tokio::test]
    async fn test_prompt_and_turns_are_built_for_the_persona() {
        let service = Arc::new(ScriptedService::replying(&["嗯"]));
        let chat = manager(service.clone());
        let history = vec![
            HistoryMessage::user("三叔呢"),
            HistoryMessage::persona("吴邪", "我也在找他"),
        ];

        chat.process_character_message("u1", "吴邪", "有线索吗", &history)
            .await
            .unwrap();

        let prompt = service.last_system_prompt().unwrap();
        assert!(prompt.contains("吴邪"));
        assert!(prompt.contains("有线索吗"));

        let turns = service.last_messages();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].role, "assistant");
        assert_eq!(turns[2].content, "有线索吗");
        assert_eq!(service.last_max_tokens(), 400);
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected() {
        let service = Arc::new(ScriptedService::replying(&[]));
        let chat = manager(service.clone());

        assert!(matches!(
            chat.process_character_message("u1", "吴邪", "   ", &[]).await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            chat.process_character_message("u1", "阿宁", "你好", &[]).await,
            Err(AppError::InvalidInput(_))
        ));
        assert_eq!(service.calls(), 0);
    }

    #[test]
    fn test_fallback_reply_without_configured_lines() {
        let mut persona = default_roster().persona("吴邪").unwrap().clone();
        persona.fallback_replies.clear();
        assert!(fallback_reply(&persona).contains("吴邪"));
    }
}
