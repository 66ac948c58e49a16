//! Keep-or-switch decision for the active group speaker.

use std::sync::Arc;

use super::context::{ContextStore, ConversationContext};
use super::keywords::{has_continuation_phrase, RosterKeywords};
use crate::chat_manager::types::Roster;

/// Turns that must have been processed before the active speaker may carry on.
pub const MIN_TURNS_FOR_CONTINUITY: u64 = 2;
/// Messages up to this many characters read as interjections.
pub const SHORT_MESSAGE_CHARS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuityVerdict {
    TooEarly,
    Mentioned,
    SameTopic,
    ShortMessage,
    ContinuationPhrase,
    OpenQuestion,
    NoSignal,
}

impl ContinuityVerdict {
    pub fn continues(&self) -> bool {
        matches!(
            self,
            Self::SameTopic | Self::ShortMessage | Self::ContinuationPhrase | Self::OpenQuestion
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TooEarly => "too_early",
            Self::Mentioned => "mentioned",
            Self::SameTopic => "same_topic",
            Self::ShortMessage => "short_message",
            Self::ContinuationPhrase => "continuation_phrase",
            Self::OpenQuestion => "open_question",
            Self::NoSignal => "no_signal",
        }
    }
}

fn ends_with_question(text: &str) -> bool {
    let trimmed = text.trim_end();
    trimmed.ends_with('?') || trimmed.ends_with('？')
}

/// Rules in priority order: too few turns, explicit mention, same topic, then
/// the weak interjection signals.
pub fn evaluate(context: &ConversationContext, message: &str, roster: &Roster) -> ContinuityVerdict {
    if context.message_count < MIN_TURNS_FOR_CONTINUITY {
        return ContinuityVerdict::TooEarly;
    }

    // A mention forces reselection even when it names the current speaker.
    if !roster.mentions_in(message).is_empty() {
        return ContinuityVerdict::Mentioned;
    }

    if let Some(topic) = roster.topic_of(message) {
        if context.topic.as_deref() == Some(topic) {
            return ContinuityVerdict::SameTopic;
        }
    }

    if message.chars().count() <= SHORT_MESSAGE_CHARS {
        return ContinuityVerdict::ShortMessage;
    }
    if has_continuation_phrase(message, &roster.continuation_phrases) {
        return ContinuityVerdict::ContinuationPhrase;
    }
    if ends_with_question(&context.last_user_message) {
        return ContinuityVerdict::OpenQuestion;
    }

    ContinuityVerdict::NoSignal
}

/// Continuity checks bound to a context store.
pub struct ContinuityEngine {
    roster: Arc<Roster>,
    store: Arc<ContextStore>,
}

impl ContinuityEngine {
    pub fn new(roster: Arc<Roster>, store: Arc<ContextStore>) -> Self {
        Self { roster, store }
    }

    pub fn verdict(&self, user_id: &str, group_id: &str, message: &str) -> ContinuityVerdict {
        let context = self.store.get(user_id, group_id);
        evaluate(&context, message, &self.roster)
    }

    pub fn should_continue(&self, user_id: &str, group_id: &str, message: &str) -> bool {
        self.verdict(user_id, group_id, message).continues()
    }

    /// Current speaker, unchanged. Only meaningful after `should_continue` said yes.
    pub fn continuation_speaker(&self, user_id: &str, group_id: &str) -> Option<String> {
        self.store.get(user_id, group_id).current_speaker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_manager::storage::{default_roster, DEFAULT_GROUP_ID};

    fn context(count: u64, topic: Option<&str>, last: &str) -> ConversationContext {
        ConversationContext {
            current_speaker: Some("张起灵".to_string()),
            topic: topic.map(str::to_string),
            last_user_message: last.to_string(),
            message_count: count,
            speaker_history: Default::default(),
        }
    }

    #[test]
    fn test_too_early_always_reselects() {
        let roster = default_roster();
        for count in 0..MIN_TURNS_FOR_CONTINUITY {
            for message in ["然后呢", "嗯", "青铜门后面有什么", "小哥？"] {
                let verdict = evaluate(&context(count, Some("青铜门"), "在吗？"), message, &roster);
                assert_eq!(verdict, ContinuityVerdict::TooEarly);
                assert!(!verdict.continues());
            }
        }
    }

    #[test]
    fn test_mention_of_current_speaker_still_reselects() {
        let roster = default_roster();
        let verdict = evaluate(&context(5, None, ""), "小哥", &roster);
        assert_eq!(verdict, ContinuityVerdict::Mentioned);
        assert!(!verdict.continues());
    }

    #[test]
    fn test_same_topic_continues() {
        let roster = default_roster();
        let verdict = evaluate(&context(3, Some("青铜门"), ""), "青铜门后面到底藏着什么东西", &roster);
        assert_eq!(verdict, ContinuityVerdict::SameTopic);
    }

    #[test]
    fn test_different_topic_without_other_signal_switches() {
        let roster = default_roster();
        let verdict = evaluate(&context(3, Some("青铜门"), "好吧"), "说说你们在长白山遇到的事情吧", &roster);
        assert_eq!(verdict, ContinuityVerdict::NoSignal);
        assert!(!verdict.continues());
    }

    #[test]
    fn test_short_message_continues() {
        let roster = default_roster();
        let verdict = evaluate(&context(3, None, ""), "好吧好吧", &roster);
        assert_eq!(verdict, ContinuityVerdict::ShortMessage);
    }

    #[test]
    fn test_continuation_phrase_continues() {
        let roster = default_roster();
        let verdict = evaluate(&context(3, None, ""), "那后来呢，你们怎么出来的", &roster);
        assert_eq!(verdict, ContinuityVerdict::ContinuationPhrase);
    }

    #[test]
    fn test_open_question_continues() {
        let roster = default_roster();
        for last in ["你当时在想什么?", "你当时在想什么？ "] {
            let verdict = evaluate(&context(3, None, last), "我觉得这件事不太简单", &roster);
            assert_eq!(verdict, ContinuityVerdict::OpenQuestion);
        }
    }

    #[test]
    fn test_engine_reads_store() {
        let roster = default_roster();
        let store = Arc::new(ContextStore::new(roster.clone()));
        let engine = ContinuityEngine::new(roster, store.clone());

        assert!(!engine.should_continue("u", DEFAULT_GROUP_ID, "然后呢"));
        store.update("u", DEFAULT_GROUP_ID, "张起灵", "小哥在吗");
        store.update("u", DEFAULT_GROUP_ID, "张起灵", "你去哪了");
        assert!(engine.should_continue("u", DEFAULT_GROUP_ID, "然后呢"));
        assert_eq!(
            engine.continuation_speaker("u", DEFAULT_GROUP_ID).as_deref(),
            Some("张起灵")
        );
    }
}
