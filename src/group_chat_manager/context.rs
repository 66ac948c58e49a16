use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Mutex as AsyncMutex;

use super::keywords::RosterKeywords;
use crate::chat_manager::types::Roster;
use crate::utils::log_debug;

/// Most recent speaker turns kept per conversation.
pub const SPEAKER_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey {
    pub user_id: String,
    pub group_id: String,
}

impl ContextKey {
    pub fn new(user_id: &str, group_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            group_id: group_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpeakerTurn {
    pub speaker: String,
    pub at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    pub current_speaker: Option<String>,
    pub topic: Option<String>,
    pub last_user_message: String,
    pub message_count: u64,
    pub speaker_history: VecDeque<SpeakerTurn>,
}

impl ConversationContext {
    fn record_turn(&mut self, speaker: &str, user_message: &str, topic: Option<&str>) {
        self.current_speaker = Some(speaker.to_string());
        self.last_user_message = user_message.to_string();
        self.message_count += 1;
        self.speaker_history.push_back(SpeakerTurn {
            speaker: speaker.to_string(),
            at: Utc::now(),
            message: user_message.to_string(),
        });
        while self.speaker_history.len() > SPEAKER_HISTORY_LIMIT {
            self.speaker_history.pop_front();
        }
        self.topic = topic.map(str::to_string);
    }
}

/// Per (user, group) conversation state.
///
/// Map locks are only held for synchronous reads and writes. Callers that run
/// a full turn take the key's turn gate first so that two turns for the same
/// key never interleave, while turns for other keys proceed independently.
pub struct ContextStore {
    roster: Arc<Roster>,
    entries: Mutex<HashMap<ContextKey, ConversationContext>>,
    gates: Mutex<HashMap<ContextKey, Arc<AsyncMutex<()>>>>,
}

fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ContextStore {
    pub fn new(roster: Arc<Roster>) -> Self {
        Self {
            roster,
            entries: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of the context, creating an empty one on first access.
    pub fn get(&self, user_id: &str, group_id: &str) -> ConversationContext {
        let mut entries = lock_recovering(&self.entries);
        entries
            .entry(ContextKey::new(user_id, group_id))
            .or_default()
            .clone()
    }

    /// Record one processed turn. Call exactly once per message, after the
    /// speaker is final.
    pub fn update(&self, user_id: &str, group_id: &str, speaker: &str, user_message: &str) {
        let topic = self.roster.topic_of(user_message);
        let mut entries = lock_recovering(&self.entries);
        let context = entries.entry(ContextKey::new(user_id, group_id)).or_default();
        context.record_turn(speaker, user_message, topic);

        log_debug(
            "context_store",
            format!(
                "user={} group={} speaker={} count={} topic={:?}",
                user_id, group_id, speaker, context.message_count, context.topic
            ),
        );
    }

    /// Drop the context; the next `get` starts from scratch. Returns whether
    /// anything was removed.
    pub fn reset(&self, user_id: &str, group_id: &str) -> bool {
        let mut entries = lock_recovering(&self.entries);
        entries.remove(&ContextKey::new(user_id, group_id)).is_some()
    }

    /// Drop every group context belonging to `user_id`, along with that
    /// user's idle turn gates.
    pub fn reset_user(&self, user_id: &str) -> usize {
        let removed = {
            let mut entries = lock_recovering(&self.entries);
            let before = entries.len();
            entries.retain(|key, _| key.user_id != user_id);
            before - entries.len()
        };
        lock_recovering(&self.gates)
            .retain(|key, gate| key.user_id != user_id || Arc::strong_count(gate) > 1);
        removed
    }

    /// Drop the gate of one key unless a turn still holds or waits on it.
    pub fn prune_gate(&self, user_id: &str, group_id: &str) -> bool {
        let mut gates = lock_recovering(&self.gates);
        let key = ContextKey::new(user_id, group_id);
        match gates.get(&key) {
            Some(gate) if Arc::strong_count(gate) == 1 => gates.remove(&key).is_some(),
            _ => false,
        }
    }

    pub fn gate_count(&self) -> usize {
        lock_recovering(&self.gates).len()
    }

    pub fn len(&self) -> usize {
        lock_recovering(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gate serialising turns for one key. Gates outlive `reset` so an
    /// in-flight turn and the next one still queue behind each other.
    pub fn turn_gate(&self, user_id: &str, group_id: &str) -> Arc<AsyncMutex<()>> {
        let mut gates = lock_recovering(&self.gates);
        gates
            .entry(ContextKey::new(user_id, group_id))
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_manager::storage::default_roster;

    fn store() -> ContextStore {
        ContextStore::new(default_roster())
    }

    #[test]
    fn test_get_creates_empty_context() {
        let store = store();
        assert!(store.is_empty());

        let context = store.get("u1", "铁三角");
        assert_eq!(context, ConversationContext::default());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_records_turn() {
        let store = store();
        store.update("u1", "铁三角", "王胖子", "胖子，晚上吃什么？");

        let context = store.get("u1", "铁三角");
        assert_eq!(context.current_speaker.as_deref(), Some("王胖子"));
        assert_eq!(context.message_count, 1);
        assert_eq!(context.last_user_message, "胖子，晚上吃什么？");
        assert_eq!(context.topic.as_deref(), Some("吃"));
        assert_eq!(context.speaker_history.len(), 1);
    }

    #[test]
    fn test_topic_is_recomputed_each_turn() {
        let store = store();
        store.update("u1", "铁三角", "王胖子", "去吃饭");
        store.update("u1", "铁三角", "王胖子", "好的");
        assert_eq!(store.get("u1", "铁三角").topic, None);
    }

    #[test]
    fn test_speaker_history_is_bounded_fifo() {
        let store = store();
        for i in 0..25 {
            store.update("u1", "铁三角", "吴邪", &format!("第{}句", i));
            let context = store.get("u1", "铁三角");
            assert!(context.speaker_history.len() <= SPEAKER_HISTORY_LIMIT);
        }

        let context = store.get("u1", "铁三角");
        assert_eq!(context.message_count, 25);
        assert_eq!(context.speaker_history.len(), SPEAKER_HISTORY_LIMIT);
        assert_eq!(context.speaker_history.front().unwrap().message, "第15句");
        assert_eq!(context.speaker_history.back().unwrap().message, "第24句");
    }

    #[test]
    fn test_reset_clears_context() {
        let store = store();
        store.update("u1", "铁三角", "吴邪", "天真");
        store.update("u1", "铁三角", "吴邪", "在吗");
        assert!(store.reset("u1", "铁三角"));
        assert!(!store.reset("u1", "铁三角"));

        let context = store.get("u1", "铁三角");
        assert_eq!(context.message_count, 0);
        assert!(context.speaker_history.is_empty());
        assert!(context.current_speaker.is_none());
    }

    #[test]
    fn test_contexts_are_isolated_per_user_and_group() {
        let store = store();
        store.update("u1", "铁三角", "吴邪", "a");
        store.update("u2", "铁三角", "王胖子", "b");
        store.update("u1", "别的组", "张起灵", "c");

        assert_eq!(store.get("u1", "铁三角").current_speaker.as_deref(), Some("吴邪"));
        assert_eq!(store.get("u2", "铁三角").current_speaker.as_deref(), Some("王胖子"));
        assert_eq!(store.reset_user("u1"), 2);
        assert_eq!(store.get("u2", "铁三角").message_count, 1);
    }

    #[test]
    fn test_turn_gate_is_shared_per_key() {
        let store = store();
        let a = store.turn_gate("u1", "铁三角");
        let b = store.turn_gate("u1", "铁三角");
        let c = store.turn_gate("u2", "铁三角");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        store.reset("u1", "铁三角");
        assert!(Arc::ptr_eq(&a, &store.turn_gate("u1", "铁三角")));
    }

    #[test]
    fn test_reset_user_prunes_idle_gates_only() {
        let store = store();
        let held = store.turn_gate("u1", "铁三角");
        let _ = store.turn_gate("u1", "另一组");
        let _ = store.turn_gate("u2", "铁三角");
        assert_eq!(store.gate_count(), 3);

        store.reset_user("u1");
        assert_eq!(store.gate_count(), 2);
        assert!(Arc::ptr_eq(&held, &store.turn_gate("u1", "铁三角")));

        assert!(!store.prune_gate("u1", "铁三角"));
        drop(held);
        assert!(store.prune_gate("u1", "铁三角"));
        assert!(store.prune_gate("u2", "铁三角"));
        assert_eq!(store.gate_count(), 0);
    }
}
