use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::prompts::PROMPT_HISTORY_LINES;
use super::types::{HistoryMessage, Role};

#[derive(Debug, Clone)]
struct CacheEntry {
    reply: String,
    stored_at: Instant,
}

/// In-memory TTL cache for single-persona replies.
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

/// Digest of everything that shapes a single-persona reply: the persona, the
/// history window the prompt actually sees, and the new message.
pub fn cache_key(persona_id: &str, history: &[HistoryMessage], message: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(persona_id.as_bytes());
    hasher.update(&[0]);

    let start = history.len().saturating_sub(PROMPT_HISTORY_LINES);
    for entry in &history[start..] {
        let role = match entry.role {
            Role::User => "u",
            Role::Persona => "p",
        };
        hasher.update(role.as_bytes());
        hasher.update(entry.speaker_label.as_deref().unwrap_or_default().as_bytes());
        hasher.update(&[0]);
        hasher.update(entry.text.as_bytes());
        hasher.update(&[0]);
    }

    hasher.update(message.as_bytes());
    hasher.finalize().to_hex().to_string()
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fresh entry for `key`; a stale one is dropped on the way out.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() <= self.ttl => Some(entry.reply.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, reply: String) {
        if self.ttl.is_zero() {
            return;
        }
        self.lock().insert(
            key,
            CacheEntry {
                reply,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.stored_at.elapsed() <= ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
