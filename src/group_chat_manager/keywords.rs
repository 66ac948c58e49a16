//! Literal keyword matching over the static roster tables.
//!
//! Matching is plain substring search and is case-sensitive; the order of the
//! topic list and of the persona list decides which match wins.

use crate::chat_manager::types::{Persona, Roster};

/// First topic in list order that occurs anywhere in `text`.
pub fn extract_topic<'a>(text: &str, topics: &'a [String]) -> Option<&'a str> {
    topics
        .iter()
        .find(|topic| !topic.is_empty() && text.contains(topic.as_str()))
        .map(|topic| topic.as_str())
}

/// Personas referenced by any of their aliases, in roster order, without duplicates.
pub fn mentioned_personas<'a>(text: &str, personas: &'a [Persona]) -> Vec<&'a str> {
    personas
        .iter()
        .filter(|persona| {
            persona
                .aliases
                .iter()
                .any(|alias| !alias.is_empty() && text.contains(alias.as_str()))
        })
        .map(|persona| persona.id.as_str())
        .collect()
}

/// Whether `text` contains any continuation phrase.
pub fn has_continuation_phrase(text: &str, phrases: &[String]) -> bool {
    phrases
        .iter()
        .any(|phrase| !phrase.is_empty() && text.contains(phrase.as_str()))
}

/// Convenience wrappers bound to a roster.
pub trait RosterKeywords {
    fn topic_of(&self, text: &str) -> Option<&str>;
    fn mentions_in(&self, text: &str) -> Vec<&str>;
}

impl RosterKeywords for Roster {
    fn topic_of(&self, text: &str) -> Option<&str> {
        extract_topic(text, &self.topics)
    }

    fn mentions_in(&self, text: &str) -> Vec<&str> {
        mentioned_personas(text, &self.personas)
    }
}
