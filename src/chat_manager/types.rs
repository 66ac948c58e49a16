use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::AppError;

/// Default bonus applied per matched topical keyword when a weight is omitted.
pub const DEFAULT_KEYWORD_WEIGHT: i32 = 8;

fn default_keyword_weight() -> i32 {
    DEFAULT_KEYWORD_WEIGHT
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeightedKeyword {
    pub keyword: String,
    #[serde(default = "default_keyword_weight")]
    pub weight: i32,
}

impl WeightedKeyword {
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            weight: DEFAULT_KEYWORD_WEIGHT,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    pub id: String,
    pub description: String,
    /// Specialised system prompt template; the generic template is used when absent.
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub max_reply_tokens: Option<u32>,
    /// Mention aliases, matched case-sensitively as substrings.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Topical vocabulary for speaker scoring, matched against the lower-cased message.
    #[serde(default)]
    pub score_keywords: Vec<WeightedKeyword>,
    /// Fixed score adjustment encoding narrative quirks.
    #[serde(default)]
    pub selection_bias: i32,
    /// Terse personas get their replies clamped by the normalizer.
    #[serde(default)]
    pub terse: bool,
    #[serde(default)]
    pub fallback_replies: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub persona_id: String,
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub max_reply_tokens: Option<u32>,
}

impl GroupMember {
    pub fn new(persona_id: &str) -> Self {
        Self {
            persona_id: persona_id.to_string(),
            prompt_template: None,
            max_reply_tokens: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GroupDefinition {
    pub id: String,
    #[serde(default)]
    pub scene: Option<String>,
    pub members: Vec<GroupMember>,
}

impl GroupDefinition {
    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.persona_id.as_str())
    }

    pub fn has_member(&self, persona_id: &str) -> bool {
        self.members.iter().any(|m| m.persona_id == persona_id)
    }

    pub fn member(&self, persona_id: &str) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.persona_id == persona_id)
    }
}

/// Static persona, group and keyword tables. Immutable after load; ordering of
/// `personas` and `topics` is part of the matching contract (first match wins).
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Roster {
    pub personas: Vec<Persona>,
    #[serde(default)]
    pub groups: Vec<GroupDefinition>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub continuation_phrases: Vec<String>,
}

impl Roster {
    pub fn persona(&self, persona_id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == persona_id)
    }

    pub fn group(&self, group_id: &str) -> Option<&GroupDefinition> {
        self.groups.iter().find(|g| g.id == group_id)
    }

    /// Score keywords are compared against the lower-cased message, so store
    /// them lower-cased too.
    pub fn normalize_keywords(&mut self) {
        for persona in &mut self.personas {
            for keyword in &mut persona.score_keywords {
                keyword.keyword = keyword.keyword.to_lowercase();
            }
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.personas.is_empty() {
            return Err(AppError::Config("roster has no personas".to_string()));
        }

        let mut seen = HashSet::new();
        for persona in &self.personas {
            if persona.id.trim().is_empty() {
                return Err(AppError::Config("persona with empty id".to_string()));
            }
            if !seen.insert(persona.id.as_str()) {
                return Err(AppError::Config(format!("duplicate persona id {}", persona.id)));
            }
        }

        let mut seen_groups = HashSet::new();
        for group in &self.groups {
            if !seen_groups.insert(group.id.as_str()) {
                return Err(AppError::Config(format!("duplicate group id {}", group.id)));
            }
            if group.members.is_empty() {
                return Err(AppError::Config(format!("group {} has no members", group.id)));
            }
            let mut members = HashSet::new();
            for member in &group.members {
                if self.persona(&member.persona_id).is_none() {
                    return Err(AppError::Config(format!(
                        "group {} references unknown persona {}",
                        group.id, member.persona_id
                    )));
                }
                if !members.insert(member.persona_id.as_str()) {
                    return Err(AppError::Config(format!(
                        "group {} lists {} twice",
                        group.id, member.persona_id
                    )));
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Persona,
}

/// One entry of caller-supplied conversation history.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    pub role: Role,
    #[serde(default)]
    pub speaker_label: Option<String>,
    pub text: String,
}

impl HistoryMessage {
    pub fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            speaker_label: None,
            text: text.to_string(),
        }
    }

    pub fn persona(speaker: &str, text: &str) -> Self {
        Self {
            role: Role::Persona,
            speaker_label: Some(speaker.to_string()),
            text: text.to_string(),
        }
    }

    /// Speaker of a persona-authored entry; `None` for user turns.
    pub fn persona_speaker(&self) -> Option<&str> {
        match self.role {
            Role::Persona => self.speaker_label.as_deref(),
            Role::User => None,
        }
    }
}

/// Message shape sent to the completion service.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Option<UsageSummary>,
}
