//! Speaker Selection for Group Chats
//!
//! This module handles:
//! - Alias mentions that force a specific group member to answer
//! - Scoring every member on recency, topical keywords and narrative bias
//! - A weighted lottery over the scores, with a least-recent fallback

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::keywords::mentioned_personas;
use crate::chat_manager::types::{GroupDefinition, HistoryMessage, Roster};
use crate::error::AppError;

/// History entries inspected for recency and repetition.
pub const RECENCY_WINDOW: usize = 8;
/// Appearances beyond this no longer lower the base score.
pub const RECENCY_CAP: usize = 10;
pub const RECENCY_WEIGHT: f64 = 3.0;
pub const REPEAT_PENALTY: f64 = 5.0;
pub const MIN_SCORE: f64 = 1.0;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionReason {
    Mentioned,
    Continued,
    Scored,
}

impl SelectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mentioned => "mentioned",
            Self::Continued => "continued",
            Self::Scored => "scored",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    pub persona_id: String,
    pub score: f64,
    pub recency: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResult {
    pub persona_id: String,
    pub reason: SelectionReason,
    /// Empty when a mention short-circuited scoring.
    pub scores: Vec<ScoredCandidate>,
}

// ============================================================================
// Mentions
// ============================================================================

/// First mentioned persona (in mention-detection order) that belongs to the group.
pub fn first_mentioned_member(
    message: &str,
    roster: &Roster,
    group: &GroupDefinition,
) -> Option<String> {
    mentioned_personas(message, &roster.personas)
        .into_iter()
        .find(|persona_id| group.has_member(persona_id))
        .map(str::to_string)
}

// ============================================================================
// Scoring
// ============================================================================

fn recent_window(history: &[HistoryMessage]) -> &[HistoryMessage] {
    let start = history.len().saturating_sub(RECENCY_WINDOW);
    &history[start..]
}

/// Persona-authored appearances of `persona_id` in the recency window.
pub fn recency_count(history: &[HistoryMessage], persona_id: &str) -> usize {
    recent_window(history)
        .iter()
        .filter(|msg| msg.persona_speaker() == Some(persona_id))
        .count()
}

/// Speaker of the literal last entry, if a persona wrote it.
pub fn most_recent_speaker(history: &[HistoryMessage]) -> Option<&str> {
    recent_window(history)
        .last()
        .and_then(|msg| msg.persona_speaker())
}

/// Score every member in group-definition order.
pub fn score_members(
    roster: &Roster,
    group: &GroupDefinition,
    message: &str,
    history: &[HistoryMessage],
) -> Vec<ScoredCandidate> {
    let message_lower = message.to_lowercase();
    let last_speaker = most_recent_speaker(history);

    group
        .member_ids()
        .map(|persona_id| {
            let recency = recency_count(history, persona_id);
            let mut score = (RECENCY_CAP - recency.min(RECENCY_CAP)) as f64 * RECENCY_WEIGHT;

            if let Some(persona) = roster.persona(persona_id) {
                for keyword in &persona.score_keywords {
                    if !keyword.keyword.is_empty() && message_lower.contains(keyword.keyword.as_str()) {
                        score += keyword.weight as f64;
                    }
                }
                score += persona.selection_bias as f64;
            }

            if last_speaker == Some(persona_id) {
                score -= REPEAT_PENALTY;
            }

            ScoredCandidate {
                persona_id: persona_id.to_string(),
                score: score.max(MIN_SCORE),
                recency,
            }
        })
        .collect()
}

/// Cumulative-subtraction lottery. `None` only when the draw falls off the end
/// through floating point error or the weights are unusable.
pub fn weighted_pick<R: Rng>(candidates: &[ScoredCandidate], rng: &mut R) -> Option<usize> {
    let total: f64 = candidates.iter().map(|c| c.score).sum();
    if !(total.is_finite() && total > 0.0) {
        return None;
    }

    let mut remaining = rng.gen_range(0.0..total);
    for (idx, candidate) in candidates.iter().enumerate() {
        remaining -= candidate.score;
        if remaining <= 0.0 {
            return Some(idx);
        }
    }

    None
}

/// Least-recent member; ties go to the earlier member.
pub fn fallback_pick(candidates: &[ScoredCandidate]) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(idx, c)| (c.recency, *idx))
        .map(|(idx, _)| idx)
}

/// Pick the next speaker for `message`. Mentions win outright; otherwise the
/// members are scored and drawn by weight.
pub fn select_speaker<R: Rng>(
    roster: &Roster,
    group: &GroupDefinition,
    message: &str,
    history: &[HistoryMessage],
    rng: &mut R,
) -> Result<SelectionResult, AppError> {
    if group.members.is_empty() {
        return Err(AppError::SelectionExhausted(format!(
            "group {} has no members",
            group.id
        )));
    }

    if let Some(persona_id) = first_mentioned_member(message, roster, group) {
        return Ok(SelectionResult {
            persona_id,
            reason: SelectionReason::Mentioned,
            scores: Vec::new(),
        });
    }

    let scores = score_members(roster, group, message, history);
    let picked = weighted_pick(&scores, rng)
        .or_else(|| fallback_pick(&scores))
        .ok_or_else(|| AppError::SelectionExhausted(format!("no candidate in group {}", group.id)))?;

    Ok(SelectionResult {
        persona_id: scores[picked].persona_id.clone(),
        reason: SelectionReason::Scored,
        scores,
    })
}

// ============================================================================
// Tests
// ============================================================================
