use super::prompts::{PROMPT_HISTORY_LINES, USER_LABEL};
use super::types::{ChatTurn, HistoryMessage, Role};

/// Convert caller history into the ordered message list sent with the system
/// prompt, ending with the new user message.
///
/// The speaking persona's own lines become `assistant` turns. Lines from other
/// personas are replayed as `user` observations, prefixed with the speaker when
/// `include_speaker_prefix` is set (group chats).
pub fn build_chat_turns(
    history: &[HistoryMessage],
    speaker_id: &str,
    user_message: &str,
    include_speaker_prefix: bool,
) -> Vec<ChatTurn> {
    let start = history.len().saturating_sub(PROMPT_HISTORY_LINES);
    let mut turns = Vec::with_capacity(history.len() - start + 1);

    for msg in &history[start..] {
        match msg.role {
            Role::User => {
                let content = if include_speaker_prefix {
                    format!("[{}]: {}", USER_LABEL, msg.text)
                } else {
                    msg.text.clone()
                };
                turns.push(ChatTurn::new("user", content));
            }
            Role::Persona => {
                let speaker = msg.speaker_label.as_deref().unwrap_or_default();
                if speaker == speaker_id {
                    turns.push(ChatTurn::new("assistant", msg.text.clone()));
                } else if include_speaker_prefix {
                    turns.push(ChatTurn::new("user", format!("[{}]: {}", speaker, msg.text)));
                } else {
                    turns.push(ChatTurn::new("user", msg.text.clone()));
                }
            }
        }
    }

    let content = if include_speaker_prefix {
        format!("[{}]: {}", USER_LABEL, user_message)
    } else {
        user_message.to_string()
    };
    turns.push(ChatTurn::new("user", content));

    turns
}
