use super::types::{GroupDefinition, HistoryMessage, Persona, Role, Roster};

/// History entries rendered into the system prompt.
pub const PROMPT_HISTORY_LINES: usize = 6;
pub const EMPTY_HISTORY_LINE: &str = "（对话刚刚开始。）";
pub const USER_LABEL: &str = "用户";
const UNKNOWN_SPEAKER_LABEL: &str = "角色";

const GENERIC_TEMPLATE: &str = "你正在扮演{{char.name}}。{{char.desc}}

{{rules}}

{{scene}}

{{group_members}}

最近的对话：
{{history}}

对方刚刚说：{{user_message}}

请以{{char}}的身份直接回复，不要在开头加名字。";

pub fn default_character_rules() -> Vec<String> {
    vec![
        "始终以角色身份说话，不要跳出角色".to_string(),
        "根据角色的性格、经历和当前处境作出反应".to_string(),
        "不要替用户或其他角色说话".to_string(),
        "不要提及自己是AI或语言模型".to_string(),
    ]
}

fn format_rules() -> String {
    let mut rules = String::from("角色规则：\n");
    for rule in default_character_rules() {
        rules.push_str(&format!("- {}\n", rule));
    }
    rules.trim_end().to_string()
}

fn speaker_label(message: &HistoryMessage) -> &str {
    match message.role {
        Role::User => USER_LABEL,
        Role::Persona => message
            .speaker_label
            .as_deref()
            .unwrap_or(UNKNOWN_SPEAKER_LABEL),
    }
}

/// Last `PROMPT_HISTORY_LINES` entries as `label: text` lines.
pub fn format_history(history: &[HistoryMessage]) -> String {
    if history.is_empty() {
        return EMPTY_HISTORY_LINE.to_string();
    }

    let start = history.len().saturating_sub(PROMPT_HISTORY_LINES);
    history[start..]
        .iter()
        .map(|msg| format!("{}: {}", speaker_label(msg), msg.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Template precedence: group member override, persona template, generic.
fn template_for<'a>(persona: &'a Persona, group: Option<&'a GroupDefinition>) -> &'a str {
    group
        .and_then(|g| g.member(&persona.id))
        .and_then(|m| m.prompt_template.as_deref())
        .or(persona.prompt_template.as_deref())
        .unwrap_or(GENERIC_TEMPLATE)
}

fn format_group_members(roster: &Roster, persona: &Persona, group: &GroupDefinition) -> String {
    let mut lines = String::new();
    for member_id in group.member_ids().filter(|id| *id != persona.id) {
        match roster.persona(member_id) {
            Some(other) if !other.description.is_empty() => {
                lines.push_str(&format!("- {}：{}\n", other.id, other.description));
            }
            _ => lines.push_str(&format!("- {}\n", member_id)),
        }
    }

    if lines.is_empty() {
        String::new()
    } else {
        format!("同场的其他角色：\n{}", lines)
    }
}

/// Runs of three or more newlines become one blank line.
fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0;
    for c in text.chars() {
        if c == '\n' {
            newlines += 1;
            if newlines > 2 {
                continue;
            }
        } else {
            newlines = 0;
        }
        out.push(c);
    }
    out
}

fn flush_template_text(out: &mut String, pending: &mut String) {
    let collapsed = collapse_blank_lines(pending);
    if out.is_empty() {
        out.push_str(collapsed.trim_start());
    } else {
        out.push_str(&collapsed);
    }
    pending.clear();
}

/// Single left-to-right pass over `template`. Values from `fixed` are treated
/// as template text (blank-line runs collapsed); values from `verbatim` are
/// copied exactly. No inserted value is scanned for placeholders again.
/// Unknown placeholders are left as written.
fn render_template(template: &str, fixed: &[(&str, &str)], verbatim: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut pending = String::new();
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            break;
        };
        let name = &after[..close];
        pending.push_str(&rest[..open]);

        if let Some((_, value)) = fixed.iter().find(|(key, _)| *key == name) {
            pending.push_str(value);
        } else if let Some((_, value)) = verbatim.iter().find(|(key, _)| *key == name) {
            flush_template_text(&mut out, &mut pending);
            out.push_str(value);
        } else {
            pending.push_str(&rest[open..open + close + 4]);
        }
        rest = &after[close + 2..];
    }

    pending.push_str(rest);
    let tail = collapse_blank_lines(&pending);
    if out.is_empty() {
        out.push_str(tail.trim());
    } else {
        out.push_str(tail.trim_end());
    }
    out
}

/// Build the system prompt for `persona` answering `message`.
pub fn build_system_prompt(
    roster: &Roster,
    persona: &Persona,
    group: Option<&GroupDefinition>,
    message: &str,
    history: &[HistoryMessage],
) -> String {
    let scene = group
        .and_then(|g| g.scene.as_deref())
        .map(|s| format!("场景：{}", s.trim()))
        .unwrap_or_default();
    let group_members = group
        .map(|g| format_group_members(roster, persona, g))
        .unwrap_or_default();
    let rules = format_rules();
    let history = format_history(history);

    render_template(
        template_for(persona, group),
        &[
            ("char.name", persona.id.as_str()),
            ("char.desc", persona.description.trim()),
            ("rules", rules.as_str()),
            ("scene", scene.as_str()),
            ("group_members", group_members.trim_end()),
            ("char", persona.id.as_str()),
        ],
        &[("history", history.as_str()), ("user_message", message)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_manager::storage::{default_roster, DEFAULT_GROUP_ID};

    #[test]
    fn test_empty_history_uses_starting_sentence() {
        assert_eq!(format_history(&[]), EMPTY_HISTORY_LINE);
    }

    #[test]
    fn test_history_keeps_last_six_entries() {
        let history: Vec<HistoryMessage> = (0..9)
            .map(|i| {
                if i % 2 == 0 {
                    HistoryMessage::user(&format!("问{}", i))
                } else {
                    HistoryMessage::persona("吴邪", &format!("答{}", i))
                }
            })
            .collect();

        let rendered = format_history(&history);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), PROMPT_HISTORY_LINES);
        assert_eq!(lines[0], "吴邪: 答3");
        assert_eq!(lines[5], "用户: 问8");
    }

    #[test]
    fn test_generic_template_for_group_member() {
        let roster = default_roster();
        let group = roster.group(DEFAULT_GROUP_ID).unwrap();
        let persona = roster.persona("王胖子").unwrap();

        let prompt = build_system_prompt(&roster, persona, Some(group), "今晚吃什么", &[]);
        assert!(prompt.starts_with("你正在扮演王胖子。"));
        assert!(prompt.contains("场景：杭州吴山居"));
        assert!(prompt.contains("- 吴邪："));
        assert!(prompt.contains("- 张起灵："));
        assert!(!prompt.contains("- 王胖子："));
        assert!(prompt.contains(EMPTY_HISTORY_LINE));
        assert!(prompt.contains("对方刚刚说：今晚吃什么"));
        assert!(!prompt.contains("{{"));
        assert!(!prompt.contains("\n\n\n"));
    }

    #[test]
    fn test_specialised_template_is_preferred() {
        let roster = default_roster();
        let persona = roster.persona("张起灵").unwrap();
        let history = vec![HistoryMessage::persona("吴邪", "小哥，你去哪？")];

        let prompt = build_system_prompt(&roster, persona, None, "回答我", &history);
        assert!(prompt.starts_with("你是张起灵。"));
        assert!(prompt.contains("每次回复不超过二十个字"));
        assert!(prompt.contains("吴邪: 小哥，你去哪？"));
        assert!(prompt.contains("对方刚刚说：回答我"));
    }

    #[test]
    fn test_user_message_is_inserted_literally() {
        let roster = default_roster();
        let persona = roster.persona("吴邪").unwrap();
        let prompt = build_system_prompt(&roster, persona, None, "{{char}} 是谁", &[]);
        assert!(prompt.contains("对方刚刚说：{{char}} 是谁"));
    }

    #[test]
    fn test_history_and_message_are_inserted_verbatim() {
        let roster = default_roster();
        let persona = roster.persona("吴邪").unwrap();
        let history = vec![HistoryMessage::user("{{char}} 和 {{user_message}}")];

        let prompt = build_system_prompt(&roster, persona, None, "第一行\n\n\n\n第二行", &history);
        assert!(prompt.contains("用户: {{char}} 和 {{user_message}}"));
        assert!(prompt.contains("对方刚刚说：第一行\n\n\n\n第二行"));
        assert!(prompt.starts_with("你正在扮演吴邪。"));
    }

    #[test]
    fn test_render_template_collapses_only_template_text() {
        let rendered = render_template(
            "\n{{a}}\n\n\n{{b}}\n\n\n\n{{c}}\n{{unknown}}\n\n",
            &[("a", "A"), ("b", "")],
            &[("c", "x\n\n\ny")],
        );
        assert_eq!(rendered, "A\n\nx\n\n\ny\n{{unknown}}");
    }
}
