pub const SERVICE: &str = "roleplay-chat";

pub fn log_info(scope: &str, message: impl AsRef<str>) {
    tracing::info!(scope = scope, "{}", message.as_ref());
}

pub fn log_warn(scope: &str, message: impl AsRef<str>) {
    tracing::warn!(scope = scope, "{}", message.as_ref());
}

pub fn log_error(scope: &str, message: impl AsRef<str>) {
    tracing::error!(scope = scope, "{}", message.as_ref());
}

pub fn log_debug(scope: &str, message: impl AsRef<str>) {
    tracing::debug!(scope = scope, "{}", message.as_ref());
}

/// Char-boundary safe truncation for log lines.
pub fn truncate_for_log(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max).collect();
        format!("{}…", truncated)
    }
}
