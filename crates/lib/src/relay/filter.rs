//! Command prefix filter.

/// Prompt carried by a message that starts with `prefix`, trimmed. `None` when the prefix
/// does not match exactly (case-sensitive). An empty string means the command had no question.
pub fn strip_prefix<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.strip_prefix(prefix).map(str::trim)
}

/// Reply sent when the prefix is used without a question.
pub fn usage_hint(prefix: &str) -> String {
    format!(
        "Por favor, digite sua pergunta depois de `{}`. Ex: `{}qual a capital da França?`",
        prefix.trim(),
        prefix
    )
}
