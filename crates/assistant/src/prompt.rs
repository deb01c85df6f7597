//! Classification prompt rendering.

use crate::session::Turn;

pub const CLASSIFY_TEMPLATE: &str = include_str!("prompts/classify.txt");

/// Shown in place of an empty history.
pub const NO_HISTORY: &str = "No previous conversation history.";

/// `role: text` per turn, oldest first.
pub fn format_history<'a>(history: impl IntoIterator<Item = &'a Turn>) -> String {
    let lines: Vec<String> = history
        .into_iter()
        .map(|turn| format!("{}: {}", turn.role, turn.text))
        .collect();
    if lines.is_empty() {
        NO_HISTORY.to_string()
    } else {
        lines.join("\n")
    }
}

/// Fill `{RAG_CONTEXT}`, `{HISTORY}` and `{USER_MESSAGE}` in one pass, so
/// placeholder text inside the substituted values is left alone.
pub fn render(template: &str, context: &str, history: &str, message: &str) -> String {
    let mut out = String::with_capacity(template.len() + context.len() + history.len() + message.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let (value, len) = [
            ("{RAG_CONTEXT}", context),
            ("{HISTORY}", history),
            ("{USER_MESSAGE}", message),
        ]
        .into_iter()
        .find(|(name, _)| tail.starts_with(name))
        .map_or(("{", 1), |(name, value)| (value, name.len()));
        out.push_str(value);
        rest = &tail[len..];
    }
    out.push_str(rest);
    out
}

/// The full classification prompt for `message`.
pub fn classification_prompt<'a>(
    context: &str,
    history: impl IntoIterator<Item = &'a Turn>,
    message: &str,
) -> String {
    render(CLASSIFY_TEMPLATE, context, &format_history(history), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TurnRole;

    #[test]
    fn empty_history_placeholder() {
        let prompt = classification_prompt("ctx", std::iter::empty(), "hello");
        assert!(prompt.contains(NO_HISTORY));
        assert!(prompt.contains("--- CURRENT USER MESSAGE ---\nhello"));
        assert!(prompt.contains("--- CONTEXTUAL INFORMATION (from Knowledge Base) ---\nctx"));
    }

    #[test]
    fn history_is_rendered_oldest_first() {
        let history = vec![
            Turn::new(TurnRole::User, "I need O+"),
            Turn::new(TurnRole::Model, "Which city?"),
        ];
        let prompt = classification_prompt("ctx", &history, "Pune");
        assert!(prompt.contains("user: I need O+\nmodel: Which city?"));
    }

    #[test]
    fn placeholders_in_values_are_not_expanded() {
        let out = render("[{HISTORY}] [{USER_MESSAGE}]", "c", "said {USER_MESSAGE}", "m");
        assert_eq!(out, "[said {USER_MESSAGE}] [m]");
    }

    #[test]
    fn unknown_braces_pass_through() {
        assert_eq!(render("a {b} {RAG_CONTEXT}", "x", "", ""), "a {b} x");
    }

    #[test]
    fn template_has_every_placeholder() {
        for name in ["{RAG_CONTEXT}", "{HISTORY}", "{USER_MESSAGE}"] {
            assert_eq!(CLASSIFY_TEMPLATE.matches(name).count(), 1, "{name}");
        }
    }
}
