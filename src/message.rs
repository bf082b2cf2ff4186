use serde::{Deserialize, Serialize};

use crate::config::RecapConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Ordered conversation turns for one query. Append-only: entries are never
/// edited or removed once pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHistory {
    messages: Vec<Message>,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(prompt: impl Into<String>) -> Self {
        let mut history = Self::new();
        history.push(Role::System, prompt);
        history
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message::new(role, content));
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Role::User, content);
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(Role::Assistant, content);
    }

    /// Append assembled context as a labelled user message. Empty context is
    /// not appended.
    pub fn push_context(&mut self, label: &str, context: &str) {
        if context.trim().is_empty() {
            return;
        }
        self.push_user(format!("{label}:\n{context}"));
    }

    /// History for a reading recap: system prompt (plus optional language
    /// instruction), the recap request, then the book text read so far.
    pub fn recap(
        recap: &RecapConfig,
        title: &str,
        book_text: &str,
        language_instruction: Option<&str>,
    ) -> Self {
        let system = match language_instruction {
            Some(instruction) => format!("{}\n{instruction}", recap.system_prompt()),
            None => recap.system_prompt().to_string(),
        };
        let mut history = Self::with_system(system);
        history.push_user(recap.user_prompt(title));
        history.push_context("Book text", book_text);
        history
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::new(Role::Assistant, "hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn empty_context_is_not_appended() {
        let mut history = MessageHistory::with_system("sys");
        history.push_context("Highlights", "   ");
        assert_eq!(history.len(), 1);
        history.push_context("Highlights", "Highlight: a");
        assert_eq!(history.as_slice()[1].content, "Highlights:\nHighlight: a");
    }

    #[test]
    fn recap_history_order() {
        let history = MessageHistory::recap(
            &RecapConfig::default(),
            "Dune",
            "Paul met the Reverend Mother.",
            Some("Always respond in German."),
        );
        let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::User]);
        assert!(history.as_slice()[0].content.ends_with("Always respond in German."));
        assert!(history.as_slice()[2].content.contains("Reverend Mother"));
    }
}
