//! Conversation history and provider selection state

use crate::llm::{ChatMessage, Role};

/// What happens to history after an exchange that executed tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryPolicy {
    /// Drop everything but the system prompt
    #[default]
    ResetAfterToolTurn,
    /// Keep the user turn, the tool-requesting assistant turn, tool results and the answer
    Retain,
}

/// Which endpoint serves the next provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveProvider {
    #[default]
    Primary,
    Fallback,
}

impl std::fmt::Display for ActiveProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Ordered message history; always starts with exactly one system message
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationState {
    messages: Vec<ChatMessage>,
}

impl ConversationState {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(instructions)],
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn instructions(&self) -> &str {
        self.messages
            .first()
            .and_then(|m| m.content.as_deref())
            .unwrap_or_default()
    }

    /// Current history followed by a new user message
    pub fn with_user(&self, text: &str) -> Vec<ChatMessage> {
        let mut messages = self.messages.clone();
        messages.push(ChatMessage::user(text));
        messages
    }

    /// Append turns after the system message
    pub fn extend(&mut self, turns: impl IntoIterator<Item = ChatMessage>) {
        self.messages
            .extend(turns.into_iter().filter(|m| m.role != Role::System));
    }

    /// Drop everything but the system message
    pub fn reset_to_system_prompt(&mut self) {
        self.messages.truncate(1);
    }

}
