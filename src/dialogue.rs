//! Conversation history for a device session
//!
//! The dialogue is an ordered, append-only sequence of messages. Insertion
//! order is conversation order; messages are never reordered or mutated
//! after append.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a dialogue message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt
    System,
    /// End-user utterance
    User,
    /// Assistant reply
    Assistant,
    /// Tool invocation result
    Tool,
}

impl Role {
    /// Wire name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A single dialogue message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,
    /// Message content
    pub content: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message stamped with the current time
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Append-only conversation history
#[derive(Debug, Default)]
pub struct Dialogue {
    messages: Vec<Message>,
}

impl Dialogue {
    /// Create an empty dialogue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dialogue seeded with a system prompt
    #[must_use]
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::new(Role::System, prompt)],
        }
    }

    /// Append a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append a message built from role and content
    pub fn put(&mut self, role: Role, content: impl Into<String>) {
        self.push(Message::new(role, content));
    }

    /// Append text to the system prompt, creating one if absent
    ///
    /// Used for static device-integration prompt augmentation at handler
    /// initialization.
    pub fn augment_system(&mut self, text: &str) {
        match self.messages.iter_mut().find(|m| m.role == Role::System) {
            Some(system) => {
                system.content.push_str("\n\n");
                system.content.push_str(text);
            }
            None => self.messages.insert(0, Message::new(Role::System, text)),
        }
    }

    /// Messages in conversation order
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Clone the history for handing to the language model
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_preserves_order() {
        let mut dialogue = Dialogue::new();
        dialogue.put(Role::User, "hello");
        dialogue.put(Role::Tool, "result");
        dialogue.put(Role::Assistant, "hi there");

        let roles: Vec<Role> = dialogue.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Tool, Role::Assistant]);
    }

    #[test]
    fn test_augment_system_appends() {
        let mut dialogue = Dialogue::with_system_prompt("You are Lark.");
        dialogue.augment_system("Connected devices: kettle");

        assert_eq!(dialogue.len(), 1);
        let system = &dialogue.messages()[0];
        assert!(system.content.starts_with("You are Lark."));
        assert!(system.content.contains("Connected devices: kettle"));
    }

    #[test]
    fn test_augment_system_creates_when_missing() {
        let mut dialogue = Dialogue::new();
        dialogue.put(Role::User, "hello");
        dialogue.augment_system("Connected devices: kettle");

        assert_eq!(dialogue.messages()[0].role, Role::System);
        assert_eq!(dialogue.messages()[1].role, Role::User);
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Tool.as_str(), "tool");
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
