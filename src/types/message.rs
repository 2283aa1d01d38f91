//! Role-tagged, token-counted message units.

use serde::{Deserialize, Serialize};

use super::Identifier;
use crate::collaborators::TokenCounter;
use crate::store::Prompt;

/// Role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One unit of the composed output.
///
/// Wire serialization carries role, content and the optional name; the
/// identifier and token cost are composition-time bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip)]
    pub identifier: Identifier,
    #[serde(skip)]
    pub tokens: u64,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, identifier: impl Into<Identifier>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            identifier: identifier.into(),
            tokens: 0,
        }
    }

    pub fn system(content: impl Into<String>, identifier: impl Into<Identifier>) -> Self {
        Self::new(Role::System, content, identifier)
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// Build a message from a stored prompt whose content has already been
    /// macro-expanded. Without a token counter the cost is zero, which is the
    /// supported unbounded-budget test mode.
    pub fn from_prompt(
        prompt: &Prompt,
        expanded: impl Into<String>,
        counter: Option<&dyn TokenCounter>,
    ) -> Self {
        Self::new(prompt.role, expanded, prompt.identifier.clone()).priced(counter)
    }

    /// Compute and attach the token cost.
    pub fn priced(mut self, counter: Option<&dyn TokenCounter>) -> Self {
        self.tokens = match counter {
            Some(counter) => counter.count(self.role, &self.content, self.name.as_deref()),
            None => 0,
        };
        self
    }
}

/// One record of the caller-supplied chat history, oldest first.
///
/// Fields are optional so malformed records survive deserialization and can
/// be skipped (with a log line) instead of failing the whole composition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl HistoryMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role: Some(role),
            content: Some(content.into()),
            name: None,
        }
    }

    pub fn named(role: Role, content: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: Some(role),
            content: Some(content.into()),
            name: Some(name.into()),
        }
    }

    /// Returns the role and content when the record is well-formed.
    pub fn validate(&self) -> Option<(Role, &str)> {
        match (self.role, self.content.as_deref()) {
            (Some(role), Some(content)) if !content.is_empty() => Some((role, content)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Section;

    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count(&self, _role: Role, content: &str, _name: Option<&str>) -> u64 {
            content.split_whitespace().count() as u64
        }
    }

    #[test]
    fn test_message_pricing() {
        let msg = Message::system("one two three", Section::Main).priced(Some(&WordCounter));
        assert_eq!(msg.tokens, 3);

        let free = Message::system("one two three", Section::Main).priced(None);
        assert_eq!(free.tokens, 0);
    }

    #[test]
    fn test_wire_serialization_hides_bookkeeping() {
        let msg = Message::new(Role::User, "hi", Identifier::custom("chatHistory-1"))
            .with_name(Some("Alice".into()));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hi");
        assert_eq!(json["name"], "Alice");
        assert!(json.get("identifier").is_none());
        assert!(json.get("tokens").is_none());
    }

    #[test]
    fn test_history_validation() {
        assert!(HistoryMessage::new(Role::User, "hi").validate().is_some());

        let missing_role = HistoryMessage {
            role: None,
            content: Some("hi".into()),
            name: None,
        };
        assert!(missing_role.validate().is_none());

        let empty = HistoryMessage::new(Role::User, "");
        assert!(empty.validate().is_none());
    }
}
