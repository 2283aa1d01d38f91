//! Injected seams to the host application.
//!
//! Tokenization, macro expansion, per-message text transforms, character
//! capabilities and directive collection are all external concerns; the
//! composer consumes them through these traits and never reaches for a
//! global. The no-op implementations below make the crate usable without a
//! host and double as test fixtures.

use async_trait::async_trait;

use crate::injection::DirectiveBatch;
use crate::types::{Identifier, Role};

/// Boxed error for collaborator failures. The composer logs-and-skips these
/// on optional steps and aborts only when chat-history content is at stake.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Pluggable token counting. Absence of a counter means every message costs
/// zero, which is the supported unbounded-budget test mode.
pub trait TokenCounter: Send + Sync {
    fn count(&self, role: Role, content: &str, name: Option<&str>) -> u64;
}

/// Replaces macro placeholders (user/character name tokens and whatever else
/// the host defines) with live values.
#[async_trait]
pub trait MacroExpander: Send + Sync {
    async fn expand(
        &self,
        text: &str,
        user_name: &str,
        character_name: &str,
    ) -> Result<String, BoxError>;
}

/// Which transform pipeline a piece of history text runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    UserInput,
    AiOutput,
}

/// Context handed to the per-message text transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformContext<'a> {
    pub character_override: Option<&'a str>,
    pub is_markdown: bool,
    pub is_prompt: bool,
    pub depth: Option<usize>,
    pub is_edit: bool,
}

#[async_trait]
pub trait TextTransformer: Send + Sync {
    async fn transform(
        &self,
        text: &str,
        placement: Placement,
        ctx: TransformContext<'_>,
    ) -> Result<String, BoxError>;
}

/// Per-character lookups: which prompts the active character disables, the
/// live macro names, and name sanitization for the structured-field naming
/// mode.
pub trait CharacterCapability: Send + Sync {
    fn is_prompt_disabled(&self, identifier: &Identifier) -> bool;
    fn user_name(&self) -> &str;
    fn character_name(&self) -> &str;
    fn sanitize_name(&self, name: &str) -> Option<String>;
}

/// Supplies the three directive lists for one composition.
#[async_trait]
pub trait DirectiveSource: Send + Sync {
    async fn collect(&self) -> Result<DirectiveBatch, BoxError>;
}

/// Literal `{{user}}` / `{{char}}` substitution, the minimum a host-free
/// setup needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicMacros;

#[async_trait]
impl MacroExpander for BasicMacros {
    async fn expand(
        &self,
        text: &str,
        user_name: &str,
        character_name: &str,
    ) -> Result<String, BoxError> {
        Ok(text
            .replace("{{user}}", user_name)
            .replace("{{char}}", character_name))
    }
}

/// Pass-through transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransform;

#[async_trait]
impl TextTransformer for NoTransform {
    async fn transform(
        &self,
        text: &str,
        _placement: Placement,
        _ctx: TransformContext<'_>,
    ) -> Result<String, BoxError> {
        Ok(text.to_string())
    }
}

/// A fixed directive batch, empty by default.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectives(pub DirectiveBatch);

#[async_trait]
impl DirectiveSource for StaticDirectives {
    async fn collect(&self) -> Result<DirectiveBatch, BoxError> {
        Ok(self.0.clone())
    }
}

/// Fixed names, no disabled prompts, whitespace-trimming name sanitizer.
#[derive(Debug, Clone)]
pub struct StaticCapability {
    pub user_name: String,
    pub character_name: String,
    pub disabled: Vec<Identifier>,
}

impl Default for StaticCapability {
    fn default() -> Self {
        Self {
            user_name: "User".to_string(),
            character_name: "Assistant".to_string(),
            disabled: Vec::new(),
        }
    }
}

impl StaticCapability {
    pub fn new(user_name: impl Into<String>, character_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            character_name: character_name.into(),
            disabled: Vec::new(),
        }
    }

    pub fn disable(mut self, identifier: impl Into<Identifier>) -> Self {
        self.disabled.push(identifier.into());
        self
    }
}

impl CharacterCapability for StaticCapability {
    fn is_prompt_disabled(&self, identifier: &Identifier) -> bool {
        self.disabled.contains(identifier)
    }

    fn user_name(&self) -> &str {
        &self.user_name
    }

    fn character_name(&self) -> &str {
        &self.character_name
    }

    fn sanitize_name(&self, name: &str) -> Option<String> {
        let trimmed: String = name
            .trim()
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_macros() {
        let expanded = BasicMacros
            .expand("{{char}} greets {{user}}", "Alice", "Bob")
            .await
            .unwrap();
        assert_eq!(expanded, "Bob greets Alice");
    }

    #[test]
    fn test_static_capability_sanitizes_names() {
        let cap = StaticCapability::default();
        assert_eq!(cap.sanitize_name("  Alice! "), Some("Alice".to_string()));
        assert_eq!(cap.sanitize_name(" ?! "), None);
    }

    #[test]
    fn test_static_capability_disables() {
        let cap = StaticCapability::default().disable(crate::types::Section::Scenario);
        assert!(cap.is_prompt_disabled(&crate::types::Section::Scenario.into()));
        assert!(!cap.is_prompt_disabled(&crate::types::Section::Main.into()));
    }
}
