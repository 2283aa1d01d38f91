//! Named content fragments and their ordering.

use serde::{Deserialize, Serialize};

use crate::types::{Identifier, Role};

/// Where a prompt's content is injected.
///
/// `Relative` prompts participate in the declaration-ordered assembly.
/// `Absolute` prompts are addressed by depth; the composer currently collects
/// them without emitting them (a reserved placement surface, see
/// [`crate::composer::Composer::compose`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionPosition {
    #[default]
    Relative,
    Absolute,
}

/// A stored content fragment. Content may contain macro placeholders that are
/// expanded at composition time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub identifier: Identifier,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub system_prompt: bool,
    #[serde(default)]
    pub injection_position: InjectionPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injection_depth: Option<usize>,
}

impl Prompt {
    pub fn new(
        identifier: impl Into<Identifier>,
        role: Role,
        content: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            role,
            content: content.into(),
            system_prompt: false,
            injection_position: InjectionPosition::Relative,
            injection_depth: None,
        }
    }

    pub fn system(identifier: impl Into<Identifier>, content: impl Into<String>) -> Self {
        let mut prompt = Self::new(identifier, Role::System, content);
        prompt.system_prompt = true;
        prompt
    }

    pub fn absolute(mut self, depth: usize) -> Self {
        self.injection_position = InjectionPosition::Absolute;
        self.injection_depth = Some(depth);
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.injection_depth = Some(depth);
        self
    }

    pub fn is_absolute(&self) -> bool {
        self.injection_position == InjectionPosition::Absolute
    }
}

/// Ordered collection of prompts for one generation request.
///
/// Identifiers are unique; [`PromptStore::set`] replaces in place so a
/// prompt's declared index survives updates. The index is what places
/// fixed-position groups at their configured slot in the assembler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptStore {
    prompts: Vec<Prompt>,
}

impl PromptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, identifier: &Identifier) -> bool {
        self.index(identifier).is_some()
    }

    pub fn get(&self, identifier: &Identifier) -> Option<&Prompt> {
        self.index(identifier).map(|i| &self.prompts[i])
    }

    pub fn get_mut(&mut self, identifier: &Identifier) -> Option<&mut Prompt> {
        self.index(identifier).map(|i| &mut self.prompts[i])
    }

    /// Insert or replace by identifier, keeping the original slot on
    /// replacement.
    pub fn set(&mut self, prompt: Prompt) {
        match self.index(&prompt.identifier) {
            Some(i) => self.prompts[i] = prompt,
            None => self.prompts.push(prompt),
        }
    }

    /// Declaration index of a prompt, used as its assembly slot.
    pub fn index(&self, identifier: &Identifier) -> Option<usize> {
        self.prompts.iter().position(|p| &p.identifier == identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Prompt> {
        self.prompts.iter()
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Section;

    #[test]
    fn test_set_replaces_in_place() {
        let mut store = PromptStore::new();
        store.set(Prompt::system(Section::Main, "first"));
        store.set(Prompt::system(Section::ChatHistory, ""));
        store.set(Prompt::system(Section::Main, "second"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.index(&Section::Main.into()), Some(0));
        assert_eq!(store.get(&Section::Main.into()).unwrap().content, "second");
    }

    #[test]
    fn test_index_is_declaration_order() {
        let mut store = PromptStore::new();
        store.set(Prompt::system(Section::BeforeContext, "a"));
        store.set(Prompt::system(Section::Main, "b"));
        store.set(Prompt::new("custom", Role::User, "c"));

        assert_eq!(store.index(&Section::Main.into()), Some(1));
        assert_eq!(store.index(&Identifier::custom("custom")), Some(2));
        assert_eq!(store.index(&Section::Bias.into()), None);
    }

    #[test]
    fn test_absolute_builder() {
        let prompt = Prompt::new("lore", Role::System, "deep lore").absolute(2);
        assert!(prompt.is_absolute());
        assert_eq!(prompt.injection_depth, Some(2));
    }
}
