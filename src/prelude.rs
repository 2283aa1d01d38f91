//! Prelude module for convenient imports.
//!
//! Re-exports the types most hosts need to drive a composition.
//!
//! # Usage
//!
//! ```rust
//! use prompt_composer::prelude::*;
//! ```

// Orchestration
pub use crate::ComposeRequest;
pub use crate::Composer;
pub use crate::ComposerBuilder;
pub use crate::Error;
pub use crate::RequestKind;
pub use crate::Result;

// Data model
pub use crate::HistoryMessage;
pub use crate::Identifier;
pub use crate::Message;
pub use crate::Role;
pub use crate::Section;

// Store and assembly
pub use crate::{Assembler, Budget, Group, InjectionPosition, Prompt, PromptStore};

// Directives
pub use crate::{DirectiveBatch, InjectionEntry};

// Collaborator seams
pub use crate::{
    CharacterCapability, DirectiveSource, MacroExpander, TextTransformer, TokenCounter,
};

// Settings
pub use crate::{ComposerSettings, NamesMode};
