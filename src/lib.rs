//! # prompt-composer
//!
//! Deterministic prompt assembly for chat-completion endpoints.
//!
//! This crate compiles one ordered, role-tagged message list from
//! heterogeneous fragments: character data, world context, chat history,
//! scripted dialogue examples, depth-addressed directive injections and
//! control instructions, under a hard token budget with strict,
//! partially-configurable ordering. Tokenization, transport, rendering and
//! persistence are external collaborators injected through traits.
//!
//! ## Quick Start
//!
//! ```rust
//! use prompt_composer::{Composer, ComposeRequest, HistoryMessage, Prompt, PromptStore, Role, Section};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), prompt_composer::Error> {
//! let mut store = PromptStore::new();
//! store.set(Prompt::system(Section::Main, "You are {{char}}."));
//! store.set(Prompt::system(Section::ChatHistory, ""));
//!
//! let composer = Composer::builder().build();
//! let request = ComposeRequest {
//!     messages: vec![HistoryMessage::new(Role::User, "hello")],
//!     ..Default::default()
//! };
//!
//! let chat = composer.compose(&mut store, &request).await?;
//! assert!(!chat.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! Without a token counter every message costs zero and the budget is
//! effectively unlimited, which is the supported test mode. Plug a real
//! counter and a `token_budget` in for production use.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod assembler;
pub mod budget;
pub mod collaborators;
pub mod composer;
pub mod injection;
pub mod prelude;
pub mod settings;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use assembler::{Assembler, Group};
pub use budget::Budget;
pub use collaborators::{
    BasicMacros, BoxError, CharacterCapability, DirectiveSource, MacroExpander, NoTransform,
    Placement, StaticCapability, StaticDirectives, TextTransformer, TokenCounter,
    TransformContext,
};
pub use composer::{
    ComposeRequest, Composer, ComposerBuilder, ExampleDialogue, ExampleTurn, RequestKind,
};
pub use injection::{DirectiveBatch, InjectionEntry, InjectionResolver};
pub use settings::{ComposerSettings, NamesMode};
pub use store::{InjectionPosition, Prompt, PromptStore};
pub use types::{HistoryMessage, Identifier, Message, Role, Section};

/// Error type for composition.
///
/// Only mandatory failures surface here; optional fragments that do not fit
/// or cannot be built are logged and skipped instead.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A mandatory reservation (reply priming, the control-prompt group, a
    /// continuation prefill, the history backbone) cannot be satisfied.
    #[error("token budget exceeded at {label}: needs {needed}, {remaining} remaining")]
    BudgetExceeded {
        label: &'static str,
        needed: u64,
        remaining: u64,
    },

    /// An insertion targeted a group that was never registered.
    #[error("no group registered for {0}")]
    GroupNotFound(String),

    /// An external collaborator failed on content that cannot be skipped.
    #[error("{stage} failed: {message}")]
    Collaborator {
        stage: &'static str,
        message: String,
    },
}

impl Error {
    pub(crate) fn collaborator(stage: &'static str, err: collaborators::BoxError) -> Self {
        Error::Collaborator {
            stage,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::BudgetExceeded {
            label: "replyPriming",
            needed: 10,
            remaining: 3,
        };
        assert!(err.to_string().contains("replyPriming"));
        assert!(err.to_string().contains("10"));
    }

    #[test]
    fn test_collaborator_error_wraps_message() {
        let inner: collaborators::BoxError = "tokenizer offline".into();
        let err = Error::collaborator("macro expansion", inner);
        assert_eq!(err.to_string(), "macro expansion failed: tokenizer offline");
    }
}
