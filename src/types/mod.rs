//! Core data model: identity, roles, messages, history records.

pub mod identifier;
pub mod message;

pub use identifier::{Identifier, Section};
pub use message::{HistoryMessage, Message, Role};
