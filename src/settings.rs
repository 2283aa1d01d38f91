//! Composition settings.

use serde::{Deserialize, Serialize};

/// How participant names reach the wire. Only the structured-field mode is
/// meaningful to the composer; every other host naming scheme is applied by
/// collaborators before or after composition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamesMode {
    #[default]
    Plain,
    /// Attach the sanitized speaker name as a structured `name` field on
    /// history messages.
    StructuredField,
}

/// Knobs for one composer instance. All templates run through macro
/// expansion at composition time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerSettings {
    /// Fixed overhead reserved up front for reply priming; a budget that
    /// cannot cover it aborts composition.
    pub reply_priming_tokens: u64,
    /// Banner inserted at the very start of chat history. An empty render
    /// skips the banner entirely.
    pub new_chat_template: String,
    /// Banner separating scripted example dialogues.
    pub new_example_chat_template: String,
    /// System nudge appended for continuation requests. The
    /// `{{lastChatMessage}}` placeholder receives the request's cycle
    /// prompt.
    pub continue_nudge_template: String,
    /// When set, continuation requests move the newest history message into
    /// the control group as an assistant prefill.
    pub continue_prefill: bool,
    /// Optional text prepended to the prefilled content.
    pub assistant_prefill: Option<String>,
    /// Depth from the end of the main group for summary / authors-note
    /// insertion when the prompt declares none.
    pub default_injection_depth: usize,
    pub names_mode: NamesMode,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            reply_priming_tokens: 3,
            new_chat_template: "[Start a new chat]".to_string(),
            new_example_chat_template: "[Example chat]".to_string(),
            continue_nudge_template:
                "[Continue your last message without repeating its original content.]".to_string(),
            continue_prefill: false,
            assistant_prefill: None,
            default_injection_depth: 4,
            names_mode: NamesMode::Plain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ComposerSettings::default();
        assert_eq!(settings.reply_priming_tokens, 3);
        assert_eq!(settings.default_injection_depth, 4);
        assert_eq!(settings.names_mode, NamesMode::Plain);
        assert!(!settings.continue_prefill);
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let settings: ComposerSettings =
            serde_json::from_str(r#"{"names_mode": "structured_field"}"#).unwrap();
        assert_eq!(settings.names_mode, NamesMode::StructuredField);
        assert_eq!(settings.reply_priming_tokens, 3);
    }
}
