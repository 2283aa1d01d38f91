//! Prompt and group identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of well-known sections the composer manages itself.
///
/// Free-form identifiers (per-turn history ids, host-defined custom prompts)
/// live in [`Identifier::Custom`]; everything the composer places at a fixed
/// point in the assembly is named here so call sites that know the section
/// statically never pass a bare string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Section {
    /// World-context text placed ahead of the character definition.
    BeforeContext,
    /// Main instruction block; also the target for summary / authors-note
    /// depth insertion.
    Main,
    /// World-context text placed after the main instructions.
    AfterContext,
    CharDescription,
    CharPersonality,
    Scenario,
    PersonaDescription,
    ChatHistory,
    DialogueExamples,
    /// Always the last top-level group in the flattened output.
    ControlPrompts,
    /// First of the two fixed system prompts added after the ordered
    /// sections.
    Auxiliary,
    /// Second fixed system prompt.
    PostHistory,
    EnhanceDefinitions,
    Bias,
    Impersonate,
    QuietPrompt,
    ContinueNudge,
    Summary,
    AuthorsNote,
    NewChat,
    NewExampleChat,
}

impl Section {
    pub const fn as_str(self) -> &'static str {
        match self {
            Section::BeforeContext => "beforeContext",
            Section::Main => "main",
            Section::AfterContext => "afterContext",
            Section::CharDescription => "charDescription",
            Section::CharPersonality => "charPersonality",
            Section::Scenario => "scenario",
            Section::PersonaDescription => "personaDescription",
            Section::ChatHistory => "chatHistory",
            Section::DialogueExamples => "dialogueExamples",
            Section::ControlPrompts => "controlPrompts",
            Section::Auxiliary => "auxiliary",
            Section::PostHistory => "postHistory",
            Section::EnhanceDefinitions => "enhanceDefinitions",
            Section::Bias => "bias",
            Section::Impersonate => "impersonate",
            Section::QuietPrompt => "quietPrompt",
            Section::ContinueNudge => "continueNudge",
            Section::Summary => "summary",
            Section::AuthorsNote => "authorsNote",
            Section::NewChat => "newChat",
            Section::NewExampleChat => "newExampleChat",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "beforeContext" => Section::BeforeContext,
            "main" => Section::Main,
            "afterContext" => Section::AfterContext,
            "charDescription" => Section::CharDescription,
            "charPersonality" => Section::CharPersonality,
            "scenario" => Section::Scenario,
            "personaDescription" => Section::PersonaDescription,
            "chatHistory" => Section::ChatHistory,
            "dialogueExamples" => Section::DialogueExamples,
            "controlPrompts" => Section::ControlPrompts,
            "auxiliary" => Section::Auxiliary,
            "postHistory" => Section::PostHistory,
            "enhanceDefinitions" => Section::EnhanceDefinitions,
            "bias" => Section::Bias,
            "impersonate" => Section::Impersonate,
            "quietPrompt" => Section::QuietPrompt,
            "continueNudge" => Section::ContinueNudge,
            "summary" => Section::Summary,
            "authorsNote" => Section::AuthorsNote,
            "newChat" => Section::NewChat,
            "newExampleChat" => Section::NewExampleChat,
            _ => return None,
        })
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a prompt or group: a well-known [`Section`] or a free-form
/// string for genuinely dynamic entries (`chatHistory-{n}`, host-defined
/// prompts).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Section(Section),
    Custom(String),
}

impl Identifier {
    pub fn custom(id: impl Into<String>) -> Self {
        Identifier::Custom(id.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Identifier::Section(section) => section.as_str(),
            Identifier::Custom(id) => id,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Identifier::Custom(_))
    }
}

impl From<Section> for Identifier {
    fn from(section: Section) -> Self {
        Identifier::Section(section)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        match Section::parse(s) {
            Some(section) => Identifier::Section(section),
            None => Identifier::Custom(s.to_string()),
        }
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        match Section::parse(&s) {
            Some(section) => Identifier::Section(section),
            None => Identifier::Custom(s),
        }
    }
}

impl PartialEq<Section> for Identifier {
    fn eq(&self, other: &Section) -> bool {
        matches!(self, Identifier::Section(section) if section == other)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Identifier {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Identifier::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_round_trip() {
        for section in [
            Section::BeforeContext,
            Section::ChatHistory,
            Section::ControlPrompts,
            Section::NewExampleChat,
        ] {
            assert_eq!(Section::parse(section.as_str()), Some(section));
        }
    }

    #[test]
    fn test_str_parsing_recognizes_sections() {
        assert_eq!(Identifier::from("chatHistory"), Section::ChatHistory);
        assert!(Identifier::from("chatHistory-3").is_custom());
    }

    #[test]
    fn test_identifier_equality() {
        let id: Identifier = Section::Main.into();
        assert_eq!(id, Section::Main);
        assert_ne!(id, Section::Bias);
        assert_eq!(id.as_str(), "main");
    }
}
