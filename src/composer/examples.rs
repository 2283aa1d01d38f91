//! Dialogue-example population.

use tracing::{debug, warn};

use crate::assembler::{Assembler, Group};
use crate::settings::NamesMode;
use crate::store::PromptStore;
use crate::types::{Identifier, Message, Section};
use crate::Result;

use super::{Composer, ExampleDialogue};

impl Composer {
    /// Fill the dialogue-examples group: the top banner directive, then each
    /// scripted dialogue all-or-nothing against the budget, then the bottom
    /// banner directive.
    ///
    /// A store without a dialogue-examples identifier makes this a no-op;
    /// callers that only carry banner directives must pre-register an empty
    /// one.
    pub(super) async fn populate_examples(
        &self,
        assembler: &mut Assembler,
        store: &PromptStore,
        dialogues: &[ExampleDialogue],
        top_entries: &[String],
        bottom_entries: &[String],
    ) -> Result<()> {
        let id: Identifier = Section::DialogueExamples.into();
        let Some(slot) = store.index(&id) else {
            debug!("no dialogue-examples prompt declared, skipping population");
            return Ok(());
        };
        assembler.add_at(Group::new(id.clone()), slot);

        if !top_entries.is_empty() {
            match self.expand(&top_entries.join("\n")).await {
                Ok(text) if !text.is_empty() => {
                    let message = Message::system(text, Identifier::custom("directivesTop"))
                        .priced(self.counter());
                    assembler.insert_at_start(message, &id)?;
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "top directive expansion failed, skipping"),
            }
        }

        if !dialogues.is_empty() {
            let banner_text = match self.expand(&self.settings.new_example_chat_template).await {
                Ok(text) => Some(text),
                Err(err) => {
                    warn!(error = %err, "example banner expansion failed, skipping dialogues");
                    None
                }
            };
            if let Some(banner_text) = banner_text {
                'dialogues: for (n, dialogue) in dialogues.iter().enumerate() {
                    let mut set = Vec::with_capacity(dialogue.turns.len() + 1);
                    if !banner_text.trim().is_empty() {
                        set.push(
                            Message::system(banner_text.clone(), Section::NewExampleChat)
                                .priced(self.counter()),
                        );
                    }
                    for turn in &dialogue.turns {
                        let content = match self.expand(&turn.content).await {
                            Ok(text) => text,
                            Err(err) => {
                                warn!(dialogue = n, error = %err, "example turn expansion failed, stopping population");
                                break 'dialogues;
                            }
                        };
                        let name = match self.settings.names_mode {
                            NamesMode::StructuredField => turn
                                .name
                                .as_deref()
                                .and_then(|n| self.capability.sanitize_name(n)),
                            NamesMode::Plain => None,
                        };
                        set.push(
                            Message::new(
                                turn.role,
                                content,
                                Identifier::custom(format!("dialogueExamples-{n}")),
                            )
                            .with_name(name)
                            .priced(self.counter()),
                        );
                    }
                    // All-or-nothing per dialogue: a partial example steers
                    // worse than none.
                    if !assembler
                        .budget()
                        .can_afford_all(set.iter().map(|m| m.tokens))
                    {
                        debug!(dialogue = n, "example dialogue does not fit, truncating examples");
                        break;
                    }
                    for message in set {
                        assembler.insert_at_end(message, &id)?;
                    }
                }
            }
        }

        if !bottom_entries.is_empty() {
            match self.expand(&bottom_entries.join("\n")).await {
                Ok(text) if !text.is_empty() => {
                    let message = Message::system(text, Identifier::custom("directivesBottom"))
                        .priced(self.counter());
                    assembler.insert_at_end(message, &id)?;
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "bottom directive expansion failed, skipping"),
            }
        }

        Ok(())
    }
}
