//! The composition orchestrator.
//!
//! [`Composer::compose`] runs the strict assembly order: mandatory reply
//! priming, directive merge, chat history (which may mutate the
//! before-context fragment), the fixed-order sections, the control group,
//! declaration-ordered remaining prompts, depth-injected fragments, dialogue
//! examples, and finally the control group attached as the last top-level
//! group. One store/assembler/budget triple serves exactly one request.

mod examples;
mod history;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::assembler::{Assembler, Group};
use crate::budget::Budget;
use crate::collaborators::{
    BasicMacros, CharacterCapability, DirectiveSource, MacroExpander, NoTransform, Placement,
    StaticCapability, StaticDirectives, TextTransformer, TokenCounter, TransformContext,
};
use crate::injection::{DirectiveBatch, InjectionResolver};
use crate::settings::ComposerSettings;
use crate::store::PromptStore;
use crate::types::{HistoryMessage, Identifier, Message, Role, Section};
use crate::{Error, Result};

/// What kind of generation the composed prompt serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    #[default]
    Normal,
    Continue,
    Impersonate,
}

/// One turn of a scripted example dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleTurn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ExampleTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }
}

/// A scripted example exchange, inserted to steer style independently of the
/// real history. Populated all-or-nothing against the budget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExampleDialogue {
    pub turns: Vec<ExampleTurn>,
}

impl ExampleDialogue {
    pub fn new(turns: Vec<ExampleTurn>) -> Self {
        Self { turns }
    }
}

/// Per-request inputs to [`Composer::compose`].
#[derive(Debug, Clone, Default)]
pub struct ComposeRequest {
    pub kind: RequestKind,
    /// Hard token ceiling for the composed output. `None` means unlimited,
    /// the no-token-counter test mode.
    pub token_budget: Option<u64>,
    /// Chronological history, oldest first.
    pub messages: Vec<HistoryMessage>,
    pub example_dialogues: Vec<ExampleDialogue>,
    pub bias: Option<String>,
    pub quiet_prompt: Option<String>,
    /// Text of the message being continued; substituted into the
    /// continuation nudge template.
    pub cycle_prompt: Option<String>,
    /// Skip directive merge entirely for this request.
    pub exclude_directives: bool,
}

/// Orchestrates the prompt store, assembler and injection resolver into the
/// final wire-ready message list.
pub struct Composer {
    counter: Option<Arc<dyn TokenCounter>>,
    macros: Arc<dyn MacroExpander>,
    transformer: Arc<dyn TextTransformer>,
    capability: Arc<dyn CharacterCapability>,
    directives: Arc<dyn DirectiveSource>,
    settings: ComposerSettings,
}

impl Composer {
    pub fn builder() -> ComposerBuilder {
        ComposerBuilder::default()
    }

    pub fn settings(&self) -> &ComposerSettings {
        &self.settings
    }

    /// Compile the ordered, role-tagged message list for one generation
    /// request.
    ///
    /// Deterministic for identical inputs. Fails only when a mandatory
    /// reservation cannot be satisfied or a collaborator breaks on
    /// mandatory history content; optional fragments that do not fit are
    /// skipped with a log line instead.
    pub async fn compose(
        &self,
        store: &mut PromptStore,
        request: &ComposeRequest,
    ) -> Result<Vec<Message>> {
        let budget = match request.token_budget {
            Some(limit) => Budget::new(limit),
            None => Budget::unlimited(),
        };
        let mut assembler = Assembler::new(budget);

        // 1. Reply priming is a fixed mandatory overhead.
        assembler
            .budget_mut()
            .reserve(self.settings.reply_priming_tokens, "replyPriming")?;

        // 2. Directive lists from the collaborator, unless excluded.
        let batch = if request.exclude_directives {
            DirectiveBatch::default()
        } else {
            match self.directives.collect().await {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(error = %err, "directive collection failed, continuing without directives");
                    DirectiveBatch::default()
                }
            }
        };
        let mut resolver = InjectionResolver::new(batch.depth_entries);

        // Continuation prefill consumes the newest history message; pull it
        // out before the walk so it cannot be emitted twice.
        let mut history = request.messages.clone();
        let prefill_source = (request.kind == RequestKind::Continue
            && self.settings.continue_prefill)
            .then(|| history.pop())
            .flatten();

        // 3. Chat history before the fixed sections: unmatched directives
        // and empty conversations mutate the before-context fragment, and
        // that mutation must land before the fragment is added.
        self.populate_history(&mut assembler, store, &mut resolver, &history)
            .await?;

        // 4. Fixed-order sections.
        for section in [
            Section::BeforeContext,
            Section::Main,
            Section::AfterContext,
            Section::CharDescription,
            Section::CharPersonality,
            Section::Scenario,
            Section::PersonaDescription,
        ] {
            self.add_section(&mut assembler, store, &section.into())
                .await?;
        }

        // 5. Control prompts, kept out of the top-level order until step 16.
        let mut control = Group::new(Section::ControlPrompts);
        if request.kind == RequestKind::Impersonate {
            if let Some(prompt) = store.get(&Section::Impersonate.into()) {
                if !self.capability.is_prompt_disabled(&prompt.identifier) {
                    match self.expand(&prompt.content).await {
                        Ok(text) if !text.is_empty() => {
                            control.push(Message::from_prompt(prompt, text, self.counter()));
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(error = %err, "impersonation prompt expansion failed, skipping");
                        }
                    }
                }
            }
        }
        if let Some(quiet) = request.quiet_prompt.as_deref().filter(|q| !q.is_empty()) {
            match self.expand(quiet).await {
                Ok(text) if !text.is_empty() => {
                    control.push(Message::system(text, Section::QuietPrompt).priced(self.counter()));
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "quiet prompt expansion failed, skipping"),
            }
        }
        // Prefill and nudge land after the impersonation instruction but
        // before the quiet prompt.
        let quiet_tail = usize::from(
            control
                .messages()
                .last()
                .is_some_and(|m| m.identifier == Section::QuietPrompt),
        );

        // 6. Continuation prefill: the withheld newest history message joins
        // the control group as an assistant-side prefill.
        if let Some(source) = prefill_source {
            if let Some((role, content)) = source.validate() {
                let content = match &self.settings.assistant_prefill {
                    Some(prefix) => format!("{prefix}{content}"),
                    None => content.to_string(),
                };
                let message = Message::new(role, content, Identifier::custom("continuePrefill"))
                    .priced(self.counter());
                assembler
                    .budget_mut()
                    .reserve(message.tokens, "continuePrefill")?;
                control.insert_at_depth(message, quiet_tail);
            }
        }

        // 7. Continuation nudge.
        if request.kind == RequestKind::Continue {
            let filled = self.settings.continue_nudge_template.replace(
                "{{lastChatMessage}}",
                request.cycle_prompt.as_deref().unwrap_or(""),
            );
            match self.expand(&filled).await {
                Ok(text) if !text.is_empty() => {
                    let message =
                        Message::system(text, Section::ContinueNudge).priced(self.counter());
                    control.insert_at_depth(message, quiet_tail);
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "continuation nudge expansion failed, skipping"),
            }
        }

        // 8. Hold the control group's cost while the remaining optional
        // content competes for the budget.
        let control_cost = control.cost();
        assembler
            .budget_mut()
            .reserve(control_cost, "controlPrompts")?;

        // 9. Remaining prompts in declaration order: the two fixed system
        // prompts, then every host-defined relative entry.
        self.add_section(&mut assembler, store, &Section::Auxiliary.into())
            .await?;
        self.add_section(&mut assembler, store, &Section::PostHistory.into())
            .await?;
        let remaining: Vec<Identifier> = store
            .iter()
            .filter(|p| p.identifier.is_custom() && !p.system_prompt && !p.is_absolute())
            .map(|p| p.identifier.clone())
            .collect();
        for id in &remaining {
            self.add_section(&mut assembler, store, id).await?;
        }

        // 10. Absolute-position prompts are collected but deliberately not
        // emitted; this stays an inert surface until depth placement for
        // stored prompts ships.
        let withheld = store
            .iter()
            .filter(|p| p.is_absolute() && !self.capability.is_prompt_disabled(&p.identifier))
            .count();
        if withheld > 0 {
            debug!(count = withheld, "withholding absolute-position prompts");
        }

        // 11. Enhance-definitions instruction.
        self.add_section(&mut assembler, store, &Section::EnhanceDefinitions.into())
            .await?;

        // 12. Bias, only with non-blank content.
        if let Some(bias) = request.bias.as_deref() {
            match self.expand(bias).await {
                Ok(text) if !text.trim().is_empty() => {
                    let id: Identifier = Section::Bias.into();
                    let message = Message::system(text, Section::Bias).priced(self.counter());
                    let group = Group::new(id.clone());
                    match store.index(&id) {
                        Some(slot) => assembler.add_at(group, slot),
                        None => assembler.add(group),
                    }
                    assembler.insert_at_end(message, &id)?;
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "bias expansion failed, skipping"),
            }
        }

        // 13. Summary and authors note inject into the main group by depth.
        for section in [Section::Summary, Section::AuthorsNote] {
            self.inject_into_main(&mut assembler, store, section).await?;
        }

        // 14–15. Dialogue examples, attempted whenever literal examples or
        // banner directives exist.
        if !request.example_dialogues.is_empty()
            || !batch.top_entries.is_empty()
            || !batch.bottom_entries.is_empty()
        {
            self.populate_examples(
                &mut assembler,
                store,
                &request.example_dialogues,
                &batch.top_entries,
                &batch.bottom_entries,
            )
            .await?;
        }

        // 16. Release the hold and attach the control group as the final
        // top-level group.
        assembler.budget_mut().free(control_cost);
        if !control.is_empty() {
            assembler.add(control);
        }

        Ok(assembler.into_chat())
    }

    /// Add a stored prompt as its own group at the declared slot. Missing,
    /// disabled, absolute-position and blank-rendering prompts are skipped;
    /// an unaffordable one is skipped by the assembler with a log line.
    async fn add_section(
        &self,
        assembler: &mut Assembler,
        store: &PromptStore,
        id: &Identifier,
    ) -> Result<()> {
        let Some(prompt) = store.get(id) else {
            return Ok(());
        };
        if self.capability.is_prompt_disabled(id) {
            debug!(%id, "prompt disabled for the active character");
            return Ok(());
        }
        if prompt.is_absolute() {
            return Ok(());
        }
        let expanded = match self.expand(&prompt.content).await {
            Ok(text) => text,
            Err(err) => {
                warn!(%id, error = %err, "macro expansion failed, skipping section");
                return Ok(());
            }
        };
        if expanded.is_empty() {
            return Ok(());
        }
        let message = Message::from_prompt(prompt, expanded, self.counter());
        let group = Group::new(id.clone());
        match store.index(id) {
            Some(slot) => assembler.add_at(group, slot),
            None => assembler.add(group),
        }
        assembler.insert_at_end(message, id)?;
        Ok(())
    }

    /// Summary / authors-note placement: into the main group at the
    /// prompt's injection depth from that group's end. An absent main group
    /// means the fragment is treated as absent.
    async fn inject_into_main(
        &self,
        assembler: &mut Assembler,
        store: &PromptStore,
        section: Section,
    ) -> Result<()> {
        let id: Identifier = section.into();
        let Some(prompt) = store.get(&id) else {
            return Ok(());
        };
        if self.capability.is_prompt_disabled(&id) || prompt.is_absolute() {
            return Ok(());
        }
        let expanded = match self.expand(&prompt.content).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => return Ok(()),
            Err(err) => {
                warn!(%id, error = %err, "macro expansion failed, skipping fragment");
                return Ok(());
            }
        };
        let depth = prompt
            .injection_depth
            .unwrap_or(self.settings.default_injection_depth);
        let message = Message::from_prompt(prompt, expanded, self.counter());
        match assembler.insert(message, &Section::Main.into(), Some(depth)) {
            Ok(_) => Ok(()),
            Err(Error::GroupNotFound(_)) => {
                debug!(%id, "main group absent, treating fragment as absent");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn counter(&self) -> Option<&dyn TokenCounter> {
        self.counter.as_deref()
    }

    async fn expand(&self, text: &str) -> Result<String> {
        self.macros
            .expand(
                text,
                self.capability.user_name(),
                self.capability.character_name(),
            )
            .await
            .map_err(|err| Error::collaborator("macro expansion", err))
    }

    async fn transform(&self, text: &str, placement: Placement, depth: usize) -> Result<String> {
        let ctx = TransformContext {
            is_prompt: true,
            depth: Some(depth),
            ..Default::default()
        };
        self.transformer
            .transform(text, placement, ctx)
            .await
            .map_err(|err| Error::collaborator("text transform", err))
    }
}

/// Builder for [`Composer`]. Every collaborator defaults to a no-op
/// implementation, so `Composer::builder().build()` yields a working
/// composer in the unbounded-budget test mode.
pub struct ComposerBuilder {
    counter: Option<Arc<dyn TokenCounter>>,
    macros: Arc<dyn MacroExpander>,
    transformer: Arc<dyn TextTransformer>,
    capability: Arc<dyn CharacterCapability>,
    directives: Arc<dyn DirectiveSource>,
    settings: ComposerSettings,
}

impl Default for ComposerBuilder {
    fn default() -> Self {
        Self {
            counter: None,
            macros: Arc::new(BasicMacros),
            transformer: Arc::new(NoTransform),
            capability: Arc::new(StaticCapability::default()),
            directives: Arc::new(StaticDirectives::default()),
            settings: ComposerSettings::default(),
        }
    }
}

impl ComposerBuilder {
    pub fn token_counter(mut self, counter: impl TokenCounter + 'static) -> Self {
        self.counter = Some(Arc::new(counter));
        self
    }

    pub fn macros(mut self, macros: impl MacroExpander + 'static) -> Self {
        self.macros = Arc::new(macros);
        self
    }

    pub fn transformer(mut self, transformer: impl TextTransformer + 'static) -> Self {
        self.transformer = Arc::new(transformer);
        self
    }

    pub fn capability(mut self, capability: impl CharacterCapability + 'static) -> Self {
        self.capability = Arc::new(capability);
        self
    }

    pub fn directives(mut self, directives: impl DirectiveSource + 'static) -> Self {
        self.directives = Arc::new(directives);
        self
    }

    pub fn settings(mut self, settings: ComposerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Composer {
        Composer {
            counter: self.counter,
            macros: self.macros,
            transformer: self.transformer,
            capability: self.capability,
            directives: self.directives,
            settings: self.settings,
        }
    }
}
