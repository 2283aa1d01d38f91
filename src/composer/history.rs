//! The chat-history sub-algorithm.

use tracing::{debug, warn};

use crate::assembler::{Assembler, Group};
use crate::collaborators::Placement;
use crate::injection::InjectionResolver;
use crate::settings::NamesMode;
use crate::store::{Prompt, PromptStore};
use crate::types::{HistoryMessage, Identifier, Message, Role, Section};
use crate::{Error, Result};

use super::Composer;

impl Composer {
    /// Populate the chat-history group and resolve depth-addressed
    /// directives against it.
    ///
    /// Depth is recomputed fresh from the runtime history length: for index
    /// `i` of length `L`, `depth = L - i - 1`, so depth 0 is always the
    /// single most recent message. Walking in chronological order with
    /// end-of-group insertion yields the correct transport order.
    pub(super) async fn populate_history(
        &self,
        assembler: &mut Assembler,
        store: &mut PromptStore,
        resolver: &mut InjectionResolver,
        history: &[HistoryMessage],
    ) -> Result<()> {
        let chat_id: Identifier = Section::ChatHistory.into();
        let group = Group::new(chat_id.clone());
        match store.index(&chat_id) {
            Some(slot) => assembler.add_at(group, slot),
            None => {
                debug!("chat history has no declared slot, appending at the end");
                assembler.add(group);
            }
        }

        // The banner is optional content: an empty render, a failed
        // expansion, or an unaffordable cost all skip it. When it fits, its
        // cost is held for the whole walk so the final start insert cannot
        // fail.
        let banner = match self.expand(&self.settings.new_chat_template).await {
            Ok(text) if !text.trim().is_empty() => {
                Some(Message::system(text, Section::NewChat).priced(self.counter()))
            }
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "new-chat banner expansion failed, skipping");
                None
            }
        };
        let banner = banner.filter(|b| {
            let fits = assembler.budget_mut().try_reserve(b.tokens);
            if !fits {
                debug!(cost = b.tokens, "new-chat banner does not fit the budget, skipping");
            }
            fits
        });

        let len = history.len();
        let saw_user = history.iter().any(|m| m.role == Some(Role::User));
        let mut inserted_any = false;

        for (index, record) in history.iter().enumerate() {
            let depth = len - index - 1;
            let Some((role, content)) = record.validate() else {
                warn!(index, "skipping malformed history record");
                continue;
            };

            // Macro and transform failures on history content abort the
            // composition: content integrity outweighs best-effort
            // continuation here.
            let content = self.expand(content).await?;
            let placement = if role == Role::User {
                Placement::UserInput
            } else {
                Placement::AiOutput
            };
            let content = self.transform(&content, placement, depth).await?;

            // At most one directive entry per history message, inserted
            // immediately before it with the message's own role. The entry
            // is consumed only once its injection has actually been placed,
            // so anything that fails to land is recovered by the flush.
            let mut injection = None;
            if let Some((entry, instructions)) = resolver.peek(depth, role) {
                match self.expand(&instructions).await {
                    Ok(text) if !text.is_empty() => {
                        let message =
                            Message::new(role, text, Identifier::custom(format!("directive-{depth}")))
                                .priced(self.counter());
                        injection = Some((entry, message));
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(depth, error = %err, "directive expansion failed, leaving entry for the flush");
                    }
                }
            }

            let name = match self.settings.names_mode {
                NamesMode::StructuredField => record
                    .name
                    .as_deref()
                    .and_then(|n| self.capability.sanitize_name(n)),
                NamesMode::Plain => None,
            };
            let message = Message::new(
                role,
                content,
                Identifier::custom(format!("chatHistory-{}", len - index)),
            )
            .with_name(name)
            .priced(self.counter());
            let cost = message.tokens;

            // The injection goes in only when its history message also
            // fits; a directive left at the end of a truncated walk would
            // address nothing.
            if let Some((entry, injection)) = injection {
                if assembler
                    .budget()
                    .can_afford_all([injection.tokens, cost])
                {
                    if assembler.insert_at_end(injection, &chat_id)? {
                        resolver.consume(entry);
                    }
                } else {
                    debug!(
                        depth,
                        "directive and its history message do not both fit, skipping injection"
                    );
                }
            }

            if assembler.insert_at_end(message, &chat_id)? {
                inserted_any = true;
            } else if inserted_any {
                // Mid-walk exhaustion truncates: callers already pass a
                // bounded recent window, the budget is the final backstop.
                debug!(
                    remaining_records = len - index,
                    "budget exhausted, dropping the remaining history"
                );
                break;
            } else {
                // Not even the first history record fits. Surfacing this as
                // a budget failure beats returning a prompt with no
                // conversation in it.
                return Err(Error::BudgetExceeded {
                    label: "chatHistory",
                    needed: cost,
                    remaining: assembler.budget().remaining(),
                });
            }
        }

        // Stranded directive entries fold into the before-context fragment,
        // ahead of its existing text. A history without any user turn
        // (empty or greeting-only conversation) re-emits every entry,
        // claimed or not.
        let flushed = resolver.flush(!saw_user);
        if !flushed.is_empty() {
            let joined = flushed.join("\n");
            match store.get_mut(&Section::BeforeContext.into()) {
                Some(prompt) => {
                    prompt.content = if prompt.content.is_empty() {
                        joined
                    } else {
                        format!("{joined}\n{}", prompt.content)
                    };
                }
                None => store.set(Prompt::system(Section::BeforeContext, joined)),
            }
        }

        if let Some(banner) = banner {
            assembler.budget_mut().free(banner.tokens);
            assembler.insert_at_start(banner, &chat_id)?;
        }
        Ok(())
    }
}
