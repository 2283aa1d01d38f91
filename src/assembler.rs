//! Groups and the budgeted assembler that flattens them.

use std::collections::BTreeMap;

use tracing::debug;

use crate::budget::Budget;
use crate::types::{Identifier, Message};
use crate::{Error, Result};

/// A named, ordered list of messages contributing to the final output.
#[derive(Debug, Clone)]
pub struct Group {
    identifier: Identifier,
    messages: Vec<Message>,
}

impl Group {
    pub fn new(identifier: impl Into<Identifier>) -> Self {
        Self {
            identifier: identifier.into(),
            messages: Vec::new(),
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Insert at `max(0, len - depth_from_end)`: depth 0 appends, depth
    /// `len` (or more) lands at the front.
    pub fn insert_at_depth(&mut self, message: Message, depth_from_end: usize) {
        let index = self.messages.len().saturating_sub(depth_from_end);
        self.messages.insert(index, message);
    }

    pub fn insert_at_start(&mut self, message: Message) {
        self.messages.insert(0, message);
    }

    /// Aggregate token cost of the group.
    pub fn cost(&self) -> u64 {
        self.messages
            .iter()
            .fold(0u64, |acc, m| acc.saturating_add(m.tokens))
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}

/// Slot-ordered top-level groups plus the remaining budget.
///
/// Groups registered with [`Assembler::add`] take the next free slot;
/// [`Assembler::add_at`] pins a group to a configured slot (the prompt
/// store's declaration index) and replaces any previous occupant. Flattening
/// walks the slots in ascending order, so configured placement wins over
/// registration time while plain appends always land after every assigned
/// slot so far.
#[derive(Debug)]
pub struct Assembler {
    slots: BTreeMap<usize, Group>,
    next_slot: usize,
    budget: Budget,
}

impl Assembler {
    pub fn new(budget: Budget) -> Self {
        Self {
            slots: BTreeMap::new(),
            next_slot: 0,
            budget,
        }
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    pub fn budget_mut(&mut self) -> &mut Budget {
        &mut self.budget
    }

    /// Append a group after every slot assigned so far.
    ///
    /// Messages already inside the group are not charged against the budget
    /// here; the composer accounts for pre-built groups explicitly.
    pub fn add(&mut self, group: Group) {
        let slot = self.next_slot;
        self.add_at(group, slot);
    }

    /// Place a group at a configured slot, replacing any occupant.
    pub fn add_at(&mut self, group: Group, slot: usize) {
        self.slots.insert(slot, group);
        self.next_slot = self.next_slot.max(slot + 1);
    }

    pub fn has_group(&self, identifier: &Identifier) -> bool {
        self.group(identifier).is_some()
    }

    pub fn group(&self, identifier: &Identifier) -> Option<&Group> {
        self.slots.values().find(|g| &g.identifier == identifier)
    }

    fn group_mut(&mut self, identifier: &Identifier) -> Result<&mut Group> {
        self.slots
            .values_mut()
            .find(|g| &g.identifier == identifier)
            .ok_or_else(|| Error::GroupNotFound(identifier.to_string()))
    }

    /// Budget-checked insertion into a named group at `depth_from_end`
    /// (append when omitted). Returns `false` when the message does not fit;
    /// the caller decides whether that truncates or merely skips.
    pub fn insert(
        &mut self,
        message: Message,
        group_id: &Identifier,
        depth_from_end: Option<usize>,
    ) -> Result<bool> {
        // Resolve the group first so a missing target surfaces even when the
        // budget would have rejected the message anyway.
        if !self.has_group(group_id) {
            return Err(Error::GroupNotFound(group_id.to_string()));
        }
        if !self.budget.try_reserve(message.tokens) {
            debug!(
                group = %group_id,
                identifier = %message.identifier,
                cost = message.tokens,
                remaining = self.budget.remaining(),
                "message does not fit the budget, skipping"
            );
            return Ok(false);
        }
        let group = self.group_mut(group_id)?;
        match depth_from_end {
            Some(depth) => group.insert_at_depth(message, depth),
            None => group.push(message),
        }
        Ok(true)
    }

    /// Insert at index 0 of the group, regardless of prior insertion order.
    pub fn insert_at_start(&mut self, message: Message, group_id: &Identifier) -> Result<bool> {
        if !self.has_group(group_id) {
            return Err(Error::GroupNotFound(group_id.to_string()));
        }
        if !self.budget.try_reserve(message.tokens) {
            debug!(group = %group_id, identifier = %message.identifier, "start insert over budget, skipping");
            return Ok(false);
        }
        self.group_mut(group_id)?.insert_at_start(message);
        Ok(true)
    }

    pub fn insert_at_end(&mut self, message: Message, group_id: &Identifier) -> Result<bool> {
        self.insert(message, group_id, None)
    }

    /// Flatten all groups in slot order into the wire-ready list. Group
    /// identifiers never appear in the output.
    pub fn into_chat(self) -> Vec<Message> {
        self.slots
            .into_values()
            .flat_map(|g| g.messages)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, Section};

    fn msg(content: &str, tokens: u64) -> Message {
        let mut m = Message::system(content, Identifier::custom(content));
        m.tokens = tokens;
        m
    }

    #[test]
    fn test_slot_order_beats_registration_order() {
        let mut assembler = Assembler::new(Budget::unlimited());
        assembler.add_at(Group::new(Section::ChatHistory), 5);
        assembler.add_at(Group::new(Section::Main), 1);
        assembler.add(Group::new(Section::ControlPrompts));

        assembler
            .insert_at_end(msg("history", 0), &Section::ChatHistory.into())
            .unwrap();
        assembler
            .insert_at_end(msg("main", 0), &Section::Main.into())
            .unwrap();
        assembler
            .insert_at_end(msg("control", 0), &Section::ControlPrompts.into())
            .unwrap();

        let chat = assembler.into_chat();
        let order: Vec<_> = chat.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(order, ["main", "history", "control"]);
    }

    #[test]
    fn test_append_lands_after_assigned_slots() {
        let mut assembler = Assembler::new(Budget::unlimited());
        assembler.add_at(Group::new(Section::Main), 10);
        assembler.add(Group::new(Section::Bias));

        assembler
            .insert_at_end(msg("main", 0), &Section::Main.into())
            .unwrap();
        assembler
            .insert_at_end(msg("bias", 0), &Section::Bias.into())
            .unwrap();

        let order: Vec<_> = assembler
            .into_chat()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(order, ["main", "bias"]);
    }

    #[test]
    fn test_depth_insertion() {
        let mut group = Group::new(Section::Main);
        group.push(msg("a", 0));
        group.push(msg("b", 0));
        group.push(msg("c", 0));

        group.insert_at_depth(msg("x", 0), 1);
        group.insert_at_depth(msg("y", 0), 100);

        let order: Vec<_> = group.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(order, ["y", "a", "b", "x", "c"]);
    }

    #[test]
    fn test_insert_respects_budget() {
        let mut assembler = Assembler::new(Budget::new(5));
        assembler.add(Group::new(Section::ChatHistory));

        assert!(
            assembler
                .insert_at_end(msg("fits", 5), &Section::ChatHistory.into())
                .unwrap()
        );
        assert!(
            !assembler
                .insert_at_end(msg("rejected", 1), &Section::ChatHistory.into())
                .unwrap()
        );
        assert_eq!(
            assembler.group(&Section::ChatHistory.into()).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_missing_group_is_an_error() {
        let mut assembler = Assembler::new(Budget::unlimited());
        let err = assembler
            .insert_at_end(msg("orphan", 0), &Section::Main.into())
            .unwrap_err();
        assert!(matches!(err, Error::GroupNotFound(_)));
    }

    #[test]
    fn test_insert_at_start_ignores_call_order() {
        let mut assembler = Assembler::new(Budget::unlimited());
        assembler.add(Group::new(Section::ChatHistory));
        let id: Identifier = Section::ChatHistory.into();

        assembler.insert_at_end(msg("first", 0), &id).unwrap();
        assembler.insert_at_end(msg("second", 0), &id).unwrap();
        assembler.insert_at_start(msg("banner", 0), &id).unwrap();

        let order: Vec<_> = assembler
            .into_chat()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(order, ["banner", "first", "second"]);
    }

    #[test]
    fn test_role_survives_flattening() {
        let mut assembler = Assembler::new(Budget::unlimited());
        assembler.add(Group::new(Section::ChatHistory));
        assembler
            .insert_at_end(
                Message::new(Role::Assistant, "hi", Identifier::custom("chatHistory-1")),
                &Section::ChatHistory.into(),
            )
            .unwrap();

        let chat = assembler.into_chat();
        assert_eq!(chat[0].role, Role::Assistant);
    }
}
