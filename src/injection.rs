//! Depth-addressed directive entries and their resolution against history.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::types::Role;

/// One injection instruction addressed to a point in chat history.
///
/// Depth 0 is the most recent history message. A `None` role matches any
/// history message at the addressed depth. Entries are one-shot: once
/// claimed, an entry never matches again within the same composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectionEntry {
    pub depth: usize,
    #[serde(default)]
    pub role: Option<Role>,
    pub instructions: Vec<String>,
}

impl InjectionEntry {
    pub fn new(depth: usize, role: impl Into<Option<Role>>, instructions: Vec<String>) -> Self {
        Self {
            depth,
            role: role.into(),
            instructions,
        }
    }

    fn joined(&self) -> String {
        self.instructions.join("\n")
    }
}

/// The three directive lists an external collaborator supplies per
/// composition: depth-addressed entries plus flat banner strings for the top
/// and bottom of the dialogue-examples group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectiveBatch {
    #[serde(default)]
    pub depth_entries: Vec<InjectionEntry>,
    #[serde(default)]
    pub top_entries: Vec<String>,
    #[serde(default)]
    pub bottom_entries: Vec<String>,
}

impl DirectiveBatch {
    pub fn is_empty(&self) -> bool {
        self.depth_entries.is_empty() && self.top_entries.is_empty() && self.bottom_entries.is_empty()
    }
}

/// Matches depth entries to history messages with the documented fallback
/// cascade, and flushes whatever went unmatched.
#[derive(Debug)]
pub struct InjectionResolver {
    entries: Vec<InjectionEntry>,
    consumed: Vec<bool>,
    // Entry indices per depth, in supplied order; keeps each claim a scan of
    // only the candidates at the addressed depth.
    by_depth: AHashMap<usize, Vec<usize>>,
}

impl InjectionResolver {
    pub fn new(entries: Vec<InjectionEntry>) -> Self {
        let mut by_depth: AHashMap<usize, Vec<usize>> = AHashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            by_depth.entry(entry.depth).or_default().push(i);
        }
        let consumed = vec![false; entries.len()];
        Self {
            entries,
            consumed,
            by_depth,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Locate the entry that would serve the history message at `depth`
    /// with `role`, without consuming it. Returns the entry's index and its
    /// newline-joined instructions.
    ///
    /// Precedence, preserved exactly as documented:
    /// 1. exact `(depth, role)` match;
    /// 2. role-agnostic entry at the same depth;
    /// 3. only at depth 0: any entry addressed to depth 1 (off-by-one
    ///    compensation for entries authored against the pre-reply length);
    /// 4. any entry at the same depth regardless of its declared role.
    ///
    /// Whether stage 4 is intended behavior or bug-masking in the system
    /// this reimplements is unresolved; it is kept because tightening it
    /// would silently drop entries that currently land.
    pub fn peek(&self, depth: usize, role: Role) -> Option<(usize, String)> {
        let i = self
            .find_at(depth, |e| e.role == Some(role))
            .or_else(|| self.find_at(depth, |e| e.role.is_none()))
            .or_else(|| (depth == 0).then(|| self.find_at(1, |_| true)).flatten())
            .or_else(|| self.find_at(depth, |_| true))?;
        Some((i, self.entries[i].joined()))
    }

    /// Mark an entry returned by [`InjectionResolver::peek`] as consumed.
    /// Callers defer this until the entry's injection message has actually
    /// been placed, so anything that fails to land is recovered by
    /// [`InjectionResolver::flush`].
    pub fn consume(&mut self, index: usize) {
        self.consumed[index] = true;
    }

    /// [`InjectionResolver::peek`] and consume in one step.
    pub fn claim(&mut self, depth: usize, role: Role) -> Option<String> {
        let (i, text) = self.peek(depth, role)?;
        self.consume(i);
        Some(text)
    }

    /// Drain entry instructions in supplied order. With `include_consumed`
    /// every entry is returned (the empty-history path re-emits even already
    /// claimed entries); otherwise only unclaimed ones. All returned entries
    /// are marked consumed.
    pub fn flush(&mut self, include_consumed: bool) -> Vec<String> {
        let mut out = Vec::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.instructions.is_empty() {
                continue;
            }
            if include_consumed || !self.consumed[i] {
                out.push(entry.joined());
                self.consumed[i] = true;
            }
        }
        out
    }

    fn find_at(&self, depth: usize, pred: impl Fn(&InjectionEntry) -> bool) -> Option<usize> {
        self.by_depth.get(&depth)?.iter().copied().find(|&i| {
            !self.consumed[i] && pred(&self.entries[i])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(depth: usize, role: Option<Role>, text: &str) -> InjectionEntry {
        InjectionEntry::new(depth, role, vec![text.to_string()])
    }

    #[test]
    fn test_exact_match_wins() {
        let mut resolver = InjectionResolver::new(vec![
            entry(2, None, "agnostic"),
            entry(2, Some(Role::User), "exact"),
        ]);
        assert_eq!(resolver.claim(2, Role::User).as_deref(), Some("exact"));
    }

    #[test]
    fn test_role_agnostic_fallback() {
        let mut resolver = InjectionResolver::new(vec![
            entry(2, Some(Role::Assistant), "wrong role"),
            entry(2, None, "agnostic"),
        ]);
        assert_eq!(resolver.claim(2, Role::User).as_deref(), Some("agnostic"));
    }

    #[test]
    fn test_depth_zero_accepts_depth_one() {
        let mut resolver =
            InjectionResolver::new(vec![entry(1, Some(Role::Assistant), "off by one")]);
        assert_eq!(resolver.claim(0, Role::User).as_deref(), Some("off by one"));
    }

    #[test]
    fn test_any_role_last_resort() {
        let mut resolver = InjectionResolver::new(vec![entry(3, Some(Role::Assistant), "any")]);
        assert_eq!(resolver.claim(3, Role::User).as_deref(), Some("any"));
    }

    #[test]
    fn test_peek_leaves_entry_unconsumed() {
        let mut resolver = InjectionResolver::new(vec![entry(0, Some(Role::User), "keep")]);
        assert!(resolver.peek(0, Role::User).is_some());
        // Never consumed, so the flush still carries it.
        assert_eq!(resolver.flush(false), vec!["keep".to_string()]);
    }

    #[test]
    fn test_one_shot_consumption() {
        let mut resolver = InjectionResolver::new(vec![entry(0, Some(Role::Assistant), "once")]);
        assert!(resolver.claim(0, Role::Assistant).is_some());
        assert!(resolver.claim(0, Role::Assistant).is_none());
    }

    #[test]
    fn test_flush_unconsumed_only() {
        let mut resolver = InjectionResolver::new(vec![
            entry(0, Some(Role::User), "claimed"),
            entry(5, None, "stranded"),
        ]);
        resolver.claim(0, Role::User).unwrap();

        assert_eq!(resolver.flush(false), vec!["stranded".to_string()]);
        // A second flush finds nothing left.
        assert!(resolver.flush(false).is_empty());
    }

    #[test]
    fn test_flush_all_includes_consumed() {
        let mut resolver = InjectionResolver::new(vec![
            entry(0, Some(Role::User), "claimed"),
            entry(5, None, "stranded"),
        ]);
        resolver.claim(0, Role::User).unwrap();

        assert_eq!(
            resolver.flush(true),
            vec!["claimed".to_string(), "stranded".to_string()]
        );
    }

    #[test]
    fn test_instructions_join_with_newlines() {
        let mut resolver = InjectionResolver::new(vec![InjectionEntry::new(
            0,
            None,
            vec!["first".into(), "second".into()],
        )]);
        assert_eq!(
            resolver.claim(0, Role::User).as_deref(),
            Some("first\nsecond")
        );
    }
}
