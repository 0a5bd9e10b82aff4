//! Per-user conversation windows.
//!
//! Each user keeps only the most recent entries; older ones fall off the
//! front. Nothing is persisted.

use std::collections::{HashMap, VecDeque};

use crate::llm::ChatEntry;

/// Entries kept per user.
pub const HISTORY_LIMIT: usize = 5;

/// Bounded history keyed by user id.
pub struct ConversationStore {
    limit: usize,
    histories: HashMap<u64, VecDeque<ChatEntry>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::with_limit(HISTORY_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            histories: HashMap::new(),
        }
    }

    /// Append an entry, dropping the oldest ones past the limit.
    pub fn push(&mut self, user_id: u64, entry: ChatEntry) {
        let history = self.histories.entry(user_id).or_default();
        history.push_back(entry);
        while history.len() > self.limit {
            history.pop_front();
        }
    }

    /// Copy of the user's window, oldest first.
    pub fn window(&self, user_id: u64) -> Vec<ChatEntry> {
        self.histories
            .get(&user_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn len(&self, user_id: u64) -> usize {
        self.histories.get(&user_id).map_or(0, VecDeque::len)
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}
