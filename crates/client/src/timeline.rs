//! Local ordered message list of one conversation

use chatdesk_shared::{Message, MessageId};
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct Timeline {
    entries: Vec<Message>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.entries
    }

    pub fn texts(&self) -> Vec<String> {
        self.entries.iter().map(|m| m.message.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.entries.iter().any(|m| &m.id == id)
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.entries.iter().position(|m| &m.id == id)
    }

    pub fn push_optimistic(&mut self, message: Message) {
        self.entries.push(message);
    }

    /// Swap the optimistic entry for the stored message, keeping its position.
    /// If the stored message is already listed (a refetch got there first),
    /// the optimistic entry is simply dropped.
    pub fn confirm(&mut self, temp_id: &MessageId, canonical: Message) {
        if self.contains(&canonical.id) {
            self.remove(temp_id);
            return;
        }
        match self.position(temp_id) {
            Some(index) => self.entries[index] = canonical,
            None => self.entries.push(canonical),
        }
    }

    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let index = self.position(id)?;
        Some(self.entries.remove(index))
    }

    /// Append a message pushed by the other side. Duplicates by id are ignored.
    pub fn append_remote(&mut self, message: Message) -> bool {
        if self.contains(&message.id) {
            return false;
        }
        self.entries.push(message);
        true
    }

    /// Replace everything durable with the store's history, sorted by server
    /// timestamp. Entries still in flight stay after the history in their
    /// current order, as do durable entries newer than the fetched history.
    pub fn replace_history(&mut self, mut history: Vec<Message>) {
        history.sort_by_key(|m| m.timestamp);
        let mut seen = HashSet::new();
        history.retain(|m| seen.insert(m.id.clone()));

        let newest = history.last().map(|m| m.timestamp);
        let carried: Vec<Message> = self
            .entries
            .drain(..)
            .filter(|m| !seen.contains(&m.id))
            .filter(|m| {
                m.id.is_temporary() || newest.map(|ts| m.timestamp > ts).unwrap_or(true)
            })
            .collect();

        history.extend(carried);
        self.entries = history;
    }
}
