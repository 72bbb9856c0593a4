//! Append-only conversation log.

use chrono::Utc;

use crate::types::{Message, Reply};

/// Ordered record of every message in a run.
///
/// `append` is the only mutator; messages are never edited or reordered once
/// stored.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    next_sequence: u64,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_sequence: 1,
        }
    }

    /// Stamp a reply with its source and the next sequence number, store it,
    /// and return the stored message.
    pub fn append(&mut self, source: impl Into<String>, reply: Reply) -> &Message {
        let message = Message {
            source: source.into(),
            kind: reply.kind,
            content: reply.content,
            sequence: self.next_sequence.max(1),
            timestamp: Utc::now(),
        };
        self.next_sequence = message.sequence + 1;
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// Sequence number the next appended message will receive.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence.max(1)
    }

    /// Get all messages.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last `k` messages.
    pub fn tail(&self, k: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(k);
        &self.messages[start..]
    }

    /// Most recently appended message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Owned copy of the history, handed to participants at turn start.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub(crate) fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
