//! Per-thread aggregation of one sync pass

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::config::UnreadCountMode;
use crate::models::{Channel, ConversationId, EmailAddress, Message};
use crate::storage::{ConversationMerge, UnreadUpdate};

#[derive(Debug, Clone)]
struct ThreadEntry {
    id: ConversationId,
    customer: EmailAddress,
    subject: String,
    unread: u32,
    last_message_at: DateTime<Utc>,
}

/// Conversation fields accumulated from the messages of one pass
///
/// Entries keep first-seen order. Subject and customer follow the last
/// recorded message, `last_message_at` is the max over recorded messages.
#[derive(Debug)]
pub struct ThreadAccumulator {
    capacity: usize,
    index: HashMap<ConversationId, usize>,
    entries: Vec<ThreadEntry>,
}

impl ThreadAccumulator {
    /// One pass touches at most `capacity` threads (the listed message count)
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            index: HashMap::with_capacity(capacity),
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Fold a message into its thread's entry.
    ///
    /// Returns false, recording nothing, if the message opens a new thread
    /// while the accumulator is full.
    pub fn record(&mut self, message: &Message) -> bool {
        if let Some(&slot) = self.index.get(&message.conversation_id) {
            let entry = &mut self.entries[slot];
            entry.customer = message.sender.clone();
            entry.subject = message.subject.clone();
            if !message.is_read {
                entry.unread = entry.unread.saturating_add(1);
            }
            if message.created_at > entry.last_message_at {
                entry.last_message_at = message.created_at;
            }
            return true;
        }

        if self.entries.len() >= self.capacity {
            return false;
        }

        self.index
            .insert(message.conversation_id.clone(), self.entries.len());
        self.entries.push(ThreadEntry {
            id: message.conversation_id.clone(),
            customer: message.sender.clone(),
            subject: message.subject.clone(),
            unread: u32::from(!message.is_read),
            last_message_at: message.created_at,
        });
        true
    }

    /// Number of distinct threads recorded
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Turn the entries into conversation merge-writes
    pub fn into_merges(self, mode: UnreadCountMode) -> Vec<ConversationMerge> {
        self.entries
            .into_iter()
            .map(|entry| ConversationMerge {
                id: entry.id,
                customer: entry.customer,
                subject: entry.subject,
                channel: Channel::Email,
                unread: match mode {
                    UnreadCountMode::Accumulate => UnreadUpdate::Increment(entry.unread),
                    UnreadCountMode::Recount => UnreadUpdate::Recount,
                },
                last_message_at: entry.last_message_at,
            })
            .collect()
    }
}
