//! Atomic write batches

use chrono::{DateTime, Utc};

use crate::models::{
    Channel, Conversation, ConversationId, ConversationPriority, ConversationStatus,
    EmailAddress, Message,
};

/// How a merge-write changes the stored unread count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreadUpdate {
    /// Add to the stored count
    Increment(u32),
    /// Recompute from the conversation's unread messages after the
    /// batch's message writes are applied
    Recount,
}

/// Merge-write of one conversation
///
/// Overwrites customer, subject, channel and last-message time. Status and
/// priority are left alone on existing conversations and default to
/// `open` / `normal` on new ones.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationMerge {
    pub id: ConversationId,
    pub customer: EmailAddress,
    pub subject: String,
    pub channel: Channel,
    pub unread: UnreadUpdate,
    pub last_message_at: DateTime<Utc>,
}

impl ConversationMerge {
    /// Merge into an existing document (if any), producing the new document.
    ///
    /// Under [`UnreadUpdate::Recount`] the stored count is carried over;
    /// the store recounts once messages are written.
    pub fn merge_into(&self, existing: Option<&Conversation>, now: DateTime<Utc>) -> Conversation {
        let previous_unread = existing.map(|c| c.unread_count).unwrap_or(0);
        let unread_count = match self.unread {
            UnreadUpdate::Increment(n) => previous_unread.saturating_add(n),
            UnreadUpdate::Recount => previous_unread,
        };

        Conversation {
            id: self.id.clone(),
            customer_name: self.customer.name.clone(),
            customer_email: self.customer.email.clone(),
            subject: self.subject.clone(),
            channel: self.channel,
            status: existing
                .map(|c| c.status)
                .unwrap_or(ConversationStatus::Open),
            priority: existing
                .map(|c| c.priority)
                .unwrap_or(ConversationPriority::Normal),
            unread_count,
            last_message_at: self.last_message_at,
            updated_at: now,
        }
    }
}

/// A set of writes committed together
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    conversations: Vec<ConversationMerge>,
    messages: Vec<Message>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a conversation merge-write
    pub fn merge_conversation(&mut self, merge: ConversationMerge) -> &mut Self {
        self.conversations.push(merge);
        self
    }

    /// Queue a full message write (same id replaces the stored document)
    pub fn set_message(&mut self, message: Message) -> &mut Self {
        self.messages.push(message);
        self
    }

    pub fn conversations(&self) -> &[ConversationMerge] {
        &self.conversations
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Total number of queued writes
    pub fn len(&self) -> usize {
        self.conversations.len() + self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty() && self.messages.is_empty()
    }

    /// Whether the batch merges the given conversation
    pub fn touches_conversation(&self, id: &ConversationId) -> bool {
        self.conversations.iter().any(|c| &c.id == id)
    }

    /// Conversations whose unread count must be recomputed after commit
    pub fn recount_targets(&self) -> impl Iterator<Item = &ConversationId> {
        self.conversations
            .iter()
            .filter(|c| c.unread == UnreadUpdate::Recount)
            .map(|c| &c.id)
    }
}
