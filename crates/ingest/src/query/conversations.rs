//! Conversation query functions

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{
    Channel, Conversation, ConversationId, ConversationPriority, ConversationStatus, Message,
    TenantId,
};
use crate::storage::MailStore;

/// Largest page the dashboard may request
pub const MAX_PAGE_SIZE: usize = 100;

/// Summary information for displaying a conversation in a list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub customer_name: String,
    pub customer_email: String,
    pub subject: String,
    pub channel: Channel,
    pub status: ConversationStatus,
    pub priority: ConversationPriority,
    pub unread_count: u32,
    /// Timestamp of the most recent message
    pub last_message_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationSummary {
    fn from(conversation: Conversation) -> Self {
        Self {
            id: conversation.id,
            customer_name: conversation.customer_name,
            customer_email: conversation.customer_email,
            subject: conversation.subject,
            channel: conversation.channel,
            status: conversation.status,
            priority: conversation.priority,
            unread_count: conversation.unread_count,
            last_message_at: conversation.last_message_at,
        }
    }
}

/// A conversation with all of its stored messages
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    pub conversation: Conversation,
    /// Ordered chronologically
    pub messages: Vec<Message>,
}

/// List a tenant's conversations, newest activity first
///
/// `limit` is clamped to `1..=MAX_PAGE_SIZE`.
pub fn list_conversations(
    store: &dyn MailStore,
    tenant: &TenantId,
    limit: usize,
    offset: usize,
) -> Result<Vec<ConversationSummary>> {
    let conversations = store.list_conversations(tenant, limit.clamp(1, MAX_PAGE_SIZE), offset)?;
    Ok(conversations
        .into_iter()
        .map(ConversationSummary::from)
        .collect())
}

/// Get a conversation and its messages
pub fn get_conversation_detail(
    store: &dyn MailStore,
    tenant: &TenantId,
    id: &ConversationId,
) -> Result<Option<ConversationDetail>> {
    let conversation = match store.get_conversation(tenant, id)? {
        Some(c) => c,
        None => return Ok(None),
    };

    let messages = store.list_messages_for_conversation(tenant, id)?;

    Ok(Some(ConversationDetail {
        conversation,
        messages,
    }))
}
