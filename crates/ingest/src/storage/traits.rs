//! Storage trait definitions

use anyhow::Result;

use super::WriteBatch;
use crate::models::{
    Conversation, ConversationId, ConversationPriority, ConversationStatus, MailCredential,
    Message, MessageId, TenantId,
};

/// Per-tenant document store for credentials, conversations and messages
///
/// Every method is scoped to a tenant; no call can observe another
/// tenant's documents.
pub trait MailStore: Send + Sync {
    /// Get the stored mail-provider credential of a tenant
    fn get_credential(&self, tenant: &TenantId) -> Result<Option<MailCredential>>;

    /// Insert or replace a tenant's credential
    fn save_credential(&self, tenant: &TenantId, credential: MailCredential) -> Result<()>;

    /// Remove a tenant's credential (mailbox disconnected)
    fn delete_credential(&self, tenant: &TenantId) -> Result<()>;

    /// Apply every write in the batch, or none of them
    fn commit(&self, tenant: &TenantId, batch: WriteBatch) -> Result<()>;

    /// Get a conversation by ID
    fn get_conversation(&self, tenant: &TenantId, id: &ConversationId)
    -> Result<Option<Conversation>>;

    /// Get a message by ID
    fn get_message(&self, tenant: &TenantId, id: &MessageId) -> Result<Option<Message>>;

    /// List conversations, ordered by last_message_at descending
    fn list_conversations(
        &self,
        tenant: &TenantId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Conversation>>;

    /// List messages of a conversation, ordered by created_at ascending
    fn list_messages_for_conversation(
        &self,
        tenant: &TenantId,
        id: &ConversationId,
    ) -> Result<Vec<Message>>;

    /// Count messages of a conversation with `is_read == false`
    fn count_unread_messages(&self, tenant: &TenantId, id: &ConversationId) -> Result<usize>;

    /// Count conversations of a tenant
    fn count_conversations(&self, tenant: &TenantId) -> Result<usize>;

    /// Count messages of a tenant
    fn count_messages(&self, tenant: &TenantId) -> Result<usize>;

    /// Dashboard triage: change status and/or priority of a conversation.
    ///
    /// Returns false if the conversation does not exist.
    fn update_triage(
        &self,
        tenant: &TenantId,
        id: &ConversationId,
        status: Option<ConversationStatus>,
        priority: Option<ConversationPriority>,
    ) -> Result<bool>;
}
