//! In-memory storage implementation
//!
//! Used by tests and local development. A whole batch is validated before
//! anything is applied, and the write lock is held for the duration of the
//! commit, so readers never observe half a batch.

use anyhow::{Result, bail};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{MailStore, WriteBatch};
use crate::models::{
    Conversation, ConversationId, ConversationPriority, ConversationStatus, MailCredential,
    Message, MessageId, TenantId,
};

/// Documents of a single tenant
#[derive(Default)]
struct TenantData {
    credential: Option<MailCredential>,
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<MessageId, Message>,
}

impl TenantData {
    fn unread_in(&self, id: &ConversationId) -> usize {
        self.messages
            .values()
            .filter(|m| &m.conversation_id == id && !m.is_read)
            .count()
    }
}

/// In-memory implementation of MailStore
pub struct InMemoryMailStore {
    tenants: RwLock<HashMap<TenantId, TenantData>>,
    /// When set, every commit fails with this reason
    fail_commits: Mutex<Option<String>>,
    commits: AtomicUsize,
}

impl InMemoryMailStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
            fail_commits: Mutex::new(None),
            commits: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent commit fail (simulates a database outage)
    pub fn fail_commits_with(&self, reason: impl Into<String>) {
        *self.fail_commits.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
    }

    /// Number of successfully applied batches
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<TenantId, TenantData>> {
        self.tenants.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TenantId, TenantData>> {
        self.tenants.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryMailStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MailStore for InMemoryMailStore {
    fn get_credential(&self, tenant: &TenantId) -> Result<Option<MailCredential>> {
        Ok(self.read().get(tenant).and_then(|t| t.credential.clone()))
    }

    fn save_credential(&self, tenant: &TenantId, credential: MailCredential) -> Result<()> {
        self.write().entry(tenant.clone()).or_default().credential = Some(credential);
        Ok(())
    }

    fn delete_credential(&self, tenant: &TenantId) -> Result<()> {
        if let Some(data) = self.write().get_mut(tenant) {
            data.credential = None;
        }
        Ok(())
    }

    fn commit(&self, tenant: &TenantId, batch: WriteBatch) -> Result<()> {
        let mut tenants = self.write();

        if let Some(reason) = self
            .fail_commits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            bail!("commit failed: {}", reason);
        }

        // Validate the whole batch before touching anything
        let data = tenants.entry(tenant.clone()).or_default();
        for message in batch.messages() {
            if !batch.touches_conversation(&message.conversation_id)
                && !data.conversations.contains_key(&message.conversation_id)
            {
                bail!(
                    "message {} references unknown conversation {}",
                    message.id.as_str(),
                    message.conversation_id.as_str()
                );
            }
        }

        let now = Utc::now();
        for merge in batch.conversations() {
            let merged = merge.merge_into(data.conversations.get(&merge.id), now);
            data.conversations.insert(merge.id.clone(), merged);
        }

        for message in batch.messages() {
            data.messages.insert(message.id.clone(), message.clone());
        }

        for id in batch.recount_targets() {
            let unread = data.unread_in(id) as u32;
            if let Some(conversation) = data.conversations.get_mut(id) {
                conversation.unread_count = unread;
            }
        }

        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_conversation(
        &self,
        tenant: &TenantId,
        id: &ConversationId,
    ) -> Result<Option<Conversation>> {
        Ok(self
            .read()
            .get(tenant)
            .and_then(|t| t.conversations.get(id).cloned()))
    }

    fn get_message(&self, tenant: &TenantId, id: &MessageId) -> Result<Option<Message>> {
        Ok(self.read().get(tenant).and_then(|t| t.messages.get(id).cloned()))
    }

    fn list_conversations(
        &self,
        tenant: &TenantId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Conversation>> {
        let tenants = self.read();
        let Some(data) = tenants.get(tenant) else {
            return Ok(Vec::new());
        };

        let mut list: Vec<_> = data.conversations.values().cloned().collect();
        list.sort_by(|a, b| {
            b.last_message_at
                .cmp(&a.last_message_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(list.into_iter().skip(offset).take(limit).collect())
    }

    fn list_messages_for_conversation(
        &self,
        tenant: &TenantId,
        id: &ConversationId,
    ) -> Result<Vec<Message>> {
        let tenants = self.read();
        let Some(data) = tenants.get(tenant) else {
            return Ok(Vec::new());
        };

        let mut result: Vec<_> = data
            .messages
            .values()
            .filter(|m| &m.conversation_id == id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(result)
    }

    fn count_unread_messages(&self, tenant: &TenantId, id: &ConversationId) -> Result<usize> {
        Ok(self.read().get(tenant).map(|t| t.unread_in(id)).unwrap_or(0))
    }

    fn count_conversations(&self, tenant: &TenantId) -> Result<usize> {
        Ok(self.read().get(tenant).map(|t| t.conversations.len()).unwrap_or(0))
    }

    fn count_messages(&self, tenant: &TenantId) -> Result<usize> {
        Ok(self.read().get(tenant).map(|t| t.messages.len()).unwrap_or(0))
    }

    fn update_triage(
        &self,
        tenant: &TenantId,
        id: &ConversationId,
        status: Option<ConversationStatus>,
        priority: Option<ConversationPriority>,
    ) -> Result<bool> {
        let mut tenants = self.write();
        let Some(conversation) = tenants
            .get_mut(tenant)
            .and_then(|t| t.conversations.get_mut(id))
        else {
            return Ok(false);
        };

        if let Some(status) = status {
            conversation.status = status;
        }
        if let Some(priority) = priority {
            conversation.priority = priority;
        }
        conversation.updated_at = Utc::now();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Channel, EmailAddress};
    use crate::storage::{ConversationMerge, UnreadUpdate};
    use chrono::{DateTime, Duration};

    fn tenant() -> TenantId {
        TenantId::new("tenant-1")
    }

    fn message(id: &str, thread: &str, is_read: bool, at: DateTime<Utc>) -> Message {
        Message::builder(MessageId::new(id), ConversationId::new(thread))
            .sender(EmailAddress::new("Jane", "jane@example.com"))
            .is_read(is_read)
            .internal_date(at.timestamp_millis())
            .build()
    }

    fn merge(thread: &str, unread: UnreadUpdate, at: DateTime<Utc>) -> ConversationMerge {
        ConversationMerge {
            id: ConversationId::new(thread),
            customer: EmailAddress::new("Jane", "jane@example.com"),
            subject: format!("Subject {}", thread),
            channel: Channel::Email,
            unread,
            last_message_at: at,
        }
    }

    #[test]
    fn test_credential_crud() {
        let store = InMemoryMailStore::new();
        assert!(store.get_credential(&tenant()).unwrap().is_none());

        store
            .save_credential(&tenant(), MailCredential::new("rt").with_email("me@acme.io"))
            .unwrap();
        let cred = store.get_credential(&tenant()).unwrap().unwrap();
        assert_eq!(cred.email.as_deref(), Some("me@acme.io"));

        store.delete_credential(&tenant()).unwrap();
        assert!(store.get_credential(&tenant()).unwrap().is_none());
    }

    #[test]
    fn test_commit_and_recount() {
        let store = InMemoryMailStore::new();
        let now = Utc::now();

        let mut batch = WriteBatch::new();
        batch.merge_conversation(merge("t1", UnreadUpdate::Recount, now));
        batch.set_message(message("m1", "t1", false, now));
        batch.set_message(message("m2", "t1", true, now));
        store.commit(&tenant(), batch).unwrap();

        let conv = store
            .get_conversation(&tenant(), &ConversationId::new("t1"))
            .unwrap()
            .unwrap();
        assert_eq!(conv.unread_count, 1);
        assert_eq!(store.count_messages(&tenant()).unwrap(), 2);
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn test_failed_commit_writes_nothing() {
        let store = InMemoryMailStore::new();
        store.fail_commits_with("disk full");

        let mut batch = WriteBatch::new();
        batch.merge_conversation(merge("t1", UnreadUpdate::Increment(1), Utc::now()));
        batch.set_message(message("m1", "t1", false, Utc::now()));

        let err = store.commit(&tenant(), batch).unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert_eq!(store.count_conversations(&tenant()).unwrap(), 0);
        assert_eq!(store.count_messages(&tenant()).unwrap(), 0);
        assert_eq!(store.commit_count(), 0);
    }

    #[test]
    fn test_orphan_message_rejects_batch() {
        let store = InMemoryMailStore::new();

        let mut batch = WriteBatch::new();
        batch.merge_conversation(merge("t1", UnreadUpdate::Increment(1), Utc::now()));
        batch.set_message(message("m1", "t1", false, Utc::now()));
        batch.set_message(message("m2", "missing", false, Utc::now()));

        assert!(store.commit(&tenant(), batch).is_err());
        assert_eq!(store.count_conversations(&tenant()).unwrap(), 0);
        assert_eq!(store.count_messages(&tenant()).unwrap(), 0);
    }

    #[test]
    fn test_list_conversations_newest_first() {
        let store = InMemoryMailStore::new();
        let now = Utc::now();

        let mut batch = WriteBatch::new();
        batch.merge_conversation(merge("old", UnreadUpdate::Recount, now - Duration::hours(2)));
        batch.merge_conversation(merge("new", UnreadUpdate::Recount, now));
        store.commit(&tenant(), batch).unwrap();

        let list = store.list_conversations(&tenant(), 10, 0).unwrap();
        assert_eq!(list[0].id.as_str(), "new");
        assert_eq!(list[1].id.as_str(), "old");

        let page = store.list_conversations(&tenant(), 1, 1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id.as_str(), "old");
    }

    #[test]
    fn test_tenants_are_isolated() {
        let store = InMemoryMailStore::new();
        let mut batch = WriteBatch::new();
        batch.merge_conversation(merge("t1", UnreadUpdate::Recount, Utc::now()));
        store.commit(&tenant(), batch).unwrap();

        let other = TenantId::new("tenant-2");
        assert_eq!(store.count_conversations(&other).unwrap(), 0);
        assert!(store
            .get_conversation(&other, &ConversationId::new("t1"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_update_triage() {
        let store = InMemoryMailStore::new();
        let id = ConversationId::new("t1");
        assert!(!store
            .update_triage(&tenant(), &id, Some(ConversationStatus::Closed), None)
            .unwrap());

        let mut batch = WriteBatch::new();
        batch.merge_conversation(merge("t1", UnreadUpdate::Recount, Utc::now()));
        store.commit(&tenant(), batch).unwrap();

        assert!(store
            .update_triage(&tenant(), &id, Some(ConversationStatus::Pending), Some(ConversationPriority::High))
            .unwrap());
        let conv = store.get_conversation(&tenant(), &id).unwrap().unwrap();
        assert_eq!(conv.status, ConversationStatus::Pending);
        assert_eq!(conv.priority, ConversationPriority::High);
    }
}
