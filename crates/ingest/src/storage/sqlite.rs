//! SQLite-based mail storage
//!
//! Each tenant's documents live in shared tables keyed by `tenant_id`.
//! A [`WriteBatch`] is applied inside a single transaction.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::batch::UnreadUpdate;
use super::traits::MailStore;
use super::WriteBatch;
use crate::models::{
    Channel, Conversation, ConversationId, ConversationPriority, ConversationStatus,
    DeliveryStatus, Direction, EmailAddress, MailCredential, Message, MessageId, TenantId,
};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- OAuth credential per tenant, written by the connect flow
            CREATE TABLE mail_credentials (
                tenant_id TEXT PRIMARY KEY,
                email TEXT,
                refresh_token TEXT,
                access_token TEXT,
                expires_at INTEGER,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE conversations (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                customer_name TEXT NOT NULL,
                customer_email TEXT NOT NULL,
                subject TEXT NOT NULL,
                channel TEXT NOT NULL DEFAULT 'email',
                status TEXT NOT NULL DEFAULT 'open',
                priority TEXT NOT NULL DEFAULT 'normal',
                unread_count INTEGER NOT NULL DEFAULT 0,
                last_message_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (tenant_id, id)
            );

            CREATE INDEX idx_conversations_last_message_at
                ON conversations(tenant_id, last_message_at DESC);

            CREATE TABLE messages (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                conversation_id TEXT NOT NULL,
                direction TEXT NOT NULL,
                sender_name TEXT NOT NULL,
                sender_email TEXT NOT NULL,
                subject TEXT NOT NULL,
                content TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                internal_date INTEGER NOT NULL,
                PRIMARY KEY (tenant_id, id),
                FOREIGN KEY (tenant_id, conversation_id)
                    REFERENCES conversations(tenant_id, id) ON DELETE CASCADE
            );

            CREATE INDEX idx_messages_conversation
                ON messages(tenant_id, conversation_id, created_at ASC);
            "#,
        ),
        // Migration 2: Partial index backing unread recounts
        M::up(
            r#"
            CREATE INDEX idx_messages_unread
                ON messages(tenant_id, conversation_id) WHERE is_read = 0;
            "#,
        ),
    ])
}

const CONVERSATION_COLUMNS: &str = "id, customer_name, customer_email, subject, channel, status,
     priority, unread_count, last_message_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, direction, sender_name, sender_email, subject,
     content, is_read, status, created_at, internal_date";

// Upserts use ON CONFLICT DO UPDATE: INSERT OR REPLACE deletes the old row
// first, which would cascade into the conversation's messages.
const UPSERT_CONVERSATION_INCREMENT: &str = "INSERT INTO conversations
     (tenant_id, id, customer_name, customer_email, subject, channel,
      unread_count, last_message_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
     ON CONFLICT(tenant_id, id) DO UPDATE SET
        customer_name = excluded.customer_name,
        customer_email = excluded.customer_email,
        subject = excluded.subject,
        channel = excluded.channel,
        unread_count = conversations.unread_count + excluded.unread_count,
        last_message_at = excluded.last_message_at,
        updated_at = excluded.updated_at";

const UPSERT_CONVERSATION_KEEP_UNREAD: &str = "INSERT INTO conversations
     (tenant_id, id, customer_name, customer_email, subject, channel,
      unread_count, last_message_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
     ON CONFLICT(tenant_id, id) DO UPDATE SET
        customer_name = excluded.customer_name,
        customer_email = excluded.customer_email,
        subject = excluded.subject,
        channel = excluded.channel,
        last_message_at = excluded.last_message_at,
        updated_at = excluded.updated_at";

const UPSERT_MESSAGE: &str = "INSERT INTO messages
     (tenant_id, id, conversation_id, direction, sender_name, sender_email, subject,
      content, is_read, status, created_at, internal_date)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
     ON CONFLICT(tenant_id, id) DO UPDATE SET
        conversation_id = excluded.conversation_id,
        direction = excluded.direction,
        sender_name = excluded.sender_name,
        sender_email = excluded.sender_email,
        subject = excluded.subject,
        content = excluded.content,
        is_read = excluded.is_read,
        status = excluded.status,
        created_at = excluded.created_at,
        internal_date = excluded.internal_date";

const RECOUNT_UNREAD: &str = "UPDATE conversations SET unread_count = (
        SELECT COUNT(*) FROM messages
        WHERE tenant_id = ?1 AND conversation_id = ?2 AND is_read = 0
     )
     WHERE tenant_id = ?1 AND id = ?2";

/// Format a timestamp so lexical order matches chronological order
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Read an RFC 3339 column; a corrupt value fails the whole row
fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let channel: String = row.get(4)?;
    let status: String = row.get(5)?;
    let priority: String = row.get(6)?;

    Ok(Conversation {
        id: ConversationId::new(row.get::<_, String>(0)?),
        customer_name: row.get(1)?,
        customer_email: row.get(2)?,
        subject: row.get(3)?,
        channel: Channel::parse(&channel).unwrap_or(Channel::Email),
        status: ConversationStatus::parse(&status).unwrap_or_default(),
        priority: ConversationPriority::parse(&priority).unwrap_or_default(),
        unread_count: row.get::<_, i64>(7)?.max(0) as u32,
        last_message_at: timestamp_at(row, 8)?,
        updated_at: timestamp_at(row, 9)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let direction: String = row.get(2)?;
    let status: String = row.get(8)?;

    Ok(Message {
        id: MessageId::new(row.get::<_, String>(0)?),
        conversation_id: ConversationId::new(row.get::<_, String>(1)?),
        direction: Direction::parse(&direction).unwrap_or(Direction::Incoming),
        sender: EmailAddress::new(row.get::<_, String>(3)?, row.get::<_, String>(4)?),
        subject: row.get(5)?,
        content: row.get(6)?,
        is_read: row.get(7)?,
        status: DeliveryStatus::parse(&status).unwrap_or(DeliveryStatus::Delivered),
        created_at: timestamp_at(row, 9)?,
        internal_date: row.get(10)?,
    })
}

/// SQLite-based mail storage
pub struct SqliteMailStore {
    conn: Mutex<Connection>,
}

impl SqliteMailStore {
    /// Open (or create) the database at `db_path` and run migrations
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        // WAL lets dashboard reads proceed while a sync commits.
        // foreign_keys must be on for the message -> conversation constraint.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MailStore for SqliteMailStore {
    fn get_credential(&self, tenant: &TenantId) -> Result<Option<MailCredential>> {
        let conn = self.lock();

        let credential = conn
            .query_row(
                "SELECT email, refresh_token, access_token, expires_at, updated_at
                 FROM mail_credentials WHERE tenant_id = ?",
                [tenant.as_str()],
                |row| {
                    Ok(MailCredential {
                        email: row.get(0)?,
                        refresh_token: row.get(1)?,
                        access_token: row.get(2)?,
                        expires_at: row.get(3)?,
                        updated_at: timestamp_at(row, 4)?,
                    })
                },
            )
            .optional()?;

        Ok(credential)
    }

    fn save_credential(&self, tenant: &TenantId, credential: MailCredential) -> Result<()> {
        let conn = self.lock();

        conn.execute(
            "INSERT INTO mail_credentials
             (tenant_id, email, refresh_token, access_token, expires_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id) DO UPDATE SET
                email = excluded.email,
                refresh_token = excluded.refresh_token,
                access_token = excluded.access_token,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
            params![
                tenant.as_str(),
                credential.email,
                credential.refresh_token,
                credential.access_token,
                credential.expires_at,
                format_timestamp(&credential.updated_at),
            ],
        )?;

        Ok(())
    }

    fn delete_credential(&self, tenant: &TenantId) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM mail_credentials WHERE tenant_id = ?",
            [tenant.as_str()],
        )?;
        Ok(())
    }

    fn commit(&self, tenant: &TenantId, batch: WriteBatch) -> Result<()> {
        let mut conn = self.lock();
        // Dropping the transaction without commit rolls everything back
        let tx = conn.transaction()?;
        let now = format_timestamp(&Utc::now());

        for merge in batch.conversations() {
            let (sql, unread) = match merge.unread {
                UnreadUpdate::Increment(n) => (UPSERT_CONVERSATION_INCREMENT, n),
                UnreadUpdate::Recount => (UPSERT_CONVERSATION_KEEP_UNREAD, 0),
            };
            tx.execute(
                sql,
                params![
                    tenant.as_str(),
                    merge.id.as_str(),
                    merge.customer.name,
                    merge.customer.email,
                    merge.subject,
                    merge.channel.as_str(),
                    unread as i64,
                    format_timestamp(&merge.last_message_at),
                    now,
                ],
            )
            .with_context(|| format!("Failed to merge conversation {}", merge.id.as_str()))?;
        }

        for message in batch.messages() {
            tx.execute(
                UPSERT_MESSAGE,
                params![
                    tenant.as_str(),
                    message.id.as_str(),
                    message.conversation_id.as_str(),
                    message.direction.as_str(),
                    message.sender.name,
                    message.sender.email,
                    message.subject,
                    message.content,
                    message.is_read,
                    message.status.as_str(),
                    format_timestamp(&message.created_at),
                    message.internal_date,
                ],
            )
            .with_context(|| format!("Failed to write message {}", message.id.as_str()))?;
        }

        for id in batch.recount_targets() {
            tx.execute(RECOUNT_UNREAD, params![tenant.as_str(), id.as_str()])?;
        }

        tx.commit().context("Failed to commit write batch")?;
        Ok(())
    }

    fn get_conversation(
        &self,
        tenant: &TenantId,
        id: &ConversationId,
    ) -> Result<Option<Conversation>> {
        let conn = self.lock();

        let conversation = conn
            .query_row(
                &format!(
                    "SELECT {} FROM conversations WHERE tenant_id = ? AND id = ?",
                    CONVERSATION_COLUMNS
                ),
                params![tenant.as_str(), id.as_str()],
                conversation_from_row,
            )
            .optional()?;

        Ok(conversation)
    }

    fn get_message(&self, tenant: &TenantId, id: &MessageId) -> Result<Option<Message>> {
        let conn = self.lock();

        let message = conn
            .query_row(
                &format!(
                    "SELECT {} FROM messages WHERE tenant_id = ? AND id = ?",
                    MESSAGE_COLUMNS
                ),
                params![tenant.as_str(), id.as_str()],
                message_from_row,
            )
            .optional()?;

        Ok(message)
    }

    fn list_conversations(
        &self,
        tenant: &TenantId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Conversation>> {
        let conn = self.lock();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM conversations
             WHERE tenant_id = ?
             ORDER BY last_message_at DESC, id ASC
             LIMIT ? OFFSET ?",
            CONVERSATION_COLUMNS
        ))?;

        let conversations = stmt
            .query_map(
                params![tenant.as_str(), limit as i64, offset as i64],
                conversation_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(conversations)
    }

    fn list_messages_for_conversation(
        &self,
        tenant: &TenantId,
        id: &ConversationId,
    ) -> Result<Vec<Message>> {
        let conn = self.lock();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages
             WHERE tenant_id = ? AND conversation_id = ?
             ORDER BY created_at ASC, id ASC",
            MESSAGE_COLUMNS
        ))?;

        let messages = stmt
            .query_map(params![tenant.as_str(), id.as_str()], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    fn count_unread_messages(&self, tenant: &TenantId, id: &ConversationId) -> Result<usize> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages
             WHERE tenant_id = ? AND conversation_id = ? AND is_read = 0",
            params![tenant.as_str(), id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn count_conversations(&self, tenant: &TenantId) -> Result<usize> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM conversations WHERE tenant_id = ?",
            [tenant.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn count_messages(&self, tenant: &TenantId) -> Result<usize> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE tenant_id = ?",
            [tenant.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn update_triage(
        &self,
        tenant: &TenantId,
        id: &ConversationId,
        status: Option<ConversationStatus>,
        priority: Option<ConversationPriority>,
    ) -> Result<bool> {
        let conn = self.lock();

        let updated = conn.execute(
            "UPDATE conversations SET
                status = COALESCE(?3, status),
                priority = COALESCE(?4, priority),
                updated_at = ?5
             WHERE tenant_id = ?1 AND id = ?2",
            params![
                tenant.as_str(),
                id.as_str(),
                status.map(|s| s.as_str()),
                priority.map(|p| p.as_str()),
                format_timestamp(&Utc::now()),
            ],
        )?;

        Ok(updated > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ConversationMerge;
    use chrono::Duration;
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteMailStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteMailStore::new(temp_dir.path().join("mail.db")).unwrap();
        (store, temp_dir)
    }

    fn tenant() -> TenantId {
        TenantId::new("tenant-1")
    }

    fn make_merge(thread: &str, unread: UnreadUpdate, at: DateTime<Utc>) -> ConversationMerge {
        ConversationMerge {
            id: ConversationId::new(thread),
            customer: EmailAddress::new("Jane Doe", "jane@example.com"),
            subject: format!("Subject {}", thread),
            channel: Channel::Email,
            unread,
            last_message_at: at,
        }
    }

    fn make_message(id: &str, thread: &str, is_read: bool, at: DateTime<Utc>) -> Message {
        Message::builder(MessageId::new(id), ConversationId::new(thread))
            .sender(EmailAddress::new("Jane Doe", "jane@example.com"))
            .subject("Help")
            .content(format!("Snippet {}", id))
            .is_read(is_read)
            .internal_date(at.timestamp_millis())
            .build()
    }

    fn commit_one(store: &SqliteMailStore, unread: UnreadUpdate) {
        let now = Utc::now();
        let mut batch = WriteBatch::new();
        batch.merge_conversation(make_merge("t1", unread, now));
        batch.set_message(make_message("m1", "t1", false, now - Duration::minutes(5)));
        batch.set_message(make_message("m2", "t1", false, now));
        store.commit(&tenant(), batch).unwrap();
    }

    #[test]
    fn test_corrupt_timestamp_is_a_store_error() {
        let (store, _dir) = create_test_store();
        commit_one(&store, UnreadUpdate::Recount);

        store
            .lock()
            .execute(
                "UPDATE messages SET created_at = 'yesterday' WHERE id = 'm1'",
                [],
            )
            .unwrap();
        store
            .lock()
            .execute(
                "UPDATE conversations SET last_message_at = '' WHERE id = 't1'",
                [],
            )
            .unwrap();

        assert!(store.get_message(&tenant(), &MessageId::new("m1")).is_err());
        assert!(store.get_message(&tenant(), &MessageId::new("m2")).unwrap().is_some());
        assert!(
            store
                .get_conversation(&tenant(), &ConversationId::new("t1"))
                .is_err()
        );
        assert!(store.list_conversations(&tenant(), 10, 0).is_err());
    }

    #[test]
    fn test_credential_crud() {
        let (store, _dir) = create_test_store();
        let cred = MailCredential::new("refresh-1")
            .with_email("support@acme.io")
            .with_access_token("access-1", 1_700_000_000);

        store.save_credential(&tenant(), cred.clone()).unwrap();
        let loaded = store.get_credential(&tenant()).unwrap().unwrap();
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(loaded.email.as_deref(), Some("support@acme.io"));
        assert_eq!(loaded.expires_at, Some(1_700_000_000));

        store.delete_credential(&tenant()).unwrap();
        assert!(store.get_credential(&tenant()).unwrap().is_none());
    }

    #[test]
    fn test_message_round_trip() {
        let (store, _dir) = create_test_store();
        commit_one(&store, UnreadUpdate::Recount);

        let message = store
            .get_message(&tenant(), &MessageId::new("m2"))
            .unwrap()
            .unwrap();
        assert_eq!(message.conversation_id.as_str(), "t1");
        assert_eq!(message.sender.name, "Jane Doe");
        assert_eq!(message.content, "Snippet m2");
        assert_eq!(message.direction, Direction::Incoming);
        assert_eq!(message.status, DeliveryStatus::Delivered);
        assert!(!message.is_read);

        let messages = store
            .list_messages_for_conversation(&tenant(), &ConversationId::new("t1"))
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id.as_str(), "m1");
    }

    #[test]
    fn test_increment_is_not_idempotent() {
        let (store, _dir) = create_test_store();
        commit_one(&store, UnreadUpdate::Increment(2));
        commit_one(&store, UnreadUpdate::Increment(2));

        let conv = store
            .get_conversation(&tenant(), &ConversationId::new("t1"))
            .unwrap()
            .unwrap();
        assert_eq!(conv.unread_count, 4);
        assert_eq!(store.count_messages(&tenant()).unwrap(), 2);
    }

    #[test]
    fn test_recount_is_idempotent() {
        let (store, _dir) = create_test_store();
        commit_one(&store, UnreadUpdate::Recount);
        commit_one(&store, UnreadUpdate::Recount);

        let conv = store
            .get_conversation(&tenant(), &ConversationId::new("t1"))
            .unwrap()
            .unwrap();
        assert_eq!(conv.unread_count, 2);
        assert_eq!(
            store
                .count_unread_messages(&tenant(), &ConversationId::new("t1"))
                .unwrap(),
            2
        );
    }

    #[test]
    fn test_merge_preserves_triage_fields() {
        let (store, _dir) = create_test_store();
        commit_one(&store, UnreadUpdate::Recount);

        let id = ConversationId::new("t1");
        assert!(store
            .update_triage(&tenant(), &id, Some(ConversationStatus::Closed), Some(ConversationPriority::High))
            .unwrap());

        commit_one(&store, UnreadUpdate::Recount);

        let conv = store.get_conversation(&tenant(), &id).unwrap().unwrap();
        assert_eq!(conv.status, ConversationStatus::Closed);
        assert_eq!(conv.priority, ConversationPriority::High);
        assert_eq!(conv.subject, "Subject t1");
    }

    #[test]
    fn test_failed_batch_rolls_back() {
        let (store, _dir) = create_test_store();
        let now = Utc::now();

        // The second message violates the foreign key, so nothing may persist
        let mut batch = WriteBatch::new();
        batch.merge_conversation(make_merge("t1", UnreadUpdate::Recount, now));
        batch.set_message(make_message("m1", "t1", false, now));
        batch.set_message(make_message("m2", "unknown-thread", false, now));

        assert!(store.commit(&tenant(), batch).is_err());
        assert_eq!(store.count_conversations(&tenant()).unwrap(), 0);
        assert_eq!(store.count_messages(&tenant()).unwrap(), 0);
    }

    #[test]
    fn test_list_conversations_order_and_tenant_scope() {
        let (store, _dir) = create_test_store();
        let now = Utc::now();

        let mut batch = WriteBatch::new();
        batch.merge_conversation(make_merge("older", UnreadUpdate::Recount, now - Duration::hours(3)));
        batch.merge_conversation(make_merge("newer", UnreadUpdate::Recount, now));
        store.commit(&tenant(), batch).unwrap();

        let list = store.list_conversations(&tenant(), 10, 0).unwrap();
        let ids: Vec<_> = list.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["newer", "older"]);

        let other = TenantId::new("tenant-2");
        assert!(store.list_conversations(&other, 10, 0).unwrap().is_empty());
        assert_eq!(store.count_conversations(&other).unwrap(), 0);
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteMailStore::in_memory().unwrap();
        commit_one(&store, UnreadUpdate::Recount);
        assert_eq!(store.count_conversations(&tenant()).unwrap(), 1);
    }
}
