//! Ingest crate - inbound email ingestion for the Savrii dashboard
//!
//! This crate provides the executor-agnostic core of the sync service:
//! - Domain models (Conversation, Message, EmailAddress, MailCredential)
//! - Gmail API client and OAuth refresh-token exchange
//! - Storage trait with in-memory and SQLite backends, atomic write batches
//! - The ingestion job with bounded retry and per-tenant single-flight
//! - Query API for the dashboard's conversation views
//!
//! All I/O is synchronous; async hosts run jobs on a blocking pool.

pub mod config;
pub mod error;
pub mod gmail;
pub mod models;
pub mod provider;
pub mod query;
pub mod storage;
pub mod sync;

pub use config::{FailureMode, GmailCredentials, GmailEndpoints, SyncOptions, UnreadCountMode};
pub use error::{IngestError, ProviderError};
pub use gmail::{GmailAuth, GmailClient, GmailConnector, NormalizeError, normalize_message};
pub use models::{
    Channel, Conversation, ConversationId, ConversationPriority, ConversationStatus,
    DeliveryStatus, Direction, EmailAddress, MailCredential, Message, MessageId, TenantId,
};
pub use provider::{MailProvider, ProviderConnector};
pub use query::{ConversationDetail, ConversationSummary, get_conversation_detail, list_conversations};
pub use storage::{
    ConversationMerge, InMemoryMailStore, MailStore, SqliteMailStore, UnreadUpdate, WriteBatch,
};
pub use sync::{
    FailureKind, IngestJob, MessageFailure, RetryPolicy, SyncReport, TenantLease, TenantLocks,
    ThreadAccumulator, sync_tenant,
};
