//! Storage traits and implementations
//!
//! This module defines the document-store abstraction for ingested mail.
//! The trait-based design allows swapping between in-memory and SQLite
//! backends; both commit a [`WriteBatch`] atomically.

mod batch;
mod memory;
mod sqlite;
mod traits;

pub use batch::{ConversationMerge, UnreadUpdate, WriteBatch};
pub use memory::InMemoryMailStore;
pub use sqlite::SqliteMailStore;
pub use traits::MailStore;
