//! Domain models for ingested mail

mod conversation;
mod credential;
mod message;
mod tenant;

pub use conversation::{
    Channel, Conversation, ConversationId, ConversationPriority, ConversationStatus,
};
pub use credential::MailCredential;
pub use message::{DeliveryStatus, Direction, EmailAddress, Message, MessageId};
pub use tenant::TenantId;
