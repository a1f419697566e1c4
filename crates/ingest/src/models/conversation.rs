//! Conversation model representing one email thread of a tenant

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a conversation (Gmail thread ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Channel the conversation came in on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Channel::Email),
            _ => None,
        }
    }
}

/// Triage status, owned by the dashboard; sync never changes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Open,
    Pending,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Open => "open",
            ConversationStatus::Pending => "pending",
            ConversationStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(ConversationStatus::Open),
            "pending" => Some(ConversationStatus::Pending),
            "closed" => Some(ConversationStatus::Closed),
            _ => None,
        }
    }
}

/// Priority, owned by the dashboard; sync never changes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl ConversationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationPriority::Low => "low",
            ConversationPriority::Normal => "normal",
            ConversationPriority::High => "high",
            ConversationPriority::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(ConversationPriority::Low),
            "normal" => Some(ConversationPriority::Normal),
            "high" => Some(ConversationPriority::High),
            "urgent" => Some(ConversationPriority::Urgent),
            _ => None,
        }
    }
}

/// A conversation aggregates the messages of one Gmail thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Gmail thread ID
    pub id: ConversationId,
    pub customer_name: String,
    pub customer_email: String,
    pub subject: String,
    pub channel: Channel,
    pub status: ConversationStatus,
    pub priority: ConversationPriority,
    pub unread_count: u32,
    /// Timestamp of the most recent message seen by the last sync pass
    pub last_message_at: DateTime<Utc>,
    /// When the conversation was last written
    pub updated_at: DateTime<Utc>,
}
