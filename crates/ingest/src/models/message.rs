//! Message model representing a single email in a conversation

use super::ConversationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a message (Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A sender or recipient with a display name
///
/// The name is never empty: when a header carries no display name the
/// address itself is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name (e.g., "Jane Doe")
    pub name: String,
    /// Email address (e.g., "jane@example.com")
    pub email: String,
}

impl EmailAddress {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Parse a header value like `"Jane Doe" <jane@example.com>`.
    ///
    /// Without an angle-bracket form the raw (trimmed) value becomes both
    /// the name and the email.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        if let Some(angle_start) = s.rfind('<')
            && let Some(angle_end) = s.rfind('>')
            && angle_start < angle_end
        {
            let email = s[angle_start + 1..angle_end].trim();
            let name = s[..angle_start].trim().trim_matches('"').trim();
            let name = if name.is_empty() { email } else { name };
            return Self::new(name, email);
        }

        Self::new(s, s)
    }

    /// Whether this address belongs to the given mailbox (ASCII case-insensitive)
    pub fn is_same_mailbox(&self, email: &str) -> bool {
        self.email.eq_ignore_ascii_case(email.trim())
    }
}

/// Whether a message was received from or sent to the customer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "incoming" => Some(Direction::Incoming),
            "outgoing" => Some(Direction::Outgoing),
            _ => None,
        }
    }
}

/// Delivery state of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DeliveryStatus::Pending),
            "sent" => Some(DeliveryStatus::Sent),
            "delivered" => Some(DeliveryStatus::Delivered),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }
}

/// A single email message within a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Gmail message ID
    pub id: MessageId,
    /// Conversation (Gmail thread) this message belongs to
    pub conversation_id: ConversationId,
    pub direction: Direction,
    pub sender: EmailAddress,
    /// Subject line of this message
    pub subject: String,
    /// Plain-text snippet of the body
    pub content: String,
    pub is_read: bool,
    pub status: DeliveryStatus,
    /// Derived from Gmail's internal timestamp
    pub created_at: DateTime<Utc>,
    /// Gmail's internal timestamp (milliseconds since epoch)
    pub internal_date: i64,
}

impl Message {
    /// Create a new message builder
    pub fn builder(id: MessageId, conversation_id: ConversationId) -> MessageBuilder {
        MessageBuilder::new(id, conversation_id)
    }
}

/// Builder for creating Message instances
pub struct MessageBuilder {
    id: MessageId,
    conversation_id: ConversationId,
    direction: Direction,
    sender: Option<EmailAddress>,
    subject: String,
    content: String,
    is_read: bool,
    status: DeliveryStatus,
    internal_date: i64,
}

impl MessageBuilder {
    fn new(id: MessageId, conversation_id: ConversationId) -> Self {
        Self {
            id,
            conversation_id,
            direction: Direction::Incoming,
            sender: None,
            subject: String::new(),
            content: String::new(),
            is_read: false,
            status: DeliveryStatus::Delivered,
            internal_date: 0,
        }
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn sender(mut self, sender: EmailAddress) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn is_read(mut self, is_read: bool) -> Self {
        self.is_read = is_read;
        self
    }

    pub fn status(mut self, status: DeliveryStatus) -> Self {
        self.status = status;
        self
    }

    /// Set Gmail's internal timestamp; `created_at` is derived from it
    pub fn internal_date(mut self, internal_date: i64) -> Self {
        self.internal_date = internal_date;
        self
    }

    pub fn build(self) -> Message {
        let created_at = DateTime::from_timestamp_millis(self.internal_date).unwrap_or_default();
        Message {
            id: self.id,
            conversation_id: self.conversation_id,
            direction: self.direction,
            sender: self
                .sender
                .unwrap_or_else(|| EmailAddress::new("unknown", "unknown@unknown.com")),
            subject: self.subject,
            content: self.content,
            is_read: self.is_read,
            status: self.status,
            created_at,
            internal_date: self.internal_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quoted_name() {
        let addr = EmailAddress::parse(r#""Jane Doe" <jane@example.com>"#);
        assert_eq!(addr.name, "Jane Doe");
        assert_eq!(addr.email, "jane@example.com");
    }

    #[test]
    fn test_parse_unquoted_name() {
        let addr = EmailAddress::parse("John Doe <john@example.com>");
        assert_eq!(addr.name, "John Doe");
        assert_eq!(addr.email, "john@example.com");
    }

    #[test]
    fn test_parse_bare_address() {
        let addr = EmailAddress::parse("jane@example.com");
        assert_eq!(addr.name, "jane@example.com");
        assert_eq!(addr.email, "jane@example.com");
    }

    #[test]
    fn test_parse_angle_brackets_without_name() {
        let addr = EmailAddress::parse("<jane@example.com>");
        assert_eq!(addr.name, "jane@example.com");
        assert_eq!(addr.email, "jane@example.com");
    }

    #[test]
    fn test_is_same_mailbox_ignores_case() {
        let addr = EmailAddress::parse("Support <Support@Acme.io>");
        assert!(addr.is_same_mailbox("support@acme.io"));
        assert!(!addr.is_same_mailbox("sales@acme.io"));
    }

    #[test]
    fn test_builder_derives_created_at() {
        let msg = Message::builder(MessageId::new("m1"), ConversationId::new("t1"))
            .internal_date(1_700_000_000_123)
            .build();
        assert_eq!(msg.created_at.timestamp_millis(), 1_700_000_000_123);
        assert_eq!(msg.direction, Direction::Incoming);
        assert_eq!(msg.status, DeliveryStatus::Delivered);
    }

    #[test]
    fn test_enum_round_trip_through_str() {
        assert_eq!(Direction::parse(Direction::Outgoing.as_str()), Some(Direction::Outgoing));
        assert_eq!(DeliveryStatus::parse("delivered"), Some(DeliveryStatus::Delivered));
        assert_eq!(DeliveryStatus::parse("bounced"), None);
    }
}
