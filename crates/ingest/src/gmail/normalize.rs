//! Gmail API response normalization
//!
//! Converts Gmail API messages to Savrii message records.

use super::api::{GmailMessage, MessagePayload};
use crate::models::{ConversationId, Direction, EmailAddress, Message, MessageId};

/// Gmail label carried by unread messages
const UNREAD_LABEL: &str = "UNREAD";

/// Reason a fetched message could not be mapped
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("message has no payload")]
    MissingPayload,

    #[error("message has no From header")]
    MissingFrom,

    #[error("invalid internal date {0:?}")]
    InvalidInternalDate(String),
}

/// Normalize a Gmail API message to a Savrii Message
///
/// `account_email` is the connected mailbox; messages it sent are marked
/// [`Direction::Outgoing`].
pub fn normalize_message(
    gmail_msg: GmailMessage,
    account_email: &str,
) -> Result<Message, NormalizeError> {
    let payload = gmail_msg
        .payload
        .as_ref()
        .ok_or(NormalizeError::MissingPayload)?;

    let sender = extract_header(payload, "From")
        .filter(|v| !v.trim().is_empty())
        .map(|v| EmailAddress::parse(&v))
        .ok_or(NormalizeError::MissingFrom)?;

    let subject = extract_header(payload, "Subject").unwrap_or_default();

    let raw_date = gmail_msg.internal_date.clone().unwrap_or_default();
    let internal_date: i64 = raw_date
        .trim()
        .parse()
        .map_err(|_| NormalizeError::InvalidInternalDate(raw_date.clone()))?;
    if chrono::DateTime::from_timestamp_millis(internal_date).is_none() {
        return Err(NormalizeError::InvalidInternalDate(raw_date));
    }

    let direction = if sender.is_same_mailbox(account_email) {
        Direction::Outgoing
    } else {
        Direction::Incoming
    };

    let is_read = !gmail_msg
        .label_ids
        .as_ref()
        .is_some_and(|labels| labels.iter().any(|l| l == UNREAD_LABEL));

    Ok(
        Message::builder(MessageId::new(gmail_msg.id), ConversationId::new(gmail_msg.thread_id))
            .direction(direction)
            .sender(sender)
            .subject(subject)
            .content(decode_html_entities(&gmail_msg.snippet))
            .is_read(is_read)
            .internal_date(internal_date)
            .build(),
    )
}

/// Extract a header value by name
fn extract_header(payload: &MessagePayload, name: &str) -> Option<String> {
    payload.headers.as_ref()?.iter().find_map(|h| {
        if h.name.eq_ignore_ascii_case(name) {
            Some(h.value.clone())
        } else {
            None
        }
    })
}

/// Decode HTML entities in snippet text
fn decode_html_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
