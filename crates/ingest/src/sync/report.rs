//! Outcome of a sync pass

use serde::Serialize;

/// Stage at which a single message failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// Fetching the message detail failed (after retries)
    FetchFailed,
    /// The fetched message could not be mapped
    ParseFailed,
}

/// A message that was listed but not stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFailure {
    pub message_id: String,
    pub kind: FailureKind,
    pub detail: String,
}

/// Statistics from a sync pass
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Distinct conversations merge-written
    pub synced_conversations: usize,
    /// Messages written
    pub synced_messages: usize,
    /// Messages sent by the connected account itself
    pub skipped_outbound: usize,
    /// Message refs returned by the provider listing
    pub listed: usize,
    pub failures: Vec<MessageFailure>,
    pub duration_ms: u64,
}

impl SyncReport {
    /// One-line human summary for the trigger response
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Synced {} conversation{} ({} message{})",
            self.synced_conversations,
            plural(self.synced_conversations),
            self.synced_messages,
            plural(self.synced_messages),
        );
        if !self.failures.is_empty() {
            summary.push_str(&format!(", {} failed", self.failures.len()));
        }
        summary
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        let report = SyncReport {
            synced_conversations: 1,
            synced_messages: 3,
            ..Default::default()
        };
        assert_eq!(report.summary(), "Synced 1 conversation (3 messages)");
    }

    #[test]
    fn test_summary_mentions_failures() {
        let report = SyncReport {
            failures: vec![MessageFailure {
                message_id: "m1".into(),
                kind: FailureKind::FetchFailed,
                detail: "HTTP 404".into(),
            }],
            ..Default::default()
        };
        assert_eq!(report.summary(), "Synced 0 conversations (0 messages), 1 failed");
    }

    #[test]
    fn test_serializes_camel_case() {
        let report = SyncReport {
            skipped_outbound: 2,
            failures: vec![MessageFailure {
                message_id: "m9".into(),
                kind: FailureKind::ParseFailed,
                detail: "message has no From header".into(),
            }],
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["skippedOutbound"], 2);
        assert_eq!(json["failures"][0]["messageId"], "m9");
        assert_eq!(json["failures"][0]["kind"], "parseFailed");
    }
}
