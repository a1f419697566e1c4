//! Tenant identifier

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a Savrii tenant (one user/account of the dashboard)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a tenant id supplied by a caller, rejecting blank values
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims() {
        assert_eq!(TenantId::parse("  user-1 "), Some(TenantId::new("user-1")));
    }

    #[test]
    fn test_parse_rejects_blank() {
        assert_eq!(TenantId::parse(""), None);
        assert_eq!(TenantId::parse("   "), None);
    }
}
