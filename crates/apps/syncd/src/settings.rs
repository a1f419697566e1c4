//! Service configuration
//!
//! Read from `ingest.json` in the Savrii config directory, then overridden
//! by `SAVRII_LISTEN_ADDR`, `SAVRII_DATABASE_PATH` and `SAVRII_FETCH_LIMIT`.

use anyhow::{Context, Result};
use ingest::{GmailEndpoints, SyncOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config filename in the Savrii config directory
pub const CONFIG_FILE: &str = "ingest.json";

/// Default database filename in the Savrii config directory
const DATABASE_FILE: &str = "savrii.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    pub listen_addr: String,
    /// SQLite database; defaults to `savrii.db` in the config directory
    pub database_path: Option<PathBuf>,
    pub gmail: GmailEndpoints,
    pub sync: SyncOptions,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8787".to_string(),
            database_path: None,
            gmail: GmailEndpoints::default(),
            sync: SyncOptions::default(),
        }
    }
}

impl ServiceConfig {
    /// Load from the config directory and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut settings: Self = config::load_json_or_default(CONFIG_FILE)?;
        settings.apply_overrides(
            config::env_string("SAVRII_LISTEN_ADDR"),
            config::env_string("SAVRII_DATABASE_PATH"),
            config::env_parse("SAVRII_FETCH_LIMIT")?,
        );
        settings.gmail.validate()?;
        Ok(settings)
    }

    /// Load from a specific JSON file without environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let settings: Self = config::load_json_file(path)?;
        settings.gmail.validate()?;
        Ok(settings)
    }

    pub fn apply_overrides(
        &mut self,
        listen_addr: Option<String>,
        database_path: Option<String>,
        fetch_limit: Option<usize>,
    ) {
        if let Some(addr) = listen_addr {
            self.listen_addr = addr;
        }
        if let Some(path) = database_path {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(limit) = fetch_limit {
            self.sync.fetch_limit = limit;
        }
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => config::config_path(DATABASE_FILE).context("Could not determine config directory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest::UnreadCountMode;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"{
                "listenAddr": "0.0.0.0:9000",
                "databasePath": "/var/lib/savrii/savrii.db",
                "sync": { "fetchLimit": 50, "unreadCount": "accumulate" }
            }"#,
        )
        .unwrap();

        let settings = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(settings.listen_addr, "0.0.0.0:9000");
        assert_eq!(
            settings.database_path().unwrap(),
            PathBuf::from("/var/lib/savrii/savrii.db")
        );
        assert_eq!(settings.sync.fetch_limit, 50);
        assert_eq!(settings.sync.unread_count, UnreadCountMode::Accumulate);
        assert_eq!(settings.gmail, GmailEndpoints::default());
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{ "gmail": { "tokenUrl": "not a url" } }"#).unwrap();

        assert!(ServiceConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_overrides() {
        let mut settings = ServiceConfig::default();
        settings.apply_overrides(Some("0.0.0.0:1234".into()), Some("/tmp/x.db".into()), Some(5));

        assert_eq!(settings.listen_addr, "0.0.0.0:1234");
        assert_eq!(settings.database_path, Some(PathBuf::from("/tmp/x.db")));
        assert_eq!(settings.sync.fetch_limit, 5);
    }

    #[test]
    fn test_overrides_absent_keep_values() {
        let mut settings = ServiceConfig::default();
        settings.apply_overrides(None, None, None);
        assert_eq!(settings, ServiceConfig::default());
    }
}
