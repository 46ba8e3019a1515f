//! Channel directory: the roster of connected platform accounts
//!
//! A channel is one authorized account on one platform ("the company
//! LinkedIn page", "the support X handle"). The engine validates
//! targets against the directory and pulls bearer tokens from it at
//! publish time; how channels get connected (OAuth flows, token
//! refresh) is outside this crate.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::config::ChannelEntry;
use crate::error::{Result, SyndicateError};
use crate::types::Platform;

/// One connected account as the engine sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub workspace_id: String,
    pub platform: Platform,
    pub platform_account_id: String,
    pub display_name: Option<String>,
    pub connected: bool,
}

/// Source of channel metadata and access tokens
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    /// Look up one channel by id, scoped to a workspace
    async fn channel(&self, workspace_id: &str, channel_id: &str) -> Result<Option<Channel>>;

    /// Bearer token for a connected channel
    async fn access_token(&self, channel_id: &str) -> Result<SecretString>;

    /// Validate that every channel id exists in the workspace, is
    /// connected, and matches the platform the caller paired it with
    async fn validate_targets(
        &self,
        workspace_id: &str,
        targets: &[(String, Platform)],
    ) -> Result<()> {
        for (channel_id, platform) in targets {
            let channel = self
                .channel(workspace_id, channel_id)
                .await?
                .ok_or_else(|| {
                    SyndicateError::Validation(format!(
                        "unknown channel '{}' in workspace '{}'",
                        channel_id, workspace_id
                    ))
                })?;

            if !channel.connected {
                return Err(SyndicateError::Validation(format!(
                    "channel '{}' is disconnected",
                    channel_id
                )));
            }

            if channel.platform != *platform {
                return Err(SyndicateError::Validation(format!(
                    "channel '{}' belongs to {} but target says {}",
                    channel_id, channel.platform, platform
                )));
            }
        }
        Ok(())
    }
}

/// Directory backed by the static roster in the config file. Tokens
/// live in per-channel files referenced from the config.
pub struct StaticChannelDirectory {
    entries: BTreeMap<String, ChannelEntry>,
}

impl StaticChannelDirectory {
    pub fn new(entries: Vec<ChannelEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.id.clone(), e)).collect(),
        }
    }
}

#[async_trait]
impl ChannelDirectory for StaticChannelDirectory {
    async fn channel(&self, workspace_id: &str, channel_id: &str) -> Result<Option<Channel>> {
        Ok(self
            .entries
            .get(channel_id)
            .filter(|e| e.workspace_id == workspace_id)
            .map(|e| Channel {
                id: e.id.clone(),
                workspace_id: e.workspace_id.clone(),
                platform: e.platform,
                platform_account_id: e.platform_account_id.clone(),
                display_name: e.display_name.clone(),
                connected: e.connected,
            }))
    }

    async fn access_token(&self, channel_id: &str) -> Result<SecretString> {
        let entry = self.entries.get(channel_id).ok_or_else(|| {
            SyndicateError::NotFound(format!("channel {}", channel_id))
        })?;

        let path = shellexpand::tilde(&entry.token_file).to_string();
        let token = std::fs::read_to_string(&path)
            .map_err(crate::error::DbError::IoError)
            .map_err(SyndicateError::Database)?;

        Ok(SecretString::from(token.trim().to_string()))
    }
}

/// In-memory directory for tests and embedding callers that manage
/// channels themselves
#[derive(Default)]
pub struct MemoryChannelDirectory {
    channels: Mutex<BTreeMap<String, (Channel, SecretString)>>,
}

impl MemoryChannelDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, channel: Channel, token: impl Into<String>) {
        let mut guard = match self.channels.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(channel.id.clone(), (channel, SecretString::from(token.into())));
    }

    pub fn set_connected(&self, channel_id: &str, connected: bool) {
        let mut guard = match self.channels.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some((channel, _)) = guard.get_mut(channel_id) {
            channel.connected = connected;
        }
    }
}

#[async_trait]
impl ChannelDirectory for MemoryChannelDirectory {
    async fn channel(&self, workspace_id: &str, channel_id: &str) -> Result<Option<Channel>> {
        let guard = match self.channels.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(guard
            .get(channel_id)
            .filter(|(c, _)| c.workspace_id == workspace_id)
            .map(|(c, _)| c.clone()))
    }

    async fn access_token(&self, channel_id: &str) -> Result<SecretString> {
        let guard = match self.channels.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .get(channel_id)
            .map(|(_, token)| token.clone())
            .ok_or_else(|| SyndicateError::NotFound(format!("channel {}", channel_id)))
    }
}

/// Convenience constructor for tests
pub fn test_channel(id: &str, workspace_id: &str, platform: Platform) -> Channel {
    Channel {
        id: id.to_string(),
        workspace_id: workspace_id.to_string(),
        platform,
        platform_account_id: format!("acct-{}", id),
        display_name: None,
        connected: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn test_memory_directory_lookup() {
        let dir = MemoryChannelDirectory::new();
        dir.insert(test_channel("chan-7", "ws-1", Platform::X), "token-abc");

        let found = dir.channel("ws-1", "chan-7").await.unwrap().unwrap();
        assert_eq!(found.platform, Platform::X);

        // Workspace scoping
        assert!(dir.channel("ws-2", "chan-7").await.unwrap().is_none());
        assert!(dir.channel("ws-1", "chan-8").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_directory_token() {
        let dir = MemoryChannelDirectory::new();
        dir.insert(test_channel("chan-7", "ws-1", Platform::X), "token-abc");

        let token = dir.access_token("chan-7").await.unwrap();
        assert_eq!(token.expose_secret(), "token-abc");

        assert!(dir.access_token("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_validate_targets_ok() {
        let dir = MemoryChannelDirectory::new();
        dir.insert(test_channel("chan-7", "ws-1", Platform::X), "t1");
        dir.insert(test_channel("chan-8", "ws-1", Platform::Mastodon), "t2");

        let targets = vec![
            ("chan-7".to_string(), Platform::X),
            ("chan-8".to_string(), Platform::Mastodon),
        ];
        assert!(dir.validate_targets("ws-1", &targets).await.is_ok());
    }

    #[tokio::test]
    async fn test_validate_targets_unknown_channel() {
        let dir = MemoryChannelDirectory::new();
        let targets = vec![("ghost".to_string(), Platform::X)];

        let err = dir.validate_targets("ws-1", &targets).await.unwrap_err();
        assert!(matches!(err, SyndicateError::Validation(_)));
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn test_validate_targets_platform_mismatch() {
        let dir = MemoryChannelDirectory::new();
        dir.insert(test_channel("chan-7", "ws-1", Platform::X), "t1");

        let targets = vec![("chan-7".to_string(), Platform::Linkedin)];
        let err = dir.validate_targets("ws-1", &targets).await.unwrap_err();
        assert!(matches!(err, SyndicateError::Validation(_)));
    }

    #[tokio::test]
    async fn test_validate_targets_disconnected() {
        let dir = MemoryChannelDirectory::new();
        dir.insert(test_channel("chan-7", "ws-1", Platform::X), "t1");
        dir.set_connected("chan-7", false);

        let targets = vec![("chan-7".to_string(), Platform::X)];
        let err = dir.validate_targets("ws-1", &targets).await.unwrap_err();
        assert!(err.to_string().contains("disconnected"));
    }

    #[tokio::test]
    async fn test_static_directory_from_config() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "secret-token\n").unwrap();

        let dir = StaticChannelDirectory::new(vec![ChannelEntry {
            id: "chan-7".to_string(),
            workspace_id: "ws-1".to_string(),
            platform: Platform::X,
            platform_account_id: "acct-42".to_string(),
            display_name: Some("Support".to_string()),
            token_file: temp.path().to_string_lossy().to_string(),
            connected: true,
        }]);

        let channel = dir.channel("ws-1", "chan-7").await.unwrap().unwrap();
        assert_eq!(channel.platform_account_id, "acct-42");

        let token = dir.access_token("chan-7").await.unwrap();
        assert_eq!(token.expose_secret(), "secret-token");
    }
}
