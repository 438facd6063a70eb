//! Named channel configuration
//!
//! A channel pairs a platform with stored credentials so requests can refer
//! to it by name instead of carrying auth inline. `account` is accepted as an
//! alias for `channel` on requests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::types::AuthMap;

/// Maximum length of a channel name
pub const MAX_CHANNEL_NAME_LEN: usize = 64;

/// Stored platform and credentials for a named channel
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelConfig {
    pub platform: String,
    #[serde(default)]
    pub auth: AuthMap,
}

impl ChannelConfig {
    pub fn new(platform: impl Into<String>, auth: AuthMap) -> Self {
        Self {
            platform: platform.into(),
            auth,
        }
    }
}

// Credentials stay out of logs; only key names are shown.
impl std::fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("platform", &self.platform)
            .field("auth", &self.auth.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Lookup of named channels
#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// Load a channel by name, `Ok(None)` when it does not exist
    async fn get_channel(&self, name: &str) -> Result<Option<ChannelConfig>>;
}

/// Channel store backed by the `[channels]` configuration table
#[derive(Debug, Clone, Default)]
pub struct ConfigChannelStore {
    channels: HashMap<String, ChannelConfig>,
}

impl ConfigChannelStore {
    pub fn new(channels: &BTreeMap<String, ChannelConfig>) -> Self {
        Self {
            channels: channels
                .iter()
                .map(|(name, channel)| (name.clone(), channel.clone()))
                .collect(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, channel: ChannelConfig) {
        self.channels.insert(name.into(), channel);
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[async_trait]
impl ChannelStore for ConfigChannelStore {
    async fn get_channel(&self, name: &str) -> Result<Option<ChannelConfig>> {
        Ok(self.channels.get(name.trim()).cloned())
    }
}

/// Validate a channel name
///
/// Rules:
/// - Alphanumeric characters, hyphens, and underscores only
/// - Maximum 64 characters
/// - Cannot be empty
pub fn validate_channel_name(name: &str) -> std::result::Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Invalid(
            "Channel name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_CHANNEL_NAME_LEN {
        return Err(ConfigError::Invalid(format!(
            "Channel name too long: {} characters (max {})",
            name.len(),
            MAX_CHANNEL_NAME_LEN
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Invalid(format!(
            "Invalid channel name '{}'. Must be alphanumeric with hyphens/underscores only",
            name
        )));
    }

    Ok(())
}
