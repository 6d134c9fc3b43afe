//! Per-channel presence.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use super::protocol::{ChannelId, Identity};

/// Presence record of one channel.
///
/// Each identity carries a holder count so that two connections joined
/// under the same name keep it visible until both have left.
#[derive(Debug, Default)]
pub struct Channel {
    members: HashMap<Identity, usize>,
}

impl Channel {
    fn join(&mut self, identity: &str) -> bool {
        let count = self.members.entry(identity.to_string()).or_insert(0);
        *count += 1;
        *count == 1
    }

    fn leave(&mut self, identity: &str) -> bool {
        match self.members.get_mut(identity) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.members.remove(identity);
                true
            }
            None => false,
        }
    }

    fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Visible identities, sorted.
    pub fn presence(&self) -> Vec<Identity> {
        let mut users: Vec<Identity> = self.members.keys().cloned().collect();
        users.sort();
        users
    }
}

#[derive(Debug, Default)]
pub struct SessionManager {
    channels: RwLock<HashMap<ChannelId, Channel>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `identity` to the channel, creating the channel if needed, and
    /// returns the presence list as it stands after the join.
    pub async fn join(&self, channel_id: ChannelId, identity: &str) -> Vec<Identity> {
        let mut channels = self.channels.write().await;
        let channel = channels.entry(channel_id).or_default();
        if channel.join(identity) {
            debug!("{} joined channel {}", identity, channel_id);
        }
        channel.presence()
    }

    /// Releases `identity` and drops the channel once nobody is left.
    /// Returns the presence list as it stands after the leave.
    pub async fn leave(&self, channel_id: ChannelId, identity: &str) -> Vec<Identity> {
        let mut channels = self.channels.write().await;
        let Some(channel) = channels.get_mut(&channel_id) else {
            return Vec::new();
        };

        if channel.leave(identity) {
            debug!("{} left channel {}", identity, channel_id);
        }

        if channel.is_empty() {
            channels.remove(&channel_id);
            debug!("Channel {} closed", channel_id);
            return Vec::new();
        }
        channel.presence()
    }

    pub async fn presence_of(&self, channel_id: &ChannelId) -> Vec<Identity> {
        self.channels
            .read()
            .await
            .get(channel_id)
            .map(Channel::presence)
            .unwrap_or_default()
    }

    pub async fn has_channel(&self, channel_id: &ChannelId) -> bool {
        self.channels.read().await.contains_key(channel_id)
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_join_creates_channel() {
        let sessions = SessionManager::new();
        let channel = Uuid::new_v4();

        assert!(!sessions.has_channel(&channel).await);
        assert_eq!(sessions.join(channel, "bob").await, vec!["bob"]);
        assert_eq!(sessions.join(channel, "ada").await, vec!["ada", "bob"]);
        assert!(sessions.has_channel(&channel).await);
    }

    #[tokio::test]
    async fn test_rejoin_does_not_duplicate() {
        let sessions = SessionManager::new();
        let channel = Uuid::new_v4();

        sessions.join(channel, "ada").await;
        sessions.join(channel, "ada").await;
        assert_eq!(sessions.presence_of(&channel).await, vec!["ada"]);
    }

    #[tokio::test]
    async fn test_matching_leaves_destroy_channel() {
        let sessions = SessionManager::new();
        let channel = Uuid::new_v4();
        let names = ["ada", "bob", "cy", "ada"];

        for name in names {
            sessions.join(channel, name).await;
        }
        for name in names {
            sessions.leave(channel, name).await;
        }

        assert!(sessions.presence_of(&channel).await.is_empty());
        assert!(!sessions.has_channel(&channel).await);
        assert_eq!(sessions.channel_count().await, 0);
    }

    #[tokio::test]
    async fn test_shared_identity_stays_until_last_holder_leaves() {
        let sessions = SessionManager::new();
        let channel = Uuid::new_v4();

        sessions.join(channel, "ada").await;
        sessions.join(channel, "ada").await;
        sessions.join(channel, "bob").await;

        assert_eq!(sessions.leave(channel, "ada").await, vec!["ada", "bob"]);
        assert_eq!(sessions.leave(channel, "ada").await, vec!["bob"]);
    }

    #[tokio::test]
    async fn test_leave_unknown_is_noop() {
        let sessions = SessionManager::new();
        let channel = Uuid::new_v4();

        assert!(sessions.leave(channel, "ghost").await.is_empty());
        sessions.join(channel, "ada").await;
        assert_eq!(sessions.leave(channel, "ghost").await, vec!["ada"]);
    }
}
