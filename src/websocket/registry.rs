use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};
use uuid::Uuid;

use super::protocol::{ChannelId, Identity};
use crate::error::TransportError;

pub type ConnectionId = Uuid;
pub type OutboundSender = mpsc::UnboundedSender<Message>;

/// A connection's channel membership.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    pub channel_id: ChannelId,
    pub identity: Identity,
}

#[derive(Debug)]
struct ConnectionEntry {
    sender: OutboundSender,
    binding: Option<Binding>,
}

/// Every live connection and its (at most one) channel binding.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: ConnectionId, sender: OutboundSender) {
        self.connections
            .write()
            .await
            .insert(id, ConnectionEntry { sender, binding: None });
        info!("Registered connection {}", id);
    }

    /// Removes the connection and hands back the binding it held, if any.
    /// Unregistering an unknown connection is a no-op.
    pub async fn unregister(&self, id: &ConnectionId) -> Option<Binding> {
        let entry = self.connections.write().await.remove(id)?;
        info!("Unregistered connection {}", id);
        entry.binding
    }

    /// Replaces the connection's binding and returns the previous one.
    pub async fn bind(&self, id: &ConnectionId, binding: Binding) -> Result<Option<Binding>, TransportError> {
        let mut connections = self.connections.write().await;
        let entry = connections.get_mut(id).ok_or(TransportError::Closed(*id))?;
        debug!("Binding connection {} to channel {} as {}", id, binding.channel_id, binding.identity);
        Ok(entry.binding.replace(binding))
    }

    pub async fn binding(&self, id: &ConnectionId) -> Option<Binding> {
        self.connections
            .read()
            .await
            .get(id)
            .and_then(|entry| entry.binding.clone())
    }

    pub async fn is_registered(&self, id: &ConnectionId) -> bool {
        self.connections.read().await.contains_key(id)
    }

    /// Connections currently bound to `channel_id`.
    pub async fn members(&self, channel_id: &ChannelId) -> Vec<(ConnectionId, OutboundSender)> {
        self.connections
            .read()
            .await
            .iter()
            .filter(|(_, entry)| {
                entry
                    .binding
                    .as_ref()
                    .is_some_and(|binding| binding.channel_id == *channel_id)
            })
            .map(|(id, entry)| (*id, entry.sender.clone()))
            .collect()
    }

    pub async fn send_to(&self, id: &ConnectionId, msg: &str) -> Result<(), TransportError> {
        let connections = self.connections.read().await;
        let entry = connections.get(id).ok_or(TransportError::Closed(*id))?;
        entry
            .sender
            .send(Message::Text(msg.to_string()))
            .map_err(|e| TransportError::SendError(e.to_string()))
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
