use std::sync::Arc;

use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, warn};

use super::protocol::{ChannelId, Identity, ServerMessage};
use super::registry::{ConnectionId, ConnectionRegistry};
use crate::error::TransportError;

/// Outcome of one fanout. `failed` lists recipients whose transport
/// turned out to be closed; the caller unregisters them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub failed: Vec<ConnectionId>,
}

pub struct BroadcastFanout {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastFanout {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Delivers `message` to every connection bound to `channel_id`,
    /// skipping `exclude`. Never fails as a whole.
    pub async fn broadcast(
        &self,
        channel_id: ChannelId,
        message: &ServerMessage,
        exclude: Option<ConnectionId>,
    ) -> FanoutReport {
        let mut report = FanoutReport::default();

        let text = match message.to_frame(channel_id) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize broadcast for channel {}: {}", channel_id, e);
                return report;
            }
        };

        for (id, sender) in self.registry.members(&channel_id).await {
            if exclude == Some(id) {
                continue;
            }

            if sender.is_closed() {
                warn!("Skipping closed connection {} in channel {}", id, channel_id);
                report.failed.push(id);
                continue;
            }

            match sender.send(Message::Text(text.clone())) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    error!("Failed to broadcast to connection {}: {}", id, e);
                    report.failed.push(id);
                }
            }
        }

        debug!(
            "Broadcast to channel {}: {} delivered, {} failed",
            channel_id,
            report.delivered,
            report.failed.len()
        );
        report
    }

    /// Sends `message` to a single connection.
    pub async fn send_to(
        &self,
        id: &ConnectionId,
        channel_id: ChannelId,
        message: &ServerMessage,
    ) -> Result<(), TransportError> {
        let text = message
            .to_frame(channel_id)
            .map_err(|e| TransportError::SendError(e.to_string()))?;
        self.registry.send_to(id, &text).await
    }
}

/// Emits the presence list of a channel to all of its members.
pub struct PresenceBroadcaster {
    fanout: Arc<BroadcastFanout>,
}

impl PresenceBroadcaster {
    pub fn new(fanout: Arc<BroadcastFanout>) -> Self {
        Self { fanout }
    }

    pub async fn announce(&self, channel_id: ChannelId, users: Vec<Identity>) -> FanoutReport {
        self.fanout
            .broadcast(channel_id, &ServerMessage::PresenceUpdate { users }, None)
            .await
    }
}
