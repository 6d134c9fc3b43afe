use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::dispatcher::MessageDispatcher;
use super::registry::ConnectionId;
use crate::config::SyncConfig;
use crate::error::{ProtocolError, TransportError};

/// Per-socket state: owns the outbound queue and the heartbeat clock.
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Message>,
    dispatcher: Arc<MessageDispatcher>,
    last_heartbeat: Arc<RwLock<Instant>>,
}

impl Connection {
    pub fn new(tx: mpsc::UnboundedSender<Message>, dispatcher: Arc<MessageDispatcher>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
            dispatcher,
            last_heartbeat: Arc::new(RwLock::new(Instant::now())),
        }
    }

    /// Handles one transport message. An `Err` means the connection is over.
    pub async fn handle_message(&mut self, msg: Message) -> Result<(), TransportError> {
        *self.last_heartbeat.write().await = Instant::now();

        match msg {
            Message::Text(text) => {
                self.dispatcher.dispatch(self.id, &text).await;
            }
            Message::Close(_) => {
                info!("Client initiated close for connection {}", self.id);
                return Err(TransportError::Closed(self.id));
            }
            Message::Ping(data) => {
                self.tx
                    .send(Message::Pong(data))
                    .map_err(|e| TransportError::SendError(format!("Failed to send pong: {}", e)))?;
            }
            Message::Pong(_) => {}
            Message::Binary(bin) => {
                let e = ProtocolError::Unsupported(format!("binary frame of {} bytes", bin.len()));
                warn!("Dropping frame from connection {}: {}", self.id, e);
            }
            Message::Frame(_) => {
                warn!("Received raw frame on connection {}", self.id);
            }
        }
        Ok(())
    }

    /// Pings the client every `interval`; the task ends when the client has
    /// been silent for longer than `timeout` or the outbound queue is gone.
    pub fn start_heartbeat(&self, config: &SyncConfig) -> JoinHandle<()> {
        let last_heartbeat = self.last_heartbeat.clone();
        let tx = self.tx.clone();
        let id = self.id;
        let interval = Duration::from_secs(config.heartbeat_interval_secs.max(1));
        let timeout = Duration::from_secs(config.heartbeat_timeout_secs);

        tokio::spawn(async move {
            loop {
                sleep(interval).await;

                let elapsed = Instant::now().duration_since(*last_heartbeat.read().await);

                if elapsed > timeout {
                    error!("Heartbeat timeout for connection {}", id);
                    break;
                }

                if let Err(e) = tx.send(Message::Ping(vec![])) {
                    error!("Failed to send heartbeat for connection {}: {}", id, e);
                    break;
                }
            }
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use serde_json::json;

    async fn connection() -> (Connection, mpsc::UnboundedReceiver<Message>, Arc<MessageDispatcher>) {
        let dispatcher = Arc::new(MessageDispatcher::new(
            Arc::new(MemoryStore::new()),
            &SyncConfig::default(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Connection::new(tx.clone(), dispatcher.clone());
        dispatcher.open(connection.id(), tx).await;
        (connection, rx, dispatcher)
    }

    #[tokio::test]
    async fn test_ping_is_answered() {
        let (mut connection, mut rx, _) = connection().await;

        connection.handle_message(Message::Ping(vec![1, 2])).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), Message::Pong(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_close_ends_connection() {
        let (mut connection, _rx, _) = connection().await;
        assert!(matches!(
            connection.handle_message(Message::Close(None)).await,
            Err(TransportError::Closed(_))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_frames_keep_connection_open() {
        let (mut connection, mut rx, dispatcher) = connection().await;

        connection.handle_message(Message::Binary(vec![0xde, 0xad])).await.unwrap();
        connection.handle_message(Message::Text("garbage".into())).await.unwrap();

        assert!(rx.try_recv().is_err());
        assert!(dispatcher.registry().is_registered(&connection.id()).await);
    }

    #[tokio::test]
    async fn test_text_is_dispatched() {
        let (mut connection, mut rx, dispatcher) = connection().await;
        let channel = Uuid::new_v4();
        let join = json!({ "type": "JOIN_CHANNEL", "channelId": channel, "payload": { "identity": "ada" } });

        connection.handle_message(Message::Text(join.to_string())).await.unwrap();

        assert!(matches!(rx.try_recv(), Ok(Message::Text(_))));
        assert_eq!(dispatcher.sessions().presence_of(&channel).await, vec!["ada"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_times_out_silent_client() {
        let (connection, mut rx, _) = connection().await;
        let config = SyncConfig {
            heartbeat_interval_secs: 1,
            heartbeat_timeout_secs: 2,
            notify_errors: false,
        };

        let handle = connection.start_heartbeat(&config);
        handle.await.unwrap();

        let mut pings = 0;
        while let Ok(Message::Ping(_)) = rx.try_recv() {
            pings += 1;
        }
        assert_eq!(pings, 2);
    }
}
