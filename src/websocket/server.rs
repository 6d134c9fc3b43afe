use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use super::connection::Connection as WebSocketConnection;
use super::dispatcher::MessageDispatcher;
use crate::config::SyncConfig;

pub struct WebSocketServer {
    dispatcher: Arc<MessageDispatcher>,
    config: SyncConfig,
}

impl WebSocketServer {
    pub fn new(dispatcher: Arc<MessageDispatcher>, config: SyncConfig) -> Self {
        Self { dispatcher, config }
    }

    /// Accepts connections until the listener fails.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        server.handle_connection(stream, addr).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept WebSocket connection: {}", e);
                    break;
                }
            }
        }
    }

    pub async fn handle_connection(self: Arc<Self>, raw_stream: TcpStream, addr: SocketAddr) {
        info!("New WebSocket connection from: {}", addr);

        let ws_stream = match tokio_tungstenite::accept_async(raw_stream).await {
            Ok(ws) => ws,
            Err(e) => {
                error!("Error during WebSocket handshake: {}", e);
                return;
            }
        };

        let (ws_sink, ws_stream) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let mut connection = WebSocketConnection::new(tx.clone(), self.dispatcher.clone());
        let connection_id = connection.id();

        let mut heartbeat_task = connection.start_heartbeat(&self.config);

        self.dispatcher.open(connection_id, tx).await;

        // Forward messages from rx to WebSocket
        let mut send_task = tokio::spawn(async move {
            let mut ws_sink = ws_sink;
            let mut rx = rx;

            while let Some(message) = rx.recv().await {
                if let Err(e) = ws_sink.send(message).await {
                    error!("Error sending WebSocket message: {}", e);
                    break;
                }
            }

            if let Err(e) = ws_sink.close().await {
                error!("Error closing WebSocket connection: {}", e);
            }
        });

        // Frames are handled one at a time, in order. Shutdown is only
        // observed between frames so a dispatched write always completes.
        let mut receive_task = tokio::spawn(async move {
            let mut ws_stream = ws_stream;

            loop {
                let message = tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    message = ws_stream.next() => message,
                };

                match message {
                    Some(Ok(msg)) => {
                        if let Err(e) = connection.handle_message(msg).await {
                            info!("Connection {} finished: {}", connection.id(), e);
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("Error receiving WebSocket message: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        });

        tokio::select! {
            _ = &mut send_task => {
                info!("Send task completed for connection {}", connection_id);
            }
            _ = &mut receive_task => {
                info!("Receive task completed for connection {}", connection_id);
            }
            _ = &mut heartbeat_task => {
                info!("Heartbeat ended for connection {}", connection_id);
            }
        }

        let _ = shutdown_tx.send(true);
        heartbeat_task.abort();
        send_task.abort();

        self.dispatcher.close(connection_id).await;
        info!("Connection {} closed", connection_id);
    }

    pub fn dispatcher(&self) -> Arc<MessageDispatcher> {
        self.dispatcher.clone()
    }
}
