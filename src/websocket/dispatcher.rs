//! Routes decoded frames to their handlers and owns the join/leave sequence.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::fanout::{BroadcastFanout, FanoutReport, PresenceBroadcaster};
use super::protocol::{
    AddSlidePayload, ChannelId, ClientMessage, DeleteSlidePayload, InboundFrame, JoinChannel,
    ServerMessage, SlidePayload,
};
use super::registry::{Binding, ConnectionId, ConnectionRegistry, OutboundSender};
use super::session::SessionManager;
use crate::config::SyncConfig;
use crate::db::{DocumentId, Storage};
use crate::error::{AppError, ProtocolError};
use crate::mutation::StateMutator;

pub struct MessageDispatcher {
    registry: Arc<ConnectionRegistry>,
    sessions: Arc<SessionManager>,
    fanout: Arc<BroadcastFanout>,
    presence: PresenceBroadcaster,
    mutator: StateMutator,
    /// Serializes binding changes with their presence updates so that a
    /// disconnect can never interleave with a join of the same connection.
    membership: Mutex<()>,
    notify_errors: bool,
}

impl MessageDispatcher {
    pub fn new(storage: Arc<dyn Storage>, config: &SyncConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let fanout = Arc::new(BroadcastFanout::new(registry.clone()));

        Self {
            registry,
            sessions: Arc::new(SessionManager::new()),
            presence: PresenceBroadcaster::new(fanout.clone()),
            fanout,
            mutator: StateMutator::new(storage),
            membership: Mutex::new(()),
            notify_errors: config.notify_errors,
        }
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    pub fn sessions(&self) -> Arc<SessionManager> {
        self.sessions.clone()
    }

    pub fn mutator(&self) -> &StateMutator {
        &self.mutator
    }

    /// Transport opened.
    pub async fn open(&self, id: ConnectionId, sender: OutboundSender) {
        self.registry.register(id, sender).await;
    }

    /// Transport closed or failed. Releases presence for the connection and
    /// for any peer found dead while announcing it.
    pub async fn close(&self, id: ConnectionId) {
        let mut pending = vec![id];

        while let Some(id) = pending.pop() {
            let _guard = self.membership.lock().await;
            let Some(binding) = self.registry.unregister(&id).await else {
                continue;
            };
            let report = self.leave(&binding).await;
            pending.extend(report.failed);
        }
    }

    /// Handles one inbound text frame. Errors never escape: a bad frame is
    /// logged and dropped, the connection stays open.
    pub async fn dispatch(&self, id: ConnectionId, text: &str) {
        let frame = match InboundFrame::decode(text) {
            Ok(frame) => frame,
            Err(ProtocolError::UnknownType(kind)) => {
                warn!("Ignoring unknown message type {} from connection {}", kind, id);
                return;
            }
            Err(e) => {
                warn!("Dropping frame from connection {}: {}", id, e);
                return;
            }
        };

        let kind = frame.message.kind();
        debug!("Connection {} sent {} for channel {}", id, kind.tag(), frame.channel_id);

        let result = match frame.message {
            ClientMessage::JoinChannel(join) => self.join_channel(id, frame.channel_id, join).await,
            ClientMessage::UpsertElement(payload) | ClientMessage::DeleteElement(payload) => {
                self.replace_elements(id, frame.channel_id, payload).await
            }
            ClientMessage::AddSlide(payload) => self.add_slide(frame.channel_id, payload).await,
            ClientMessage::DeleteSlide(payload) => self.delete_slide(frame.channel_id, payload).await,
        };

        if let Err(e) = result {
            self.report_failure(id, frame.channel_id, kind.tag(), e).await;
        }
    }

    async fn join_channel(
        &self,
        id: ConnectionId,
        channel_id: ChannelId,
        join: JoinChannel,
    ) -> Result<(), AppError> {
        let binding = Binding {
            channel_id,
            identity: join.identity,
        };

        let failed = {
            let _guard = self.membership.lock().await;
            let previous = self.registry.bind(&id, binding.clone()).await?;

            let mut failed = Vec::new();
            if let Some(previous) = previous {
                failed.extend(self.leave(&previous).await.failed);
            }

            let users = self.sessions.join(channel_id, &binding.identity).await;
            info!("{} joined channel {} ({} present)", binding.identity, channel_id, users.len());
            failed.extend(self.presence.announce(channel_id, users).await.failed);
            failed
        };

        for dead in failed {
            self.close(dead).await;
        }
        Ok(())
    }

    /// Releases a binding's presence and tells the remaining members.
    /// Caller holds the membership lock.
    async fn leave(&self, binding: &Binding) -> FanoutReport {
        let users = self.sessions.leave(binding.channel_id, &binding.identity).await;
        info!("{} left channel {}", binding.identity, binding.channel_id);
        self.presence.announce(binding.channel_id, users).await
    }

    async fn replace_elements(
        &self,
        origin: ConnectionId,
        channel_id: ChannelId,
        payload: SlidePayload,
    ) -> Result<(), AppError> {
        let slide = self
            .mutator
            .replace_slide_elements(channel_id, payload.slide.id, payload.slide.elements)
            .await?;

        let message = ServerMessage::SlideUpdate { slide };
        self.publish(channel_id, &message, Some(origin)).await;
        Ok(())
    }

    async fn add_slide(&self, channel_id: ChannelId, payload: AddSlidePayload) -> Result<(), AppError> {
        let document_id = payload.slide.document_id.unwrap_or(channel_id);
        self.mutator.add_slide(document_id, payload.slide).await?;
        self.refresh_slide_list(channel_id, document_id).await
    }

    async fn delete_slide(&self, channel_id: ChannelId, payload: DeleteSlidePayload) -> Result<(), AppError> {
        self.mutator.delete_slide(channel_id, payload.slide_id).await?;
        self.refresh_slide_list(channel_id, channel_id).await
    }

    /// Sends the full, ordered slide list of `document_id` to every member
    /// of `channel_id`, sender included.
    pub async fn refresh_slide_list(
        &self,
        channel_id: ChannelId,
        document_id: DocumentId,
    ) -> Result<(), AppError> {
        let list = self.mutator.slide_list(document_id).await?;
        let message = ServerMessage::SlideList {
            slides: list.slides,
            document: Some(list.document),
        };
        self.publish(channel_id, &message, None).await;
        Ok(())
    }

    /// Broadcasts a mutation result, honouring the message's echo policy.
    async fn publish(&self, channel_id: ChannelId, message: &ServerMessage, origin: Option<ConnectionId>) {
        let exclude = origin.filter(|_| !message.echoes_to_sender());
        let report = self.fanout.broadcast(channel_id, message, exclude).await;
        for dead in report.failed {
            self.close(dead).await;
        }
    }

    async fn report_failure(&self, id: ConnectionId, channel_id: ChannelId, tag: &str, e: AppError) {
        match &e {
            AppError::StorageError(_) if e.is_not_found() => {
                warn!("{} from connection {} aborted: {}", tag, id, e)
            }
            AppError::TransportError(_) | AppError::ProtocolError(_) | AppError::ValidationError(_) => {
                warn!("{} from connection {} rejected: {}", tag, id, e)
            }
            _ => error!("{} from connection {} failed: {}", tag, id, e),
        }

        if self.notify_errors {
            let message = ServerMessage::Error {
                message: format!("{} failed: {}", tag, e),
            };
            if let Err(send_err) = self.fanout.send_to(&id, channel_id, &message).await {
                debug!("Could not notify connection {} of failure: {}", id, send_err);
            }
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.connection_count().await
    }
}
