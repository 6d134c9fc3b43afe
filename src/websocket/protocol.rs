//! JSON wire protocol.
//!
//! Every frame has the shape `{ "type": TAG, "channelId": <uuid>, "payload": {...} }`.
//! Inbound frames are decoded in two steps: the envelope first, then the
//! payload into the typed shape selected by the tag.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{Document, DocumentId, NewSlide, Slide, SlideElements, SlideId};
use crate::error::ProtocolError;

/// A channel is identified by the id of the document it edits.
pub type ChannelId = DocumentId;
/// Display name a user supplies on join.
pub type Identity = String;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "channelId")]
    channel_id: ChannelId,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    JoinChannel,
    UpsertElement,
    DeleteElement,
    AddSlide,
    DeleteSlide,
}

impl MessageKind {
    pub const ALL: [MessageKind; 5] = [
        MessageKind::JoinChannel,
        MessageKind::UpsertElement,
        MessageKind::DeleteElement,
        MessageKind::AddSlide,
        MessageKind::DeleteSlide,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            MessageKind::JoinChannel => "JOIN_CHANNEL",
            MessageKind::UpsertElement => "UPSERT_ELEMENT",
            MessageKind::DeleteElement => "DELETE_ELEMENT",
            MessageKind::AddSlide => "ADD_SLIDE",
            MessageKind::DeleteSlide => "DELETE_SLIDE",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinChannel {
    pub identity: Identity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlidePayload {
    pub slide: SlideElements,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddSlidePayload {
    #[serde(default)]
    pub slide: NewSlide,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSlidePayload {
    pub slide_id: SlideId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    JoinChannel(JoinChannel),
    UpsertElement(SlidePayload),
    DeleteElement(SlidePayload),
    AddSlide(AddSlidePayload),
    DeleteSlide(DeleteSlidePayload),
}

impl ClientMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ClientMessage::JoinChannel(_) => MessageKind::JoinChannel,
            ClientMessage::UpsertElement(_) => MessageKind::UpsertElement,
            ClientMessage::DeleteElement(_) => MessageKind::DeleteElement,
            ClientMessage::AddSlide(_) => MessageKind::AddSlide,
            ClientMessage::DeleteSlide(_) => MessageKind::DeleteSlide,
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(kind: MessageKind, value: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value)
        .map_err(|e| ProtocolError::Malformed(format!("{} payload: {}", kind.tag(), e)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub channel_id: ChannelId,
    pub message: ClientMessage,
}

impl InboundFrame {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let kind = MessageKind::from_tag(&envelope.kind)
            .ok_or_else(|| ProtocolError::UnknownType(envelope.kind.clone()))?;

        let message = match kind {
            MessageKind::JoinChannel => {
                let join: JoinChannel = payload(kind, envelope.payload)?;
                if join.identity.trim().is_empty() {
                    return Err(ProtocolError::Malformed("JOIN_CHANNEL identity is empty".into()));
                }
                ClientMessage::JoinChannel(join)
            }
            MessageKind::UpsertElement => ClientMessage::UpsertElement(payload(kind, envelope.payload)?),
            MessageKind::DeleteElement => ClientMessage::DeleteElement(payload(kind, envelope.payload)?),
            MessageKind::AddSlide => ClientMessage::AddSlide(payload(kind, envelope.payload)?),
            MessageKind::DeleteSlide => ClientMessage::DeleteSlide(payload(kind, envelope.payload)?),
        };

        Ok(Self {
            channel_id: envelope.channel_id,
            message,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    #[serde(rename = "PRESENCE_UPDATE")]
    PresenceUpdate { users: Vec<Identity> },
    #[serde(rename = "UPDATE_SLIDE")]
    SlideUpdate { slide: Slide },
    #[serde(rename = "SLIDE_LIST")]
    SlideList {
        slides: Vec<Slide>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        document: Option<Document>,
    },
    #[serde(rename = "ERROR")]
    Error { message: String },
}

impl ServerMessage {
    /// Whether the originating connection receives its own broadcast.
    ///
    /// Element updates are already applied locally by the sender; full
    /// refreshes carry server-assigned state the sender needs as well.
    pub fn echoes_to_sender(&self) -> bool {
        !matches!(self, ServerMessage::SlideUpdate { .. })
    }

    pub fn to_frame(&self, channel_id: ChannelId) -> Result<String, serde_json::Error> {
        serde_json::to_string(&OutboundFrame {
            channel_id,
            message: self,
        })
    }
}

#[derive(Serialize)]
struct OutboundFrame<'a> {
    #[serde(rename = "channelId")]
    channel_id: ChannelId,
    #[serde(flatten)]
    message: &'a ServerMessage,
}
