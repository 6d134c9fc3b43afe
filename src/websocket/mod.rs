//! WebSocket sync engine
//!
//! Connection registry, channel presence, the inbound message dispatcher
//! and the broadcast fanout that relays canonical state to channel members.

mod connection;
mod dispatcher;
mod fanout;
mod protocol;
mod registry;
mod server;
mod session;

pub use connection::Connection;
pub use dispatcher::MessageDispatcher;
pub use fanout::{BroadcastFanout, FanoutReport, PresenceBroadcaster};
pub use protocol::{
    AddSlidePayload, ChannelId, ClientMessage, DeleteSlidePayload, Identity, InboundFrame,
    JoinChannel, MessageKind, ServerMessage, SlidePayload,
};
pub use registry::{Binding, ConnectionId, ConnectionRegistry, OutboundSender};
pub use server::WebSocketServer;
pub use session::{Channel, SessionManager};
