use serde::{Deserialize, Serialize};

use crate::conversations::Message;

/// Events a client may send over the realtime channel.
///
/// Frames are JSON text of the form `{"event": <name>, "data": <payload>}`.
/// Anything that does not parse into one of these is dropped by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    JoinRoom(String),
    LeaveRoom(String),
    /// The message is expected to already be persisted through the delivery
    /// API; the gateway only fans it out.
    SendMessage(Message),
    #[serde(rename_all = "camelCase")]
    Typing {
        conversation_id: String,
        is_typing: bool,
    },
}

/// Events the gateway pushes to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    NewMessage(Message),
    #[serde(rename_all = "camelCase")]
    Typing {
        conversation_id: String,
        is_typing: bool,
    },
}
