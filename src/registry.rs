use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::events::ServerEvent;

/// One live realtime connection. Minted at upgrade time, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// In-memory map from conversation id to the sessions currently joined to it.
///
/// Membership is ephemeral: it lives only as long as the owning connection
/// and is rebuilt from explicit `joinRoom` events after a reconnect. Rooms
/// are not checked against the conversation store; joining a room that was
/// never persisted is allowed.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, HashMap<SessionId, UnboundedSender<ServerEvent>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: joining a room twice has no additional effect.
    pub fn join(&self, conversation_id: &str, session: SessionId, tx: UnboundedSender<ServerEvent>) {
        self.rooms
            .lock()
            .unwrap()
            .entry(conversation_id.to_owned())
            .or_default()
            .insert(session, tx);
    }

    /// No-op if the session was not a member.
    pub fn leave(&self, conversation_id: &str, session: SessionId) {
        let mut rooms = self.rooms.lock().unwrap();
        if let Some(members) = rooms.get_mut(conversation_id) {
            members.remove(&session);
            if members.is_empty() {
                rooms.remove(conversation_id);
            }
        }
    }

    /// Removes the session from every room it had joined. Called when the
    /// owning connection closes, so no membership entry outlives it.
    pub fn disconnect(&self, session: SessionId) {
        let mut rooms = self.rooms.lock().unwrap();
        rooms.retain(|_, members| {
            members.remove(&session);
            !members.is_empty()
        });
    }

    /// Best-effort fan-out to every member of the room except `exclude`.
    /// A member whose connection is already torn down is logged and skipped;
    /// the remaining members still receive the event.
    pub fn broadcast(&self, conversation_id: &str, event: ServerEvent, exclude: Option<SessionId>) {
        let rooms = self.rooms.lock().unwrap();
        let Some(members) = rooms.get(conversation_id) else {
            return;
        };

        for (session, tx) in members {
            if Some(*session) == exclude {
                continue;
            }
            if tx.send(event.clone()).is_err() {
                tracing::warn!(%session, conversation = conversation_id, "dropping event for stale session");
            }
        }
    }

    pub fn member_count(&self, conversation_id: &str) -> usize {
        self.rooms
            .lock()
            .unwrap()
            .get(conversation_id)
            .map_or(0, HashMap::len)
    }
}
