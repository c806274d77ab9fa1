use axum::{
    Router, debug_handler,
    extract::{State, WebSocketUpgrade, ws::WebSocket},
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::{
    AppState,
    auth::AuthContext,
    events::{ClientEvent, ServerEvent},
    registry::{RoomRegistry, SessionId},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(gateway_ws))
}

#[debug_handler]
async fn gateway_ws(
    State(state): State<AppState>,
    auth: AuthContext,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |stream| handle_session(state, auth, stream))
}

/// One realtime session, from upgrade to disconnect.
///
/// Inbound frames are handled to completion in arrival order, which is what
/// gives each room its per-room broadcast ordering. A malformed frame is
/// dropped; this channel is best-effort and carries no acknowledgements.
async fn handle_session(state: AppState, auth: AuthContext, stream: WebSocket) {
    let session = SessionId::new();
    tracing::info!(%session, user = %auth.user_id, "realtime session opened");

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let (mut sink, mut source) = stream.split();

    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(frame) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(frame.into()).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = source.next().await {
        let Ok(event) = serde_json::from_slice::<ClientEvent>(&frame.into_data()) else {
            tracing::debug!(%session, "dropping unparseable frame");
            continue;
        };

        dispatch(&state.registry, session, &tx, event);
    }

    state.registry.disconnect(session);
    send_task.abort();
    tracing::info!(%session, user = %auth.user_id, "realtime session closed");
}

fn dispatch(
    registry: &RoomRegistry,
    session: SessionId,
    tx: &mpsc::UnboundedSender<ServerEvent>,
    event: ClientEvent,
) {
    match event {
        ClientEvent::JoinRoom(conversation_id) => {
            registry.join(&conversation_id, session, tx.clone());
        }
        ClientEvent::LeaveRoom(conversation_id) => {
            registry.leave(&conversation_id, session);
        }
        // Persistence already happened through the delivery API; the
        // sender stays included so its other tabs reconcile too.
        ClientEvent::SendMessage(message) => {
            let conversation_id = message.conversation_id.clone();
            registry.broadcast(&conversation_id, ServerEvent::NewMessage(message), None);
        }
        ClientEvent::Typing {
            conversation_id,
            is_typing,
        } => {
            registry.broadcast(
                &conversation_id,
                ServerEvent::Typing {
                    conversation_id: conversation_id.clone(),
                    is_typing,
                },
                Some(session),
            );
        }
    }
}
