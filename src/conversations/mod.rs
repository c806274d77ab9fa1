pub mod store;

use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use sqlx::SqlitePool;

pub use store::{Conversation, Message};

use crate::{AppResult, AppState, auth::AuthContext};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_conversations).post(create_conversation))
        .route("/{id}/messages", get(list_messages).post(send_message))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateConversationQuery {
    participants: Vec<String>,
}

#[debug_handler]
async fn create_conversation(
    State(db_pool): State<SqlitePool>,
    auth: AuthContext,
    Json(CreateConversationQuery { participants }): Json<CreateConversationQuery>,
) -> AppResult<Response> {
    let mut all = vec![auth.user_id];
    all.extend(participants);

    let (conversation, created) = store::find_or_create_conversation(&db_pool, &all).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(conversation)).into_response())
}

#[debug_handler]
async fn list_conversations(
    State(db_pool): State<SqlitePool>,
    auth: AuthContext,
) -> AppResult<Json<Vec<Conversation>>> {
    Ok(Json(store::list_conversations(&db_pool, &auth.user_id).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendMessageQuery {
    text: Option<String>,
    file: Option<String>,
}

#[debug_handler]
async fn send_message(
    State(db_pool): State<SqlitePool>,
    auth: AuthContext,
    Path(conversation_id): Path<String>,
    Json(SendMessageQuery { text, file }): Json<SendMessageQuery>,
) -> AppResult<Response> {
    let message =
        store::append_message(&db_pool, &conversation_id, &auth.user_id, text, file).await?;
    Ok((StatusCode::CREATED, Json(message)).into_response())
}

#[debug_handler]
async fn list_messages(
    State(db_pool): State<SqlitePool>,
    _auth: AuthContext,
    Path(conversation_id): Path<String>,
) -> AppResult<Json<Vec<Message>>> {
    Ok(Json(store::list_messages(&db_pool, &conversation_id).await?))
}
