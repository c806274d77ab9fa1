pub mod auth;
pub mod conversations;
pub mod db;
pub mod events;
pub mod registry;
pub mod ws;

use std::sync::Arc;

use axum::{
    Json,
    extract::FromRef,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use sqlx::SqlitePool;

use registry::RoomRegistry;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub registry: Arc<RoomRegistry>,
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    /// Malformed input to the store: empty message, degenerate participant set.
    Validation(String),
    /// Reference to a conversation that does not exist.
    NotFound(String),
    /// No identity supplied on a protected route.
    Unauthorized,
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "not authorized, no token".to_owned(),
            ),
            AppError::Internal(err) => {
                tracing::error!("internal error: {err}\n{}", err.backtrace());
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Server Error: {err}"),
                )
            }
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}
