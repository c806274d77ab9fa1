use std::sync::Arc;

use axum::{Router, http::HeaderValue};
use orbit::{AppState, conversations, db, registry::RoomRegistry, ws};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("orbit=info")),
        )
        .init();

    let database_url =
        dotenv::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:orbit.db?mode=rwc".to_owned());
    let db_pool = db::connect(&database_url).await?;

    let app_state = AppState {
        db_pool,
        registry: Arc::new(RoomRegistry::new()),
    };

    let frontend_url =
        dotenv::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_owned());
    let cors = CorsLayer::new()
        .allow_origin(frontend_url.parse::<HeaderValue>()?)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/conversations", conversations::router())
        .merge(ws::router())
        .with_state(app_state)
        .layer(cors);

    let port = dotenv::var("PORT").unwrap_or_else(|_| "5000".to_owned());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!("server running on port {port}");
    axum::serve(listener, app).await?;
    Ok(())
}
