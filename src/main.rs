mod bots;
mod crossword;
mod jeopardy;
mod judge;
mod scheduler;
mod shared;
mod store;
mod websockets;

use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bots::BotManager;
use crate::crossword::CrosswordService;
use crate::jeopardy::JeopardyService;
use crate::shared::AppState;
use crate::store::{MemoryStore, PostgresStore, Store};
use crate::websockets::{EventRouter, InMemoryTransport, Transport};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parlor=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting parlor game server");

    // Use PostgreSQL when DATABASE_URL is set, otherwise in-memory
    let store: Arc<dyn Store> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => match sqlx::PgPool::connect(&database_url).await {
            Ok(pool) => {
                info!("Connected to PostgreSQL");
                Arc::new(PostgresStore::new(pool))
            }
            Err(e) => {
                warn!(error = %e, "Failed to connect to PostgreSQL, falling back to in-memory store");
                Arc::new(MemoryStore::new())
            }
        },
        Err(_) => {
            info!("No DATABASE_URL set, using in-memory store (state lost on restart)");
            Arc::new(MemoryStore::new())
        }
    };

    let transport: Arc<dyn Transport> = Arc::new(InMemoryTransport::new());
    let crossword = Arc::new(CrosswordService::new(store.clone(), transport.clone()));
    let jeopardy = Arc::new(JeopardyService::new(store.clone(), transport.clone()));
    let bots = Arc::new(BotManager::new(crossword.clone()));
    let router = Arc::new(EventRouter::new(
        crossword.clone(),
        jeopardy.clone(),
        bots.clone(),
        transport.clone(),
    ));

    let app_state = AppState::new(store.clone(), transport, router);

    // Allow origins from environment for production, localhost for dev.
    // Set ALLOWED_ORIGINS="*" to allow all origins (dev only!)
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:5173,https://localhost:5173".to_string());

    let cors = if allowed_origins.trim() == "*" {
        warn!("CORS: allowing ALL origins (insecure for production)");
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .split(',')
            .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
            .collect();
        info!("Allowed CORS origins: {:?}", origins);
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    };

    let stats_store = store.clone();
    let app = Router::new()
        .route("/", get(|| async { "parlor" }))
        .route("/health", get(|| async { "OK" }))
        .route(
            "/stats",
            get(move || {
                let store = stats_store.clone();
                async move {
                    let users = store.get_user_count().await.unwrap_or(0);
                    Json(json!({ "users": users }))
                }
            }),
        )
        .route("/ws", get(websockets::websocket_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    // PORT is provided by the platform; default to 3000 for local dev
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    info!("Server running on {}", addr);
    axum::serve(listener, app).await.unwrap();
}
