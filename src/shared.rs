use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::store::Store;
use crate::websockets::{EventRouter, Transport};

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub transport: Arc<dyn Transport>,
    pub router: Arc<EventRouter>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        router: Arc<EventRouter>,
    ) -> Self {
        Self {
            store,
            transport,
            router,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal,
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::StoreError(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::StoreError(format!("serialization: {}", e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::StoreError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Store error: {}", msg),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}
