//! HTTP surface over [`MarketService`].
//!
//! - `requests`: dealer buy requests and direct acceptance
//! - `chats`: chats, messages and deal submission
//! - `orders`: order reads and status updates
//! - `directory`: user registration and the MSP catalog

pub mod actor;
pub mod chats;
pub mod directory;
pub mod error;
pub mod extract;
pub mod orders;
pub mod requests;

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::service::MarketService;

/// Success envelope shared by all handlers.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            data,
            message: message.into(),
        })
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the full application router.
pub fn router(service: MarketService) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(requests::router())
        .merge(chats::router())
        .merge(orders::router())
        .merge(directory::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}
