use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

mod webhook;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/github/webhook", post(webhook::webhook))
}

async fn health() -> &'static str { "ok" }
