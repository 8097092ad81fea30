//! Storefront API Library
//!
//! Cart, order, and hosted-checkout lifecycle for the storefront backend.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod payments;
pub mod services;

use axum::{
    extract::State,
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

// Common query parameters for list endpoints
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

/// Uniform response envelope: every endpoint, success or failure, renders
/// this shape so clients can branch on `success` alone.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            message: Some(message),
            data: None,
        }
    }
}

/// Routes under `/api/v1`.
///
/// Cart and order routes sit behind the bearer-token middleware; the
/// payment webhook is deliberately outside it - the processor authenticates
/// with a signature, not a bearer identity.
pub fn api_v1_routes() -> Router<AppState> {
    let protected = Router::new()
        .nest("/cart", handlers::carts::cart_routes())
        .nest("/order", handlers::orders::order_routes())
        .route_layer(middleware::from_fn(auth::auth_middleware));

    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .route(
            "/payments/webhook",
            post(handlers::payment_webhooks::payment_webhook),
        )
        .merge(protected)
}

/// Assembles the full application router. Shared by `main` and the test
/// harness so both exercise identical middleware.
pub fn build_router(state: AppState, auth_service: Arc<auth::AuthService>) -> Router {
    let cors_layer = if state.config.is_development() {
        CorsLayer::permissive()
    } else {
        match HeaderValue::from_str(&state.config.public_url) {
            Ok(origin) => CorsLayer::new()
                .allow_origin(origin)
                .allow_methods(Any)
                .allow_headers(Any),
            Err(_) => {
                warn!("public_url is not a valid CORS origin; falling back to permissive CORS");
                CorsLayer::permissive()
            }
        }
    };

    Router::new()
        .route("/", get(|| async { "storefront-api up" }))
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .layer(Extension(auth_service))
        .with_state(state)
}

async fn api_status() -> Json<ApiResponse<Value>> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "storefront-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Json(ApiResponse::success(status_data))
}

async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Json(ApiResponse::success(health_data))
}

#[cfg(test)]
mod response_tests {
    use super::*;

    #[test]
    fn success_envelope_shape() {
        let response = ApiResponse::success(json!({"id": 1}));
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["success"], json!(true));
        assert_eq!(value["data"]["id"], json!(1));
        assert!(value.get("message").is_none());
    }

    #[test]
    fn error_envelope_shape() {
        let response = ApiResponse::<Value>::error("Not found: Order".into());
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["success"], json!(false));
        assert_eq!(value["message"], json!("Not found: Order"));
        assert_eq!(value["data"], json!(null));
    }

    #[test]
    fn list_query_defaults() {
        let query: ListQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 20);
    }
}
