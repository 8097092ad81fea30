#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use storefront_api::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db,
    entities::{product, user, ProductModel, UserModel},
    events::{self, EventSender},
    handlers::AppServices,
    payments::{webhook, HostedCheckoutClient},
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Helper harness backed by an in-memory SQLite database.
///
/// The router is the real one from `build_router`, so requests traverse the
/// same middleware stack as production.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub auth: Arc<AuthService>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a test application with default configuration.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Construct a test application, letting the caller adjust configuration
    /// (shipping price, cart policy, payment API base) before startup.
    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "test_secret_key_for_testing_purposes_only".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // A single pooled connection keeps every query on the same in-memory
        // database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment_secret_key = Some("sk_test_key".to_string());
        cfg.payment_webhook_secret = Some(TEST_WEBHOOK_SECRET.to_string());
        customize(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to create test schema");

        let db_arc = Arc::new(pool);
        let config = Arc::new(cfg);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(HostedCheckoutClient::new(
            config
                .payment_secret_key
                .clone()
                .unwrap_or_default(),
            config.payment_api_base.clone(),
        ));

        let auth = Arc::new(AuthService::new(AuthConfig::new(
            config.jwt_secret.clone(),
            "storefront-api".to_string(),
            "storefront-clients".to_string(),
            Duration::from_secs(config.jwt_expiration),
        )));

        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            config.clone(),
            gateway,
        );

        let state = AppState {
            db: db_arc,
            config,
            event_sender,
            services,
        };

        let router = storefront_api::build_router(state.clone(), auth.clone());

        Self {
            router,
            state,
            auth,
            _event_task: event_task,
        }
    }

    /// Inserts a user row and returns it.
    pub async fn seed_user(&self, username: &str, email: &str, admin: bool) -> UserModel {
        let model = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username.to_string()),
            email: Set(email.to_string()),
            is_admin: Set(admin),
            created_at: Set(Utc::now()),
        };
        model
            .insert(&*self.state.db)
            .await
            .expect("failed to seed user")
    }

    /// Inserts a catalog product and returns it.
    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> ProductModel {
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            image: Set(format!("https://img.example.com/{}.png", name)),
            price: Set(price),
            count_in_stock: Set(stock),
            created_at: Set(Utc::now()),
        };
        model
            .insert(&*self.state.db)
            .await
            .expect("failed to seed product")
    }

    /// Access token for a seeded user.
    pub fn token_for(&self, user: &UserModel) -> String {
        self.auth.issue_token(user).expect("failed to issue token")
    }

    /// Sends a JSON request through the full router and returns status plus
    /// parsed body.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::String(
                String::from_utf8_lossy(&bytes).to_string(),
            ))
        };

        (status, value)
    }

    /// Delivers a signed webhook payload the way the payment processor would.
    pub async fn deliver_webhook(&self, payload: &Value) -> StatusCode {
        let body = payload.to_string();
        let signature = webhook::signature_header(body.as_bytes(), TEST_WEBHOOK_SECRET);
        self.deliver_webhook_with_signature(&body, &signature).await
    }

    /// Delivers a webhook payload with an arbitrary signature header.
    pub async fn deliver_webhook_with_signature(
        &self,
        body: &str,
        signature: &str,
    ) -> StatusCode {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header(header::CONTENT_TYPE, "application/json")
            .header(webhook::SIGNATURE_HEADER, signature)
            .body(Body::from(body.to_string()))
            .expect("failed to build webhook request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("webhook request failed")
            .status()
    }
}

/// Builds a `checkout.session.completed` event payload for an order.
pub fn completed_session_event(order_id: Uuid, payment_status: &str) -> Value {
    serde_json::json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": format!("cs_{}", Uuid::new_v4().simple()),
                "metadata": { "orderId": order_id.to_string(), "test": "ok" },
                "payment_status": payment_status,
                "customer_details": { "email": "buyer@example.com" }
            }
        }
    })
}
