use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{signal, sync::mpsc};
use tracing::{error, info, warn};

use storefront_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);
    let config = Arc::new(cfg);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    // Payment processor client
    let secret_key = config.payment_secret_key.clone().unwrap_or_else(|| {
        warn!("Payment secret key not configured; checkout session creation will be rejected by the processor");
        String::new()
    });
    let gateway = Arc::new(api::payments::HostedCheckoutClient::new(
        secret_key,
        config.payment_api_base.clone(),
    ));

    // Token verification for protected routes
    let auth_service = Arc::new(api::auth::AuthService::new(api::auth::AuthConfig::new(
        config.jwt_secret.clone(),
        "storefront-api".to_string(),
        "storefront-clients".to_string(),
        Duration::from_secs(config.jwt_expiration),
    )));

    // Aggregate app services used by HTTP handlers
    let services = api::handlers::AppServices::new(
        db_arc.clone(),
        Arc::new(event_sender.clone()),
        config.clone(),
        gateway,
    );

    let app_state = api::AppState {
        db: db_arc,
        config: config.clone(),
        event_sender,
        services,
    };

    let app = api::build_router(app_state, auth_service);

    // Bind and serve
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("storefront-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
