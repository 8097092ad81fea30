use crate::config::AppConfig;
use crate::errors::ServiceError;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement,
};
use std::time::Duration;
use tracing::{debug, info};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Establishes a connection pool to the database
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };
    establish_connection_with_config(&config).await
}

/// Establishes a connection pool using pool sizing from the app config
pub async fn establish_connection_from_app_config(
    cfg: &AppConfig,
) -> Result<DbPool, ServiceError> {
    let config = DbConfig {
        url: cfg.database_url.clone(),
        max_connections: cfg.db_max_connections,
        min_connections: cfg.db_min_connections,
        connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
    };
    establish_connection_with_config(&config).await
}

async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .sqlx_logging(false);

    let pool = Database::connect(options).await?;
    info!("Database connection established");
    Ok(pool)
}

/// Creates the schema when `auto_migrate` is enabled.
///
/// Statements are idempotent (`CREATE TABLE IF NOT EXISTS`) and written per
/// backend so development SQLite files and production Postgres both bootstrap
/// without an external migration step.
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    let backend = pool.get_database_backend();
    let statements = match backend {
        DbBackend::Sqlite => SQLITE_SCHEMA,
        DbBackend::Postgres => POSTGRES_SCHEMA,
        other => {
            return Err(ServiceError::InvalidOperation(format!(
                "unsupported database backend: {:?}",
                other
            )))
        }
    };

    for sql in statements {
        debug!("Applying schema statement");
        pool.execute(Statement::from_string(backend, (*sql).to_string()))
            .await?;
    }

    info!("Database schema is up to date");
    Ok(())
}

const SQLITE_SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY NOT NULL,
        username TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        is_admin INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS products (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        image TEXT NOT NULL,
        price REAL NOT NULL,
        count_in_stock INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS carts (
        id TEXT PRIMARY KEY NOT NULL,
        user_id TEXT NOT NULL UNIQUE,
        version INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS cart_items (
        id TEXT PRIMARY KEY NOT NULL,
        cart_id TEXT NOT NULL,
        product_id TEXT NOT NULL,
        name TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        unit_price REAL NOT NULL,
        image TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (cart_id, product_id)
    );"#,
    r#"CREATE TABLE IF NOT EXISTS orders (
        id TEXT PRIMARY KEY NOT NULL,
        user_id TEXT NOT NULL,
        username TEXT NOT NULL,
        email TEXT NOT NULL,
        shipping_address TEXT NOT NULL,
        shipping_city TEXT NOT NULL,
        shipping_postal_code TEXT NOT NULL,
        shipping_country TEXT NOT NULL,
        payment_method TEXT NOT NULL,
        shipping_price REAL NOT NULL,
        total_price REAL NOT NULL,
        status TEXT NOT NULL,
        paid_at TEXT,
        payment_status TEXT,
        payment_update_time TEXT,
        payer_email TEXT,
        delivered_at TEXT,
        version INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS order_items (
        id TEXT PRIMARY KEY NOT NULL,
        order_id TEXT NOT NULL,
        product_id TEXT NOT NULL,
        name TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        unit_price REAL NOT NULL,
        image TEXT NOT NULL,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE INDEX IF NOT EXISTS idx_orders_user_id ON orders (user_id);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_order_items_order_id ON order_items (order_id);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_cart_items_cart_id ON cart_items (cart_id);"#,
];

const POSTGRES_SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        username TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        is_admin BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS products (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        image TEXT NOT NULL,
        price NUMERIC(19, 4) NOT NULL,
        count_in_stock INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS carts (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL UNIQUE,
        version INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS cart_items (
        id UUID PRIMARY KEY,
        cart_id UUID NOT NULL,
        product_id UUID NOT NULL,
        name TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        unit_price NUMERIC(19, 4) NOT NULL,
        image TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        UNIQUE (cart_id, product_id)
    );"#,
    r#"CREATE TABLE IF NOT EXISTS orders (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL,
        username TEXT NOT NULL,
        email TEXT NOT NULL,
        shipping_address TEXT NOT NULL,
        shipping_city TEXT NOT NULL,
        shipping_postal_code TEXT NOT NULL,
        shipping_country TEXT NOT NULL,
        payment_method TEXT NOT NULL,
        shipping_price NUMERIC(19, 4) NOT NULL,
        total_price NUMERIC(19, 4) NOT NULL,
        status VARCHAR(20) NOT NULL,
        paid_at TIMESTAMPTZ,
        payment_status TEXT,
        payment_update_time TEXT,
        payer_email TEXT,
        delivered_at TIMESTAMPTZ,
        version INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    );"#,
    r#"CREATE TABLE IF NOT EXISTS order_items (
        id UUID PRIMARY KEY,
        order_id UUID NOT NULL,
        product_id UUID NOT NULL,
        name TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        unit_price NUMERIC(19, 4) NOT NULL,
        image TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    );"#,
    r#"CREATE INDEX IF NOT EXISTS idx_orders_user_id ON orders (user_id);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_order_items_order_id ON order_items (order_id);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_cart_items_cart_id ON cart_items (cart_id);"#,
];
