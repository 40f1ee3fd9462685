use crate::config::DatabaseSettings;
use crate::errors::ServiceError;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::{debug, info};

/// Type alias for a database connection pool.
pub type DbPool = DatabaseConnection;

/// Establishes a connection pool from application settings.
pub async fn establish_connection(settings: &DatabaseSettings) -> Result<DbPool, ServiceError> {
    debug!(
        max_connections = settings.max_connections,
        min_connections = settings.min_connections,
        "configuring database connection"
    );

    let mut opt = ConnectOptions::new(settings.url.clone());
    opt.max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .connect_timeout(settings.connect_timeout())
        .idle_timeout(settings.idle_timeout())
        .sqlx_logging(false);

    let pool = Database::connect(opt)
        .await
        .map_err(ServiceError::db_error)?;

    info!(
        max_connections = settings.max_connections,
        "database connection established"
    );

    Ok(pool)
}

/// Convenience connector for one-off URLs (tests, CLI tooling).
pub async fn connect(database_url: &str) -> Result<DbPool, ServiceError> {
    Database::connect(database_url)
        .await
        .map_err(ServiceError::db_error)
}
