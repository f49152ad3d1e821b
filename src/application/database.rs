use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;

use crate::config::{database::DatabaseConfig, CONFIG};
use crate::error::{AppError, Result};
use crate::migrations::Migrator;

pub type DbConn = DatabaseConnection;

/// Opens the configured database and brings its schema up to date
pub async fn connect() -> Result<DbConn> {
    open(&CONFIG.database).await
}

pub async fn open(config: &DatabaseConfig) -> Result<DbConn> {
    let url = &config.database_url;
    // An in-memory SQLite database exists per connection
    let pool_size = if url.contains(":memory:") {
        1
    } else {
        config.max_connections.max(1)
    };

    let mut options = ConnectOptions::new(url.as_str());
    options
        .max_connections(pool_size)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(false);

    tracing::info!(backend = backend_name(url), pool_size, "Opening database");
    let conn = Database::connect(options)
        .await
        .map_err(|e| AppError::Internal(format!("Database unavailable: {}", e)))?;

    run_migrations(&conn).await?;
    Ok(conn)
}

pub async fn run_migrations(db: &DbConn) -> Result<()> {
    let pending = Migrator::get_pending_migrations(db).await?.len();
    if pending == 0 {
        tracing::debug!("Schema is up to date");
        return Ok(());
    }
    Migrator::up(db, None)
        .await
        .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))?;
    tracing::info!(applied = pending, "Schema migrated");
    Ok(())
}

pub async fn ping(db: &DbConn) -> bool {
    db.ping().await.is_ok()
}

fn backend_name(url: &str) -> &'static str {
    if url.starts_with("postgres") {
        "postgres"
    } else if url.starts_with("sqlite") {
        "sqlite"
    } else {
        "unknown"
    }
}
