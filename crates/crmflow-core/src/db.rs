use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::Result;

pub type DbPool = PgPool;

/// Establishes a connection pool against one of the two databases a run
/// talks to (source CRM or analytical store).
pub async fn connect(database_url: &str) -> Result<DbPool> {
    connect_with_timeout(database_url, Duration::from_secs(30)).await
}

pub async fn connect_with_timeout(database_url: &str, acquire_timeout: Duration) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await?;

    tracing::debug!("database connection pool established");
    Ok(pool)
}
