use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use repricer_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Open the catalog pool described by the `[database]` configuration.
///
/// Every connection enforces foreign keys and runs in WAL mode so backfill
/// inserts do not block concurrent estimate reads.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await
}
