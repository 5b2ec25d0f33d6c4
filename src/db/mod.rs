//! Database layer
//!
//! SQLite-backed stores for the two persistent record types:
//! - Principals (accounts)
//! - API keys
//!
//! The repositories expose only the narrow contracts the services need;
//! schema management beyond idempotent creation lives with the embedding
//! application.

pub mod api_key_repository;
pub mod principal_repository;

pub use api_key_repository::ApiKeyRepository;
pub use principal_repository::PrincipalRepository;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

use crate::config::DatabaseConfig;

/// Database connection pool type
pub type DbPool = Pool<Sqlite>;

/// Initialize the database connection pool and ensure the schema exists
pub async fn init_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .with_context(|| format!("Invalid database URL: {}", config.url))?
        .create_if_missing(true)
        // Cascading API-key deletes depend on FK enforcement
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;

    ensure_schema(&pool).await?;

    Ok(pool)
}

/// Create tables and indexes if they do not already exist
async fn ensure_schema(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS principals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            password_digest TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'user',
            banned INTEGER NOT NULL DEFAULT 0,
            verified INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create principals table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_keys (
            id TEXT PRIMARY KEY,
            principal_id INTEGER NOT NULL
                REFERENCES principals(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            prefix TEXT NOT NULL,
            secret_digest TEXT NOT NULL UNIQUE,
            active INTEGER NOT NULL DEFAULT 1,
            scopes TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            last_used_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create api_keys table")?;

    // Digest lookup is the hot path for key authentication
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_api_keys_digest ON api_keys(secret_digest)")
        .execute(pool)
        .await
        .context("Failed to create api_keys digest index")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_api_keys_principal ON api_keys(principal_id)",
    )
    .execute(pool)
    .await
    .context("Failed to create api_keys principal index")?;

    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        // A shared in-memory database exists per connection
        max_connections: 1,
    };
    init_pool(&config).await.expect("in-memory pool")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_creation_is_idempotent() {
        let pool = test_pool().await;
        ensure_schema(&pool).await.unwrap();
        ensure_schema(&pool).await.unwrap();
    }
}
