//! API key repository

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::principal_repository::parse_db_timestamp;
use crate::models::ApiKey;

#[derive(Debug, sqlx::FromRow)]
struct ApiKeyRow {
    id: String,
    principal_id: i64,
    name: String,
    prefix: String,
    secret_digest: String,
    active: bool,
    scopes: String,
    created_at: String,
    last_used_at: Option<String>,
}

const SELECT_COLUMNS: &str =
    "id, principal_id, name, prefix, secret_digest, active, scopes, created_at, last_used_at";

pub struct ApiKeyRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ApiKeyRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, key: &ApiKey) -> Result<()> {
        let scopes =
            serde_json::to_string(&key.scopes).context("Failed to serialize key scopes")?;

        sqlx::query(
            r#"
            INSERT INTO api_keys (id, principal_id, name, prefix, secret_digest, active, scopes, created_at, last_used_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(key.id.to_string())
        .bind(key.principal_id)
        .bind(&key.name)
        .bind(&key.prefix)
        .bind(&key.secret_digest)
        .bind(key.active)
        .bind(scopes)
        .bind(key.created_at.to_rfc3339())
        .bind(key.last_used_at.map(|d| d.to_rfc3339()))
        .execute(self.pool)
        .await
        .context("Failed to insert api key")?;

        Ok(())
    }

    /// Indexed lookup by secret digest, the authentication hot path
    pub async fn get_by_digest(&self, digest: &str) -> Result<Option<ApiKey>> {
        let row = sqlx::query_as::<_, ApiKeyRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM api_keys WHERE secret_digest = ?"
        ))
        .bind(digest)
        .fetch_optional(self.pool)
        .await
        .context("Failed to fetch api key by digest")?;

        row.map(row_to_api_key).transpose()
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<ApiKey>> {
        let row = sqlx::query_as::<_, ApiKeyRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM api_keys WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to fetch api key by id")?;

        row.map(row_to_api_key).transpose()
    }

    pub async fn list_for_principal(&self, principal_id: i64) -> Result<Vec<ApiKey>> {
        let rows = sqlx::query_as::<_, ApiKeyRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM api_keys WHERE principal_id = ? ORDER BY created_at DESC"
        ))
        .bind(principal_id)
        .fetch_all(self.pool)
        .await
        .context("Failed to list api keys")?;

        rows.into_iter().map(row_to_api_key).collect()
    }

    pub async fn rename(&self, id: Uuid, name: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE api_keys SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id.to_string())
            .execute(self.pool)
            .await
            .context("Failed to rename api key")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE api_keys SET active = ? WHERE id = ?")
            .bind(active)
            .bind(id.to_string())
            .execute(self.pool)
            .await
            .context("Failed to update api key active flag")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool)
            .await
            .context("Failed to delete api key")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn touch_last_used(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(self.pool)
            .await
            .context("Failed to update api key last_used_at")?;

        Ok(())
    }
}

fn row_to_api_key(row: ApiKeyRow) -> Result<ApiKey> {
    Ok(ApiKey {
        id: Uuid::parse_str(&row.id).context("Invalid api key id")?,
        principal_id: row.principal_id,
        name: row.name,
        prefix: row.prefix,
        secret_digest: row.secret_digest,
        active: row.active,
        scopes: serde_json::from_str(&row.scopes).context("Invalid api key scopes")?,
        created_at: parse_db_timestamp(&row.created_at),
        last_used_at: row.last_used_at.as_deref().map(parse_db_timestamp),
    })
}
