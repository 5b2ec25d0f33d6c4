//! Principal repository

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::models::{Principal, Role};

#[derive(Debug, sqlx::FromRow)]
struct PrincipalRow {
    id: i64,
    email: String,
    password_digest: String,
    role: String,
    banned: bool,
    verified: bool,
    created_at: String,
    updated_at: String,
}

const SELECT_COLUMNS: &str =
    "id, email, password_digest, role, banned, verified, created_at, updated_at";

pub struct PrincipalRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PrincipalRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Principal>> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM principals WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .context("Failed to fetch principal by id")?;

        row.map(row_to_principal).transpose()
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<Principal>> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM principals WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await
        .context("Failed to fetch principal by email")?;

        row.map(row_to_principal).transpose()
    }

    pub async fn count_admins(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM principals WHERE role = 'admin'")
            .fetch_one(self.pool)
            .await
            .context("Failed to count admins")?;

        Ok(row.get::<i64, _>("n"))
    }

    pub async fn insert(
        &self,
        email: &str,
        password_digest: &str,
        role: Role,
    ) -> Result<Principal> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO principals (email, password_digest, role, banned, verified, created_at, updated_at)
            VALUES (?, ?, ?, 0, 0, ?, ?)
            "#,
        )
        .bind(email)
        .bind(password_digest)
        .bind(role.to_string())
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await
        .context("Failed to insert principal")?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .context("Principal missing after insert")
    }

    pub async fn set_banned(&self, id: i64, banned: bool) -> Result<bool> {
        self.update_flag("banned", id, banned).await
    }

    pub async fn set_verified(&self, id: i64, verified: bool) -> Result<bool> {
        self.update_flag("verified", id, verified).await
    }

    pub async fn set_password_digest(&self, id: i64, digest: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE principals SET password_digest = ?, updated_at = ? WHERE id = ?")
                .bind(digest)
                .bind(Utc::now().to_rfc3339())
                .bind(id)
                .execute(self.pool)
                .await
                .context("Failed to update password digest")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn promote_to_admin(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE principals SET role = 'admin', updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(self.pool)
            .await
            .context("Failed to promote principal")?;

        Ok(result.rows_affected() > 0)
    }

    /// Demote an admin to a regular user, unless they are the last admin.
    ///
    /// The admin count is evaluated inside the same statement as the
    /// mutation, so two concurrent demotions cannot both observe "two
    /// admins" and each remove one; SQLite serializes the whole statement
    /// under its write lock.
    pub async fn demote_admin_guarded(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE principals SET role = 'user', updated_at = ?
            WHERE id = ? AND role = 'admin'
              AND (SELECT COUNT(*) FROM principals WHERE role = 'admin') > 1
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.pool)
        .await
        .context("Failed to demote principal")?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a principal, refusing to remove the last admin.
    ///
    /// Same single-statement guard as [`demote_admin_guarded`]; API keys
    /// cascade via the foreign key.
    ///
    /// [`demote_admin_guarded`]: Self::demote_admin_guarded
    pub async fn delete_guarded(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM principals
            WHERE id = ?
              AND (role != 'admin'
                   OR (SELECT COUNT(*) FROM principals WHERE role = 'admin') > 1)
            "#,
        )
        .bind(id)
        .execute(self.pool)
        .await
        .context("Failed to delete principal")?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_flag(&self, column: &str, id: i64, value: bool) -> Result<bool> {
        // column is always a literal from this module, never user input
        let result = sqlx::query(&format!(
            "UPDATE principals SET {column} = ?, updated_at = ? WHERE id = ?"
        ))
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.pool)
        .await
        .with_context(|| format!("Failed to update principal {column} flag"))?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_principal(row: PrincipalRow) -> Result<Principal> {
    Ok(Principal {
        id: row.id,
        email: row.email,
        password_digest: row.password_digest,
        role: Role::from_str(&row.role).map_err(anyhow::Error::msg)?,
        banned: row.banned,
        verified: row.verified,
        created_at: parse_db_timestamp(&row.created_at),
        updated_at: parse_db_timestamp(&row.updated_at),
    })
}

pub(crate) fn parse_db_timestamp(ts: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S") {
        return DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc);
    }
    Utc::now()
}
