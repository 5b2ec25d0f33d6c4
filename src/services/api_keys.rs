//! API key authority
//!
//! Issues long-lived keys and authenticates them by digest lookup. The
//! plaintext secret exists exactly once, in the issuance response; only an
//! HMAC digest is stored, and authentication finds the record by that
//! digest rather than scanning active keys.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::db::{ApiKeyRepository, PrincipalRepository};
use crate::models::{ApiKey, IssuedApiKey, Principal};
use crate::services::crypto;
use crate::utils::error::{AuthError, AuthResult, RejectReason, Rejection};

/// Length of the base64url-encoded secret part (32 random bytes)
const SECRET_LEN: usize = 43;

pub struct ApiKeyAuthority {
    config: AuthConfig,
    pool: SqlitePool,
}

impl ApiKeyAuthority {
    pub fn new(config: &AuthConfig, pool: SqlitePool) -> Self {
        Self {
            config: config.clone(),
            pool,
        }
    }

    fn keys(&self) -> ApiKeyRepository<'_> {
        ApiKeyRepository::new(&self.pool)
    }

    fn principals(&self) -> PrincipalRepository<'_> {
        PrincipalRepository::new(&self.pool)
    }

    /// Issue a new key for `owner_id`.
    ///
    /// The returned [`IssuedApiKey`] is the only copy of the plaintext that
    /// will ever exist; no subsequent read can reproduce it.
    pub async fn issue_key(
        &self,
        owner_id: i64,
        name: &str,
        scopes: Vec<String>,
    ) -> AuthResult<IssuedApiKey> {
        if name.trim().is_empty() {
            return Err(AuthError::Validation("Key name cannot be empty".to_string()));
        }
        self.principals()
            .get_by_id(owner_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("Principal not found".to_string()))?;

        let mut secret = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        let plaintext = format!(
            "{}{}",
            self.config.api_key_prefix,
            URL_SAFE_NO_PAD.encode(secret)
        );

        let api_key = ApiKey {
            id: Uuid::new_v4(),
            principal_id: owner_id,
            name: name.to_string(),
            prefix: self.config.api_key_prefix.clone(),
            secret_digest: crypto::key_digest(&self.config.token_secret, &plaintext),
            active: true,
            scopes,
            created_at: Utc::now(),
            last_used_at: None,
        };
        self.keys().insert(&api_key).await?;

        Ok(IssuedApiKey {
            api_key,
            key: plaintext,
        })
    }

    /// Authenticate a raw key to its owning principal.
    ///
    /// Format screening runs before any digest computation; the digest
    /// lookup is indexed; status checks mirror the token pipeline. The
    /// `last_used_at` touch runs on a background task, best-effort; it
    /// never delays or fails the call.
    pub async fn authenticate(&self, raw_key: &str) -> Result<Principal, Rejection> {
        self.screen_key(raw_key)?;

        let digest = crypto::key_digest(&self.config.token_secret, raw_key);
        let key = self
            .keys()
            .get_by_digest(&digest)
            .await?
            .ok_or(RejectReason::KeyNotFound)?;

        if !key.active {
            return Err(RejectReason::KeyInactive.into());
        }

        let principal = self
            .principals()
            .get_by_id(key.principal_id)
            .await?
            .ok_or(RejectReason::KeyNotFound)?;

        if principal.banned {
            return Err(RejectReason::Banned.into());
        }
        if !principal.verified {
            return Err(RejectReason::Unverified.into());
        }

        let pool = self.pool.clone();
        let key_id = key.id;
        tokio::spawn(async move {
            if let Err(e) = ApiKeyRepository::new(&pool).touch_last_used(key_id).await {
                tracing::debug!(error = %e, key_id = %key_id, "last_used_at update failed");
            }
        });

        Ok(principal)
    }

    /// Cheap shape checks so junk never reaches the HMAC
    fn screen_key(&self, raw_key: &str) -> Result<(), RejectReason> {
        let prefix = &self.config.api_key_prefix;
        if raw_key.len() != prefix.len() + SECRET_LEN {
            return Err(RejectReason::Malformed);
        }
        let secret = match raw_key.strip_prefix(prefix.as_str()) {
            Some(s) => s,
            None => return Err(RejectReason::Malformed),
        };
        if !secret
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(RejectReason::Malformed);
        }
        Ok(())
    }

    pub async fn list_for_principal(&self, principal_id: i64) -> AuthResult<Vec<ApiKey>> {
        Ok(self.keys().list_for_principal(principal_id).await?)
    }

    /// Rename a key; allowed for its owner or any admin
    pub async fn rename(&self, actor: &Principal, id: Uuid, name: &str) -> AuthResult<ApiKey> {
        let key = self.authorize_mutation(actor, id).await?;
        if name.trim().is_empty() {
            return Err(AuthError::Validation("Key name cannot be empty".to_string()));
        }
        self.keys().rename(id, name).await?;
        Ok(ApiKey {
            name: name.to_string(),
            ..key
        })
    }

    /// Activate or deactivate a key; allowed for its owner or any admin
    pub async fn set_active(&self, actor: &Principal, id: Uuid, active: bool) -> AuthResult<()> {
        self.authorize_mutation(actor, id).await?;
        self.keys().set_active(id, active).await?;
        Ok(())
    }

    /// Delete a key; allowed for its owner or any admin
    pub async fn delete(&self, actor: &Principal, id: Uuid) -> AuthResult<()> {
        self.authorize_mutation(actor, id).await?;
        self.keys().delete(id).await?;
        Ok(())
    }

    async fn authorize_mutation(&self, actor: &Principal, id: Uuid) -> AuthResult<ApiKey> {
        let key = self
            .keys()
            .get_by_id(id)
            .await?
            .ok_or_else(|| AuthError::NotFound("API key not found".to_string()))?;

        if key.principal_id != actor.id && !actor.role.is_admin() {
            return Err(AuthError::Unauthorized);
        }
        Ok(key)
    }
}
