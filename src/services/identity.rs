//! Identity resolver
//!
//! Merges bearer-token and API-key authentication into one "current
//! principal" decision. A present bearer token is authoritative: if it
//! fails, resolution fails, even when a valid API key accompanies it.
//! Falling back would let an attacker shadow a stolen key behind an
//! expired token and hide the failure from the sink.

use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::db::PrincipalRepository;
use crate::models::Principal;
use crate::services::api_keys::ApiKeyAuthority;
use crate::services::tokens::{TokenAuthority, TokenKind};
use crate::utils::error::{AuthError, AuthResult};
use crate::utils::observe;

pub struct IdentityResolver {
    tokens: TokenAuthority,
    keys: ApiKeyAuthority,
    pool: SqlitePool,
}

impl IdentityResolver {
    pub fn new(config: &AppConfig, pool: SqlitePool) -> Self {
        Self {
            tokens: TokenAuthority::new(&config.auth),
            keys: ApiKeyAuthority::new(&config.auth, pool.clone()),
            pool,
        }
    }

    /// Resolve the principal behind a request.
    ///
    /// Bearer token first, validated as an access token; the API key is
    /// attempted only when no bearer token is present at all. Neither
    /// credential present is a plain unauthorized.
    pub async fn resolve_current_principal(
        &self,
        bearer_token: Option<&str>,
        api_key: Option<&str>,
    ) -> AuthResult<Principal> {
        if let Some(token) = bearer_token {
            let principals = PrincipalRepository::new(&self.pool);
            return match self.tokens.validate(token, TokenKind::Access, &principals).await {
                Ok(principal) => {
                    observe::auth_success("bearer_token", principal.id);
                    Ok(principal)
                }
                // No fallback to the API key, deliberately
                Err(rejection) => Err(rejection.into_auth_error("bearer_token", false)),
            };
        }

        if let Some(raw_key) = api_key {
            return match self.keys.authenticate(raw_key).await {
                Ok(principal) => {
                    observe::auth_success("api_key", principal.id);
                    Ok(principal)
                }
                Err(rejection) => Err(rejection.into_auth_error("api_key", false)),
            };
        }

        Err(AuthError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::Role;

    async fn setup() -> (IdentityResolver, SqlitePool, i64) {
        let pool = test_pool().await;
        let repo = PrincipalRepository::new(&pool);
        let p = repo
            .insert("a@example.com", "digest", Role::User)
            .await
            .unwrap();
        repo.set_verified(p.id, true).await.unwrap();

        let resolver = IdentityResolver::new(&AppConfig::default(), pool.clone());
        (resolver, pool, p.id)
    }

    #[tokio::test]
    async fn test_bearer_token_resolution() {
        let (resolver, _pool, id) = setup().await;
        let token = resolver.tokens.mint(TokenKind::Access, id).unwrap();

        let principal = resolver
            .resolve_current_principal(Some(&token), None)
            .await
            .unwrap();
        assert_eq!(principal.id, id);
    }

    #[tokio::test]
    async fn test_api_key_resolution_without_bearer() {
        let (resolver, _pool, id) = setup().await;
        let issued = resolver.keys.issue_key(id, "ci", vec![]).await.unwrap();

        let principal = resolver
            .resolve_current_principal(None, Some(&issued.key))
            .await
            .unwrap();
        assert_eq!(principal.id, id);
    }

    #[tokio::test]
    async fn test_invalid_bearer_never_falls_back_to_valid_key() {
        let (resolver, _pool, id) = setup().await;
        let issued = resolver.keys.issue_key(id, "ci", vec![]).await.unwrap();

        // The key alone would resolve; the broken bearer must still fail
        let err = resolver
            .resolve_current_principal(Some("not-a-token"), Some(&issued.key))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));

        // Same with a well-formed but wrong-kind token
        let refresh = resolver.tokens.mint(TokenKind::Refresh, id).unwrap();
        let err = resolver
            .resolve_current_principal(Some(&refresh), Some(&issued.key))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn test_no_credentials_is_unauthorized() {
        let (resolver, _pool, _id) = setup().await;
        let err = resolver
            .resolve_current_principal(None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn test_refresh_token_rejected_as_bearer() {
        let (resolver, _pool, id) = setup().await;
        let refresh = resolver.tokens.mint(TokenKind::Refresh, id).unwrap();

        let err = resolver
            .resolve_current_principal(Some(&refresh), None)
            .await
            .unwrap_err();
        // Collapsed outward; the wrong_type tag goes to the sink only
        assert!(matches!(err, AuthError::Unauthorized));
    }
}
