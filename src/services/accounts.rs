//! Account lifecycle service
//!
//! Registration, email verification, login/refresh, password management,
//! ban/unban, role grants and deletion. Sits at the login/registration
//! boundary of the token authority; everything token-shaped goes through
//! the shared validation pipeline.

use sqlx::SqlitePool;
use validator::ValidateEmail;

use crate::config::AuthConfig;
use crate::db::PrincipalRepository;
use crate::models::{Principal, Role};
use crate::services::credentials::CredentialVerifier;
use crate::services::crypto;
use crate::services::tokens::{TokenAuthority, TokenKind};
use crate::utils::error::{AuthError, AuthResult};
use crate::utils::observe;

/// Access/refresh token pair returned by login and refresh
#[derive(Debug, Clone, serde::Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

pub struct AccountService {
    config: AuthConfig,
    pool: SqlitePool,
    tokens: TokenAuthority,
    verifier: CredentialVerifier,
}

impl AccountService {
    pub fn new(config: &AuthConfig, pool: SqlitePool) -> Self {
        Self {
            config: config.clone(),
            tokens: TokenAuthority::new(config),
            verifier: CredentialVerifier::new(pool.clone()),
            pool,
        }
    }

    fn principals(&self) -> PrincipalRepository<'_> {
        PrincipalRepository::new(&self.pool)
    }

    /// Register a new account.
    ///
    /// Returns the principal together with its verification token; handing
    /// that token to the account holder (email delivery) is the embedding
    /// application's concern.
    pub async fn register(&self, email: &str, password: &str) -> AuthResult<(Principal, String)> {
        if !email.validate_email() {
            return Err(AuthError::Validation("Invalid email address".to_string()));
        }
        self.check_password(password)?;

        if self.principals().get_by_email(email).await?.is_some() {
            return Err(AuthError::Conflict("Email already registered".to_string()));
        }

        let digest = crypto::hash_password(password)?;
        let principal = self.principals().insert(email, &digest, Role::User).await?;
        let verify_token = self.tokens.mint(TokenKind::Verify, principal.id)?;

        Ok((principal, verify_token))
    }

    /// Confirm an email address from a verification token.
    ///
    /// Success is a result variant carrying the verified principal;
    /// invalid and expired tokens stay distinguishable for the end user.
    pub async fn verify_email(&self, token: &str) -> AuthResult<Principal> {
        let principal = self
            .tokens
            .validate(token, TokenKind::Verify, &self.principals())
            .await
            .map_err(|r| r.into_auth_error("verify_email", true))?;

        self.principals().set_verified(principal.id, true).await?;
        observe::auth_success("verify_email", principal.id);

        Ok(Principal {
            verified: true,
            ..principal
        })
    }

    /// Authenticate credentials and mint an access/refresh pair
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<TokenPair> {
        let principal = self.verifier.verify_credentials(email, password).await?;
        self.token_pair(principal.id)
    }

    /// Exchange a refresh token for a fresh pair
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let principal = self
            .tokens
            .validate(refresh_token, TokenKind::Refresh, &self.principals())
            .await
            .map_err(|r| r.into_auth_error("refresh", false))?;

        observe::auth_success("refresh", principal.id);
        self.token_pair(principal.id)
    }

    /// Mint a password-reset token for an account, if one exists.
    ///
    /// `Ok(None)` for an unknown email, indistinguishable to the caller's
    /// caller from the success case; no account enumeration.
    pub async fn request_password_reset(&self, email: &str) -> AuthResult<Option<String>> {
        match self.principals().get_by_email(email).await? {
            Some(principal) => Ok(Some(self.tokens.mint(TokenKind::Reset, principal.id)?)),
            None => Ok(None),
        }
    }

    /// Set a new password from a reset token.
    ///
    /// Invalid and expired tokens stay distinguishable for the end user.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthResult<()> {
        self.check_password(new_password)?;

        let principal = self
            .tokens
            .validate(token, TokenKind::Reset, &self.principals())
            .await
            .map_err(|r| r.into_auth_error("reset_password", true))?;

        let digest = crypto::hash_password(new_password)?;
        self.principals()
            .set_password_digest(principal.id, &digest)
            .await?;
        observe::auth_success("reset_password", principal.id);

        Ok(())
    }

    /// Change a password from within an authenticated session
    pub async fn change_password(
        &self,
        principal_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let principal = self
            .principals()
            .get_by_id(principal_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("Principal not found".to_string()))?;

        if !crypto::verify_password(current_password, &principal.password_digest)? {
            observe::credential_failure("change_password", "wrong_password");
            return Err(AuthError::Unauthorized);
        }
        self.check_password(new_password)?;

        let digest = crypto::hash_password(new_password)?;
        self.principals()
            .set_password_digest(principal_id, &digest)
            .await?;

        Ok(())
    }

    /// Ban an account. Banning yourself is rejected outright.
    pub async fn ban(&self, actor_id: i64, target_id: i64) -> AuthResult<()> {
        if actor_id == target_id {
            return Err(AuthError::SelfBan);
        }
        if !self.principals().set_banned(target_id, true).await? {
            return Err(AuthError::NotFound("Principal not found".to_string()));
        }
        Ok(())
    }

    pub async fn unban(&self, target_id: i64) -> AuthResult<()> {
        if !self.principals().set_banned(target_id, false).await? {
            return Err(AuthError::NotFound("Principal not found".to_string()));
        }
        Ok(())
    }

    pub async fn grant_admin(&self, target_id: i64) -> AuthResult<()> {
        if !self.principals().promote_to_admin(target_id).await? {
            return Err(AuthError::NotFound("Principal not found".to_string()));
        }
        Ok(())
    }

    /// Demote an admin to a regular user.
    ///
    /// The last remaining admin cannot be demoted; the count check and the
    /// mutation are atomic in the store, so concurrent demotions cannot
    /// race past each other.
    pub async fn revoke_admin(&self, target_id: i64) -> AuthResult<()> {
        let principals = self.principals();
        let principal = principals
            .get_by_id(target_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("Principal not found".to_string()))?;

        if !principal.role.is_admin() {
            return Err(AuthError::Conflict("Principal is not an admin".to_string()));
        }

        if !principals.demote_admin_guarded(target_id).await? {
            // The guard is the authority; the pre-read above is only for
            // error reporting
            return Err(AuthError::LastAdmin);
        }
        Ok(())
    }

    /// Delete an account and, via cascade, its API keys.
    ///
    /// Deleting the last admin is rejected under the same atomic guard as
    /// demotion.
    pub async fn delete_principal(&self, target_id: i64) -> AuthResult<()> {
        let principals = self.principals();
        principals
            .get_by_id(target_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("Principal not found".to_string()))?;

        if !principals.delete_guarded(target_id).await? {
            return Err(AuthError::LastAdmin);
        }
        Ok(())
    }

    fn token_pair(&self, principal_id: i64) -> AuthResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.tokens.mint(TokenKind::Access, principal_id)?,
            refresh_token: self.tokens.mint(TokenKind::Refresh, principal_id)?,
            token_type: "Bearer".to_string(),
            expires_in: (self.config.access_token_expiry_minutes as u64) * 60,
        })
    }

    fn check_password(&self, password: &str) -> AuthResult<()> {
        if password.len() < self.config.password_min_length {
            return Err(AuthError::Validation(format!(
                "Password must be at least {} characters",
                self.config.password_min_length
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::test_pool;

    async fn service() -> (AccountService, SqlitePool) {
        let pool = test_pool().await;
        let service = AccountService::new(&AppConfig::default().auth, pool.clone());
        (service, pool)
    }

    #[tokio::test]
    async fn test_register_validations() {
        let (service, _pool) = service().await;

        assert!(matches!(
            service.register("not-an-email", "long enough pw").await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            service.register("a@example.com", "short").await,
            Err(AuthError::Validation(_))
        ));

        service.register("a@example.com", "long enough pw").await.unwrap();
        assert!(matches!(
            service.register("a@example.com", "long enough pw").await,
            Err(AuthError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_register_verify_login_flow() {
        let (service, _pool) = service().await;

        let (principal, verify_token) = service
            .register("a@example.com", "correct horse battery")
            .await
            .unwrap();
        assert!(!principal.verified);

        // Login before verification fails generically
        assert!(matches!(
            service.login("a@example.com", "correct horse battery").await,
            Err(AuthError::Unauthorized)
        ));

        let verified = service.verify_email(&verify_token).await.unwrap();
        assert!(verified.verified);
        assert_eq!(verified.id, principal.id);

        let pair = service
            .login("a@example.com", "correct horse battery")
            .await
            .unwrap();
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 120 * 60);
    }

    #[tokio::test]
    async fn test_verify_email_bad_token_is_user_facing() {
        let (service, _pool) = service().await;

        // Garbage collapses to the generic error, not the expired one
        assert!(matches!(
            service.verify_email("junk").await,
            Err(AuthError::Unauthorized)
        ));

        // A tampered but well-formed token surfaces as invalid
        let (_, token) = service
            .register("a@example.com", "correct horse battery")
            .await
            .unwrap();
        let mut tampered = token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });
        assert!(matches!(
            service.verify_email(&tampered).await,
            Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn test_refresh_rotates_pair() {
        let (service, _pool) = service().await;
        let (_, verify_token) = service
            .register("a@example.com", "correct horse battery")
            .await
            .unwrap();
        service.verify_email(&verify_token).await.unwrap();

        let pair = service
            .login("a@example.com", "correct horse battery")
            .await
            .unwrap();
        let renewed = service.refresh(&pair.refresh_token).await.unwrap();
        assert!(!renewed.access_token.is_empty());

        // An access token is not accepted on the refresh surface
        assert!(matches!(
            service.refresh(&pair.access_token).await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let (service, _pool) = service().await;
        let (_, verify_token) = service
            .register("a@example.com", "original password")
            .await
            .unwrap();
        service.verify_email(&verify_token).await.unwrap();

        // Unknown email yields no token, not an error
        assert!(service
            .request_password_reset("nobody@example.com")
            .await
            .unwrap()
            .is_none());

        let reset_token = service
            .request_password_reset("a@example.com")
            .await
            .unwrap()
            .unwrap();
        service
            .reset_password(&reset_token, "replacement password")
            .await
            .unwrap();

        assert!(service.login("a@example.com", "original password").await.is_err());
        service
            .login("a@example.com", "replacement password")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_change_password_requires_current() {
        let (service, _pool) = service().await;
        let (principal, verify_token) = service
            .register("a@example.com", "original password")
            .await
            .unwrap();
        service.verify_email(&verify_token).await.unwrap();

        assert!(matches!(
            service
                .change_password(principal.id, "wrong", "replacement password")
                .await,
            Err(AuthError::Unauthorized)
        ));

        service
            .change_password(principal.id, "original password", "replacement password")
            .await
            .unwrap();
        service
            .login("a@example.com", "replacement password")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_self_ban_rejected() {
        let (service, pool) = service().await;
        let admin = PrincipalRepository::new(&pool)
            .insert("admin@example.com", "digest", Role::Admin)
            .await
            .unwrap();

        assert!(matches!(
            service.ban(admin.id, admin.id).await,
            Err(AuthError::SelfBan)
        ));
    }

    #[tokio::test]
    async fn test_ban_unban() {
        let (service, pool) = service().await;
        let repo = PrincipalRepository::new(&pool);
        let admin = repo.insert("admin@example.com", "digest", Role::Admin).await.unwrap();
        let user = repo.insert("u@example.com", "digest", Role::User).await.unwrap();

        service.ban(admin.id, user.id).await.unwrap();
        assert!(repo.get_by_id(user.id).await.unwrap().unwrap().banned);

        service.unban(user.id).await.unwrap();
        assert!(!repo.get_by_id(user.id).await.unwrap().unwrap().banned);

        assert!(matches!(
            service.ban(admin.id, 9999).await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_count_invariant() {
        let (service, pool) = service().await;
        let repo = PrincipalRepository::new(&pool);
        let first = repo.insert("a1@example.com", "digest", Role::Admin).await.unwrap();

        // Sole admin: neither deletable nor demotable
        assert!(matches!(
            service.delete_principal(first.id).await,
            Err(AuthError::LastAdmin)
        ));
        assert!(matches!(
            service.revoke_admin(first.id).await,
            Err(AuthError::LastAdmin)
        ));

        let second = repo.insert("a2@example.com", "digest", Role::Admin).await.unwrap();
        service.revoke_admin(second.id).await.unwrap();
        assert_eq!(repo.count_admins().await.unwrap(), 1);

        // Demoting a non-admin is a conflict, not a demotion
        assert!(matches!(
            service.revoke_admin(second.id).await,
            Err(AuthError::Conflict(_))
        ));

        service.grant_admin(second.id).await.unwrap();
        service.delete_principal(first.id).await.unwrap();
        assert_eq!(repo.count_admins().await.unwrap(), 1);
    }
}
