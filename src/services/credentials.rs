//! Credential verifier
//!
//! Timing-safe email/password authentication. The Argon2 verification runs
//! on every call, against a precomputed dummy digest when the email matches
//! no account, so "no such account" and "wrong password" are
//! latency-indistinguishable. Status flags are checked strictly after the
//! hash comparison for the same reason.

use sqlx::SqlitePool;

use crate::db::PrincipalRepository;
use crate::models::Principal;
use crate::services::crypto;
use crate::utils::error::{AuthError, AuthResult, RejectReason};
use crate::utils::observe;

pub struct CredentialVerifier {
    pool: SqlitePool,
}

impl CredentialVerifier {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Authenticate an email/password pair.
    ///
    /// All failures return the same generic error; the specific cause goes
    /// only to the observability sink.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> AuthResult<Principal> {
        let principals = PrincipalRepository::new(&self.pool);
        let principal = principals.get_by_email(email).await?;

        // The hash check must run whether or not the account exists, and
        // must precede every status check.
        match principal {
            None => {
                let _ = crypto::verify_password(password, crypto::dummy_digest())?;
                observe::credential_failure("credentials", "unknown_email");
                Err(AuthError::Unauthorized)
            }
            Some(principal) => {
                if !crypto::verify_password(password, &principal.password_digest)? {
                    observe::credential_failure("credentials", "wrong_password");
                    return Err(AuthError::Unauthorized);
                }

                if principal.banned {
                    observe::auth_failure("credentials", RejectReason::Banned);
                    return Err(AuthError::Unauthorized);
                }
                if !principal.verified {
                    observe::auth_failure("credentials", RejectReason::Unverified);
                    return Err(AuthError::Unauthorized);
                }

                observe::auth_success("credentials", principal.id);
                Ok(principal)
            }
        }
    }
}
