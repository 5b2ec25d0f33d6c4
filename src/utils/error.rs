//! Error types and handling
//!
//! Every authentication decision terminates with either a success value or a
//! tagged rejection. Rejections carry their specific reason to the
//! observability sink; callers receive a collapsed public error so the tag
//! never leaks to an end user unless a flow opts in (verify/reset).

use serde::Serialize;
use thiserror::Error;

/// Why an authentication attempt was rejected.
///
/// These tags are internal: they are reported to the observability sink and
/// asserted on in tests, but the public error collapses most of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Input is not shaped like a token (or key) at all
    Malformed,
    /// Input exceeds the configured maximum length
    TooLong,
    /// Signature verification failed or a required claim was missing
    InvalidSignature,
    /// Signature was valid but the token is past its expiry
    Expired,
    /// Token is valid but of a different kind than the call site expects
    WrongType,
    /// Subject claim is not a well-formed non-negative integer
    BadSubject,
    /// Subject parsed but no such principal exists
    SubjectNotFound,
    /// The resolved principal is banned
    Banned,
    /// The resolved principal has not verified their email
    Unverified,
    /// No API key matches the presented digest
    KeyNotFound,
    /// The API key exists but has been deactivated
    KeyInactive,
}

impl RejectReason {
    /// Stable tag used in log events and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Malformed => "malformed",
            RejectReason::TooLong => "too_long",
            RejectReason::InvalidSignature => "invalid_signature",
            RejectReason::Expired => "expired",
            RejectReason::WrongType => "wrong_type",
            RejectReason::BadSubject => "bad_subject",
            RejectReason::SubjectNotFound => "subject_not_found",
            RejectReason::Banned => "banned",
            RejectReason::Unverified => "unverified",
            RejectReason::KeyNotFound => "key_not_found",
            RejectReason::KeyInactive => "key_inactive",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public error type for all account and authentication operations
#[derive(Debug, Error)]
pub enum AuthError {
    /// Generic authentication failure; deliberately reason-free
    #[error("Unauthorized")]
    Unauthorized,

    /// Token failed validation (verify/reset flows only)
    #[error("Invalid token")]
    TokenInvalid,

    /// Token is expired (verify/reset flows only)
    #[error("Token has expired")]
    TokenExpired,

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists or state conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Input failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// The mutation would leave the system without an admin
    #[error("At least one admin account must remain")]
    LastAdmin,

    /// A principal attempted to ban itself
    #[error("An account cannot ban itself")]
    SelfBan,

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Collapse a rejection to the generic unauthorized error.
    ///
    /// Used by every surface except verify/reset; the specific reason has
    /// already been reported to the sink by the time this runs.
    pub fn generic(_reason: RejectReason) -> Self {
        AuthError::Unauthorized
    }

    /// Map a rejection for the verify-email and reset-password surfaces,
    /// where "expired, request a new one" and "invalid link" are worth
    /// distinguishing for the end user. Everything else stays generic.
    pub fn user_facing(reason: RejectReason) -> Self {
        match reason {
            RejectReason::Expired => AuthError::TokenExpired,
            RejectReason::InvalidSignature => AuthError::TokenInvalid,
            _ => AuthError::Unauthorized,
        }
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AuthError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.message().contains("UNIQUE constraint failed") {
                    AuthError::Conflict("Resource already exists".to_string())
                } else {
                    AuthError::Database(db_err.to_string())
                }
            }
            _ => AuthError::Database(err.to_string()),
        }
    }
}

/// Failure of a validation pipeline: either a terminal rejection with its
/// tagged reason, or a store error that the caller propagates as-is.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("{0}")]
    Rejected(RejectReason),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<RejectReason> for Rejection {
    fn from(reason: RejectReason) -> Self {
        Rejection::Rejected(reason)
    }
}

impl Rejection {
    /// The tagged reason, if this is a rejection rather than a store error
    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            Rejection::Rejected(r) => Some(*r),
            Rejection::Store(_) => None,
        }
    }

    /// Convert into the public error for `method`, reporting the specific
    /// reason to the observability sink on the way out. `user_facing`
    /// selects the verify/reset mapping that keeps expiry distinguishable.
    pub fn into_auth_error(self, method: &'static str, user_facing: bool) -> AuthError {
        match self {
            Rejection::Rejected(reason) => {
                crate::utils::observe::auth_failure(method, reason);
                if user_facing {
                    AuthError::user_facing(reason)
                } else {
                    AuthError::generic(reason)
                }
            }
            Rejection::Store(err) => err.into(),
        }
    }
}

/// Result type alias for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
