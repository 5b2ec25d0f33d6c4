//! Token authority
//!
//! Mints the four token kinds and runs the shared validation pipeline. Every
//! call site that accepts a token (access-protected resolution, refresh,
//! email verification, password reset) goes through [`TokenAuthority::validate`]
//! with its expected kind; there is exactly one pipeline, parameterized, so
//! the checks cannot drift apart.
//!
//! Pipeline order, each stage terminating with its own reason:
//! format, length, signature/expiry, kind, subject, principal status.
//! The first two run before any cryptography so malformed or oversized
//! input never reaches signature verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::config::AuthConfig;
use crate::db::PrincipalRepository;
use crate::models::Principal;
use crate::services::crypto;
use crate::utils::error::{RejectReason, Rejection};

/// Token kind, each with an independent expiry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
    Verify,
    Reset,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::Verify => "verify",
            TokenKind::Reset => "reset",
        }
    }

    pub const ALL: [TokenKind; 4] = [
        TokenKind::Access,
        TokenKind::Refresh,
        TokenKind::Verify,
        TokenKind::Reset,
    ];
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed claims carried by every token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (principal id, string-encoded)
    pub sub: String,
    /// Token kind; checked against the expectation of each call site
    #[serde(rename = "type")]
    pub kind: String,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// Additional claims; unused by validation, preserved for callers
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

/// Mints and validates signed tokens.
///
/// Pure and free of I/O except for the principal-status stage, which takes
/// the store as an argument. Construction derives the signing keys once
/// from the explicit configuration; no ambient state.
pub struct TokenAuthority {
    config: AuthConfig,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenAuthority {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            config: config.clone(),
            encoding: EncodingKey::from_secret(config.token_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.token_secret.as_bytes()),
        }
    }

    /// Mint a signed token of `kind` for `subject_id`
    pub fn mint(&self, kind: TokenKind, subject_id: i64) -> Result<String, anyhow::Error> {
        self.mint_with_claims(kind, subject_id, BTreeMap::new())
    }

    /// Mint a signed token carrying additional claims
    pub fn mint_with_claims(
        &self,
        kind: TokenKind,
        subject_id: i64,
        extra: BTreeMap<String, Value>,
    ) -> Result<String, anyhow::Error> {
        self.mint_at(kind, subject_id, extra, Utc::now())
    }

    /// Mint with an explicit issuance instant; `mint` passes the current
    /// time. Also what expiry tests use instead of sleeping.
    pub(crate) fn mint_at(
        &self,
        kind: TokenKind,
        subject_id: i64,
        extra: BTreeMap<String, Value>,
        issued_at: DateTime<Utc>,
    ) -> Result<String, anyhow::Error> {
        let claims = Claims {
            sub: subject_id.to_string(),
            kind: kind.as_str().to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.expiry_offset(kind)).timestamp(),
            extra,
        };
        self.sign(&claims)
    }

    pub(crate) fn sign(&self, claims: &Claims) -> Result<String, anyhow::Error> {
        encode(&Header::default(), claims, &self.encoding)
            .map_err(|e| anyhow::anyhow!("Failed to sign token: {}", e))
    }

    fn expiry_offset(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => Duration::minutes(self.config.access_token_expiry_minutes),
            TokenKind::Refresh => Duration::days(self.config.refresh_token_expiry_days),
            TokenKind::Verify => Duration::minutes(self.config.verify_token_expiry_minutes),
            TokenKind::Reset => Duration::minutes(self.config.reset_token_expiry_minutes),
        }
    }

    /// The pure stages of the pipeline: format, length, signature, kind,
    /// subject. Returns the subject id; no store access.
    pub fn screen(&self, token: &str, expected: TokenKind) -> Result<i64, RejectReason> {
        // Stage 1: format. Nothing that is not three base64url segments
        // gets anywhere near signature verification.
        if !well_formed(token) {
            return Err(RejectReason::Malformed);
        }

        // Stage 2: length. Oversized input is rejected before the
        // comparatively expensive signature check.
        if token.len() > self.config.max_token_length {
            return Err(RejectReason::TooLong);
        }

        // Stage 3: signature and expiry. A missing claim is an invalid
        // token, not a decoding fault.
        let mut validation = Validation::default();
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => RejectReason::Expired,
                _ => RejectReason::InvalidSignature,
            }
        })?;

        // Stage 4: kind, compared in constant time. This is what keeps a
        // refresh token out of an access slot (and every other pairing).
        if !crypto::constant_time_eq(
            data.claims.kind.as_bytes(),
            expected.as_str().as_bytes(),
        ) {
            return Err(RejectReason::WrongType);
        }

        // Stage 5: subject must be a plain non-negative integer before it
        // is ever used as a lookup key.
        parse_subject(&data.claims.sub).ok_or(RejectReason::BadSubject)
    }

    /// The full pipeline: `screen` plus the principal-status stage.
    ///
    /// All four validation call sites use this function.
    pub async fn validate(
        &self,
        token: &str,
        expected: TokenKind,
        principals: &PrincipalRepository<'_>,
    ) -> Result<Principal, Rejection> {
        let subject = self.screen(token, expected)?;

        // Stage 6: status. Banned principals fail every kind; access and
        // refresh additionally require a verified account.
        let principal = principals
            .get_by_id(subject)
            .await?
            .ok_or(RejectReason::SubjectNotFound)?;

        if principal.banned {
            return Err(RejectReason::Banned.into());
        }

        if matches!(expected, TokenKind::Access | TokenKind::Refresh) && !principal.verified {
            return Err(RejectReason::Unverified.into());
        }

        Ok(principal)
    }
}

/// Exactly three non-empty dot-separated base64url segments
fn well_formed(token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    let mut segments = 0;
    for segment in token.split('.') {
        segments += 1;
        if segments > 3 || segment.is_empty() {
            return false;
        }
        if !segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return false;
        }
    }
    segments == 3
}

/// Digits-only non-negative integer parse; anything else is rejected at the
/// subject stage rather than surfacing as a cast failure downstream
fn parse_subject(sub: &str) -> Option<i64> {
    if sub.is_empty() || !sub.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    sub.parse::<i64>().ok()
}
