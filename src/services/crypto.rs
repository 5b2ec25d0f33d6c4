//! Digest and signing primitives
//!
//! Password hashing with Argon2, HMAC digesting for API keys, and
//! constant-time comparison. Token signing lives in the token authority;
//! everything else cryptographic is here.

use anyhow::Result;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Hash a password using Argon2id with a fresh random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let digest = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(digest)
}

/// Verify a password against a stored digest
pub fn verify_password(password: &str, digest: &str) -> Result<bool> {
    let parsed = PasswordHash::new(digest)
        .map_err(|e| anyhow::anyhow!("Invalid password digest format: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// A real Argon2 digest of a throwaway value.
///
/// The credential verifier runs the password check against this when no
/// account matches, so "no such account" costs the same as "wrong
/// password". The value is precomputed once; only verification cost is on
/// the request path.
pub fn dummy_digest() -> &'static str {
    static DIGEST: Lazy<String> = Lazy::new(|| {
        hash_password("gatehouse-dummy-credential").expect("Argon2 default parameters are valid")
    });
    &DIGEST
}

/// HMAC-SHA256 digest of a raw API key, hex-encoded.
///
/// Deterministic under a fixed secret, which is what allows the store to
/// look keys up by digest instead of scanning; the HMAC key stands in for
/// a per-record salt.
pub fn key_digest(secret: &str, raw_key: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(raw_key.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Byte equality whose timing does not depend on where the inputs differ
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
