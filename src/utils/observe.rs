//! Authentication outcome reporting
//!
//! Thin wrapper over `tracing` implementing the observability-sink contract:
//! every authentication success and failure is reported as a structured
//! (method, reason) event. Emission is fire-and-forget; no caller ever
//! blocks or fails because of it.

use crate::utils::error::RejectReason;

/// Report a rejected authentication attempt
pub fn auth_failure(method: &'static str, reason: RejectReason) {
    tracing::warn!(
        target: "gatehouse::auth",
        method,
        reason = reason.as_str(),
        "authentication rejected"
    );
}

/// Report a failed credential check (unknown email / wrong password).
///
/// These carry a detail string instead of a [`RejectReason`]: outwardly both
/// collapse to the same generic failure, but operators get the distinction.
pub fn credential_failure(method: &'static str, detail: &'static str) {
    tracing::warn!(
        target: "gatehouse::auth",
        method,
        reason = detail,
        "authentication rejected"
    );
}

/// Report an accepted authentication attempt
pub fn auth_success(method: &'static str, principal_id: i64) {
    tracing::debug!(
        target: "gatehouse::auth",
        method,
        principal_id,
        "authentication accepted"
    );
}
