//! API key models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A long-lived API credential.
///
/// Only the digest of the secret is ever stored; the plaintext exists solely
/// inside the [`IssuedApiKey`] returned at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub principal_id: i64,
    pub name: String,
    /// Public prefix shared by all keys, used for fast candidate screening
    pub prefix: String,
    #[serde(skip_serializing)]
    pub secret_digest: String,
    pub active: bool,
    /// Permission labels recorded on the key. Not enforced during
    /// authentication; [`ApiKey::has_scope`] is the enforcement hook.
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Whether this key carries the named scope.
    ///
    /// Authentication does not call this; callers that want scope gating
    /// check it against their own operation after authenticating.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Response to key issuance, the only place the plaintext appears
#[derive(Debug, Clone, Serialize)]
pub struct IssuedApiKey {
    #[serde(flatten)]
    pub api_key: ApiKey,
    /// Plaintext API key (only returned on creation)
    pub key: String,
}
