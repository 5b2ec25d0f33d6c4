//! Principal model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Principal role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Principal entity (an account)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_digest: String,
    pub role: Role,
    /// Banned principals fail every authentication path
    pub banned: bool,
    /// Unverified principals cannot use access/refresh tokens
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Principal without the password digest, safe for serialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalPublic {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub banned: bool,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Principal> for PrincipalPublic {
    fn from(p: Principal) -> Self {
        Self {
            id: p.id,
            email: p.email,
            role: p.role,
            banned: p.banned,
            verified: p.verified,
            created_at: p.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_role_round_trip() {
        assert_eq!(Role::from_str("admin").unwrap(), Role::Admin);
        assert_eq!(Role::from_str("USER").unwrap(), Role::User);
        assert_eq!(Role::Admin.to_string(), "admin");
        assert!(Role::from_str("root").is_err());
    }

    #[test]
    fn test_digest_not_serialized() {
        let principal = Principal {
            id: 1,
            email: "a@example.com".to_string(),
            password_digest: "secret-digest".to_string(),
            role: Role::User,
            banned: false,
            verified: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_string(&principal).unwrap();
        assert!(!json.contains("secret-digest"));
    }
}
