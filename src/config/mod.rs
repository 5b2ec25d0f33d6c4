//! Configuration management
//!
//! YAML-based configuration with environment variable overrides and default
//! values for every setting. The loaded `AppConfig` is immutable and passed
//! explicitly into the authorities at construction; nothing reads ambient
//! state after startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub auth: AuthConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Authentication configuration
///
/// One shared signing secret covers token signatures and API-key digests.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// HMAC secret for token signing and key digests (min 32 chars)
    pub token_secret: String,
    #[serde(default = "default_access_expiry_minutes")]
    pub access_token_expiry_minutes: i64,
    #[serde(default = "default_refresh_expiry_days")]
    pub refresh_token_expiry_days: i64,
    #[serde(default = "default_verify_expiry_minutes")]
    pub verify_token_expiry_minutes: i64,
    #[serde(default = "default_reset_expiry_minutes")]
    pub reset_token_expiry_minutes: i64,
    /// Tokens longer than this are rejected before signature verification
    #[serde(default = "default_max_token_length")]
    pub max_token_length: usize,
    /// Public prefix prepended to every issued API key
    #[serde(default = "default_api_key_prefix")]
    pub api_key_prefix: String,
    #[serde(default = "default_password_min_length")]
    pub password_min_length: usize,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_access_expiry_minutes() -> i64 {
    120
}

fn default_refresh_expiry_days() -> i64 {
    30
}

fn default_verify_expiry_minutes() -> i64 {
    10
}

fn default_reset_expiry_minutes() -> i64 {
    30
}

fn default_max_token_length() -> usize {
    1024
}

fn default_api_key_prefix() -> String {
    "gk_".to_string()
}

fn default_password_min_length() -> usize {
    8
}

fn default_database_url() -> String {
    "sqlite://./data/gatehouse.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            auth: AuthConfig {
                token_secret: "change-me-in-production-minimum-32-characters-long".to_string(),
                access_token_expiry_minutes: default_access_expiry_minutes(),
                refresh_token_expiry_days: default_refresh_expiry_days(),
                verify_token_expiry_minutes: default_verify_expiry_minutes(),
                reset_token_expiry_minutes: default_reset_expiry_minutes(),
                max_token_length: default_max_token_length(),
                api_key_prefix: default_api_key_prefix(),
                password_min_length: default_password_min_length(),
            },
            database: DatabaseConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Loaded in order (later overrides earlier):
    /// 1. Default values
    /// 2. Configuration file (YAML, path from `GATEHOUSE_CONFIG`)
    /// 3. Environment variables
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("GATEHOUSE_CONFIG").map(PathBuf::from).ok();

        let mut config = match config_path {
            Some(ref path) if path.exists() => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                serde_norway::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file: {:?}", path))?
            }
            _ => AppConfig::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(secret) = std::env::var("GATEHOUSE_TOKEN_SECRET") {
            self.auth.token_secret = secret;
        }
        if let Ok(prefix) = std::env::var("GATEHOUSE_API_KEY_PREFIX") {
            self.auth.api_key_prefix = prefix;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.auth.token_secret.len() < 32 {
            anyhow::bail!("Token secret must be at least 32 characters long");
        }

        if self.auth.access_token_expiry_minutes <= 0
            || self.auth.refresh_token_expiry_days <= 0
            || self.auth.verify_token_expiry_minutes <= 0
            || self.auth.reset_token_expiry_minutes <= 0
        {
            anyhow::bail!("Token expiries must be positive");
        }

        // Ceilings keep expiry arithmetic far inside chrono::Duration's
        // panic-free range: one year of minutes, ten years of days.
        const MAX_EXPIRY_MINUTES: i64 = 525_600;
        const MAX_EXPIRY_DAYS: i64 = 3_650;
        if self.auth.access_token_expiry_minutes > MAX_EXPIRY_MINUTES
            || self.auth.verify_token_expiry_minutes > MAX_EXPIRY_MINUTES
            || self.auth.reset_token_expiry_minutes > MAX_EXPIRY_MINUTES
        {
            anyhow::bail!("Token expiries must not exceed {} minutes", MAX_EXPIRY_MINUTES);
        }
        if self.auth.refresh_token_expiry_days > MAX_EXPIRY_DAYS {
            anyhow::bail!("Refresh token expiry must not exceed {} days", MAX_EXPIRY_DAYS);
        }

        // A signed token with a numeric subject is never shorter than this;
        // smaller limits would reject every well-formed token.
        if self.auth.max_token_length < 64 {
            anyhow::bail!("max_token_length must be at least 64");
        }

        if self.auth.api_key_prefix.is_empty() || self.auth.api_key_prefix.len() > 16 {
            anyhow::bail!("API key prefix must be between 1 and 16 characters");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.auth.access_token_expiry_minutes, 120);
        assert_eq!(config.auth.refresh_token_expiry_days, 30);
        assert_eq!(config.auth.verify_token_expiry_minutes, 10);
        assert_eq!(config.auth.reset_token_expiry_minutes, 30);
        assert_eq!(config.auth.max_token_length, 1024);
    }

    #[test]
    fn test_validation_secret_length() {
        let mut config = AppConfig::default();
        config.auth.token_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_expiry_ceilings() {
        let mut config = AppConfig::default();
        config.auth.refresh_token_expiry_days = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.auth.access_token_expiry_minutes = i64::MAX;
        assert!(config.validate().is_err());

        // The ceilings themselves are accepted
        let mut config = AppConfig::default();
        config.auth.access_token_expiry_minutes = 525_600;
        config.auth.refresh_token_expiry_days = 3_650;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_token_length_floor() {
        let mut config = AppConfig::default();
        config.auth.max_token_length = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_yaml_with_defaults() {
        let yaml = r#"
auth:
  token_secret: "test-secret-that-is-at-least-32-characters-long"
  access_token_expiry_minutes: 15
"#;
        let config: AppConfig = serde_norway::from_str(yaml).unwrap();
        assert_eq!(config.auth.access_token_expiry_minutes, 15);
        // Unspecified fields fall back to defaults
        assert_eq!(config.auth.refresh_token_expiry_days, 30);
        assert_eq!(config.auth.api_key_prefix, "gk_");
        assert_eq!(config.database.max_connections, 5);
    }
}
