//! Data models

pub mod api_key;
pub mod principal;

pub use api_key::{ApiKey, IssuedApiKey};
pub use principal::{Principal, PrincipalPublic, Role};
