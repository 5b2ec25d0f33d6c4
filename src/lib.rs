//! Gatehouse
//!
//! Account, credential and token authority core: short-lived signed tokens
//! of four kinds behind one shared validation pipeline, timing-safe
//! password authentication, digest-addressed API keys, and a single
//! "current principal" resolution rule. Transport, persistence migrations
//! and delivery concerns live with the embedding application.

pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use db::{init_pool, DbPool};
pub use models::{ApiKey, IssuedApiKey, Principal, PrincipalPublic, Role};
pub use services::{
    AccountService, ApiKeyAuthority, CredentialVerifier, IdentityResolver, TokenAuthority,
    TokenKind, TokenPair,
};
pub use utils::error::{AuthError, AuthResult, RejectReason, Rejection};
