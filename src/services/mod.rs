//! Service layer
//!
//! The cooperating authorities: crypto primitives, the token authority,
//! the credential verifier, the API key authority and the identity
//! resolver, plus the account lifecycle service built on top of them.

pub mod accounts;
pub mod api_keys;
pub mod credentials;
pub mod crypto;
pub mod identity;
pub mod tokens;

pub use accounts::{AccountService, TokenPair};
pub use api_keys::ApiKeyAuthority;
pub use credentials::CredentialVerifier;
pub use identity::IdentityResolver;
pub use tokens::{Claims, TokenAuthority, TokenKind};
