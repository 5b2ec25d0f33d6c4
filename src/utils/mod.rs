//! Shared utilities

pub mod error;
pub mod observe;
