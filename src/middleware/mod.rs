//! Middleware components
//!
//! This module contains:
//! - Provider session verification (JWT bearer token or session cookie)
//! - Security context extractors with lazy sync

pub mod session;

pub use session::{
    resolve_with_sync, SessionClaims, SessionError, SessionVerifier, UserContext,
};
