// src/lib.rs

//! Bearer token verification against an issuer's JSON Web Key Set.
//!
//! The key set is fetched lazily, cached in memory, and refreshed when a token
//! names a key the cache has not seen, which is how issuer key rotation is
//! picked up without any background polling.

pub mod config;
pub mod error;
pub mod guard;
pub mod validator;

/// The public prelude for the `jwks-verifier` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::config::{Config, ConfigBuilder};
    pub use crate::error::AuthError;
    pub use crate::guard::{
        extract_bearer_token, AuthGuard, Authenticated, GuardedRequest, PublicRoute, Unauthorized,
    };
    pub use crate::validator::cache::KeySetCache;
    pub use crate::validator::fetcher::KeySetFetcher;
    pub use crate::validator::model::{
        KeyEntry, KeyMaterial, SigningKeySet, TokenPayload, UserInfo,
    };
    pub use crate::validator::TokenVerifier;
    pub use jsonwebtoken::Algorithm;
}
