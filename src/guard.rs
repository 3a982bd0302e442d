// src/guard.rs

//! The per-request integration point for host frameworks.
//!
//! `AuthGuard` pulls the bearer token out of a request, verifies it, and
//! attaches the resulting identity. Frameworks plug in through the
//! `GuardedRequest` trait and two injected functions: one that builds the
//! framework's unauthorized error, and one that shapes the attached identity.

use crate::error::AuthError;
use crate::validator::model::{TokenPayload, UserInfo};
use crate::validator::TokenVerifier;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// What a host request must expose for the guard to authenticate it.
pub trait GuardedRequest {
    /// The raw `Authorization` header value, if present.
    fn authorization(&self) -> Option<&str>;

    /// Whether the matched route is marked public and skips authentication.
    fn is_public(&self) -> bool {
        false
    }

    /// Stores the authenticated identity on the request.
    fn attach_identity<U: Clone + Send + Sync + 'static>(&mut self, identity: U);
}

/// Request extension marking a route as public.
#[derive(Clone, Copy, Debug, Default)]
pub struct PublicRoute;

/// Request extension holding the identity attached by the guard.
#[derive(Clone, Debug)]
pub struct Authenticated<U>(pub U);

impl<B> GuardedRequest for http::Request<B> {
    fn authorization(&self) -> Option<&str> {
        self.headers()
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
    }

    fn is_public(&self) -> bool {
        self.extensions().get::<PublicRoute>().is_some()
    }

    fn attach_identity<U: Clone + Send + Sync + 'static>(&mut self, identity: U) {
        self.extensions_mut().insert(Authenticated(identity));
    }
}

/// Pulls the token out of an `Authorization` header value.
///
/// Accepts `Bearer <token>` (scheme matched case-insensitively) and a bare
/// token. Any other scheme, or an empty value, yields no token.
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();
    let token = match header.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        Some(_) => return None,
        None if header.eq_ignore_ascii_case("bearer") => return None,
        None => header,
    };
    (!token.is_empty()).then_some(token)
}

/// The default unauthorized error, carrying only a client-safe message.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct Unauthorized {
    pub message: String,
    #[source]
    pub source: Option<AuthError>,
}

impl Unauthorized {
    pub fn new(message: impl Into<String>, source: Option<AuthError>) -> Self {
        Self { message: message.into(), source }
    }

    /// Always `401 Unauthorized`.
    pub fn status(&self) -> http::StatusCode {
        http::StatusCode::UNAUTHORIZED
    }
}

type ErrorFactory<E> = Arc<dyn Fn(&str, AuthError) -> E + Send + Sync>;
type UserTransform<U> = Arc<dyn Fn(TokenPayload, UserInfo) -> U + Send + Sync>;

/// Authenticates requests with a shared `TokenVerifier`.
///
/// `U` is the identity attached to requests (`UserInfo` unless a transform is
/// configured) and `E` the host framework's rejection type.
pub struct AuthGuard<U = UserInfo, E = Unauthorized> {
    verifier: TokenVerifier,
    create_unauthorized_error: ErrorFactory<E>,
    transform_user: UserTransform<U>,
}

impl<U, E> Clone for AuthGuard<U, E> {
    fn clone(&self) -> Self {
        Self {
            verifier: self.verifier.clone(),
            create_unauthorized_error: self.create_unauthorized_error.clone(),
            transform_user: self.transform_user.clone(),
        }
    }
}

impl AuthGuard {
    /// Creates a guard that rejects with `Unauthorized` and attaches `UserInfo`.
    pub fn new(verifier: TokenVerifier) -> Self {
        Self {
            verifier,
            create_unauthorized_error: Arc::new(|message: &str, source: AuthError| {
                Unauthorized::new(message, Some(source))
            }),
            transform_user: Arc::new(|_payload: TokenPayload, user: UserInfo| user),
        }
    }
}

impl<U, E> AuthGuard<U, E> {
    /// Replaces the function that turns a failure into the host's rejection type.
    ///
    /// The function receives a client-safe message and the underlying error.
    pub fn with_unauthorized_error<E2, F>(self, create: F) -> AuthGuard<U, E2>
    where
        F: Fn(&str, AuthError) -> E2 + Send + Sync + 'static,
    {
        AuthGuard {
            verifier: self.verifier,
            create_unauthorized_error: Arc::new(create),
            transform_user: self.transform_user,
        }
    }

    /// Replaces the function that builds the identity attached to requests.
    pub fn with_transform_user<U2, F>(self, transform: F) -> AuthGuard<U2, E>
    where
        F: Fn(TokenPayload, UserInfo) -> U2 + Send + Sync + 'static,
    {
        AuthGuard {
            verifier: self.verifier,
            create_unauthorized_error: self.create_unauthorized_error,
            transform_user: Arc::new(transform),
        }
    }

    /// Authenticates a raw `Authorization` header value and returns the identity.
    ///
    /// A missing or unusable header is rejected without touching the verifier.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<U, E> {
        let Some(token) = authorization.and_then(extract_bearer_token) else {
            debug!("Rejecting request without a bearer token");
            return Err(self.reject(AuthError::MissingToken));
        };

        let payload = match self.verifier.verify(token).await {
            Ok(payload) => payload,
            Err(e) => return Err(self.reject(e)),
        };
        let user = match self.verifier.extract_user_info(&payload) {
            Ok(user) => user,
            Err(e) => return Err(self.reject(e)),
        };

        Ok((self.transform_user)(payload, user))
    }

    /// The host-facing entry point, called once per request.
    ///
    /// Returns `Ok(true)` when the request may proceed: either its route is
    /// public, or its token verified and the identity is now attached.
    pub async fn can_activate<R>(&self, request: &mut R) -> Result<bool, E>
    where
        R: GuardedRequest,
        U: Clone + Send + Sync + 'static,
    {
        if request.is_public() {
            return Ok(true);
        }

        let identity = self.authenticate(request.authorization()).await?;
        request.attach_identity(identity);
        Ok(true)
    }

    fn reject(&self, error: AuthError) -> E {
        warn!("Authentication failed: {}", error);
        (self.create_unauthorized_error)(error.public_message(), error)
    }
}
