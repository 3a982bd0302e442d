// src/error.rs

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::Algorithm;
use thiserror::Error;

/// The primary error type for the `jwks-verifier` library.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A required configuration field is missing.
    #[error("A required configuration field is missing: {0}")]
    MissingConfiguration(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A provided URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The JWKS endpoint could not be reached, or the request timed out.
    #[error("JWKS request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The JWKS endpoint answered with a non-success status code.
    #[error("JWKS endpoint returned status {status}")]
    FetchStatus { status: u16 },

    /// The JWKS endpoint answered with a body that is not a key set.
    #[error("Malformed JWKS document: {0}")]
    JwksParse(String),

    /// No credential was presented where one was required.
    #[error("No bearer token was presented")]
    MissingToken,

    /// The presented credential is not structurally a signed token.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The JWT header is missing the required 'kid' (Key ID) field.
    #[error("The JWT header is missing the 'kid' (Key ID) field")]
    MissingKeyId,

    /// The token references a key that is absent from the key set, even after refreshing.
    #[error("Key not found for kid: {0}")]
    UnknownKey(String),

    /// The algorithm in the JWT header is not allowed by the configuration.
    #[error("Unsupported algorithm: {0:?}")]
    UnsupportedAlgorithm(Algorithm),

    /// The token's algorithm cannot be verified with the selected key.
    #[error("Algorithm {alg:?} cannot be used with key '{kid}'")]
    KeyAlgorithmMismatch { kid: String, alg: Algorithm },

    /// The published key material could not be turned into a verification key.
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Cryptographic verification of the signature failed.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// The token's `exp` claim is in the past.
    #[error("Token has expired")]
    ExpiredToken,

    /// The token's `nbf` claim is in the future.
    #[error("Token is not valid yet")]
    ImmatureToken,

    /// The token's `iss` claim does not match the expected issuer.
    #[error("Token issuer does not match the expected issuer")]
    IssuerMismatch,

    /// The token's `aud` claim does not match the configured audience.
    #[error("Token audience does not match the expected audience")]
    AudienceMismatch,

    /// A claim that must be present is missing from the token.
    #[error("A required claim is missing from the token: {0}")]
    MissingRequiredClaim(String),

    /// Failed to deserialize the token's claims into the target type.
    #[error("Failed to deserialize claims: {0}")]
    ClaimDeserialization(String),

    /// Any other error reported by the `jsonwebtoken` crate.
    #[error("JWT validation error: {0}")]
    JwtValidation(jsonwebtoken::errors::Error),
}

impl AuthError {
    /// Returns `true` for failures to obtain a key set from the issuer.
    ///
    /// These share one recovery policy: the cache keeps whatever it held before.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            AuthError::Http(_) | AuthError::FetchStatus { .. } | AuthError::JwksParse(_)
        )
    }

    /// Returns `true` for configuration problems, which are fatal at construction.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            AuthError::MissingConfiguration(_)
                | AuthError::InvalidConfiguration(_)
                | AuthError::InvalidUrl(_)
        )
    }

    /// A message that is safe to hand to an unauthenticated client.
    ///
    /// It names the failure kind but never carries issuer responses, key ids
    /// or transport details.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "Missing bearer token",
            AuthError::ExpiredToken => "Token expired",
            AuthError::ImmatureToken => "Token not yet valid",
            AuthError::InvalidSignature => "Invalid token signature",
            AuthError::IssuerMismatch | AuthError::AudienceMismatch => {
                "Token was not issued for this service"
            }
            AuthError::Http(_) | AuthError::FetchStatus { .. } | AuthError::JwksParse(_) => {
                "Authentication service unavailable"
            }
            _ => "Invalid token",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidToken => {
                AuthError::MalformedToken("token is not a three-part JWS".to_string())
            }
            ErrorKind::Base64(e) => {
                AuthError::MalformedToken(format!("base64 decoding failed: {e}"))
            }
            ErrorKind::Json(e) => AuthError::MalformedToken(format!("invalid JSON segment: {e}")),
            ErrorKind::Utf8(e) => AuthError::MalformedToken(format!("invalid UTF-8 segment: {e}")),
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
            ErrorKind::ImmatureSignature => AuthError::ImmatureToken,
            ErrorKind::InvalidIssuer => AuthError::IssuerMismatch,
            ErrorKind::InvalidAudience => AuthError::AudienceMismatch,
            ErrorKind::MissingRequiredClaim(claim) => {
                AuthError::MissingRequiredClaim(claim.clone())
            }
            ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidKeyFormat => AuthError::InvalidKeyMaterial(err.to_string()),
            _ => AuthError::JwtValidation(err),
        }
    }
}
