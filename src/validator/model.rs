// src/validator/model.rs

use crate::error::AuthError;
use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::SystemTime;
use tracing::warn;

/// A single JSON Web Key as published by the issuer (RFC 7517).
///
/// Every field is optional; missing members are reported per key when the
/// entry is converted.
#[derive(Debug, Deserialize)]
pub struct JsonWebKey {
    pub kid: Option<String>,
    pub kty: Option<String>,
    #[serde(rename = "use")]
    pub use_purpose: Option<String>,
    pub alg: Option<String>,
    pub crv: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
    pub n: Option<String>,
    pub e: Option<String>,
}

/// Represents a JSON Web Key Set (JWKS), which is a collection of JWKs.
///
/// Entries stay untyped until `SigningKeySet::from_jwks`, so one malformed
/// entry does not fail the whole document.
#[derive(Debug, Deserialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<serde_json::Value>,
}

/// Public key material, one variant per key family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// `kty: "RSA"`: base64url modulus and exponent.
    Rsa { n: String, e: String },
    /// `kty: "EC"`: curve name and base64url affine coordinates.
    Ec { crv: String, x: String, y: String },
    /// `kty: "OKP"`: curve name (Ed25519) and base64url public key.
    Okp { crv: String, x: String },
}

impl KeyMaterial {
    /// Whether a token signed with `alg` can be checked against this material.
    pub fn supports(&self, alg: Algorithm) -> bool {
        match self {
            KeyMaterial::Rsa { .. } => matches!(
                alg,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ),
            KeyMaterial::Ec { crv, .. } => matches!(
                (crv.as_str(), alg),
                ("P-256", Algorithm::ES256) | ("P-384", Algorithm::ES384)
            ),
            KeyMaterial::Okp { crv, .. } => crv == "Ed25519" && alg == Algorithm::EdDSA,
        }
    }

    /// Builds the `jsonwebtoken` verification key for this material.
    pub fn decoding_key(&self) -> Result<DecodingKey, AuthError> {
        let key = match self {
            KeyMaterial::Rsa { n, e } => DecodingKey::from_rsa_components(n, e)?,
            KeyMaterial::Ec { x, y, .. } => DecodingKey::from_ec_components(x, y)?,
            KeyMaterial::Okp { x, .. } => DecodingKey::from_ed_components(x)?,
        };
        Ok(key)
    }
}

/// One public key of a `SigningKeySet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    /// Unique within its key set.
    pub kid: String,
    /// Optional `alg` hint published alongside the key.
    pub alg: Option<Algorithm>,
    pub material: KeyMaterial,
}

impl KeyEntry {
    /// Converts a raw JWK, returning a reason when it cannot be used for verification.
    fn from_jwk(jwk: JsonWebKey) -> Result<Self, String> {
        let kid = jwk.kid.filter(|kid| !kid.is_empty()).ok_or("missing 'kid'")?;

        if jwk.use_purpose.as_deref().is_some_and(|purpose| purpose != "sig") {
            return Err(format!("key '{kid}' is not a signing key"));
        }

        let alg = match jwk.alg.as_deref() {
            Some(name) => Some(
                Algorithm::from_str(name)
                    .map_err(|_| format!("key '{kid}' has unknown alg '{name}'"))?,
            ),
            None => None,
        };

        let material = match jwk.kty.as_deref() {
            Some("RSA") => KeyMaterial::Rsa {
                n: required_component(&kid, "n", jwk.n, None)?,
                e: required_component(&kid, "e", jwk.e, None)?,
            },
            Some("EC") => {
                let crv = jwk.crv.ok_or_else(|| format!("key '{kid}' is missing 'crv'"))?;
                let width = match crv.as_str() {
                    "P-256" => 32,
                    "P-384" => 48,
                    other => return Err(format!("key '{kid}' uses unsupported curve '{other}'")),
                };
                KeyMaterial::Ec {
                    x: required_component(&kid, "x", jwk.x, Some(width))?,
                    y: required_component(&kid, "y", jwk.y, Some(width))?,
                    crv,
                }
            }
            Some("OKP") => {
                let crv = jwk.crv.ok_or_else(|| format!("key '{kid}' is missing 'crv'"))?;
                if crv != "Ed25519" {
                    return Err(format!("key '{kid}' uses unsupported curve '{crv}'"));
                }
                KeyMaterial::Okp {
                    x: required_component(&kid, "x", jwk.x, Some(32))?,
                    crv,
                }
            }
            Some(other) => return Err(format!("key '{kid}' has unsupported kty '{other}'")),
            None => return Err(format!("key '{kid}' is missing 'kty'")),
        };

        if let Some(alg) = alg {
            if !material.supports(alg) {
                return Err(format!(
                    "key '{kid}' advertises alg {alg:?} that does not fit its key type"
                ));
            }
        }

        Ok(Self { kid, alg, material })
    }
}

fn required_component(
    kid: &str,
    name: &str,
    value: Option<String>,
    expected_len: Option<usize>,
) -> Result<String, String> {
    let value = value.ok_or_else(|| format!("key '{kid}' is missing '{name}'"))?;
    let value = value.trim_end_matches('=').to_string();
    let bytes = URL_SAFE_NO_PAD
        .decode(&value)
        .map_err(|e| format!("key '{kid}' has undecodable '{name}': {e}"))?;
    if bytes.is_empty() || expected_len.is_some_and(|len| len != bytes.len()) {
        return Err(format!("key '{kid}' has a '{name}' of unexpected length {}", bytes.len()));
    }
    Ok(value)
}

/// A point-in-time snapshot of the issuer's public keys.
///
/// Never patched after construction; a refresh replaces it wholesale.
#[derive(Debug, Clone)]
pub struct SigningKeySet {
    keys: Vec<KeyEntry>,
    fetched_at: SystemTime,
}

impl SigningKeySet {
    /// Converts a parsed JWKS document, dropping entries that cannot be used.
    ///
    /// When two entries share a `kid`, the first one wins.
    pub fn from_jwks(jwks: JsonWebKeySet, fetched_at: SystemTime) -> Self {
        let mut keys: Vec<KeyEntry> = Vec::with_capacity(jwks.keys.len());
        for value in jwks.keys {
            let jwk = match serde_json::from_value::<JsonWebKey>(value) {
                Ok(jwk) => jwk,
                Err(e) => {
                    warn!("Dropping malformed JWK: {}", e);
                    continue;
                }
            };
            match KeyEntry::from_jwk(jwk) {
                Ok(entry) if keys.iter().any(|k| k.kid == entry.kid) => {
                    warn!("Dropping JWK with duplicate kid '{}'", entry.kid);
                }
                Ok(entry) => keys.push(entry),
                Err(reason) => warn!("Dropping unusable JWK: {}", reason),
            }
        }
        Self { keys, fetched_at }
    }

    pub fn keys(&self) -> &[KeyEntry] {
        &self.keys
    }

    pub fn fetched_at(&self) -> SystemTime {
        self.fetched_at
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Builds the `kid` lookup index for this set.
    pub fn index(&self) -> HashMap<String, KeyEntry> {
        self.keys.iter().map(|k| (k.kid.clone(), k.clone())).collect()
    }
}

/// The verified claims of a bearer token.
///
/// Application-defined claims such as an active organization id are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TokenPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub iss: String,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenPayload {
    /// The subject identifier: `sub`, falling back to `id`.
    pub fn subject(&self) -> Option<&str> {
        self.sub.as_deref().or(self.id.as_deref())
    }

    /// An application-defined claim by name.
    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }
}

/// The stable subset of a `TokenPayload` most callers need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
}

impl TryFrom<&TokenPayload> for UserInfo {
    type Error = AuthError;

    fn try_from(payload: &TokenPayload) -> Result<Self, Self::Error> {
        let required = |value: Option<&str>, claim: &str| -> Result<String, AuthError> {
            value
                .map(str::to_string)
                .ok_or_else(|| AuthError::MissingRequiredClaim(claim.to_string()))
        };
        Ok(Self {
            id: required(payload.subject(), "sub")?,
            name: required(payload.name.as_deref(), "name")?,
            email: required(payload.email.as_deref(), "email")?,
            image: payload.image.clone(),
        })
    }
}
