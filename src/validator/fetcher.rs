// src/validator/fetcher.rs

use super::model::{JsonWebKeySet, SigningKeySet};
use crate::error::AuthError;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, instrument};
use url::Url;

/// Retrieves the issuer's current key set over HTTP.
///
/// Performs exactly one request per call; retrying is left to the caller.
#[derive(Clone, Debug)]
pub struct KeySetFetcher {
    http_client: reqwest::Client,
    jwks_url: Url,
}

impl KeySetFetcher {
    /// Creates a fetcher for `jwks_url` whose requests are bounded by `timeout`.
    pub fn new(jwks_url: Url, timeout: Duration) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client, jwks_url })
    }

    /// The fully-qualified JWKS URL this fetcher reads.
    pub fn jwks_url(&self) -> &Url {
        &self.jwks_url
    }

    /// Downloads and parses the key set.
    ///
    /// # Errors
    ///
    /// * `AuthError::Http` on connection failures and timeouts.
    /// * `AuthError::FetchStatus` when the endpoint answers with a non-2xx status.
    /// * `AuthError::JwksParse` when the body is not a JSON object with a `keys` array.
    #[instrument(skip(self), fields(url = %self.jwks_url), err)]
    pub async fn fetch(&self) -> Result<SigningKeySet, AuthError> {
        let response = self.http_client.get(self.jwks_url.clone()).send().await.map_err(|e| {
            error!("Failed to reach JWKS endpoint: {}", e);
            AuthError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            error!("JWKS endpoint returned status {}", status);
            return Err(AuthError::FetchStatus { status: status.as_u16() });
        }

        let body = response.bytes().await?;
        let jwks: JsonWebKeySet = serde_json::from_slice(&body).map_err(|e| {
            error!("Failed to parse JWKS response: {}", e);
            AuthError::JwksParse(e.to_string())
        })?;

        let published = jwks.keys.len();
        let key_set = SigningKeySet::from_jwks(jwks, SystemTime::now());
        debug!("Fetched JWKS with {} usable keys out of {} published", key_set.len(), published);

        Ok(key_set)
    }
}
