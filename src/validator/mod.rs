// src/validator/mod.rs

pub mod cache;
pub mod fetcher;
pub mod model;

use crate::config::Config;
use crate::error::AuthError;
use cache::KeySetCache;
use fetcher::KeySetFetcher;
use jsonwebtoken::{decode, decode_header, Validation};
use model::{KeyEntry, TokenPayload, UserInfo};
use serde::de::DeserializeOwned;
use std::time::SystemTime;
use tracing::{debug, instrument, warn};

/// Verifies bearer tokens against the issuer's published key set.
///
/// This struct should be created once and shared (it is cheap to clone).
/// It owns the key cache, so one verifier per issuer keeps one cache per process.
#[derive(Clone)]
pub struct TokenVerifier {
    config: Config,
    cache: KeySetCache,
}

impl TokenVerifier {
    /// Creates a new `TokenVerifier` with the given configuration.
    ///
    /// No network call is made here; see `initialize`.
    pub fn new(config: Config) -> Result<Self, AuthError> {
        let fetcher = KeySetFetcher::new(config.jwks_url.clone(), config.fetch_timeout)?;
        Ok(Self::with_cache(config, KeySetCache::new(fetcher)))
    }

    /// Creates a verifier on top of an existing cache.
    ///
    /// Verifiers that share a cache share one key set and one fetch schedule,
    /// e.g. two audiences served by the same issuer.
    pub fn with_cache(config: Config, cache: KeySetCache) -> Self {
        Self { config, cache }
    }

    /// Warms the key cache. Intended for process startup; never fails.
    pub async fn initialize(&self) {
        self.cache.initialize().await;
    }

    pub fn cache(&self) -> &KeySetCache {
        &self.cache
    }

    /// Verifies a token and returns its claims.
    pub async fn verify(&self, token: &str) -> Result<TokenPayload, AuthError> {
        self.verify_as::<TokenPayload>(token).await
    }

    /// Verifies a token and deserializes its claims into `T`.
    ///
    /// This method performs, in order:
    /// 1. Structural decoding of the header (`kid`, `alg`) without trusting it.
    /// 2. Key lookup by `kid`, refreshing the key set on a miss up to
    ///    `max_refresh_attempts` times.
    /// 3. Signature verification with the key's family-specific verification key.
    /// 4. Claim validation: `iss` must equal the expected issuer, `exp` must not
    ///    be in the past (minus leeway), `nbf` if present, `aud` if configured.
    ///
    /// # Arguments
    ///
    /// * `token` - The raw compact JWS, without any `Bearer ` prefix.
    #[instrument(skip(self, token), err)]
    pub async fn verify_as<T: DeserializeOwned>(&self, token: &str) -> Result<T, AuthError> {
        // 1. Decode header to get kid and alg without validation.
        if token.split('.').count() != 3 {
            return Err(AuthError::MalformedToken(
                "expected three dot-separated segments".to_string(),
            ));
        }
        let header = decode_header(token)?;

        // 2. Check if the algorithm is allowed.
        if !self.config.validation.algorithms.contains(&header.alg) {
            return Err(AuthError::UnsupportedAlgorithm(header.alg));
        }
        let kid = header.kid.ok_or(AuthError::MissingKeyId)?;

        // 3. Find the key, tolerating one rotation window.
        let entry = self.find_key(&kid).await?;
        if !entry.material.supports(header.alg) || entry.alg.is_some_and(|alg| alg != header.alg) {
            return Err(AuthError::KeyAlgorithmMismatch { kid, alg: header.alg });
        }
        let decoding_key = entry.material.decoding_key()?;

        // 4. Construct validation options.
        let validation = self.validation_for(header.alg);

        // 5. Decode into a generic value first, keeping claim-shape errors apart from JWT errors.
        let token_data = decode::<serde_json::Value>(token, &decoding_key, &validation)?;
        debug!("Token verified with kid '{}'", kid);

        serde_json::from_value(token_data.claims)
            .map_err(|e| AuthError::ClaimDeserialization(e.to_string()))
    }

    /// Projects a verified payload onto the smaller `UserInfo` shape.
    ///
    /// Fails with `MissingRequiredClaim` rather than filling in defaults.
    pub fn extract_user_info(&self, payload: &TokenPayload) -> Result<UserInfo, AuthError> {
        UserInfo::try_from(payload)
    }

    /// Number of keys currently cached.
    pub async fn key_count(&self) -> usize {
        self.cache.key_count().await
    }

    /// Time of the last successful key set fetch.
    pub async fn last_fetched_at(&self) -> Option<SystemTime> {
        self.cache.last_fetched_at().await
    }

    /// The fully-qualified JWKS URL in use.
    pub fn jwks_url(&self) -> &url::Url {
        self.cache.jwks_url()
    }

    async fn find_key(&self, kid: &str) -> Result<KeyEntry, AuthError> {
        let keys = self.cache.get_keys().await?;
        if let Some(entry) = keys.get(kid) {
            return Ok(entry.clone());
        }

        let attempts = self.config.validation.max_refresh_attempts;
        for attempt in 1..=attempts {
            debug!("Key '{}' not cached, refreshing JWKS (attempt {}/{})", kid, attempt, attempts);
            // Look up in the set this refresh fetched, not whatever the cache holds now.
            let keys = self.cache.refresh().await?;
            if let Some(entry) = keys.get(kid) {
                return Ok(entry.clone());
            }
        }

        warn!("Key '{}' not found in JWKS after {} refresh attempt(s)", kid, attempts);
        Err(AuthError::UnknownKey(kid.to_string()))
    }

    fn validation_for(&self, alg: jsonwebtoken::Algorithm) -> Validation {
        let details = &self.config.validation;

        let mut validation = Validation::new(alg);
        validation.leeway = details.leeway.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[details.expected_issuer.as_str()]);

        match &details.audience {
            Some(audience) => {
                validation.set_audience(&[audience.as_str()]);
                validation.set_required_spec_claims(&["exp", "iss", "aud"]);
            }
            None => {
                validation.validate_aud = false;
                validation.set_required_spec_claims(&["exp", "iss"]);
            }
        }
        validation
    }
}
