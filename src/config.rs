// src/config.rs

use crate::error::AuthError;
use jsonwebtoken::Algorithm;
use std::time::Duration;
use url::Url;

/// The path of the JWKS document relative to the issuer base URL.
pub const DEFAULT_JWKS_PATH: &str = "/api/auth/jwks";

/// Upper bound on a single JWKS request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest accepted clock skew tolerance.
pub const MAX_LEEWAY: Duration = Duration::from_secs(3600);

/// Every asymmetric algorithm the verifier knows how to check.
pub const SUPPORTED_ALGORITHMS: [Algorithm; 9] = [
    Algorithm::EdDSA,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// Contains the claim validation settings applied to every token.
#[derive(Clone, Debug)]
pub struct ValidationDetails {
    /// The value the `iss` claim must equal exactly.
    pub expected_issuer: String,
    /// If set, the `aud` claim is required and must contain this value.
    pub audience: Option<String>,
    /// The signing algorithms that are permitted.
    /// Tokens signed with any other algorithm will be rejected.
    pub algorithms: Vec<Algorithm>,
    /// The tolerance for clock skew when validating `exp` and `nbf`.
    /// Defaults to zero: a token is expired once `exp < now`.
    pub leeway: Duration,
    /// How many times a verification may refresh the key set when it meets
    /// an unknown `kid`. Defaults to 1.
    pub max_refresh_attempts: u32,
}

/// The main configuration for the verifier.
///
/// This struct holds everything needed to locate the issuer's key set and
/// validate tokens against it. It should be constructed using the `ConfigBuilder`.
#[derive(Clone, Debug)]
pub struct Config {
    /// The base URL of the token issuer, as configured.
    pub issuer_base_url: Url,
    /// The fully-qualified URL of the JWKS document.
    pub jwks_url: Url,
    /// Bound on each JWKS request; a timeout counts as a fetch failure.
    pub fetch_timeout: Duration,
    /// The specific validation parameters to apply to the token.
    pub validation: ValidationDetails,
}

/// A builder for creating a `Config` instance.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    issuer_base_url: Option<String>,
    jwks_path: Option<String>,
    expected_issuer: Option<String>,
    audience: Option<String>,
    algorithms: Option<Vec<Algorithm>>,
    leeway: Option<Duration>,
    fetch_timeout: Option<Duration>,
    max_refresh_attempts: Option<u32>,
}

impl ConfigBuilder {
    /// Creates a new `ConfigBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder from the `AUTH_*` environment variables.
    ///
    /// Recognised variables: `AUTH_ISSUER_BASE_URL`, `AUTH_JWKS_PATH`,
    /// `AUTH_EXPECTED_ISSUER`, `AUTH_AUDIENCE`, `AUTH_CLOCK_SKEW_SECONDS`,
    /// `AUTH_FETCH_TIMEOUT_SECONDS` and `AUTH_MAX_REFRESH_ATTEMPTS`.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates a builder from an arbitrary key lookup, using the same keys as `from_env`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut builder = Self::new();
        if let Some(url) = get("AUTH_ISSUER_BASE_URL") {
            builder = builder.issuer_base_url(&url)?;
        }
        if let Some(path) = get("AUTH_JWKS_PATH") {
            builder = builder.jwks_path(path);
        }
        if let Some(issuer) = get("AUTH_EXPECTED_ISSUER") {
            builder = builder.expected_issuer(issuer);
        }
        if let Some(audience) = get("AUTH_AUDIENCE") {
            builder = builder.audience(audience);
        }
        if let Some(secs) = get("AUTH_CLOCK_SKEW_SECONDS") {
            let secs = parse_number("AUTH_CLOCK_SKEW_SECONDS", &secs)?;
            builder = builder.leeway(Duration::from_secs(secs));
        }
        if let Some(secs) = get("AUTH_FETCH_TIMEOUT_SECONDS") {
            let secs = parse_number("AUTH_FETCH_TIMEOUT_SECONDS", &secs)?;
            builder = builder.fetch_timeout(Duration::from_secs(secs));
        }
        if let Some(attempts) = get("AUTH_MAX_REFRESH_ATTEMPTS") {
            let attempts = parse_number("AUTH_MAX_REFRESH_ATTEMPTS", &attempts)?;
            let attempts = u32::try_from(attempts).map_err(|_| {
                AuthError::InvalidConfiguration(
                    "AUTH_MAX_REFRESH_ATTEMPTS is too large".to_string(),
                )
            })?;
            builder = builder.max_refresh_attempts(attempts);
        }
        Ok(builder)
    }

    /// Sets the base URL of the token issuer. This is a required field.
    ///
    /// # Arguments
    ///
    /// * `url` - The issuer base URL, e.g., "https://auth.example.com".
    pub fn issuer_base_url(mut self, url: &str) -> Result<Self, AuthError> {
        let url = url.trim();
        if !url.is_empty() {
            Url::parse(url).map_err(|e| AuthError::InvalidUrl(format!("{url}: {e}")))?;
        }
        self.issuer_base_url = Some(url.to_string());
        Ok(self)
    }

    /// Overrides the JWKS path. Defaults to `/api/auth/jwks`.
    pub fn jwks_path(mut self, path: impl Into<String>) -> Self {
        self.jwks_path = Some(path.into());
        self
    }

    /// Sets the value the `iss` claim must equal.
    /// Defaults to the issuer base URL without a trailing slash.
    pub fn expected_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.expected_issuer = Some(issuer.into());
        self
    }

    /// Enables audience validation against the given value.
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Sets the allowed signing algorithms.
    /// Defaults to every entry of `SUPPORTED_ALGORITHMS`.
    pub fn algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = Some(algorithms);
        self
    }

    /// Sets the clock skew tolerance. Defaults to zero, at most `MAX_LEEWAY`.
    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.leeway = Some(leeway);
        self
    }

    /// Sets the timeout for each JWKS request. Defaults to 10 seconds.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Sets how many key set refreshes one verification may trigger. Defaults to 1.
    pub fn max_refresh_attempts(mut self, attempts: u32) -> Self {
        self.max_refresh_attempts = Some(attempts);
        self
    }

    /// Consumes the builder and returns a `Config` object.
    ///
    /// # Errors
    ///
    /// Returns an error if `issuer_base_url` is missing or empty, if the
    /// resulting JWKS URL is invalid, if an algorithm outside
    /// `SUPPORTED_ALGORITHMS` is requested, or if the leeway exceeds `MAX_LEEWAY`.
    pub fn build(self) -> Result<Config, AuthError> {
        let base = self
            .issuer_base_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| AuthError::MissingConfiguration("issuer_base_url".to_string()))?;
        let issuer_base_url =
            Url::parse(&base).map_err(|e| AuthError::InvalidUrl(e.to_string()))?;

        let trimmed_base = base.trim_end_matches('/');
        let jwks_path = self.jwks_path.as_deref().unwrap_or(DEFAULT_JWKS_PATH);
        let jwks_url = join_jwks_url(trimmed_base, jwks_path)?;

        let algorithms = self.algorithms.unwrap_or_else(|| SUPPORTED_ALGORITHMS.to_vec());
        if algorithms.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "at least one algorithm must be allowed".to_string(),
            ));
        }
        if let Some(alg) = algorithms.iter().find(|alg| !SUPPORTED_ALGORITHMS.contains(alg)) {
            return Err(AuthError::InvalidConfiguration(format!(
                "algorithm {alg:?} is not supported"
            )));
        }

        let leeway = self.leeway.unwrap_or(Duration::ZERO);
        if leeway > MAX_LEEWAY {
            return Err(AuthError::InvalidConfiguration(format!(
                "clock skew of {}s exceeds the {}s maximum",
                leeway.as_secs(),
                MAX_LEEWAY.as_secs()
            )));
        }

        Ok(Config {
            issuer_base_url,
            jwks_url,
            fetch_timeout: self.fetch_timeout.unwrap_or(DEFAULT_FETCH_TIMEOUT),
            validation: ValidationDetails {
                expected_issuer: self.expected_issuer.unwrap_or_else(|| trimmed_base.to_string()),
                audience: self.audience,
                algorithms,
                leeway,
                max_refresh_attempts: self.max_refresh_attempts.unwrap_or(1),
            },
        })
    }
}

// Plain concatenation keeps any path prefix on the base URL, which `Url::join` would drop.
fn join_jwks_url(base: &str, path: &str) -> Result<Url, AuthError> {
    let path = path.trim();
    let url = if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    };
    Url::parse(&url).map_err(|e| AuthError::InvalidUrl(format!("{url}: {e}")))
}

fn parse_number(key: &str, value: &str) -> Result<u64, AuthError> {
    value.parse::<u64>().map_err(|_| {
        AuthError::InvalidConfiguration(format!(
            "{key} must be a non-negative integer, got '{value}'"
        ))
    })
}
