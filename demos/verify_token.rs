//! Verifies a single bearer token against a live issuer.
//!
//! ```text
//! AUTH_ISSUER_BASE_URL=http://localhost:3000 RUST_LOG=debug \
//!     cargo run --example verify_token -- "Bearer eyJhbGciOi..."
//! ```

use jwks_verifier::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ConfigBuilder::from_env()?.build()?;
    let verifier = TokenVerifier::new(config)?;
    verifier.initialize().await;

    println!("JWKS URL: {}", verifier.jwks_url());
    println!("Cached keys: {}", verifier.key_count().await);

    let header = std::env::args().nth(1).ok_or("usage: verify_token <token>")?;
    let token = extract_bearer_token(&header).ok_or(AuthError::MissingToken)?;

    let payload = verifier.verify(token).await?;
    let user = verifier.extract_user_info(&payload)?;

    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(())
}
