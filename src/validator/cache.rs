// src/validator/cache.rs

use super::fetcher::KeySetFetcher;
use super::model::{KeyEntry, SigningKeySet};
use crate::error::AuthError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// The `kid` → key lookup table built from one `SigningKeySet`.
pub type KeyIndex = HashMap<String, KeyEntry>;

/// A raw key set and its index, always built and swapped together.
struct Snapshot {
    key_set: Arc<SigningKeySet>,
    index: Arc<KeyIndex>,
}

impl Snapshot {
    fn new(key_set: SigningKeySet) -> Self {
        let index = key_set.index();
        Self {
            key_set: Arc::new(key_set),
            index: Arc::new(index),
        }
    }
}

/// An in-memory cache of the issuer's signing keys.
///
/// Filled lazily on first use and replaced wholesale by `refresh`. Cloning is
/// cheap and every clone shares the same state.
#[derive(Clone)]
pub struct KeySetCache {
    inner: Arc<Inner>,
}

struct Inner {
    fetcher: KeySetFetcher,
    current: RwLock<Option<Arc<Snapshot>>>,
    // Serialises the lazy fill of an empty cache so a burst of first requests fetches once.
    fill_gate: Mutex<()>,
}

impl KeySetCache {
    pub fn new(fetcher: KeySetFetcher) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                current: RwLock::new(None),
                fill_gate: Mutex::new(()),
            }),
        }
    }

    /// Returns the key index, fetching the key set first if the cache is empty.
    ///
    /// A populated cache is served without any network call.
    pub async fn get_keys(&self) -> Result<Arc<KeyIndex>, AuthError> {
        Ok(self.snapshot_or_fill().await?.index.clone())
    }

    /// Returns the unprocessed key set, with the same lazy-fetch behaviour as `get_keys`.
    pub async fn get_raw_key_set(&self) -> Result<Arc<SigningKeySet>, AuthError> {
        Ok(self.snapshot_or_fill().await?.key_set.clone())
    }

    /// Fetches the key set unconditionally and swaps it in.
    ///
    /// Returns the index this call installed, which a concurrent refresh may
    /// already have replaced in the cache. On failure the previous contents
    /// stay in place and the error is returned.
    #[instrument(skip(self), err)]
    pub async fn refresh(&self) -> Result<Arc<KeyIndex>, AuthError> {
        Ok(self.fetch_and_swap().await?.index.clone())
    }

    /// Populates the cache at startup.
    ///
    /// Never fails: an unreachable issuer is logged and the cache fills itself
    /// on the first verification instead.
    pub async fn initialize(&self) {
        match self.refresh().await {
            Ok(keys) => info!("JWKS cache initialized with {} keys", keys.len()),
            Err(e) => warn!(
                "Could not load JWKS from {} at startup, will retry on first use: {}",
                self.jwks_url(),
                e
            ),
        }
    }

    /// Number of keys currently cached.
    pub async fn key_count(&self) -> usize {
        self.inner.current.read().await.as_ref().map_or(0, |s| s.index.len())
    }

    /// Time of the last successful fetch, if any.
    pub async fn last_fetched_at(&self) -> Option<SystemTime> {
        self.inner.current.read().await.as_ref().map(|s| s.key_set.fetched_at())
    }

    /// The fully-qualified JWKS URL in use.
    pub fn jwks_url(&self) -> &Url {
        self.inner.fetcher.jwks_url()
    }

    async fn current(&self) -> Option<Arc<Snapshot>> {
        self.inner.current.read().await.clone()
    }

    async fn snapshot_or_fill(&self) -> Result<Arc<Snapshot>, AuthError> {
        if let Some(snapshot) = self.current().await {
            debug!("JWKS cache hit");
            return Ok(snapshot);
        }

        let _gate = self.inner.fill_gate.lock().await;
        // Another caller may have filled the cache while we waited.
        if let Some(snapshot) = self.current().await {
            return Ok(snapshot);
        }

        debug!("JWKS cache empty. Fetching from issuer.");
        self.fetch_and_swap().await
    }

    async fn fetch_and_swap(&self) -> Result<Arc<Snapshot>, AuthError> {
        let key_set = self.inner.fetcher.fetch().await?;
        let snapshot = Arc::new(Snapshot::new(key_set));

        *self.inner.current.write().await = Some(snapshot.clone());
        info!("JWKS cache refreshed with {} keys", snapshot.index.len());

        Ok(snapshot)
    }
}
