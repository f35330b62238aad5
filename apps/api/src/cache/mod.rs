//! Content-addressed result cache.
//!
//! Identical inputs map to identical keys (see [`hashing`]), so expensive
//! model calls run once per distinct input. The cache is an optimization
//! only: any storage error is logged and the request proceeds as if the
//! cache did not exist. There is no TTL and no request coalescing; two
//! concurrent misses both compute and the later write wins.

pub mod hashing;
pub mod postgres;
pub mod store;

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use hashing::CacheKey;
use store::CacheStore;

/// A value plus whether it was served from the cache. Handlers surface the
/// flag so callers can tell a fresh computation from a replay.
#[derive(Debug)]
pub struct CachedResult<T> {
    pub value: T,
    pub cached: bool,
}

pub struct CacheGate {
    store: Arc<dyn CacheStore>,
}

impl CacheGate {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Serves `key` from the cache or runs `compute` and stores the result.
    ///
    /// `bypass` skips the lookup but not the write, so a forced recompute
    /// refreshes the entry for later callers. Compute errors propagate
    /// untouched and nothing is stored for them.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        bypass: bool,
        compute: F,
    ) -> Result<CachedResult<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !bypass {
            match self.store.fetch(key).await {
                Ok(Some(payload)) => match serde_json::from_value::<T>(payload) {
                    Ok(value) => {
                        debug!(%key, "cache hit");
                        return Ok(CachedResult {
                            value,
                            cached: true,
                        });
                    }
                    Err(err) => {
                        warn!(%key, %err, "cached payload failed to decode, recomputing");
                    }
                },
                Ok(None) => {}
                Err(err) => {
                    warn!(%key, %err, "cache lookup failed, computing without cache");
                }
            }
        }

        let value = compute().await?;

        match serde_json::to_value(&value) {
            Ok(payload) => {
                if let Err(err) = self.store.put(key, &payload).await {
                    warn!(%key, %err, "cache write failed, serving uncached result");
                }
            }
            Err(err) => warn!(%key, %err, "result not serializable for caching"),
        }
        Ok(CachedResult {
            value,
            cached: false,
        })
    }
}
