//! Sync result cache
//!
//! Process-local, TTL-bounded memo of recent lazy-sync outcomes so the sync
//! path can run on every request. Entries are bound to an owner (the provider
//! user id) and carry an HMAC-SHA256 tag over the serialised value and owner.
//!
//! Every failure mode degrades to a miss: wrong owner, expired entry, tag
//! mismatch (the entry is evicted), poisoned lock, serialisation failure.
//! A miss only costs an extra provider round trip.
//!
//! Single-node only; nothing is shared between processes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::SyncCacheConfig;

type HmacSha256 = Hmac<Sha256>;

/// Internal cache faults. Logged, never returned to callers.
#[derive(Debug, Error)]
enum CacheFault {
    #[error("integrity violation for key {0}")]
    IntegrityViolation(String),

    #[error("cache lock poisoned")]
    Poisoned,

    #[error("failed to serialise cache value: {0}")]
    Serialization(String),
}

struct CacheEntry<V> {
    value: V,
    owner: String,
    stored_at: Instant,
    ttl: Duration,
    tag: Vec<u8>,
    generation: u64,
}

type EntryMap<V> = HashMap<String, CacheEntry<V>>;

pub struct SyncCache<V> {
    entries: Arc<RwLock<EntryMap<V>>>,
    secret: Vec<u8>,
    default_ttl: Duration,
    enabled: bool,
    generation: AtomicU64,
}

impl<V> SyncCache<V>
where
    V: Serialize + Clone + Send + Sync + 'static,
{
    pub fn new(config: &SyncCacheConfig) -> Self {
        let secret = match config.secret.as_deref() {
            Some(secret) if !secret.is_empty() => secret.as_bytes().to_vec(),
            _ => {
                let mut bytes = vec![0u8; 32];
                rand::thread_rng().fill_bytes(&mut bytes);
                bytes
            }
        };

        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            secret,
            default_ttl: Duration::from_secs(config.ttl_secs),
            enabled: config.enabled,
            generation: AtomicU64::new(0),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn tag(&self, value: &V, owner: &str) -> Result<HmacSha256, CacheFault> {
        let payload =
            serde_json::to_vec(value).map_err(|e| CacheFault::Serialization(e.to_string()))?;

        // HMAC accepts keys of any length
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| CacheFault::Serialization(e.to_string()))?;
        mac.update(&payload);
        mac.update(&[0u8]);
        mac.update(owner.as_bytes());
        Ok(mac)
    }

    /// Store `value` under `key` for `owner`; `ttl` defaults to the configured TTL
    pub fn set(&self, key: &str, value: V, owner: &str, ttl: Option<Duration>) {
        if !self.enabled {
            return;
        }

        let ttl = ttl.unwrap_or(self.default_ttl);
        let tag = match self.tag(&value, owner) {
            Ok(mac) => mac.finalize().into_bytes().to_vec(),
            Err(fault) => {
                warn!(key = key, error = %fault, "Sync cache write skipped");
                return;
            }
        };
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        {
            let Ok(mut entries) = self.entries.write() else {
                warn!(key = key, error = %CacheFault::Poisoned, "Sync cache write skipped");
                return;
            };
            entries.insert(
                key.to_string(),
                CacheEntry {
                    value,
                    owner: owner.to_string(),
                    stored_at: Instant::now(),
                    ttl,
                    tag,
                    generation,
                },
            );
        }

        self.schedule_eviction(key.to_string(), generation, ttl);
    }

    /// Drop the entry after `ttl` unless it was overwritten in the meantime.
    /// Without a runtime, expiry is only enforced on read.
    fn schedule_eviction(&self, key: String, generation: u64, ttl: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let entries = Arc::downgrade(&self.entries);

        handle.spawn(async move {
            tokio::time::sleep(ttl).await;
            let Some(entries) = entries.upgrade() else {
                return;
            };
            if let Ok(mut map) = entries.write() {
                if map.get(&key).is_some_and(|e| e.generation == generation) {
                    map.remove(&key);
                }
            };
        });
    }

    /// Read an entry for `owner`, optionally rejecting entries older than `max_age`
    pub fn get(&self, key: &str, owner: &str, max_age: Option<Duration>) -> Option<V> {
        if !self.enabled {
            return None;
        }

        let outcome = {
            let entries = match self.entries.read() {
                Ok(entries) => entries,
                Err(_) => {
                    warn!(key = key, error = %CacheFault::Poisoned, "Sync cache read treated as miss");
                    return None;
                }
            };
            let entry = entries.get(key)?;

            if entry.owner != owner {
                debug!(key = key, "Sync cache owner mismatch");
                return None;
            }

            let age = entry.stored_at.elapsed();
            if age > entry.ttl {
                Lookup::Expired
            } else if max_age.is_some_and(|max| age > max) {
                return None;
            } else {
                match self.tag(&entry.value, owner) {
                    Ok(mac) => match mac.verify_slice(&entry.tag) {
                        Ok(()) => Lookup::Hit(entry.value.clone()),
                        Err(_) => Lookup::Tampered,
                    },
                    Err(fault) => {
                        warn!(key = key, error = %fault, "Sync cache read treated as miss");
                        return None;
                    }
                }
            }
        };

        match outcome {
            Lookup::Hit(value) => Some(value),
            Lookup::Expired => {
                self.remove(key);
                None
            }
            Lookup::Tampered => {
                error!(
                    key = key,
                    error = %CacheFault::IntegrityViolation(key.to_string()),
                    "Sync cache entry failed integrity check; evicting"
                );
                self.remove(key);
                None
            }
        }
    }

    /// Remove `key`; when `owner` is given only that owner's entry is removed
    pub fn invalidate(&self, key: &str, owner: Option<&str>) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };
        match owner {
            Some(owner) if entries.get(key).is_some_and(|e| e.owner != owner) => false,
            _ => entries.remove(key).is_some(),
        }
    }

    /// Remove every entry held for `owner`
    pub fn invalidate_owner(&self, owner: &str) -> usize {
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, e| e.owner != owner);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }

    #[cfg(test)]
    fn tamper(&self, key: &str, f: impl FnOnce(&mut V)) {
        let mut entries = self.entries.write().unwrap();
        f(&mut entries.get_mut(key).unwrap().value);
    }

    #[cfg(test)]
    fn retag_owner(&self, key: &str, owner: &str) {
        let mut entries = self.entries.write().unwrap();
        entries.get_mut(key).unwrap().owner = owner.to_string();
    }
}

enum Lookup<V> {
    Hit(V),
    Expired,
    Tampered,
}
