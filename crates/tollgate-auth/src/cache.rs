//! Bounded, expiring cache of registered clients.
//!
//! Sits in front of [`crate::CredentialStore::find_client`] so that token
//! issuance does not hit storage on every request.
//!
//! ## Expiry
//!
//! Entries expire `ttl` after they were set. A lookup of an expired entry is a
//! miss but leaves the entry in place; a background sweep running every
//! `max(ttl / 2, 60s)` removes expired entries whether or not they are read.
//!
//! ## Eviction
//!
//! When the cache is full and a new key is set, the entry that was set
//! earliest is evicted. Reads do not refresh an entry's position, so this is
//! insertion-order eviction rather than LRU.
//!
//! ## Statistics
//!
//! Hit, miss and eviction counters are atomics updated outside the map lock.
//! A [`CacheStats`] snapshot may be marginally stale relative to the map.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::config::ClientCacheConfig;
use crate::types::Client;
use crate::{AuthError, AuthResult};

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of entries currently in the cache.
    pub size: usize,
    /// Configured capacity.
    pub max_size: usize,
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, including lookups of expired entries.
    pub misses: u64,
    /// Number of entries removed by capacity eviction or the expiry sweep.
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate as a percentage.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

struct CachedClient {
    client: Arc<Client>,
    created_at: OffsetDateTime,
    expires_at: OffsetDateTime,
    /// Insertion sequence; orders entries that share a `created_at`.
    seq: u64,
}

struct CacheInner {
    entries: RwLock<HashMap<String, CachedClient>>,
    ttl: Duration,
    max_size: usize,
    clock: Arc<dyn Clock>,
    next_seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheInner {
    fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;

        self.entries.write().retain(|_, entry| {
            if entry.expires_at <= now {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }
}

/// Local in-memory client cache.
///
/// Creating a cache spawns its expiry sweep on the current tokio runtime;
/// call [`ClientCache::stop`] exactly once to end it.
pub struct ClientCache {
    inner: Arc<CacheInner>,
    cancel: CancellationToken,
    stopped: AtomicBool,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ClientCache {
    /// Creates a cache that reads the wall clock.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new(config: &ClientCacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a cache that reads timestamps from `clock`.
    ///
    /// The sweep itself is scheduled on tokio time; `clock` only decides which
    /// entries it considers expired.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn with_clock(config: &ClientCacheConfig, clock: Arc<dyn Clock>) -> Self {
        let inner = Arc::new(CacheInner {
            entries: RwLock::new(HashMap::new()),
            ttl: config.ttl,
            max_size: config.max_size,
            clock,
            next_seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        });
        let cancel = CancellationToken::new();
        let sweeper = spawn_sweeper(Arc::clone(&inner), config.sweep_interval(), cancel.clone());

        Self {
            inner,
            cancel,
            stopped: AtomicBool::new(false),
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Returns the client cached under `client_id`, unless absent or expired.
    pub fn get(&self, client_id: &str) -> Option<Arc<Client>> {
        let now = self.inner.clock.now();
        let found = self
            .inner
            .entries
            .read()
            .get(client_id)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| Arc::clone(&entry.client));

        match found {
            Some(client) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                Some(client)
            }
            None => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores `client` under `client_id` with fresh timestamps.
    ///
    /// Returns `false` without storing when `client_id` or the client's own
    /// identifier is empty, or when the TTL overflows the expiry timestamp.
    /// At capacity, a new key evicts the earliest-set entry first.
    pub fn set(&self, client_id: &str, client: Client) -> bool {
        if client_id.is_empty() || client.client_id.is_empty() {
            tracing::debug!(client_id, "Refusing to cache client without identifier");
            return false;
        }

        let now = self.inner.clock.now();
        let Some(expires_at) = time::Duration::try_from(self.inner.ttl)
            .ok()
            .and_then(|ttl| now.checked_add(ttl))
        else {
            tracing::warn!(client_id, "Cache TTL out of range, not caching");
            return false;
        };
        let entry = CachedClient {
            client: Arc::new(client),
            created_at: now,
            expires_at,
            seq: self.inner.next_seq.fetch_add(1, Ordering::Relaxed),
        };

        let evicted = {
            let mut entries = self.inner.entries.write();
            let evicted = if entries.len() >= self.inner.max_size && !entries.contains_key(client_id)
            {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| (e.created_at, e.seq))
                    .map(|(key, _)| key.clone());
                oldest.and_then(|key| entries.remove(&key).map(|_| key))
            } else {
                None
            };
            entries.insert(client_id.to_string(), entry);
            evicted
        };

        if let Some(key) = evicted {
            self.inner.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(evicted = %key, "Client cache full, evicted oldest entry");
        }
        true
    }

    /// Removes one entry. No-op if absent.
    pub fn invalidate(&self, client_id: &str) {
        self.inner.entries.write().remove(client_id);
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.inner.entries.write().clear();
    }

    /// Removes expired entries now. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        self.inner.sweep_expired()
    }

    /// Returns the number of entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Returns `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a point-in-time statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            max_size: self.inner.max_size,
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            evictions: self.inner.evictions.load(Ordering::Relaxed),
        }
    }

    /// Stops the background sweep and waits for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::AlreadyStopped`] on a second call.
    pub async fn stop(&self) -> AuthResult<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Err(AuthError::AlreadyStopped {
                component: "client cache",
            });
        }

        self.cancel.cancel();
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "Client cache sweeper ended abnormally");
        }
        tracing::debug!("Client cache stopped");
        Ok(())
    }
}

impl Drop for ClientCache {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCache")
            .field("ttl", &self.inner.ttl)
            .field("stats", &self.stats())
            .finish()
    }
}

fn spawn_sweeper(
    inner: Arc<CacheInner>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = inner.sweep_expired();
                    if removed > 0 {
                        tracing::debug!(removed, "Swept expired client cache entries");
                    }
                }
                () = cancel.cancelled() => break,
            }
        }
    })
}
