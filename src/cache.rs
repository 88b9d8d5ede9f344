//! TTL + approximate-LRU read cache.
//!
//! Entries expire lazily: a read past `expires_at` removes the entry and
//! reports a miss. When a write finds the cache full, expired entries are
//! purged first, then the least-read oldest tenth is evicted.
//!
//! Misses on the same key are single-flight: concurrent `get_or_set` callers
//! wait for the first one's computation instead of repeating it. A compute
//! function must not call `get_or_set` for its own key.
//!
//! The cache never returns errors. Absence is `None`.

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

const DEFAULT_TTL_SECS: u64 = 5 * 60;
const DEFAULT_MAX_SIZE: usize = 500;

/// Fraction of the capacity evicted when expiry alone frees nothing.
const EVICTION_DIVISOR: usize = 10;

/// Longest TTL honored; larger values are clamped so expiry stays representable.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub default_ttl: Duration,
    pub max_size: usize,
    pub enable_stats: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            max_size: DEFAULT_MAX_SIZE,
            enable_stats: false,
        }
    }
}

/// Counters reported by [`Cache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
    created_at: Instant,
    hits: u64,
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

type FlightMap<L> = Mutex<HashMap<String, Arc<L>>>;

pub struct Cache<V> {
    config: CacheConfig,
    inner: Mutex<Inner<V>>,
    flights: FlightMap<Mutex<()>>,
    async_flights: FlightMap<tokio::sync::Mutex<()>>,
}

fn relock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn flight_for<L: Default>(map: &FlightMap<L>, key: &str) -> Arc<L> {
    Arc::clone(relock(map).entry(key.to_string()).or_default())
}

/// Drops a key's flight entry when the computing caller leaves, on any path.
struct FlightCleanup<'a, L> {
    map: &'a FlightMap<L>,
    key: &'a str,
}

impl<L> Drop for FlightCleanup<'_, L> {
    fn drop(&mut self) {
        relock(self.map).remove(self.key);
    }
}

/// Compile a `*` glob into an anchored regex. Everything else is literal.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$")).ok()
}

impl<V: Clone> Cache<V> {
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            flights: Mutex::new(HashMap::new()),
            async_flights: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Store `value`; `ttl` defaults to the cache-wide TTL.
    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        self.set_at(key, value, ttl, Instant::now());
    }

    pub fn has(&self, key: &str) -> bool {
        self.has_at(key, Instant::now())
    }

    /// Returns whether the key was present.
    pub fn delete(&self, key: &str) -> bool {
        relock(&self.inner).entries.remove(key).is_some()
    }

    /// Remove every key matching a `*` glob, returning how many went.
    pub fn delete_pattern(&self, pattern: &str) -> usize {
        let Some(re) = glob_to_regex(pattern) else {
            return 0;
        };
        let mut inner = relock(&self.inner);
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !re.is_match(key));
        let removed = before - inner.entries.len();
        debug!(pattern, removed, "Cache pattern delete");
        removed
    }

    /// Drop all entries and reset counters.
    pub fn clear(&self) {
        let mut inner = relock(&self.inner);
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
    }

    /// Number of stored entries, expired ones included until touched.
    pub fn len(&self) -> usize {
        relock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove expired entries now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = relock(&self.inner);
        let before = inner.entries.len();
        inner.entries.retain(|_, e| now < e.expires_at);
        before - inner.entries.len()
    }

    /// Counters, when enabled in the config.
    pub fn stats(&self) -> Option<CacheStats> {
        if !self.config.enable_stats {
            return None;
        }
        let inner = relock(&self.inner);
        let total = inner.hits + inner.misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total == 0 {
            0.0
        } else {
            inner.hits as f64 / total as f64
        };
        Some(CacheStats {
            size: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            hit_rate,
        })
    }

    /// Read-through: return the cached value or compute, store and return it.
    pub fn get_or_set<F>(&self, key: &str, compute: F, ttl: Option<Duration>) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(v) = self.get(key) {
            return v;
        }

        let flight = flight_for(&self.flights, key);
        let _cleanup = FlightCleanup { map: &self.flights, key };
        let _guard = relock(&*flight);
        if let Some(v) = self.peek(key) {
            return v;
        }

        let value = compute();
        self.set(key, value.clone(), ttl);
        value
    }

    /// Like [`Cache::get_or_set`] for fallible computations. Errors are
    /// returned to the caller and nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns whatever `compute` returns.
    pub fn try_get_or_set<F, E>(&self, key: &str, compute: F, ttl: Option<Duration>) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(v) = self.get(key) {
            return Ok(v);
        }

        let flight = flight_for(&self.flights, key);
        let _cleanup = FlightCleanup { map: &self.flights, key };
        let _guard = relock(&*flight);
        if let Some(v) = self.peek(key) {
            return Ok(v);
        }

        let result = compute();
        if let Ok(value) = &result {
            self.set(key, value.clone(), ttl);
        }
        result
    }

    /// Async read-through. Concurrent misses on one key await a single
    /// computation.
    pub async fn get_or_set_async<F, Fut>(&self, key: &str, compute: F, ttl: Option<Duration>) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(v) = self.get(key) {
            return v;
        }

        let flight = flight_for(&self.async_flights, key);
        let _cleanup = FlightCleanup {
            map: &self.async_flights,
            key,
        };
        let _guard = flight.lock().await;
        if let Some(v) = self.peek(key) {
            return v;
        }

        let value = compute().await;
        self.set(key, value.clone(), ttl);
        value
    }

    /// Lookup that neither counts toward stats nor bumps the entry's hits.
    fn peek(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        relock(&self.inner)
            .entries
            .get(key)
            .filter(|e| now < e.expires_at)
            .map(|e| e.value.clone())
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let stats = self.config.enable_stats;
        let mut guard = relock(&self.inner);
        let inner = &mut *guard;

        let fresh = inner.entries.get(key).map(|e| now < e.expires_at);
        if fresh != Some(true) {
            if fresh.is_some() {
                inner.entries.remove(key);
            }
            if stats {
                inner.misses += 1;
            }
            return None;
        }

        let entry = inner.entries.get_mut(key)?;
        entry.hits += 1;
        if stats {
            inner.hits += 1;
        }
        Some(entry.value.clone())
    }

    fn set_at(&self, key: &str, value: V, ttl: Option<Duration>, now: Instant) {
        let ttl = ttl.unwrap_or(self.config.default_ttl).min(MAX_TTL);
        let expires_at = now.checked_add(ttl).unwrap_or(now);
        let mut inner = relock(&self.inner);

        if inner.entries.len() >= self.config.max_size && !inner.entries.contains_key(key) {
            self.cleanup(&mut inner, now);
        }

        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at,
                created_at: now,
                hits: 0,
            },
        );
    }

    fn has_at(&self, key: &str, now: Instant) -> bool {
        let mut inner = relock(&self.inner);
        match inner.entries.get(key) {
            Some(entry) if now < entry.expires_at => true,
            Some(_) => {
                inner.entries.remove(key);
                false
            }
            None => false,
        }
    }

    fn cleanup(&self, inner: &mut Inner<V>, now: Instant) {
        let before = inner.entries.len();
        inner.entries.retain(|_, e| now < e.expires_at);
        let expired = before - inner.entries.len();

        let mut evicted = 0;
        if inner.entries.len() >= self.config.max_size {
            let count = (self.config.max_size / EVICTION_DIVISOR).max(1);
            let mut ranked: Vec<(u64, Instant, String)> = inner
                .entries
                .iter()
                .map(|(k, e)| (e.hits, e.created_at, k.clone()))
                .collect();
            ranked.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

            for (_, _, key) in ranked.into_iter().take(count) {
                inner.entries.remove(&key);
                evicted += 1;
            }
            if self.config.enable_stats {
                inner.evictions += evicted as u64;
            }
        }

        debug!(expired, evicted, size = inner.entries.len(), "Cache cleanup");
    }
}

impl<V> std::fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Three caches with different staleness tolerances.
#[derive(Debug)]
pub struct CacheTiers<V> {
    pub short: Cache<V>,
    pub default: Cache<V>,
    pub long: Cache<V>,
}

impl<V: Clone> CacheTiers<V> {
    #[must_use]
    pub fn new(short: CacheConfig, default: CacheConfig, long: CacheConfig) -> Self {
        Self {
            short: Cache::new(short),
            default: Cache::new(default),
            long: Cache::new(long),
        }
    }

    pub fn clear_all(&self) {
        self.short.clear();
        self.default.clear();
        self.long.clear();
    }

    /// Apply a pattern delete to every tier. Returns the total removed.
    pub fn delete_pattern(&self, pattern: &str) -> usize {
        self.short.delete_pattern(pattern)
            + self.default.delete_pattern(pattern)
            + self.long.delete_pattern(pattern)
    }
}

/// Memoize `f` in `cache`, keyed by `key_fn` applied to the argument.
pub fn cached<'c, A, V, K, F>(
    cache: &'c Cache<V>,
    key_fn: K,
    f: F,
    ttl: Option<Duration>,
) -> impl Fn(A) -> V + 'c
where
    V: Clone,
    K: Fn(&A) -> String + 'c,
    F: Fn(A) -> V + 'c,
{
    move |arg| {
        let key = key_fn(&arg);
        cache.get_or_set(&key, || f(arg), ttl)
    }
}

/// Async counterpart of [`cached`]; call through [`AsyncMemo::call`].
pub fn cached_async<V, K, F>(
    cache: &Cache<V>,
    key_fn: K,
    f: F,
    ttl: Option<Duration>,
) -> AsyncMemo<'_, V, K, F> {
    AsyncMemo {
        cache,
        key_fn,
        f,
        ttl,
    }
}

pub struct AsyncMemo<'c, V, K, F> {
    cache: &'c Cache<V>,
    key_fn: K,
    f: F,
    ttl: Option<Duration>,
}

impl<V: Clone, K, F> AsyncMemo<'_, V, K, F> {
    pub async fn call<A, Fut>(&self, arg: A) -> V
    where
        K: Fn(&A) -> String,
        F: Fn(A) -> Fut,
        Fut: Future<Output = V>,
    {
        let key = (self.key_fn)(&arg);
        self.cache
            .get_or_set_async(&key, || (self.f)(arg), self.ttl)
            .await
    }
}
