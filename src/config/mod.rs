//! Configuration management.
//!
//! Two things are configurable: where snapshots live on disk, and how the
//! three cache tiers are sized. Both resolve from an explicit value first,
//! then `OSTORE_*` environment variables, then built-in defaults.

use crate::cache::{CacheConfig, CacheTiers};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "OSTORE_DATA_DIR";

const SHORT_TTL_ENV: &str = "OSTORE_CACHE_SHORT_TTL_SECS";
const DEFAULT_TTL_ENV: &str = "OSTORE_CACHE_DEFAULT_TTL_SECS";
const LONG_TTL_ENV: &str = "OSTORE_CACHE_LONG_TTL_SECS";
const MAX_SIZE_ENV: &str = "OSTORE_CACHE_MAX_SIZE";
const STATS_ENV: &str = "OSTORE_CACHE_STATS";

/// Global store directory, `~/.organizer-store/`.
#[must_use]
pub fn global_store_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".organizer-store"))
}

/// Resolve the directory snapshots are written to.
///
/// Priority:
/// 1. `explicit` (the `--data-dir` flag)
/// 2. `OSTORE_DATA_DIR`
/// 3. `~/.organizer-store/data`
#[must_use]
pub fn resolve_data_dir(explicit: Option<&Path>) -> Option<PathBuf> {
    resolve_data_dir_with(explicit, std::env::var(DATA_DIR_ENV).ok())
}

fn resolve_data_dir_with(explicit: Option<&Path>, env: Option<String>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Some(dir) = env.filter(|d| !d.trim().is_empty()) {
        return Some(PathBuf::from(dir));
    }

    global_store_dir().map(|dir| dir.join("data"))
}

/// Sizing for the short/default/long cache tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub short_ttl: Duration,
    pub default_ttl: Duration,
    pub long_ttl: Duration,
    pub max_size: usize,
    pub enable_stats: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            short_ttl: Duration::from_secs(30),
            default_ttl: Duration::from_secs(5 * 60),
            long_ttl: Duration::from_secs(30 * 60),
            max_size: 500,
            enable_stats: false,
        }
    }
}

impl CacheSettings {
    /// Defaults overridden by any `OSTORE_CACHE_*` variables that are set.
    ///
    /// # Errors
    ///
    /// Returns a config error if a variable is set but does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`CacheSettings::from_env`] with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns a config error if a present value does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(secs) = parse_var::<u64>(&lookup, SHORT_TTL_ENV)? {
            settings.short_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, DEFAULT_TTL_ENV)? {
            settings.default_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, LONG_TTL_ENV)? {
            settings.long_ttl = Duration::from_secs(secs);
        }
        if let Some(size) = parse_var::<usize>(&lookup, MAX_SIZE_ENV)? {
            if size == 0 {
                return Err(Error::Config(format!("{MAX_SIZE_ENV} must be positive")));
            }
            settings.max_size = size;
        }
        if let Some(raw) = lookup(STATS_ENV) {
            settings.enable_stats = !matches!(raw.trim().to_lowercase().as_str(), "" | "0" | "false");
        }

        Ok(settings)
    }

    fn tier(&self, ttl: Duration) -> CacheConfig {
        CacheConfig {
            default_ttl: ttl,
            max_size: self.max_size,
            enable_stats: self.enable_stats,
        }
    }

    /// Build the three cache instances.
    #[must_use]
    pub fn build_tiers<V: Clone>(&self) -> CacheTiers<V> {
        CacheTiers::new(
            self.tier(self.short_ttl),
            self.tier(self.default_ttl),
            self.tier(self.long_ttl),
        )
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name}: cannot parse {raw:?}"))),
    }
}
