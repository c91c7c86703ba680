//! Cache configuration.
//!
//! TTL defaults per resource class and the store capacity, loaded from the
//! `[cache]` table of `reword.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

use super::keys::TtlClass;

// Statistics change with every generation; lists change only on explicit writes.
const DEFAULT_VOLATILE_TTL_SECS: u64 = 5 * 60;
const DEFAULT_LIST_TTL_SECS: u64 = 30 * 60;
const DEFAULT_MAX_ENTRIES: usize = 512;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL (seconds) for usage statistics, feature limits and template listings.
    pub volatile_ttl_secs: u64,
    /// TTL (seconds) for saved content and generation history.
    pub list_ttl_secs: u64,
    /// Maximum number of entries kept before the least recently used is dropped.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            volatile_ttl_secs: DEFAULT_VOLATILE_TTL_SECS,
            list_ttl_secs: DEFAULT_LIST_TTL_SECS,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            volatile_ttl_secs: settings.volatile_ttl.as_secs(),
            list_ttl_secs: settings.list_ttl.as_secs(),
            max_entries: settings.max_entries.get(),
        }
    }
}

impl CacheConfig {
    pub fn ttl_for(&self, class: TtlClass) -> Duration {
        match class {
            TtlClass::Volatile => Duration::from_secs(self.volatile_ttl_secs),
            TtlClass::List => Duration::from_secs(self.list_ttl_secs),
        }
    }

    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}
