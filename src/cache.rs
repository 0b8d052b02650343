//! Process-local response cache with a provider rate-limit flag.
//!
//! Entries are valid while `now - stored_at < timeout`. Stale entries are not
//! evicted, only ignored until the next `put` for the same key overwrites them.
//!
//! The rate-limit flag carries its own reset time and clears itself once that
//! time has passed, so a tripped flag can never wedge the screener for the
//! lifetime of the process. `clear_rate_limit` resets it early.

use crate::models::fundamental::FundamentalData;
use crate::models::stock::Bar;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Series(Vec<Bar>),
    Fundamentals(FundamentalData),
    Symbols(Vec<String>),
}

/// Cache contract shared by every fetch path.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<CachedValue>;
    fn put(&self, key: &str, value: CachedValue);
    fn is_rate_limited(&self) -> bool;
    fn trip_rate_limit(&self, cooldown: Duration);
    fn clear_rate_limit(&self);
}

struct CacheEntry {
    value: CachedValue,
    stored_at: Instant,
}

pub struct RateLimitedCache {
    timeout: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    rate_limit_reset: Mutex<Option<Instant>>,
}

impl RateLimitedCache {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(3600))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            entries: Mutex::new(HashMap::new()),
            rate_limit_reset: Mutex::new(None),
        }
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Time left before the rate-limit flag clears, if tripped.
    pub fn rate_limit_remaining(&self) -> Option<Duration> {
        let reset = self.rate_limit_reset.lock().ok()?;
        (*reset)
            .and_then(|at| at.checked_duration_since(Instant::now()))
            .filter(|left| !left.is_zero())
    }
}

impl Default for RateLimitedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache for RateLimitedCache {
    fn get(&self, key: &str) -> Option<CachedValue> {
        let entries = self.entries.lock().ok()?;
        let entry = entries.get(key)?;
        if entry.stored_at.elapsed() < self.timeout {
            debug!("cache hit: {}", key);
            Some(entry.value.clone())
        } else {
            None
        }
    }

    fn put(&self, key: &str, value: CachedValue) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key.to_string(),
                CacheEntry {
                    value,
                    stored_at: Instant::now(),
                },
            );
        }
    }

    fn is_rate_limited(&self) -> bool {
        let mut reset = match self.rate_limit_reset.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        match *reset {
            Some(at) if Instant::now() < at => true,
            Some(_) => {
                debug!("rate limit cooldown elapsed, resuming upstream calls");
                *reset = None;
                false
            }
            None => false,
        }
    }

    fn trip_rate_limit(&self, cooldown: Duration) {
        if let Ok(mut reset) = self.rate_limit_reset.lock() {
            warn!("Provider rate limit hit, suspending upstream calls for {:?}", cooldown);
            *reset = Some(Instant::now() + cooldown);
        }
    }

    fn clear_rate_limit(&self) {
        if let Ok(mut reset) = self.rate_limit_reset.lock() {
            *reset = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(names: &[&str]) -> CachedValue {
        CachedValue::Symbols(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_put_then_get() {
        let cache = RateLimitedCache::new();
        cache.put("movers_gainers", symbols(&["AAPL", "MSFT"]));

        assert_eq!(cache.get("movers_gainers"), Some(symbols(&["AAPL", "MSFT"])));
        assert_eq!(cache.get("movers_losers"), None);
    }

    #[test]
    fn test_stale_entry_is_a_miss_but_kept() {
        let cache = RateLimitedCache::with_timeout(Duration::ZERO);
        cache.put("k", symbols(&["AAPL"]));

        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_put_overwrites() {
        let cache = RateLimitedCache::new();
        cache.put("k", symbols(&["AAPL"]));
        cache.put("k", symbols(&["NVDA"]));

        assert_eq!(cache.get("k"), Some(symbols(&["NVDA"])));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_rate_limit_trips_and_clears() {
        let cache = RateLimitedCache::new();
        assert!(!cache.is_rate_limited());

        cache.trip_rate_limit(Duration::from_secs(60));
        assert!(cache.is_rate_limited());
        assert!(cache.rate_limit_remaining().is_some());

        cache.clear_rate_limit();
        assert!(!cache.is_rate_limited());
    }

    #[test]
    fn test_rate_limit_expires_on_its_own() {
        let cache = RateLimitedCache::new();
        cache.trip_rate_limit(Duration::ZERO);

        assert!(!cache.is_rate_limited());
        assert_eq!(cache.rate_limit_remaining(), None);
    }

    #[test]
    fn test_rate_limit_does_not_touch_entries() {
        let cache = RateLimitedCache::new();
        cache.put("k", symbols(&["AAPL"]));
        cache.trip_rate_limit(Duration::from_secs(60));

        assert!(cache.get("k").is_some());
    }
}
