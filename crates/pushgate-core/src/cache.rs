//! Shared cache contract.
//!
//! The remote session tier stores its records through [`CacheManager`]. A
//! production deployment backs this with a clustered cache; [`MemoryCache`]
//! serves single-node runs and tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, mapref::entry::Entry as MapEntry};
use tokio::time::Instant;

use crate::error::CacheError;

/// Key-value cache shared by all gateway nodes.
///
/// Keys are strings, values opaque bytes. `swap` must be atomic per key:
/// two concurrent swaps on the same key each observe a distinct previous
/// value.
#[async_trait]
pub trait CacheManager: Send + Sync {
    /// Store `value` under `key`, expiring after `ttl` when given.
    async fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Current live value under `key`.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    /// Delete `key`. `Ok(true)` if a live value was removed.
    async fn remove(&self, key: &str) -> Result<bool, CacheError>;

    /// Store `value` and return the live value it replaced.
    async fn swap(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<Option<Bytes>, CacheError>;

    /// Store `value` only if the live value under `key` is still `expected`.
    ///
    /// `expected == None` means the key must be absent or expired. Returns
    /// whether the write happened. Atomic per key, like `swap`.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Bytes>,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: Bytes, ttl: Option<Duration>) -> Self {
        Self { value, expires_at: ttl.map(|ttl| Instant::now() + ttl) }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

/// In-process [`CacheManager`].
///
/// Expiry is lazy: a stale entry lingers until the next access to its key,
/// or until [`MemoryCache::purge_expired`] runs, and is never returned.
/// Uses tokio's clock so paused-time tests control expiry.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    fn live_value(entry: CacheEntry, now: Instant) -> Option<Bytes> {
        entry.is_live(now).then_some(entry.value)
    }
}

#[async_trait]
impl CacheManager for MemoryCache {
    async fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.entries.insert(key.to_owned(), CacheEntry::new(value, ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key)
            && entry.is_live(now)
        {
            return Ok(Some(entry.value.clone()));
        }
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        Ok(None)
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self.entries.remove(key).and_then(|(_, entry)| Self::live_value(entry, now)).is_some())
    }

    async fn swap(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<Option<Bytes>, CacheError> {
        let now = Instant::now();
        let fresh = CacheEntry::new(value, ttl);
        match self.entries.entry(key.to_owned()) {
            MapEntry::Occupied(mut occupied) => {
                let previous = occupied.insert(fresh);
                Ok(Self::live_value(previous, now))
            },
            MapEntry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(None)
            },
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Bytes>,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        let now = Instant::now();
        match self.entries.entry(key.to_owned()) {
            MapEntry::Occupied(mut occupied) => {
                let current = occupied.get();
                let live = current.is_live(now).then_some(&current.value);
                if live != expected {
                    return Ok(false);
                }
                occupied.insert(CacheEntry::new(value, ttl));
                Ok(true)
            },
            MapEntry::Vacant(vacant) => {
                if expected.is_some() {
                    return Ok(false);
                }
                vacant.insert(CacheEntry::new(value, ttl));
                Ok(true)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn swap_returns_previous_value() {
        let cache = MemoryCache::new();

        assert_eq!(cache.swap("k", Bytes::from_static(b"a"), None).await.unwrap(), None);
        let previous = cache.swap("k", Bytes::from_static(b"b"), None).await.unwrap();

        assert_eq!(previous, Some(Bytes::from_static(b"a")));
        assert_eq!(cache.get("k").await.unwrap(), Some(Bytes::from_static(b"b")));
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let cache = MemoryCache::new();
        cache.put("k", Bytes::from_static(b"v"), None).await.unwrap();

        assert!(cache.remove("k").await.unwrap());
        assert!(!cache.remove("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = MemoryCache::new();
        cache.put("k", Bytes::from_static(b"v"), Some(Duration::from_secs(10))).await.unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cache.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn swap_over_expired_entry_sees_nothing() {
        let cache = MemoryCache::new();
        cache.put("k", Bytes::from_static(b"old"), Some(Duration::from_secs(1))).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.swap("k", Bytes::from_static(b"new"), None).await.unwrap(), None);
        assert!(!cache.remove("missing").await.unwrap());
    }

    #[tokio::test]
    async fn compare_and_swap_requires_expected_value() {
        let cache = MemoryCache::new();
        let a = Bytes::from_static(b"a");
        cache.put("k", a.clone(), None).await.unwrap();

        let stale = Bytes::from_static(b"stale");
        let b = Bytes::from_static(b"b");
        assert!(!cache.compare_and_swap("k", Some(&stale), b.clone(), None).await.unwrap());
        assert!(!cache.compare_and_swap("k", None, b.clone(), None).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), Some(a.clone()));

        assert!(cache.compare_and_swap("k", Some(&a), b.clone(), None).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), Some(b));
    }

    #[tokio::test]
    async fn compare_and_swap_on_absent_key() {
        let cache = MemoryCache::new();
        let a = Bytes::from_static(b"a");

        assert!(!cache.compare_and_swap("k", Some(&a), a.clone(), None).await.unwrap());
        assert!(cache.compare_and_swap("k", None, a.clone(), None).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), Some(a));
    }

    #[tokio::test(start_paused = true)]
    async fn compare_and_swap_treats_expired_as_absent() {
        let cache = MemoryCache::new();
        let old = Bytes::from_static(b"old");
        cache.put("k", old.clone(), Some(Duration::from_secs(1))).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(!cache.compare_and_swap("k", Some(&old), Bytes::new(), None).await.unwrap());
        assert!(cache.compare_and_swap("k", None, Bytes::from_static(b"new"), None).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired() {
        let cache = MemoryCache::new();
        cache.put("short", Bytes::new(), Some(Duration::from_secs(1))).await.unwrap();
        cache.put("forever", Bytes::new(), None).await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}
