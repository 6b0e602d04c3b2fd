//! Cache with failure injection.

use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use pushgate_core::{CacheError, CacheManager, MemoryCache};

/// [`MemoryCache`] whose operations can be made to fail individually.
///
/// Failures leave the underlying state untouched.
#[derive(Debug, Default)]
pub struct FlakyCache {
    inner: MemoryCache,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_removes: AtomicBool,
    calls: AtomicUsize,
}

impl FlakyCache {
    /// Healthy cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `get` fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make `put`, `swap` and `compare_and_swap` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `remove` fail.
    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    /// Total operations attempted, failed or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, flag: &AtomicBool, op: &str) -> Result<(), CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if flag.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable(format!("injected {op} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheManager for FlakyCache {
    async fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.check(&self.fail_writes, "put")?;
        self.inner.put(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        self.check(&self.fail_reads, "get")?;
        self.inner.get(key).await
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        self.check(&self.fail_removes, "remove")?;
        self.inner.remove(key).await
    }

    async fn swap(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<Option<Bytes>, CacheError> {
        self.check(&self.fail_writes, "swap")?;
        self.inner.swap(key, value, ttl).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Bytes>,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        self.check(&self.fail_writes, "compare_and_swap")?;
        self.inner.compare_and_swap(key, expected, value, ttl).await
    }
}
