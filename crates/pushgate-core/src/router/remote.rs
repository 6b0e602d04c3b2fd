use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{ClientLocator, RouteKey, SessionTable};
use crate::{cache::CacheManager, error::RouterError};

/// Cache key prefix for remote route records.
const KEY_PREFIX: &str = "pushgate:rr";

/// Cluster-visible claim of where a session lives.
///
/// Persisted through the shared cache so any node can resolve it. May
/// describe this node or another one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRouter {
    locator: ClientLocator,
    online: bool,
}

impl RemoteRouter {
    /// Online claim for `locator`.
    pub fn new(locator: ClientLocator) -> Self {
        Self { locator, online: true }
    }

    /// Where the session terminates.
    pub fn locator(&self) -> &ClientLocator {
        &self.locator
    }

    /// Whether the session was live when last written.
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Same claim, marked offline.
    pub fn into_offline(self) -> Self {
        Self { online: false, ..self }
    }

    fn to_bytes(&self) -> Result<Bytes, RouterError> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| RouterError::Codec(e.to_string()))?;
        Ok(Bytes::from(buf))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, RouterError> {
        ciborium::de::from_reader(bytes).map_err(|e| RouterError::Codec(e.to_string()))
    }
}

/// Remote tier backed by the shared cache.
///
/// Only defines the key scheme and record encoding; storage, replication and
/// expiry belong to the [`CacheManager`]. Every write carries `ttl`, so a
/// record whose node stopped refreshing it eventually disappears.
pub struct RemoteRouterTable {
    cache: Arc<dyn CacheManager>,
    ttl: Option<Duration>,
}

impl RemoteRouterTable {
    /// Table over `cache`, writing records with `ttl` (`None` never expires).
    pub fn new(cache: Arc<dyn CacheManager>, ttl: Option<Duration>) -> Self {
        Self { cache, ttl }
    }

    /// Cache key for a route.
    pub fn cache_key(key: &RouteKey) -> String {
        format!("{KEY_PREFIX}:{}:{}", key.user_id, key.client_type)
    }

    /// Current record together with the exact bytes it was read from.
    ///
    /// Pass the bytes to [`RemoteRouterTable::replace`] to write back only if
    /// nobody changed the record in between.
    pub async fn lookup_versioned(
        &self,
        key: &RouteKey,
    ) -> Result<Option<(RemoteRouter, Bytes)>, RouterError> {
        let Some(raw) = self.cache.get(&Self::cache_key(key)).await? else {
            return Ok(None);
        };
        Ok(Self::decode_previous(key, Some(raw.clone())).map(|router| (router, raw)))
    }

    /// Write `router` only if the stored record is still `expected`
    /// (`None`: no live record). `Ok(false)` when another writer got there
    /// first.
    pub async fn replace(
        &self,
        key: &RouteKey,
        expected: Option<&Bytes>,
        router: &RemoteRouter,
    ) -> Result<bool, RouterError> {
        let value = router.to_bytes()?;
        Ok(self.cache.compare_and_swap(&Self::cache_key(key), expected, value, self.ttl).await?)
    }

    fn decode_previous(key: &RouteKey, bytes: Option<Bytes>) -> Option<RemoteRouter> {
        let bytes = bytes?;
        match RemoteRouter::from_bytes(&bytes) {
            Ok(router) => Some(router),
            Err(error) => {
                // Unreadable record: nothing trustworthy is being displaced.
                warn!(route = %key, %error, "discarding undecodable remote route record");
                None
            },
        }
    }
}

#[async_trait]
impl SessionTable for RemoteRouterTable {
    type Router = RemoteRouter;

    async fn register(
        &self,
        key: &RouteKey,
        router: RemoteRouter,
    ) -> Result<Option<RemoteRouter>, RouterError> {
        let value = router.to_bytes()?;
        let previous = self.cache.swap(&Self::cache_key(key), value, self.ttl).await?;
        Ok(Self::decode_previous(key, previous))
    }

    async fn unregister(&self, key: &RouteKey) -> Result<bool, RouterError> {
        Ok(self.cache.remove(&Self::cache_key(key)).await?)
    }

    async fn lookup(&self, key: &RouteKey) -> Result<Option<RemoteRouter>, RouterError> {
        let bytes = self.cache.get(&Self::cache_key(key)).await?;
        Ok(Self::decode_previous(key, bytes))
    }
}
