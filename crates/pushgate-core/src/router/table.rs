use async_trait::async_trait;

use super::RouteKey;
use crate::error::RouterError;

/// Keyed session store shared by the local and the remote tier.
///
/// `register` is an atomic get-and-replace per key: concurrent callers on the
/// same key each observe exactly one predecessor, and different keys never
/// contend with each other.
#[async_trait]
pub trait SessionTable: Send + Sync {
    /// Record type stored per key.
    type Router: Clone + Send + Sync + 'static;

    /// Store `router` under `key`, returning the entry it replaced.
    async fn register(
        &self,
        key: &RouteKey,
        router: Self::Router,
    ) -> Result<Option<Self::Router>, RouterError>;

    /// Remove the entry under `key`. `Ok(true)` if an entry was removed.
    async fn unregister(&self, key: &RouteKey) -> Result<bool, RouterError>;

    /// Current entry under `key`.
    async fn lookup(&self, key: &RouteKey) -> Result<Option<Self::Router>, RouterError>;
}
