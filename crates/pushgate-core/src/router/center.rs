use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{
    ClientLocator, LocalRouter, LocalRouterTable, NodeAddress, RemoteRouter, RemoteRouterTable,
    RouteKey, Router, SessionTable,
};
use crate::{
    cache::CacheManager,
    connection::{ConnectionId, ConnectionRef},
    event::{EventBus, RouterChangeEvent},
};

/// Facade over the local and remote session tables.
///
/// Registration writes both tiers and announces every displaced live
/// session on the event bus, which is how duplicate logins get kicked. No
/// operation here fails: collaborator errors are logged and absorbed so a
/// flaky cache never breaks the connection that triggered the call.
pub struct RouterCenter {
    node: NodeAddress,
    local: LocalRouterTable,
    remote: RemoteRouterTable,
    events: EventBus,
}

impl RouterCenter {
    /// Router for the node reachable at `node`.
    ///
    /// Remote records are written with `route_ttl`; `None` keeps them until
    /// explicitly removed.
    pub fn new(
        node: NodeAddress,
        cache: Arc<dyn CacheManager>,
        events: EventBus,
        route_ttl: Option<Duration>,
    ) -> Self {
        Self {
            node,
            local: LocalRouterTable::new(),
            remote: RemoteRouterTable::new(cache, route_ttl),
            events,
        }
    }

    /// Public address of this node.
    pub fn node(&self) -> &NodeAddress {
        &self.node
    }

    /// Number of sessions bound on this node.
    pub fn local_sessions(&self) -> usize {
        self.local.len()
    }

    /// Receive routing change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RouterChangeEvent> {
        self.events.subscribe()
    }

    /// Bind `user_id` to `connection` in both tiers.
    ///
    /// The client type comes from the connection's session context. A
    /// displaced local router always produces a notification; a displaced
    /// remote router only when it was still online. Always returns `true`.
    pub async fn register(&self, user_id: &str, connection: ConnectionRef) -> bool {
        let connection_id = connection.id();
        let key = RouteKey::new(user_id, connection.session().client_type);
        let locator = ClientLocator::for_connection(&self.node, connection.as_ref());

        match self.local.register(&key, LocalRouter::new(connection)).await {
            Ok(Some(previous)) => {
                debug!(
                    route = %key,
                    previous = previous.connection_id(),
                    connection_id,
                    "local session replaced"
                );
                self.notify(user_id, Router::Local(previous));
            },
            Ok(None) => {},
            Err(error) => warn!(route = %key, %error, "local register failed"),
        }

        match self.remote.register(&key, RemoteRouter::new(locator)).await {
            Ok(Some(previous)) if previous.is_online() => {
                debug!(route = %key, previous = ?previous.locator(), "remote session replaced");
                self.notify(user_id, Router::Remote(previous));
            },
            Ok(_) => {},
            Err(error) => warn!(route = %key, %error, "remote register failed"),
        }

        true
    }

    /// Remove the binding from both tiers.
    ///
    /// `true` only if both tiers held and removed an entry. Both removals
    /// are attempted regardless of the first outcome.
    pub async fn unregister(&self, user_id: &str, client_type: u8) -> bool {
        let key = RouteKey::new(user_id, client_type);

        let remote = self.remote.unregister(&key).await.unwrap_or_else(|error| {
            warn!(route = %key, %error, "remote unregister failed");
            false
        });
        let local = self.local.unregister(&key).await.unwrap_or_else(|error| {
            warn!(route = %key, %error, "local unregister failed");
            false
        });

        remote && local
    }

    /// Local router for the key, if this node holds it.
    pub fn lookup_local(&self, user_id: &str, client_type: u8) -> Option<LocalRouter> {
        self.local.get(&RouteKey::new(user_id, client_type))
    }

    /// Cluster-wide record for the key. Cache failures read as absent.
    pub async fn lookup_remote(&self, user_id: &str, client_type: u8) -> Option<RemoteRouter> {
        let key = RouteKey::new(user_id, client_type);
        self.remote.lookup(&key).await.unwrap_or_else(|error| {
            warn!(route = %key, %error, "remote lookup failed");
            None
        })
    }

    /// Rewrite the remote record of a session still held here, resetting its
    /// TTL.
    ///
    /// Skipped when the key is not bound locally or when the record already
    /// names another session, so a node that has not yet processed a kick
    /// cannot reclaim a user who moved away.
    pub async fn refresh(&self, user_id: &str, client_type: u8) -> bool {
        let key = RouteKey::new(user_id, client_type);
        let Some(local) = self.local.get(&key) else {
            return false;
        };
        let locator = ClientLocator::new(&self.node, client_type, local.connection_id());

        let current = match self.remote.lookup_versioned(&key).await {
            Ok(current) => current,
            Err(error) => {
                warn!(route = %key, %error, "refresh lookup failed");
                return false;
            },
        };
        let expected = match &current {
            Some((router, _)) if router.locator() != &locator => {
                debug!(route = %key, owner = ?router.locator(), "refresh skipped, route moved");
                return false;
            },
            Some((_, raw)) => Some(raw),
            None => None,
        };

        self.replace_remote(&key, expected, &RemoteRouter::new(locator)).await
    }

    /// Mark the remote record offline if it names a session on this node.
    ///
    /// A later registration that displaces an offline record emits no
    /// notification.
    pub async fn mark_offline(&self, user_id: &str, client_type: u8) -> bool {
        self.mark_offline_where(&RouteKey::new(user_id, client_type), |_| true).await
    }

    /// Tear down the binding held by a closing connection.
    ///
    /// Removes the local entry only if it still belongs to `connection_id`,
    /// and then marks the matching remote record offline. Returns whether the
    /// local entry was removed.
    pub async fn unbind_connection(
        &self,
        user_id: &str,
        client_type: u8,
        connection_id: ConnectionId,
    ) -> bool {
        let key = RouteKey::new(user_id, client_type);
        if !self.local.unregister_if(&key, connection_id) {
            debug!(route = %key, connection_id, "stale close, binding already replaced");
            return false;
        }

        self.mark_offline_where(&key, |locator| locator.connection_id() == connection_id).await;
        true
    }

    async fn mark_offline_where(
        &self,
        key: &RouteKey,
        owns: impl Fn(&ClientLocator) -> bool,
    ) -> bool {
        let (current, raw) = match self.remote.lookup_versioned(key).await {
            Ok(Some(current)) => current,
            Ok(None) => return false,
            Err(error) => {
                warn!(route = %key, %error, "offline lookup failed");
                return false;
            },
        };

        if !current.locator().is_on(&self.node) || !owns(current.locator()) {
            return false;
        }

        self.replace_remote(key, Some(&raw), &current.into_offline()).await
    }

    /// Conditional write of the remote record. A newer claim written since
    /// `expected` was read is left alone.
    async fn replace_remote(
        &self,
        key: &RouteKey,
        expected: Option<&Bytes>,
        router: &RemoteRouter,
    ) -> bool {
        match self.remote.replace(key, expected, router).await {
            Ok(true) => true,
            Ok(false) => {
                debug!(route = %key, "remote record changed since read, write skipped");
                false
            },
            Err(error) => {
                warn!(route = %key, %error, "remote write failed");
                false
            },
        }
    }

    fn notify(&self, user_id: &str, router: Router) {
        self.events.post(RouterChangeEvent { user_id: user_id.to_owned(), router });
    }
}

impl std::fmt::Debug for RouterCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterCenter")
            .field("node", &self.node)
            .field("local_sessions", &self.local.len())
            .finish_non_exhaustive()
    }
}
