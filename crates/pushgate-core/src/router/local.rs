use std::fmt;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{RouteKey, SessionTable};
use crate::{
    connection::{ConnectionId, ConnectionRef},
    error::RouterError,
};

/// Binds a routing key to a live connection on this node.
///
/// Exists only while this node holds the socket.
#[derive(Clone)]
pub struct LocalRouter {
    connection: ConnectionRef,
    client_type: u8,
}

impl LocalRouter {
    /// Wrap a connection. The client type is read from its session context.
    pub fn new(connection: ConnectionRef) -> Self {
        let client_type = connection.session().client_type;
        Self { connection, client_type }
    }

    /// The live connection.
    pub fn connection(&self) -> &ConnectionRef {
        &self.connection
    }

    /// Id of the live connection.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id()
    }

    /// Client kind captured at registration.
    pub fn client_type(&self) -> u8 {
        self.client_type
    }
}

impl fmt::Debug for LocalRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRouter")
            .field("connection_id", &self.connection.id())
            .field("client_type", &self.client_type)
            .finish()
    }
}

/// In-process table of [`LocalRouter`]s.
///
/// Sharded map, so writers on different keys never share a lock.
#[derive(Debug, Default)]
pub struct LocalRouterTable {
    routers: DashMap<RouteKey, LocalRouter>,
}

impl LocalRouterTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions held by this node.
    pub fn len(&self) -> usize {
        self.routers.len()
    }

    /// Whether no session is held.
    pub fn is_empty(&self) -> bool {
        self.routers.is_empty()
    }

    /// Remove the entry only if it still belongs to `connection_id`.
    ///
    /// A connection closing after a duplicate login must not evict the
    /// session that replaced it.
    pub fn unregister_if(&self, key: &RouteKey, connection_id: ConnectionId) -> bool {
        self.routers.remove_if(key, |_, router| router.connection_id() == connection_id).is_some()
    }

    /// Synchronous lookup.
    pub fn get(&self, key: &RouteKey) -> Option<LocalRouter> {
        self.routers.get(key).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl SessionTable for LocalRouterTable {
    type Router = LocalRouter;

    async fn register(
        &self,
        key: &RouteKey,
        router: LocalRouter,
    ) -> Result<Option<LocalRouter>, RouterError> {
        Ok(self.routers.insert(key.clone(), router))
    }

    async fn unregister(&self, key: &RouteKey) -> Result<bool, RouterError> {
        Ok(self.routers.remove(key).is_some())
    }

    async fn lookup(&self, key: &RouteKey) -> Result<Option<LocalRouter>, RouterError> {
        Ok(self.get(key))
    }
}
