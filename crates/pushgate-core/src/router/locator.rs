use std::fmt;

use serde::{Deserialize, Serialize};

use crate::connection::{Connection, ConnectionId};

/// Externally reachable address of a gateway node.
///
/// This is what other nodes use to reach sessions held here, which may
/// differ from the socket the node listens on (NAT, containers).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddress {
    /// Host name or IP.
    pub host: String,
    /// Port.
    pub port: u16,
}

impl NodeAddress {
    /// Build an address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Where a session's socket physically terminates.
///
/// Immutable value type. Identity for routing purposes is the
/// `(user_id, client_type)` key it is stored under, not these fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientLocator {
    host: String,
    port: u16,
    client_type: u8,
    connection_id: ConnectionId,
}

impl ClientLocator {
    /// Build a locator from its parts.
    pub fn new(node: &NodeAddress, client_type: u8, connection_id: ConnectionId) -> Self {
        Self { host: node.host.clone(), port: node.port, client_type, connection_id }
    }

    /// Locator for `connection` as reachable through `node`.
    pub fn for_connection(node: &NodeAddress, connection: &dyn Connection) -> Self {
        Self::new(node, connection.session().client_type, connection.id())
    }

    /// Node host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Node port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Client kind.
    pub fn client_type(&self) -> u8 {
        self.client_type
    }

    /// Connection id on the owning node.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Whether the session terminates on `node`.
    pub fn is_on(&self, node: &NodeAddress) -> bool {
        self.host == node.host && self.port == node.port
    }
}
