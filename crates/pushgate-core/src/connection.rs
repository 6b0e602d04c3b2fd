//! Connection abstraction.
//!
//! Abstracts over the transport's live socket handle. Production uses the TCP
//! connection in `pushgate-server`; tests use in-memory connections that
//! record what was sent.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use pushgate_proto::Frame;

use crate::router::RouteKey;

/// Identifier of a connection, unique within one gateway process.
pub type ConnectionId = u64;

/// Shared handle to a live connection.
pub type ConnectionRef = Arc<dyn Connection>;

/// Per-connection session state owned by the transport.
///
/// A connection is *bound* once a user identity has been attached by the
/// bind handshake. Dispatch requires a bound connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    /// Bound user, if any.
    pub user_id: Option<String>,

    /// Client kind announced by the peer.
    pub client_type: u8,

    /// Optional device identifier.
    pub device_id: Option<String>,
}

impl SessionContext {
    /// Context for a freshly bound user.
    pub fn bound(user_id: impl Into<String>, client_type: u8) -> Self {
        Self { user_id: Some(user_id.into()), client_type, device_id: None }
    }

    /// Whether a user identity is attached.
    pub fn is_bound(&self) -> bool {
        self.user_id.is_some()
    }

    /// Routing key for the bound user.
    pub fn route_key(&self) -> Option<RouteKey> {
        self.user_id.as_deref().map(|user_id| RouteKey::new(user_id, self.client_type))
    }
}

/// A live client connection held by this node.
///
/// Implementations must be cheap to share: routing tables keep an
/// [`Arc`] to every bound connection.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Process-unique connection id.
    fn id(&self) -> ConnectionId;

    /// Snapshot of the session context.
    fn session(&self) -> SessionContext;

    /// Replace the session context.
    fn set_session(&self, session: SessionContext);

    /// Remote address of the peer, when known.
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Queue a frame for delivery to the peer.
    ///
    /// Returns once the frame is handed to the writer, not when it reaches
    /// the peer.
    async fn send(&self, frame: Frame) -> io::Result<()>;

    /// Close the connection.
    ///
    /// Stops the read loop and drops the socket after pending writes flush.
    /// Idempotent.
    fn close(&self, reason: &str);

    /// Whether [`Connection::close`] has been called.
    fn is_closed(&self) -> bool;
}

impl std::fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("peer_addr", &self.peer_addr())
            .field("closed", &self.is_closed())
            .finish()
    }
}
