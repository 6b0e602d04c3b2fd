//! Pushgate gateway core
//!
//! Session routing and message dispatch for a long-connection gateway,
//! decoupled from sockets. The transport layer owns the sockets and drives
//! this crate through the [`connection::Connection`] abstraction.
//!
//! # Architecture
//!
//! Every inbound byte flows codec → dispatch → router lookup → queue publish.
//! The codec lives in `pushgate-proto`; this crate covers the rest:
//!
//! - A two-tier session router. The local table answers "is this socket
//!   mine"; the cache-backed remote table answers "which node holds this
//!   user" for the whole cluster. Both are keyed by `(user_id, client_type)`
//!   and replace atomically per key.
//! - A dispatch pipeline that checks the connection's binding, stamps each
//!   application frame with a unique id, and publishes it to the queue with
//!   bounded failover.
//!
//! Like the connection state machine this design follows, the pipeline
//! returns declarative [`dispatch::DispatchAction`]s (send a reply, close)
//! rather than touching the socket itself.
//!
//! # Components
//!
//! - [`connection`]: Connection handle and per-connection session context
//! - [`router`]: Session tables and [`router::RouterCenter`]
//! - [`event`]: Routing change notifications
//! - [`cache`]: Shared cache contract and in-memory implementation
//! - [`idgen`]: Unique id generation
//! - [`mq`]: Queue clients, topics, provider registry
//! - [`failover`]: Bounded retry across provider instances
//! - [`dispatch`]: The per-frame dispatch pipeline
//! - [`error`]: Collaborator error types

pub mod cache;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod failover;
pub mod idgen;
pub mod mq;
pub mod router;

pub use cache::{CacheManager, MemoryCache};
pub use connection::{Connection, ConnectionId, ConnectionRef, SessionContext};
pub use dispatch::{DispatchAction, DispatchEnvelope, DispatchPipeline};
pub use error::{CacheError, IdGenError, QueueError, RouterError};
pub use event::{EventBus, RouterChangeEvent};
pub use failover::{FailoverInvoker, FailoverPolicy, Retryable};
pub use idgen::{IdGen, SequenceIdGen};
pub use mq::{QueueClient, QueuePool, QueueProviderRegistry, QueueSettings, Topic};
pub use router::{
    ClientLocator, LocalRouter, LocalRouterTable, NodeAddress, RemoteRouter, RemoteRouterTable,
    RouteKey, Router, RouterCenter, SessionTable,
};
