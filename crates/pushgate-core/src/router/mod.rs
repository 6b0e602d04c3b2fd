//! Two-tier session routing.
//!
//! The local table holds live connection handles for sessions terminating on
//! this node. The remote table publishes, through the shared cache, where
//! every session in the cluster terminates. [`RouterCenter`] keeps the two in
//! step and announces displaced sessions on the [`crate::event::EventBus`].
//!
//! There is no two-phase commit between the tiers. A crash between the local
//! and remote writes leaves at most one stale remote record, which the next
//! registration for that key or the record's TTL corrects.

mod center;
mod key;
mod local;
mod locator;
mod remote;
mod table;

pub use center::RouterCenter;
pub use key::RouteKey;
pub use local::{LocalRouter, LocalRouterTable};
pub use locator::{ClientLocator, NodeAddress};
pub use remote::{RemoteRouter, RemoteRouterTable};
pub use table::SessionTable;

/// A routing record displaced by a newer registration.
#[derive(Debug, Clone)]
pub enum Router {
    /// Connection held by this node.
    Local(LocalRouter),
    /// Cluster-visible claim, possibly on another node.
    Remote(RemoteRouter),
}
