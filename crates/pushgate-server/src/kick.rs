//! Duplicate-login enforcement.
//!
//! Listens for routing change events. A displaced local session is closed
//! right here. A displaced session on another node is announced on the
//! router-change topic for that node to act on.

use std::sync::Arc;

use bytes::Bytes;
use pushgate_core::{
    FailoverInvoker, QueuePool, RemoteRouter, Router, RouterCenter, RouterChangeEvent, Topic,
};
use serde::{Deserialize, Serialize};
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reason given to a connection closed by a newer login.
pub const DUPLICATE_LOGIN: &str = "duplicate login";

/// Request for another node to close a displaced session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KickNotice {
    /// User whose session moved.
    pub user_id: String,
    /// Displaced routing record; names the node and connection to close.
    pub router: RemoteRouter,
}

impl KickNotice {
    /// Encode as CBOR.
    pub fn encode(&self) -> Result<Vec<u8>, ciborium::ser::Error<std::io::Error>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)?;
        Ok(buf)
    }

    /// Decode from CBOR.
    pub fn decode(bytes: &[u8]) -> Result<Self, ciborium::de::Error<std::io::Error>> {
        ciborium::de::from_reader(bytes)
    }
}

/// Spawn the listener. It runs until `shutdown` is cancelled.
pub fn spawn_kick_listener(
    router: Arc<RouterCenter>,
    queue: QueuePool,
    invoker: FailoverInvoker,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut events = router.subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                () = shutdown.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(event) => handle_event(&router, &queue, &invoker, event).await,
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "kick listener lagged, some displaced sessions stay open");
                },
                Err(RecvError::Closed) => break,
            }
        }
        debug!("kick listener stopped");
    })
}

async fn handle_event(
    router: &RouterCenter,
    queue: &QueuePool,
    invoker: &FailoverInvoker,
    event: RouterChangeEvent,
) {
    match event.router {
        Router::Local(previous) => {
            let current = router.lookup_local(&event.user_id, previous.client_type());
            // Same connection binding again.
            if current.is_some_and(|c| c.connection_id() == previous.connection_id()) {
                return;
            }
            info!(
                user_id = %event.user_id,
                connection_id = previous.connection_id(),
                "closing displaced session"
            );
            previous.connection().close(DUPLICATE_LOGIN);
        },
        Router::Remote(previous) => {
            // Displacements on this node arrive as local events too.
            if previous.locator().is_on(router.node()) {
                return;
            }
            let notice = KickNotice { user_id: event.user_id, router: previous };
            let payload = match notice.encode() {
                Ok(payload) => Bytes::from(payload),
                Err(error) => {
                    warn!(user_id = %notice.user_id, %error, "kick notice encoding failed");
                    return;
                },
            };
            let start = queue.next_start();
            let result = invoker
                .invoke(|attempt| {
                    let client = Arc::clone(queue.client(start, attempt));
                    let payload = payload.clone();
                    async move { client.publish(Topic::RouterChange, payload).await }
                })
                .await;
            match result {
                Ok(()) => debug!(
                    user_id = %notice.user_id,
                    host = notice.router.locator().host(),
                    "kick notice published"
                ),
                Err(error) => warn!(user_id = %notice.user_id, %error, "kick notice publish failed"),
            }
        },
    }
}
