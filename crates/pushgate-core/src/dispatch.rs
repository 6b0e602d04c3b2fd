//! Per-frame dispatch pipeline.
//!
//! Verifies that the sending connection owns a session, stamps the payload
//! with a unique id and publishes it to the dispatch topic. Like the rest of
//! the core this module never touches the socket; it returns
//! [`DispatchAction`]s for the transport to execute in order.

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use pushgate_proto::{Command, ErrorCode, ErrorPayload, Frame};
use tracing::{debug, error, warn};

use crate::{
    connection::Connection,
    failover::FailoverInvoker,
    idgen::IdGen,
    mq::{QueuePool, Topic},
    router::RouterCenter,
};

/// Id namespace for dispatched messages.
pub const DISPATCH_NAMESPACE: &str = "dispatch";

/// Reason sent to a client that dispatches without a session.
pub const NOT_BOUND_REASON: &str = "not bind user";

/// Side effect requested by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchAction {
    /// Write a frame to the connection.
    SendFrame(Frame),

    /// Close the connection after preceding writes are queued.
    Close {
        /// Reason for logs.
        reason: String,
    },
}

/// Message handed to the queue: a unique id plus the opaque frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEnvelope {
    /// Unique id from the `dispatch` namespace.
    pub id: i64,
    /// Frame payload, untouched.
    pub payload: Bytes,
}

impl DispatchEnvelope {
    /// Size of the id prefix.
    pub const ID_SIZE: usize = 8;

    /// Wire form: 8-byte big-endian id followed by the payload.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::ID_SIZE + self.payload.len());
        buf.put_i64(self.id);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse the wire form. `None` if shorter than the id prefix.
    pub fn decode(mut bytes: Bytes) -> Option<Self> {
        if bytes.len() < Self::ID_SIZE {
            return None;
        }
        let id = bytes.get_i64();
        Some(Self { id, payload: bytes })
    }
}

/// Turns inbound `Dispatch` frames into queue messages.
///
/// Stateless across frames. Call [`DispatchPipeline::handle`] sequentially
/// per connection; ids are then assigned in frame order.
pub struct DispatchPipeline {
    router: Arc<RouterCenter>,
    id_gen: Arc<dyn IdGen>,
    queue: QueuePool,
    invoker: FailoverInvoker,
}

impl DispatchPipeline {
    /// Pipeline publishing through `queue` with `invoker`'s retry budget.
    pub fn new(
        router: Arc<RouterCenter>,
        id_gen: Arc<dyn IdGen>,
        queue: QueuePool,
        invoker: FailoverInvoker,
    ) -> Self {
        Self { router, id_gen, queue, invoker }
    }

    /// Process one inbound frame from `connection`.
    ///
    /// - Not a `Dispatch` frame: `[Close]`.
    /// - Connection does not own a session: `[SendFrame(error), Close]`.
    /// - Otherwise publishes and returns nothing. Publish failures are logged
    ///   and dropped; the client is not told.
    pub async fn handle(&self, connection: &dyn Connection, frame: Frame) -> Vec<DispatchAction> {
        let connection_id = connection.id();

        if frame.header.command_enum() != Some(Command::Dispatch) {
            error!(
                connection_id,
                command = frame.header.command(),
                "unexpected command on dispatch path"
            );
            return vec![DispatchAction::Close { reason: "unexpected command".to_owned() }];
        }

        if !self.owns_session(connection) {
            error!(connection_id, "dispatch rejected: {NOT_BOUND_REASON}");
            return vec![
                DispatchAction::SendFrame(not_bound_reply(&frame)),
                DispatchAction::Close { reason: NOT_BOUND_REASON.to_owned() },
            ];
        }

        // One id per frame, fixed before any retry.
        let id = match self.id_gen.next_id(DISPATCH_NAMESPACE) {
            Ok(id) => id,
            Err(err) => {
                error!(connection_id, error = %err, "dispatch dropped, no id");
                return Vec::new();
            },
        };

        let envelope = DispatchEnvelope { id, payload: frame.payload }.encode();
        let start = self.queue.next_start();
        let result = self
            .invoker
            .invoke(|attempt| {
                let client = Arc::clone(self.queue.client(start, attempt));
                let envelope = envelope.clone();
                async move { client.publish(Topic::DispatchMessage, envelope).await }
            })
            .await;

        match result {
            Ok(()) => debug!(connection_id, id, "dispatched"),
            Err(err) => warn!(connection_id, id, error = %err, "dispatch publish failed"),
        }
        Vec::new()
    }

    /// Bound, and this node's local router for the key is this connection.
    fn owns_session(&self, connection: &dyn Connection) -> bool {
        let session = connection.session();
        let Some(user_id) = session.user_id.as_deref() else {
            return false;
        };
        self.router
            .lookup_local(user_id, session.client_type)
            .is_some_and(|local| local.connection_id() == connection.id())
    }
}

impl std::fmt::Debug for DispatchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchPipeline")
            .field("queue", &self.queue)
            .field("invoker", &self.invoker)
            .finish_non_exhaustive()
    }
}

fn not_bound_reply(request: &Frame) -> Frame {
    let payload = ErrorPayload::new(ErrorCode::NotBound, NOT_BOUND_REASON)
        .encode()
        .unwrap_or_else(|err| {
            warn!(error = %err, "error payload encoding failed, replying without body");
            Bytes::new()
        });
    Frame::reply_to(&request.header, Command::Error, payload)
}
