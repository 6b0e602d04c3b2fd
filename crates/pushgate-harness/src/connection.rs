//! In-memory connection.

use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use pushgate_core::{Connection, ConnectionId, ConnectionRef, SessionContext};
use pushgate_proto::Frame;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Connection that records sent frames instead of writing to a socket.
///
/// Sends after [`Connection::close`] fail with `BrokenPipe`, like a real
/// socket whose writer has shut down.
#[derive(Debug)]
pub struct MemoryConnection {
    id: ConnectionId,
    session: RwLock<SessionContext>,
    sent: Mutex<Vec<Frame>>,
    close_reason: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl MemoryConnection {
    /// Unbound connection with a fresh process-unique id.
    pub fn new() -> Arc<Self> {
        Self::with_session(SessionContext::default())
    }

    /// Connection already carrying `user_id` and `client_type`.
    pub fn bound(user_id: &str, client_type: u8) -> Arc<Self> {
        Self::with_session(SessionContext::bound(user_id, client_type))
    }

    /// Connection with an explicit session context.
    pub fn with_session(session: SessionContext) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            session: RwLock::new(session),
            sent: Mutex::new(Vec::new()),
            close_reason: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Same connection as a trait object.
    pub fn as_ref_dyn(self: &Arc<Self>) -> ConnectionRef {
        Arc::clone(self) as ConnectionRef
    }

    /// Frames sent so far.
    pub fn sent(&self) -> Vec<Frame> {
        self.sent.lock().clone()
    }

    /// Reason given to the first close, if closed.
    pub fn close_reason(&self) -> Option<String> {
        self.close_reason.lock().clone()
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn session(&self) -> SessionContext {
        self.session.read().clone()
    }

    fn set_session(&self, session: SessionContext) {
        *self.session.write() = session;
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }

    async fn send(&self, frame: Frame) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"));
        }
        self.sent.lock().push(frame);
        Ok(())
    }

    fn close(&self, reason: &str) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            *self.close_reason.lock() = Some(reason.to_owned());
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
