//! TCP connection handle.

use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::{Mutex, RwLock};
use pushgate_core::{Connection, ConnectionId, SessionContext};
use pushgate_proto::{Frame, FrameCodec};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Server side of one client socket.
///
/// Outbound frames go through a bounded channel to a dedicated writer task,
/// so routing code can send from any task without touching the socket.
/// Closing cancels the token shared with the read loop; the writer flushes
/// whatever was already queued and shuts the socket down.
#[derive(Debug)]
pub struct TcpConnection {
    id: ConnectionId,
    peer: SocketAddr,
    session: RwLock<SessionContext>,
    outbound: mpsc::Sender<Frame>,
    cancel: CancellationToken,
    close_reason: Mutex<Option<String>>,
}

impl TcpConnection {
    /// Start the writer task over `writer` and return the handle plus the
    /// writer's join handle.
    ///
    /// `cancel` is usually a child of the server's shutdown token.
    pub fn spawn<W>(
        peer: SocketAddr,
        writer: W,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Arc<Self>, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let conn = Arc::new(Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            peer,
            session: RwLock::new(SessionContext::default()),
            outbound,
            cancel: cancel.clone(),
            close_reason: Mutex::new(None),
        });
        let task = tokio::spawn(write_loop(conn.id, writer, rx, cancel));
        (conn, task)
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    /// Reason passed to the first [`Connection::close`].
    pub fn close_reason(&self) -> Option<String> {
        self.close_reason.lock().clone()
    }
}

#[async_trait]
impl Connection for TcpConnection {
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
        Some(self.peer)
    }

    async fn send(&self, frame: Frame) -> io::Result<()> {
        if self.cancel.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"));
        }
        self.outbound
            .send(frame)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "writer stopped"))
    }

    fn close(&self, reason: &str) {
        {
            let mut slot = self.close_reason.lock();
            if slot.is_none() {
                *slot = Some(reason.to_owned());
                debug!(connection_id = self.id, peer = %self.peer, reason, "closing connection");
            }
        }
        self.cancel.cancel();
    }

    fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

async fn write_loop<W>(
    connection_id: ConnectionId,
    mut writer: W,
    mut rx: mpsc::Receiver<Frame>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    let codec = FrameCodec::new();
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        let frame = tokio::select! {
            biased;
            frame = rx.recv() => frame,
            () = cancel.cancelled() => None,
        };
        let Some(frame) = frame else { break };

        codec.encode(&frame, &mut buf);
        if let Err(error) = writer.write_all(&buf).await {
            debug!(connection_id, %error, "write failed");
            cancel.cancel();
            return;
        }
        buf.clear();
    }

    // Flush frames queued before the close.
    while let Ok(frame) = rx.try_recv() {
        codec.encode(&frame, &mut buf);
    }
    if !buf.is_empty()
        && let Err(error) = writer.write_all(&buf).await
    {
        trace!(connection_id, %error, "final flush failed");
    }
    let _ = writer.shutdown().await;
}
