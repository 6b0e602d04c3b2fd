//! TCP accept loop and per-connection read loop.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::BytesMut;
use pushgate_core::{
    CacheManager, Connection, ConnectionRef, DispatchAction, DispatchPipeline, EventBus,
    FailoverInvoker, MemoryCache, QueuePool, QueueProviderRegistry, RouterCenter, SequenceIdGen,
    Topic,
};
use pushgate_proto::FrameCodec;
use tokio::{
    io::AsyncReadExt,
    net::{TcpListener, TcpStream, tcp::OwnedReadHalf},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::ServerConfig,
    connection::TcpConnection,
    error::Result,
    handler::FrameHandler,
    kick::spawn_kick_listener,
};

/// Initial capacity of each connection's receive buffer.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Gateway server bound to a TCP listener.
///
/// One task per connection. Within a connection, decode, handling and
/// publishing run strictly in sequence, so frames are processed in arrival
/// order.
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    router: Arc<RouterCenter>,
    cache: Arc<MemoryCache>,
    handler: Arc<FrameHandler>,
    queue: QueuePool,
    shutdown: CancellationToken,
}

impl Server {
    /// Validate `config`, resolve the queue provider and bind the listener.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        Self::bind_with_registry(config, &QueueProviderRegistry::with_builtin()).await
    }

    /// Like [`Server::bind`] with a caller-supplied provider registry.
    pub async fn bind_with_registry(
        config: ServerConfig,
        registry: &QueueProviderRegistry,
    ) -> Result<Self> {
        config.validate()?;
        Topic::validate_all()?;

        let queue = registry.resolve(
            &config.queue_provider,
            &config.queue_settings,
            config.queue_instances,
        )?;

        let listener = TcpListener::bind(config.bind_addr).await?;
        let node = config.public_node(listener.local_addr()?);

        let cache = Arc::new(MemoryCache::new());
        let router = Arc::new(RouterCenter::new(
            node,
            Arc::clone(&cache) as Arc<dyn CacheManager>,
            EventBus::default(),
            config.route_ttl,
        ));
        let pipeline = DispatchPipeline::new(
            Arc::clone(&router),
            Arc::new(SequenceIdGen::new()),
            queue.clone(),
            FailoverInvoker::new(config.failover),
        );
        let handler = Arc::new(FrameHandler::new(Arc::clone(&router), pipeline));

        Ok(Self {
            config,
            listener,
            router,
            cache,
            handler,
            queue,
            shutdown: CancellationToken::new(),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Token that stops the server and every connection when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Shared session router.
    pub fn router(&self) -> &Arc<RouterCenter> {
        &self.router
    }

    /// Accept connections until shutdown.
    pub async fn run(self) -> Result<()> {
        info!(
            addr = %self.listener.local_addr()?,
            node = %self.router.node(),
            "server listening"
        );

        let kick = spawn_kick_listener(
            Arc::clone(&self.router),
            self.queue.clone(),
            FailoverInvoker::new(self.config.failover),
            self.shutdown.clone(),
        );
        let sweeper = spawn_cache_sweeper(
            Arc::clone(&self.cache),
            self.config.cache_purge_interval,
            self.shutdown.clone(),
        );

        loop {
            let accepted = tokio::select! {
                () = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => self.spawn_connection(stream, peer),
                Err(error) => warn!(%error, "accept failed"),
            }
        }

        join_logged("kick listener", kick).await;
        join_logged("cache sweeper", sweeper).await;
        info!("server stopped");
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(error) = stream.set_nodelay(true) {
            debug!(%peer, %error, "set_nodelay failed");
        }
        let (reader, writer) = stream.into_split();
        let (conn, writer_task) = TcpConnection::spawn(
            peer,
            writer,
            self.config.outbound_capacity,
            self.shutdown.child_token(),
        );
        let codec = FrameCodec::with_max_payload(self.config.max_frame_size);
        let handler = Arc::clone(&self.handler);

        tokio::spawn(async move {
            debug!(connection_id = conn.id(), %peer, "connection accepted");
            read_loop(&conn, reader, &codec, &handler).await;

            // Release the binding unless a newer login already took it.
            let session = conn.session();
            if let Some(user_id) = session.user_id.as_deref() {
                handler.router().unbind_connection(user_id, session.client_type, conn.id()).await;
            }
            conn.close("disconnected");
            join_logged("connection writer", writer_task).await;
            debug!(connection_id = conn.id(), reason = ?conn.close_reason(), "connection finished");
        });
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listener", &self.listener)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

/// Periodically drop expired records from the in-process cache. Lazy expiry
/// alone never frees keys that are not read again.
fn spawn_cache_sweeper(
    cache: Arc<MemoryCache>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(every);
        ticks.tick().await;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticks.tick() => {},
            }
            let purged = cache.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = cache.len(), "expired cache records swept");
            }
        }
    })
}

/// Await a background task. A panic or cancellation is logged, not
/// propagated. Returns whether the task ran to completion.
async fn join_logged(task: &str, handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(error) => {
            warn!(task, %error, panicked = error.is_panic(), "background task failed");
            false
        },
    }
}

async fn read_loop(
    conn: &Arc<TcpConnection>,
    mut reader: OwnedReadHalf,
    codec: &FrameCodec,
    handler: &FrameHandler,
) {
    let conn_ref: ConnectionRef = Arc::clone(conn) as ConnectionRef;
    let connection_id = conn.id();
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

    loop {
        let read = tokio::select! {
            () = conn.closed() => return,
            read = reader.read_buf(&mut buf) => read,
        };
        match read {
            Ok(0) => {
                debug!(connection_id, "peer closed");
                return;
            },
            Ok(_) => {},
            Err(error) => {
                debug!(connection_id, %error, "read failed");
                return;
            },
        }

        let batch = match codec.decode(&mut buf) {
            Ok(Some(batch)) => batch,
            Ok(None) => continue,
            Err(error) => {
                warn!(connection_id, %error, "protocol error, closing");
                conn.close("protocol error");
                return;
            },
        };

        for frame in batch {
            let actions = handler.handle(&conn_ref, frame).await;
            if !execute(conn, actions).await {
                return;
            }
        }
    }
}

/// Run actions in order. Returns false once the connection should stop.
async fn execute(conn: &TcpConnection, actions: Vec<DispatchAction>) -> bool {
    for action in actions {
        match action {
            DispatchAction::SendFrame(frame) => {
                if let Err(error) = conn.send(frame).await {
                    debug!(connection_id = conn.id(), %error, "send failed");
                    return false;
                }
            },
            DispatchAction::Close { reason } => {
                conn.close(&reason);
                return false;
            },
        }
    }
    !conn.is_closed()
}
