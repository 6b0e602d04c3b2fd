//! Per-frame command handling.
//!
//! Control commands (heartbeat, bind, unbind) are answered here. Everything
//! else goes to the [`DispatchPipeline`], which closes the connection for
//! anything that is not a `Dispatch` frame.

use std::sync::Arc;

use bytes::Bytes;
use pushgate_core::{ConnectionRef, DispatchAction, DispatchPipeline, RouterCenter, SessionContext};
use pushgate_proto::{BindPayload, Command, ErrorCode, ErrorPayload, Frame};
use tracing::{debug, info, warn};

/// Routes decoded frames to the control handlers or the dispatch pipeline.
///
/// Returns actions in the order the transport must execute them.
#[derive(Debug)]
pub struct FrameHandler {
    router: Arc<RouterCenter>,
    pipeline: DispatchPipeline,
}

impl FrameHandler {
    /// Handler over a shared router and a pipeline built from it.
    pub fn new(router: Arc<RouterCenter>, pipeline: DispatchPipeline) -> Self {
        Self { router, pipeline }
    }

    /// The router this handler registers sessions with.
    pub fn router(&self) -> &Arc<RouterCenter> {
        &self.router
    }

    /// Handle one frame from `connection`.
    pub async fn handle(&self, connection: &ConnectionRef, frame: Frame) -> Vec<DispatchAction> {
        match frame.header.command_enum() {
            Some(Command::Heartbeat) => self.heartbeat(connection, &frame).await,
            Some(Command::Bind) => self.bind(connection, &frame).await,
            Some(Command::Unbind) => self.unbind(connection, &frame).await,
            _ => self.pipeline.handle(&**connection, frame).await,
        }
    }

    async fn heartbeat(&self, connection: &ConnectionRef, frame: &Frame) -> Vec<DispatchAction> {
        let session = connection.session();
        if let Some(user_id) = session.user_id.as_deref()
            && self.owns(connection, user_id, session.client_type)
        {
            self.router.refresh(user_id, session.client_type).await;
        }
        vec![DispatchAction::SendFrame(Frame::reply_to(
            &frame.header,
            Command::Heartbeat,
            Bytes::new(),
        ))]
    }

    async fn bind(&self, connection: &ConnectionRef, frame: &Frame) -> Vec<DispatchAction> {
        let connection_id = connection.id();
        let bind = match BindPayload::decode(&frame.payload) {
            Ok(bind) if !bind.user_id.is_empty() => bind,
            Ok(_) => return vec![error_reply(frame, ErrorCode::BadRequest, "empty user id")],
            Err(error) => {
                debug!(connection_id, %error, "malformed bind payload");
                return vec![error_reply(frame, ErrorCode::BadRequest, "malformed bind payload")];
            },
        };

        // Rebinding to another identity releases the previous one first.
        let previous = connection.session();
        if let Some(user_id) = previous.user_id.as_deref()
            && (user_id != bind.user_id || previous.client_type != bind.client_type)
        {
            self.router.unbind_connection(user_id, previous.client_type, connection_id).await;
        }

        connection.set_session(SessionContext {
            user_id: Some(bind.user_id.clone()),
            client_type: bind.client_type,
            device_id: bind.device_id,
        });
        self.router.register(&bind.user_id, Arc::clone(connection)).await;
        info!(
            connection_id,
            user_id = %bind.user_id,
            client_type = bind.client_type,
            "session bound"
        );

        vec![DispatchAction::SendFrame(Frame::reply_to(&frame.header, Command::Ok, Bytes::new()))]
    }

    async fn unbind(&self, connection: &ConnectionRef, frame: &Frame) -> Vec<DispatchAction> {
        let session = connection.session();
        let Some(user_id) = session.user_id.as_deref() else {
            return vec![error_reply(frame, ErrorCode::NotBound, "not bind user")];
        };

        // A superseded connection only drops its own identity; the routes
        // belong to its successor.
        let removed = if self.owns(connection, user_id, session.client_type) {
            self.router.unregister(user_id, session.client_type).await
        } else {
            true
        };
        connection.set_session(SessionContext::default());

        if removed {
            info!(connection_id = connection.id(), user_id, "session unbound");
            vec![DispatchAction::SendFrame(Frame::reply_to(&frame.header, Command::Ok, Bytes::new()))]
        } else {
            warn!(connection_id = connection.id(), user_id, "unbind left routes behind");
            vec![error_reply(frame, ErrorCode::Internal, "unbind incomplete")]
        }
    }

    fn owns(&self, connection: &ConnectionRef, user_id: &str, client_type: u8) -> bool {
        self.router
            .lookup_local(user_id, client_type)
            .is_some_and(|local| local.connection_id() == connection.id())
    }
}

fn error_reply(request: &Frame, code: ErrorCode, reason: &str) -> DispatchAction {
    let payload = ErrorPayload::new(code, reason).encode().unwrap_or_else(|error| {
        warn!(%error, "error payload encoding failed, replying without body");
        Bytes::new()
    });
    DispatchAction::SendFrame(Frame::reply_to(&request.header, Command::Error, payload))
}
