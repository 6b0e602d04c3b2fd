//! Pushgate gateway server.
//!
//! Accepts TCP connections, decodes frames with the `pushgate-proto` codec
//! and drives the `pushgate-core` router and dispatch pipeline. The server
//! owns the sockets; the core only ever sees them through the
//! [`pushgate_core::Connection`] trait.
//!
//! # Architecture
//!
//! ```text
//! TcpListener ──accept──▶ per-connection task
//!                           │ read_buf → FrameCodec::decode
//!                           ▼
//!                       FrameHandler ──▶ Heartbeat / Bind / Unbind
//!                           │
//!                           ▼
//!                     DispatchPipeline ──▶ QueuePool
//!                           │
//!                  [DispatchAction] ──▶ writer task
//! ```
//!
//! Duplicate logins are enforced by a listener on the router's change
//! events (see [`kick`]).

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod kick;
pub mod server;

pub use config::ServerConfig;
pub use connection::TcpConnection;
pub use error::{Result, ServerError};
pub use handler::FrameHandler;
pub use kick::KickNotice;
pub use server::Server;
