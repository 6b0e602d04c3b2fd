//! Wire format for the Pushgate protocol.
//!
//! Frames consist of a fixed 13-byte big-endian header followed by an opaque
//! payload of exactly `length` bytes. The header carries a two-byte magic
//! constant, a command byte, a sequence number used for request/response
//! correlation, and a flags byte.
//!
//! Edge nodes hold a very large number of long-lived sockets, so the codec is
//! stateless: every call to [`FrameCodec::decode`] works directly on the
//! connection's receive buffer and leaves partial frames in place for the next
//! read.
//!
//! # Security
//!
//! Header parsing uses compile-time verified layouts via `zerocopy`. Declared
//! payload lengths are checked against a 10 MiB limit before any payload byte
//! is consumed, and a bad magic is rejected as soon as two bytes are
//! buffered. Neither failure is explained to the peer.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod command;
pub mod errors;
pub mod flags;
pub mod frame;
pub mod header;
pub mod payloads;

pub use codec::{DecodedBatch, FrameCodec};
pub use command::Command;
pub use errors::{ProtocolError, Result};
pub use flags::FrameFlags;
pub use frame::Frame;
pub use header::FrameHeader;
pub use payloads::{BindPayload, ErrorCode, ErrorPayload};
