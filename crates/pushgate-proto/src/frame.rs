//! Complete protocol frame: header plus payload.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{command::Command, header::FrameHeader};

/// One complete unit of the wire protocol.
///
/// Immutable once built. The header's length field always matches the
/// payload, since [`Frame::new`] derives it from the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Fixed header
    pub header: FrameHeader,

    /// Opaque payload bytes
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame, setting the header length from the payload.
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        header.set_length(payload.len() as i32);
        Self { header, payload }
    }

    /// Build a reply frame carrying `command` and echoing the request's
    /// sequence number so the client can correlate it.
    pub fn reply_to(request: &FrameHeader, command: Command, payload: impl Into<Bytes>) -> Self {
        let mut header = FrameHeader::new(command);
        header.set_sequence(request.sequence());
        Self::new(header, payload)
    }

    /// Total encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }

    /// Append the encoded frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);
    }

    /// Encode the frame into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }
}
