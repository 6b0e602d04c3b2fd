//! Stream framing codec.
//!
//! The codec holds no per-connection state. Each [`FrameCodec::decode`] call
//! consumes as many complete frames as the receive buffer holds and leaves any
//! trailing partial frame untouched, so the caller simply appends the next
//! read and decodes again.

use bytes::BytesMut;

use crate::{
    errors::{ProtocolError, Result},
    frame::Frame,
    header::FrameHeader,
};

/// Largest payload accepted by default: 10 MiB.
pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Most the codec pre-allocates for a partial frame. The rest grows with the
/// bytes that actually arrive.
const RESERVE_LIMIT: usize = 64 * 1024;

/// Frames fully assembled by one decode call, in arrival order.
///
/// Never empty: a call that completes no frame returns `None` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBatch {
    frames: Vec<Frame>,
}

impl DecodedBatch {
    /// Number of frames in the batch.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false for a batch returned by the codec.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames in arrival order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Iterate frames in arrival order.
    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.frames.iter()
    }

    /// Take ownership of the frames.
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

impl IntoIterator for DecodedBatch {
    type Item = Frame;
    type IntoIter = std::vec::IntoIter<Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}

impl<'a> IntoIterator for &'a DecodedBatch {
    type Item = &'a Frame;
    type IntoIter = std::slice::Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

/// Decoder/encoder for the Pushgate wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    max_payload: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Codec with the default 10 MiB payload limit.
    pub fn new() -> Self {
        Self { max_payload: MAX_PAYLOAD_SIZE }
    }

    /// Codec with a custom payload limit.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self { max_payload }
    }

    /// Payload limit in force.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Decode every complete frame at the front of `src`.
    ///
    /// Returns `Ok(None)` when not even one frame is complete; `src` is left
    /// exactly as it was and the caller should retry after the next read.
    /// Consumed bytes are removed from `src`; a trailing partial frame stays.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::UnknownFrame`] as soon as two buffered bytes at a
    ///   frame boundary are not the magic constant.
    /// - [`ProtocolError::FrameSizeLimit`] when a header declares more than
    ///   [`FrameCodec::max_payload`] bytes. Raised before any payload is read.
    /// - [`ProtocolError::NegativeLength`] when a header declares a negative
    ///   length.
    ///
    /// All three are fatal for the connection. Frames already assembled in the
    /// failing call are dropped along with it.
    pub fn decode(&self, src: &mut BytesMut) -> Result<Option<DecodedBatch>> {
        let mut frames = Vec::new();

        loop {
            let magic_len = FrameHeader::MAGIC.len();
            if src.len() >= magic_len && src[..magic_len] != FrameHeader::MAGIC {
                return Err(ProtocolError::UnknownFrame {
                    found: u16::from_be_bytes([src[0], src[1]]),
                });
            }

            if src.len() < FrameHeader::SIZE {
                break;
            }

            let header = FrameHeader::from_bytes(&src[..FrameHeader::SIZE])?;
            let payload_len = self.checked_length(&header)?;
            let frame_len = FrameHeader::SIZE + payload_len;

            if src.len() < frame_len {
                src.reserve((frame_len - src.len()).min(RESERVE_LIMIT));
                break;
            }

            let mut raw = src.split_to(frame_len);
            let payload = raw.split_off(FrameHeader::SIZE).freeze();
            frames.push(Frame { header, payload });
        }

        if frames.is_empty() { Ok(None) } else { Ok(Some(DecodedBatch { frames })) }
    }

    /// Append the encoded frame to `dst`.
    pub fn encode(&self, frame: &Frame, dst: &mut BytesMut) {
        frame.encode(dst);
    }

    fn checked_length(&self, header: &FrameHeader) -> Result<usize> {
        let declared = header.length();
        let Ok(len) = usize::try_from(declared) else {
            return Err(ProtocolError::NegativeLength(declared));
        };

        if len > self.max_payload {
            return Err(ProtocolError::FrameSizeLimit { declared, max: self.max_payload });
        }

        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, Bytes};
    use hex_literal::hex;

    use super::*;
    use crate::command::Command;

    fn raw_frame(command: u8, sequence: i32, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.put_slice(&FrameHeader::MAGIC);
        buf.put_u8(command);
        buf.put_u8(0);
        buf.put_i32(sequence);
        buf.put_u8(0);
        buf.put_i32(payload.len() as i32);
        buf.put_slice(payload);
        buf
    }

    fn header_with_length(length: i32) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_slice(&FrameHeader::MAGIC);
        buf.put_u8(1);
        buf.put_u8(0);
        buf.put_i32(1);
        buf.put_u8(0);
        buf.put_i32(length);
        buf
    }

    #[test]
    fn header_with_short_payload_is_absent() {
        let codec = FrameCodec::new();
        let mut buf = header_with_length(1);

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), FrameHeader::SIZE, "partial frame must not be consumed");
    }

    #[test]
    fn partial_then_rest_yields_frame() {
        let codec = FrameCodec::new();
        let wire = raw_frame(Command::Dispatch.to_u8(), 7, b"Hello,World!");
        let (first, rest) = wire.split_at(FrameHeader::SIZE + 5);

        let mut buf = BytesMut::from(first);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(rest);
        let batch = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.frames()[0].header.sequence(), 7);
        assert_eq!(batch.frames()[0].payload, Bytes::from_static(b"Hello,World!"));
        assert!(buf.is_empty());
    }

    #[test]
    fn swapped_magic_fails_with_only_two_bytes() {
        let codec = FrameCodec::new();
        let mut buf = BytesMut::from(&hex!("c0bc")[..]);

        assert_eq!(codec.decode(&mut buf), Err(ProtocolError::UnknownFrame { found: 0xC0BC }));
    }

    #[test]
    fn swapped_magic_in_full_header_fails() {
        let codec = FrameCodec::new();
        let mut buf = BytesMut::from(&hex!("c0bc 01 00 00000001 00 00000000")[..]);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownFrame { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn single_byte_waits_for_more() {
        let codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0xBC_u8][..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn oversized_length_is_rejected_before_payload() {
        let codec = FrameCodec::new();
        let mut buf = header_with_length((MAX_PAYLOAD_SIZE + 1) as i32);

        assert_eq!(
            codec.decode(&mut buf),
            Err(ProtocolError::FrameSizeLimit {
                declared: 10_485_761,
                max: MAX_PAYLOAD_SIZE,
            })
        );
    }

    #[test]
    fn max_length_is_accepted() {
        let codec = FrameCodec::new();
        let mut buf = header_with_length(MAX_PAYLOAD_SIZE as i32);

        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.put_bytes(0xAB, MAX_PAYLOAD_SIZE);
        let batch = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.frames()[0].payload.len(), MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn header_alone_does_not_allocate_declared_payload() {
        let codec = FrameCodec::new();
        let mut buf = header_with_length(MAX_PAYLOAD_SIZE as i32);

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(
            buf.capacity() <= FrameHeader::SIZE + 2 * RESERVE_LIMIT,
            "capacity {} after a bare header",
            buf.capacity()
        );
    }

    #[test]
    fn negative_length_is_fatal() {
        let codec = FrameCodec::new();
        let mut buf = header_with_length(-1);

        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err, ProtocolError::NegativeLength(-1));
        assert!(err.is_fatal());
    }

    #[test]
    fn coalesced_frames_decode_in_order() {
        let codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&raw_frame(1, 1, b"Hello,World!"));
        buf.extend_from_slice(&raw_frame(1, 1, b"HaHa"));

        let batch = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.frames()[0].payload, Bytes::from_static(b"Hello,World!"));
        assert_eq!(batch.frames()[1].payload, Bytes::from_static(b"HaHa"));
        assert!(buf.is_empty());
    }

    #[test]
    fn complete_frames_are_returned_and_partial_tail_kept() {
        let codec = FrameCodec::new();
        let second = raw_frame(6, 2, b"tail");
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&raw_frame(6, 1, b"head"));
        buf.extend_from_slice(&second[..FrameHeader::SIZE + 1]);

        let batch = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.frames()[0].header.sequence(), 1);
        assert_eq!(&buf[..], &second[..FrameHeader::SIZE + 1]);
    }

    #[test]
    fn bad_magic_after_good_frame_fails_whole_call() {
        let codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&raw_frame(6, 1, b"ok"));
        buf.extend_from_slice(&hex!("dead"));

        assert!(matches!(codec.decode(&mut buf), Err(ProtocolError::UnknownFrame { .. })));
    }

    #[test]
    fn empty_payload_frame_decodes() {
        let codec = FrameCodec::new();
        let mut buf = BytesMut::from(&raw_frame(Command::Heartbeat.to_u8(), 3, b"")[..]);

        let batch = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(batch.frames()[0].header.command_enum(), Some(Command::Heartbeat));
        assert!(batch.frames()[0].payload.is_empty());
    }

    #[test]
    fn custom_limit_applies() {
        let codec = FrameCodec::with_max_payload(4);
        let mut buf = BytesMut::from(&raw_frame(6, 1, b"12345")[..]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::FrameSizeLimit { declared: 5, max: 4 })
        ));
    }

    #[test]
    fn encode_matches_wire_layout() {
        let codec = FrameCodec::new();
        let mut header = FrameHeader::new(Command::Dispatch);
        header.set_sequence(1);
        let frame = Frame::new(header, Bytes::from_static(b"HaHa"));

        let mut out = BytesMut::new();
        codec.encode(&frame, &mut out);
        assert_eq!(&out[..], &raw_frame(6, 1, b"HaHa")[..]);
    }
}
