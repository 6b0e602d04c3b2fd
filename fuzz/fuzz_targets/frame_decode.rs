//! Decode arbitrary bytes as a frame stream.
//!
//! Must never panic. Every decoded frame re-encodes to exactly the bytes it
//! was read from.

#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use pushgate_proto::{FrameCodec, FrameHeader};

fuzz_target!(|data: &[u8]| {
    let codec = FrameCodec::with_max_payload(64 * 1024);
    let mut buf = BytesMut::from(data);

    let Ok(Some(batch)) = codec.decode(&mut buf) else {
        return;
    };

    let mut offset = 0;
    for frame in &batch {
        let len = frame.encoded_len();
        assert_eq!(&frame.to_bytes()[..], &data[offset..offset + len]);
        assert_eq!(frame.payload.len() + FrameHeader::SIZE, len);
        offset += len;
    }
    assert_eq!(buf.len(), data.len() - offset);
});
