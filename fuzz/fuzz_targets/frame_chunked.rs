//! Feed one byte stream to the codec in arbitrary chunks.
//!
//! The frames seen must not depend on how the stream was split.

#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use pushgate_proto::{Frame, FrameCodec};

fn decode_all(codec: &FrameCodec, chunks: &[&[u8]]) -> (Vec<Frame>, bool) {
    let mut buf = BytesMut::new();
    let mut frames = Vec::new();
    for chunk in chunks {
        buf.extend_from_slice(chunk);
        match codec.decode(&mut buf) {
            Ok(Some(batch)) => frames.extend(batch),
            Ok(None) => {},
            Err(_) => return (frames, true),
        }
    }
    (frames, false)
}

fuzz_target!(|input: (u8, &[u8])| {
    let (step, data) = input;
    let step = usize::from(step.max(1));
    let codec = FrameCodec::with_max_payload(64 * 1024);

    let (whole, whole_failed) = decode_all(&codec, &[data]);
    let chunks: Vec<&[u8]> = data.chunks(step).collect();
    let (split, split_failed) = decode_all(&codec, &chunks);

    assert_eq!(whole_failed, split_failed);
    if !whole_failed {
        assert_eq!(whole, split);
    }
});
