//! Decode arbitrary bytes as control payloads. Must never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pushgate_proto::{BindPayload, ErrorPayload};

fuzz_target!(|data: &[u8]| {
    if let Ok(bind) = BindPayload::decode(data) {
        let encoded = bind.encode().unwrap();
        assert_eq!(BindPayload::decode(&encoded).unwrap(), bind);
    }
    let _ = ErrorPayload::decode(data);
});
