//! Frame flags.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Per-frame flags byte.
    ///
    /// The gateway core carries these through unchanged; they describe how the
    /// opaque payload was produced and are interpreted by the endpoints.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FrameFlags: u8 {
        /// Payload is encrypted.
        const CRYPTO = 0x01;
        /// Payload is compressed.
        const COMPRESS = 0x02;
        /// Sender expects a business-level acknowledgement.
        const BIZ_ACK = 0x04;
        /// Gateway should acknowledge on receipt.
        const AUTO_ACK = 0x08;
    }
}

impl FrameFlags {
    /// Build flags from the raw header byte, keeping unknown bits.
    pub fn from_byte(value: u8) -> Self {
        Self::from_bits_retain(value)
    }
}
