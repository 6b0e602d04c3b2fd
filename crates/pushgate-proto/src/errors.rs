//! Protocol error types.

use thiserror::Error;

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while decoding frames or control payloads.
///
/// Framing errors ([`ProtocolError::UnknownFrame`],
/// [`ProtocolError::FrameSizeLimit`], [`ProtocolError::NegativeLength`]) mean
/// stream alignment is lost. The owning connection must be closed; reading
/// further bytes can never recover it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// First two bytes of a frame did not match the magic constant.
    #[error("unknown frame: bad magic {found:#06x}")]
    UnknownFrame {
        /// The two bytes found where the magic was expected, big-endian.
        found: u16,
    },

    /// Declared payload length exceeds the configured limit.
    #[error("frame size limit exceeded: declared {declared} bytes, max {max}")]
    FrameSizeLimit {
        /// Length field from the header.
        declared: i32,
        /// Limit in force for this codec.
        max: usize,
    },

    /// Declared payload length is negative.
    #[error("negative frame length: {0}")]
    NegativeLength(i32),

    /// Header slice was shorter than [`crate::FrameHeader::SIZE`].
    #[error("header too short: expected {expected} bytes, got {actual}")]
    HeaderTooShort {
        /// Required size.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Control payload could not be encoded as CBOR.
    #[error("payload encode failed: {0}")]
    PayloadEncode(String),

    /// Control payload could not be decoded from CBOR.
    #[error("payload decode failed: {0}")]
    PayloadDecode(String),
}

impl ProtocolError {
    /// Whether the error leaves the byte stream unusable.
    ///
    /// Transport loops close the connection on fatal errors without sending a
    /// reply.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownFrame { .. } | Self::FrameSizeLimit { .. } | Self::NegativeLength(_)
        )
    }
}
