//! Frame command codes.

use serde_repr::{Deserialize_repr, Serialize_repr};

/// Command carried in the header's command byte.
///
/// The codec never interprets commands: an unknown byte still decodes into a
/// [`crate::Frame`] and is rejected later by whichever handler receives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Command {
    /// Keepalive. Echoed back by the server.
    Heartbeat = 1,
    /// Bind a user identity to the connection.
    Bind = 2,
    /// Release the bound identity.
    Unbind = 3,
    /// Positive acknowledgement of a request.
    Ok = 4,
    /// Error reply to a request.
    Error = 5,
    /// Application message to hand off to the delivery pipeline.
    Dispatch = 6,
}

impl Command {
    /// Convert from the raw command byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Bind),
            3 => Some(Self::Unbind),
            4 => Some(Self::Ok),
            5 => Some(Self::Error),
            6 => Some(Self::Dispatch),
            _ => None,
        }
    }

    /// Raw command byte.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Commands a client may send to the gateway.
    pub fn is_client_request(self) -> bool {
        matches!(self, Self::Heartbeat | Self::Bind | Self::Unbind | Self::Dispatch)
    }
}

impl From<Command> for u8 {
    fn from(command: Command) -> Self {
        command.to_u8()
    }
}
