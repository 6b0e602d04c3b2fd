//! Fixed-size frame header.
//!
//! ```text
//!  0      1      2        3         4..8        8      9..13
//! +------+------+--------+---------+-----------+------+-----------+
//! | 0xBC | 0xC0 | command| reserved| sequence  | flags| length    |
//! +------+------+--------+---------+-----------+------+-----------+
//!                                   i32 BE             i32 BE
//! ```

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{BigEndian, I32},
};

use crate::{
    command::Command,
    errors::{ProtocolError, Result},
    flags::FrameFlags,
};

/// Frame header, laid out exactly as it appears on the wire.
///
/// Every field is byte-aligned, so the struct has no padding and can be read
/// straight out of a receive buffer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned,
)]
#[repr(C)]
pub struct FrameHeader {
    magic: [u8; 2],
    command: u8,
    reserved: u8,
    sequence: I32<BigEndian>,
    flags: u8,
    length: I32<BigEndian>,
}

impl FrameHeader {
    /// Size of the encoded header in bytes.
    pub const SIZE: usize = 13;

    /// Magic constant opening every frame.
    pub const MAGIC: [u8; 2] = [0xBC, 0xC0];

    /// Create a header for the given command with zeroed sequence, flags, and
    /// length.
    pub fn new(command: Command) -> Self {
        Self::with_raw_command(command.to_u8())
    }

    /// Create a header carrying an arbitrary command byte.
    pub fn with_raw_command(command: u8) -> Self {
        Self {
            magic: Self::MAGIC,
            command,
            reserved: 0,
            sequence: I32::new(0),
            flags: 0,
            length: I32::new(0),
        }
    }

    /// Parse a header from the start of `bytes`.
    ///
    /// Validates the magic but not the length; length policy belongs to the
    /// codec.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (header, _rest) = Self::read_from_prefix(bytes).map_err(|_| {
            ProtocolError::HeaderTooShort { expected: Self::SIZE, actual: bytes.len() }
        })?;

        if header.magic != Self::MAGIC {
            return Err(ProtocolError::UnknownFrame { found: u16::from_be_bytes(header.magic) });
        }

        Ok(header)
    }

    /// Encoded header bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Raw command byte.
    pub fn command(&self) -> u8 {
        self.command
    }

    /// Command as a known enum value, if recognized.
    pub fn command_enum(&self) -> Option<Command> {
        Command::from_u8(self.command)
    }

    /// Reserved byte. Carried through unchanged.
    pub fn reserved(&self) -> u8 {
        self.reserved
    }

    /// Correlation sequence number.
    pub fn sequence(&self) -> i32 {
        self.sequence.get()
    }

    /// Frame flags.
    pub fn flags(&self) -> FrameFlags {
        FrameFlags::from_byte(self.flags)
    }

    /// Declared payload length. May be negative on untrusted input.
    pub fn length(&self) -> i32 {
        self.length.get()
    }

    /// Set the command byte.
    pub fn set_command(&mut self, command: Command) {
        self.command = command.to_u8();
    }

    /// Set the reserved byte.
    pub fn set_reserved(&mut self, reserved: u8) {
        self.reserved = reserved;
    }

    /// Set the correlation sequence number.
    pub fn set_sequence(&mut self, sequence: i32) {
        self.sequence = I32::new(sequence);
    }

    /// Set the flags byte.
    pub fn set_flags(&mut self, flags: FrameFlags) {
        self.flags = flags.bits();
    }

    pub(crate) fn set_length(&mut self, length: i32) {
        self.length = I32::new(length);
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn header_is_thirteen_bytes() {
        assert_eq!(std::mem::size_of::<FrameHeader>(), FrameHeader::SIZE);
    }

    #[test]
    fn encodes_big_endian() {
        let mut header = FrameHeader::new(Command::Dispatch);
        header.set_sequence(0x0102_0304);
        header.set_flags(FrameFlags::BIZ_ACK);
        header.set_length(12);

        assert_eq!(header.to_bytes(), hex!("bcc0 06 00 01020304 04 0000000c"));
    }

    #[test]
    fn parses_fields() {
        let bytes = hex!("bcc0 01 07 ffffffff 03 00000004");
        let header = FrameHeader::from_bytes(&bytes).unwrap();

        assert_eq!(header.command_enum(), Some(Command::Heartbeat));
        assert_eq!(header.reserved(), 7);
        assert_eq!(header.sequence(), -1);
        assert_eq!(header.flags(), FrameFlags::CRYPTO | FrameFlags::COMPRESS);
        assert_eq!(header.length(), 4);
    }

    #[test]
    fn rejects_swapped_magic() {
        let bytes = hex!("c0bc 01 00 00000001 00 00000000");
        assert_eq!(
            FrameHeader::from_bytes(&bytes),
            Err(ProtocolError::UnknownFrame { found: 0xC0BC })
        );
    }

    #[test]
    fn rejects_short_slice() {
        let bytes = hex!("bcc0 01 00");
        assert!(matches!(
            FrameHeader::from_bytes(&bytes),
            Err(ProtocolError::HeaderTooShort { expected: 13, actual: 4 })
        ));
    }

    #[test]
    fn unknown_command_is_preserved() {
        let header = FrameHeader::with_raw_command(0x7F);
        assert_eq!(header.command(), 0x7F);
        assert_eq!(header.command_enum(), None);
    }
}
