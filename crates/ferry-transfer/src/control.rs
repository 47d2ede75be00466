//! Single-byte control alphabet.
//!
//! These values share the low byte range with payload data. They are only
//! ever read at handshake points, never inside a counted-length read, so no
//! escaping is needed.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlByte {
    /// Receiver -> sender: send the next chunk. Also terminates console output.
    Eot = 0x01,
    /// Rendezvous byte, written by the sender and echoed by the receiver.
    Bot = 0x02,
    Lok = 0x03,
    /// Verdict barrier, written by the receiver and echoed by the sender.
    Sync = 0x04,
    Ok = 0x05,
    Rsd = 0x06,
    /// Chunk trailer matched.
    Sok = 0x07,
    /// Chunk trailer mismatch: resend.
    Nok = 0x08,
}

impl ControlByte {
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    pub const fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x01 => Self::Eot,
            0x02 => Self::Bot,
            0x03 => Self::Lok,
            0x04 => Self::Sync,
            0x05 => Self::Ok,
            0x06 => Self::Rsd,
            0x07 => Self::Sok,
            0x08 => Self::Nok,
            _ => return None,
        })
    }
}

impl From<ControlByte> for u8 {
    fn from(c: ControlByte) -> u8 {
        c.as_byte()
    }
}

impl TryFrom<u8> for ControlByte {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        Self::from_byte(byte).ok_or(byte)
    }
}

impl fmt::Display for ControlByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Eot => "EOT",
            Self::Bot => "BOT",
            Self::Lok => "LOK",
            Self::Sync => "SYNC",
            Self::Ok => "OK",
            Self::Rsd => "RSD",
            Self::Sok => "SOK",
            Self::Nok => "NOK",
        };
        f.write_str(name)
    }
}
