use super::wire::{WireError, WireReader, WireWriter};

pub const DEFAULT_UDP_PORT: u16 = 9495;
pub const DEFAULT_WORLD_PORT: u16 = 9494;
pub const MAX_MSG_SIZE: usize = 1024;
pub const HEADER_SIZE: usize = 17;
pub const PROTOCOL_NAME: &str = "SPACE-PHYS";
pub const PROTOCOL_VERSION: &str = "0.0.1";

const SEQUENCE_WRAP_THRESHOLD: u16 = 32768;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    None = 0,
    Hello = 1,
    Shutup = 2,
    Disconnect = 3,
    Challenge = 4,
    Welcome = 5,
    Sync = 6,
    Enter = 7,
    Exit = 8,
    MoveShoot = 9,
    DebugRect = 10,
}

impl TryFrom<u8> for Command {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::None,
            1 => Self::Hello,
            2 => Self::Shutup,
            3 => Self::Disconnect,
            4 => Self::Challenge,
            5 => Self::Welcome,
            6 => Self::Sync,
            7 => Self::Enter,
            8 => Self::Exit,
            9 => Self::MoveShoot,
            10 => Self::DebugRect,
            other => return Err(WireError::UnknownTag(other)),
        })
    }
}

/// `true` when `s1` is newer than `s2` on the 16-bit circle.
#[inline]
pub fn sequence_greater_than(s1: u16, s2: u16) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

/// SDBM string hash, used to derive the protocol id from name and version.
pub fn protocol_id(name: &str, version: &str) -> u32 {
    name.bytes()
        .chain(version.bytes())
        .fold(0u32, |hash, c| {
            (c as u32)
                .wrapping_add(hash << 6)
                .wrapping_add(hash << 16)
                .wrapping_sub(hash)
        })
}

/// Reads the leading protocol id without validating anything else.
pub fn peek_protocol_id(packet: &[u8]) -> Option<u32> {
    WireReader::new(packet).read_u32().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub protocol_id: u32,
    pub salt: i64,
    pub ack: u16,
    pub seq: u16,
    pub redundancy: u8,
}

impl PacketHeader {
    pub fn encode(&self, writer: &mut WireWriter<'_>) -> Result<(), WireError> {
        writer.write_u32(self.protocol_id)?;
        writer.write_i64(self.salt)?;
        writer.write_u16(self.ack)?;
        writer.write_u16(self.seq)?;
        writer.write_u8(self.redundancy)
    }

    pub fn decode(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            protocol_id: reader.read_u32()?,
            salt: reader.read_i64()?,
            ack: reader.read_u16()?,
            seq: reader.read_u16()?,
            redundancy: reader.read_u8()?,
        })
    }
}
