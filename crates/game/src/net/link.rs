//! Framing for the TCP link between the simulation and the world service.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{Buf, Bytes, BytesMut};
use uuid::Uuid;

use super::wire::{WireError, WireReader, WireWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkTag {
    Ready = 1,
    Join = 2,
    Leave = 3,
    Spec = 4,
    Spawn = 5,
    State = 6,
    Shutdown = 7,
}

impl TryFrom<u8> for LinkTag {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::Ready,
            2 => Self::Join,
            3 => Self::Leave,
            4 => Self::Spec,
            5 => Self::Spawn,
            6 => Self::State,
            7 => Self::Shutdown,
            other => return Err(WireError::UnknownTag(other)),
        })
    }
}

/// Grid position of one live body, reported to the world service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyCell {
    pub body_id: u16,
    pub x: u16,
    pub y: u16,
}

/// Simulation to world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    Ready { port: u32 },
    Spawn { body_id: u16, player_id: Uuid },
    Spec { body_id: u16 },
    State(Vec<BodyCell>),
    Shutdown,
}

impl WorldEvent {
    pub fn tag(&self) -> LinkTag {
        match self {
            Self::Ready { .. } => LinkTag::Ready,
            Self::Spawn { .. } => LinkTag::Spawn,
            Self::Spec { .. } => LinkTag::Spec,
            Self::State(_) => LinkTag::State,
            Self::Shutdown => LinkTag::Shutdown,
        }
    }

    pub fn size(&self) -> usize {
        1 + match self {
            Self::Ready { .. } => 4,
            Self::Spawn { .. } => 18,
            Self::Spec { .. } => 2,
            Self::State(cells) => 2 + 6 * cells.len().min(u16::MAX as usize),
            Self::Shutdown => 0,
        }
    }

    pub fn encode(&self) -> Result<Bytes, WireError> {
        let mut buf = vec![0u8; self.size()];
        let mut writer = WireWriter::new(&mut buf);
        writer.write_u8(self.tag() as u8)?;
        match self {
            Self::Ready { port } => writer.write_u32(*port)?,
            Self::Spawn { body_id, player_id } => {
                writer.write_u16(*body_id)?;
                writer.write_uuid(player_id)?;
            }
            Self::Spec { body_id } => writer.write_u16(*body_id)?,
            Self::State(cells) => {
                let count = cells.len().min(u16::MAX as usize);
                writer.write_u16(count as u16)?;
                for cell in &cells[..count] {
                    writer.write_u16(cell.body_id)?;
                    writer.write_u16(cell.x)?;
                    writer.write_u16(cell.y)?;
                }
            }
            Self::Shutdown => {}
        }
        Ok(Bytes::from(buf))
    }
}

/// World to simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldCommand {
    Join { player_id: Uuid, ip: IpAddr },
    Leave { player_id: Uuid },
    Shutdown,
}

impl WorldCommand {
    /// Takes one complete command off the front of `buf`. Returns `Ok(None)`
    /// and leaves `buf` untouched while the command is still incomplete.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, WireError> {
        let mut reader = WireReader::new(&buf[..]);
        match Self::read(&mut reader) {
            Ok(command) => {
                let consumed = reader.position();
                buf.advance(consumed);
                Ok(Some(command))
            }
            Err(WireError::Underflow { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        let tag = reader.read_u8()?;
        match LinkTag::try_from(tag)? {
            LinkTag::Join => {
                let player_id = reader.read_uuid()?;
                let len = reader.read_u8()?;
                let ip = match len {
                    4 => {
                        let octets: [u8; 4] = reader
                            .read_bytes(4)?
                            .try_into()
                            .map_err(|_| WireError::IpLength(len))?;
                        IpAddr::V4(Ipv4Addr::from(octets))
                    }
                    16 => {
                        let octets: [u8; 16] = reader
                            .read_bytes(16)?
                            .try_into()
                            .map_err(|_| WireError::IpLength(len))?;
                        Ipv6Addr::from(octets).to_canonical()
                    }
                    other => return Err(WireError::IpLength(other)),
                };
                Ok(Self::Join { player_id, ip })
            }
            LinkTag::Leave => Ok(Self::Leave {
                player_id: reader.read_uuid()?,
            }),
            LinkTag::Shutdown => Ok(Self::Shutdown),
            _ => Err(WireError::UnknownTag(tag)),
        }
    }

    /// Encodes the command the way the world service does.
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let size = match self {
            Self::Join { ip: IpAddr::V4(_), .. } => 1 + 16 + 1 + 4,
            Self::Join { ip: IpAddr::V6(_), .. } => 1 + 16 + 1 + 16,
            Self::Leave { .. } => 1 + 16,
            Self::Shutdown => 1,
        };
        let mut buf = vec![0u8; size];
        let mut writer = WireWriter::new(&mut buf);
        match self {
            Self::Join { player_id, ip } => {
                writer.write_u8(LinkTag::Join as u8)?;
                writer.write_uuid(player_id)?;
                match ip {
                    IpAddr::V4(v4) => {
                        writer.write_u8(4)?;
                        writer.write_bytes(&v4.octets())?;
                    }
                    IpAddr::V6(v6) => {
                        writer.write_u8(16)?;
                        writer.write_bytes(&v6.octets())?;
                    }
                }
            }
            Self::Leave { player_id } => {
                writer.write_u8(LinkTag::Leave as u8)?;
                writer.write_uuid(player_id)?;
            }
            Self::Shutdown => writer.write_u8(LinkTag::Shutdown as u8)?,
        }
        Ok(Bytes::from(buf))
    }
}

/// Leading frame of the map transfer: byte count and cell resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapHeader {
    pub byte_count: u32,
    pub resolution: u8,
}

impl MapHeader {
    pub const SIZE: usize = 5;

    pub fn decode(bytes: &[u8; Self::SIZE]) -> Result<Self, WireError> {
        let mut reader = WireReader::new(bytes);
        Ok(Self {
            byte_count: reader.read_u32()?,
            resolution: reader.read_u8()?,
        })
    }

    pub fn encode(&self) -> Result<[u8; Self::SIZE], WireError> {
        let mut bytes = [0u8; Self::SIZE];
        let mut writer = WireWriter::new(&mut bytes);
        writer.write_u32(self.byte_count)?;
        writer.write_u8(self.resolution)?;
        Ok(bytes)
    }
}
