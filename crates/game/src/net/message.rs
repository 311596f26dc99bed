use glam::Vec2;
use uuid::Uuid;

use super::protocol::Command;
use super::wire::{WireError, WireReader, WireWriter};
use crate::map::Rect;

/// Messages a connected client may place after the packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    None,
    Sync,
    Enter,
    Exit,
    Disconnect,
    MoveShoot { tick: u16, buttons: u8 },
}

impl ClientMessage {
    pub fn command(&self) -> Command {
        match self {
            Self::None => Command::None,
            Self::Sync => Command::Sync,
            Self::Enter => Command::Enter,
            Self::Exit => Command::Exit,
            Self::Disconnect => Command::Disconnect,
            Self::MoveShoot { .. } => Command::MoveShoot,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::MoveShoot { .. } => 4,
            _ => 1,
        }
    }

    pub fn decode(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        let tag = reader.read_u8()?;
        match Command::try_from(tag)? {
            Command::None => Ok(Self::None),
            Command::Sync => Ok(Self::Sync),
            Command::Enter => Ok(Self::Enter),
            Command::Exit => Ok(Self::Exit),
            Command::Disconnect => Ok(Self::Disconnect),
            Command::MoveShoot => Ok(Self::MoveShoot {
                tick: reader.read_u16()?,
                buttons: reader.read_u8()?,
            }),
            _ => Err(WireError::UnknownTag(tag)),
        }
    }

    pub fn encode(&self, writer: &mut WireWriter<'_>) -> Result<(), WireError> {
        writer.write_u8(self.command() as u8)?;
        if let Self::MoveShoot { tick, buttons } = self {
            writer.write_u16(*tick)?;
            writer.write_u8(*buttons)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub body_id: u16,
    pub position: Vec2,
    pub velocity: Vec2,
}

impl BodyState {
    pub const SIZE: usize = 18;
}

/// Largest number of body states a single SYNC reply carries.
pub const MAX_SYNC_BODIES: usize = 48;

#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Shutup,
    Sync {
        seq: u16,
        time_ms: u64,
        bodies: Vec<BodyState>,
    },
    Enter {
        player_id: Uuid,
        body_id: u16,
        x: u32,
        y: u32,
    },
    Exit {
        body_id: u16,
    },
    MoveShoot {
        body_id: u16,
        tick: u16,
        buttons: u8,
    },
    DebugRect {
        seq: u16,
        rect: Rect,
    },
}

impl ServerMessage {
    pub fn command(&self) -> Command {
        match self {
            Self::Shutup => Command::Shutup,
            Self::Sync { .. } => Command::Sync,
            Self::Enter { .. } => Command::Enter,
            Self::Exit { .. } => Command::Exit,
            Self::MoveShoot { .. } => Command::MoveShoot,
            Self::DebugRect { .. } => Command::DebugRect,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Shutup => 1,
            Self::Sync { bodies, .. } => {
                12 + BodyState::SIZE * bodies.len().min(u8::MAX as usize)
            }
            Self::Enter { .. } => 27,
            Self::Exit { .. } => 3,
            Self::MoveShoot { .. } => 6,
            Self::DebugRect { .. } => 19,
        }
    }

    pub fn encode(&self, writer: &mut WireWriter<'_>) -> Result<(), WireError> {
        writer.write_u8(self.command() as u8)?;
        match self {
            Self::Shutup => {}
            Self::Sync {
                seq,
                time_ms,
                bodies,
            } => {
                writer.write_u16(*seq)?;
                writer.write_u64(*time_ms)?;
                writer.write_u8(bodies.len().min(u8::MAX as usize) as u8)?;
                for body in bodies.iter().take(u8::MAX as usize) {
                    writer.write_u16(body.body_id)?;
                    writer.write_f32(body.position.x)?;
                    writer.write_f32(body.position.y)?;
                    writer.write_f32(body.velocity.x)?;
                    writer.write_f32(body.velocity.y)?;
                }
            }
            Self::Enter {
                player_id,
                body_id,
                x,
                y,
            } => {
                writer.write_uuid(player_id)?;
                writer.write_u16(*body_id)?;
                writer.write_u32(*x)?;
                writer.write_u32(*y)?;
            }
            Self::Exit { body_id } => writer.write_u16(*body_id)?,
            Self::MoveShoot {
                body_id,
                tick,
                buttons,
            } => {
                writer.write_u16(*body_id)?;
                writer.write_u16(*tick)?;
                writer.write_u8(*buttons)?;
            }
            Self::DebugRect { seq, rect } => {
                writer.write_u16(*seq)?;
                writer.write_f32(rect.x)?;
                writer.write_f32(rect.y)?;
                writer.write_f32(rect.w)?;
                writer.write_f32(rect.h)?;
            }
        }
        Ok(())
    }

    /// Decodes a server message. Used by tests and tooling that play the
    /// client side of the protocol.
    pub fn decode(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        let tag = reader.read_u8()?;
        Ok(match Command::try_from(tag)? {
            Command::Shutup => Self::Shutup,
            Command::Sync => {
                let seq = reader.read_u16()?;
                let time_ms = reader.read_u64()?;
                let count = reader.read_u8()? as usize;
                let mut bodies = Vec::with_capacity(count);
                for _ in 0..count {
                    bodies.push(BodyState {
                        body_id: reader.read_u16()?,
                        position: Vec2::new(reader.read_f32()?, reader.read_f32()?),
                        velocity: Vec2::new(reader.read_f32()?, reader.read_f32()?),
                    });
                }
                Self::Sync {
                    seq,
                    time_ms,
                    bodies,
                }
            }
            Command::Enter => Self::Enter {
                player_id: reader.read_uuid()?,
                body_id: reader.read_u16()?,
                x: reader.read_u32()?,
                y: reader.read_u32()?,
            },
            Command::Exit => Self::Exit {
                body_id: reader.read_u16()?,
            },
            Command::MoveShoot => Self::MoveShoot {
                body_id: reader.read_u16()?,
                tick: reader.read_u16()?,
                buttons: reader.read_u8()?,
            },
            Command::DebugRect => Self::DebugRect {
                seq: reader.read_u16()?,
                rect: Rect::new(
                    reader.read_f32()?,
                    reader.read_f32()?,
                    reader.read_f32()?,
                    reader.read_f32()?,
                ),
            },
            _ => return Err(WireError::UnknownTag(tag)),
        })
    }
}

/// A decoded client message tagged with its sender and message sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundMessage {
    pub player_id: Uuid,
    pub seq: u16,
    pub message: ClientMessage,
}
