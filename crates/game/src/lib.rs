pub mod config;
pub mod map;
pub mod net;
pub mod physics;
pub mod player;
pub mod simulation;

pub use config::SimConfig;
pub use map::{GridMap, MapError, Rect, WorldGeometry};
pub use net::{
    ClientMessage, Command, ConnectionState, Connector, InboundMessage, PacketHeader,
    ReliableChannel, ServerMessage, Transmit, WireError, WorldCommand, WorldEvent,
};
pub use physics::{Buttons, CollisionResolver, ControlledBody, HistoricalTransform, StateHistory};
pub use player::{Player, PlayerRegistry, PlayerStats, PlayerStatus};
pub use simulation::{ArenaError, BodyArena, BodyHandle, SimState, Simulation};
