mod arena;
mod command;
mod tick;

pub use arena::{ArenaError, BodyArena, BodyHandle};
pub use tick::{SimState, Simulation};
