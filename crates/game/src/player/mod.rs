mod config;
mod registry;
mod state;

pub use config::PlayerStats;
pub use registry::{Player, PlayerRegistry};
pub use state::PlayerStatus;
