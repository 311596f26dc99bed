use std::time::Duration;

use crate::net::{protocol_id, MAX_MSG_SIZE, PROTOCOL_NAME, PROTOCOL_VERSION};
use crate::player::PlayerStats;

/// Process-wide settings, fixed at startup and handed to every component.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub name: String,
    pub version: String,
    pub protocol_id: u32,
    pub timestep: Duration,
    pub world_rate: u32,
    pub max_msg_size: usize,

    pub handshake_interval: Duration,
    pub handshake_attempts: u32,
    pub peer_timeout: Duration,
    pub quiet_threshold: u32,

    pub outbound_capacity: usize,
    pub inbound_capacity: usize,
    pub world_capacity: usize,
    pub messages_per_tick: usize,

    pub input_delay: i32,
    pub echo_input: bool,
    pub debug_rects: bool,

    pub player_stats: PlayerStats,
    pub broad_size: f32,
    pub narrow_size: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::new(PROTOCOL_NAME, PROTOCOL_VERSION)
    }
}

impl SimConfig {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            protocol_id: protocol_id(name, version),
            timestep: Duration::from_millis(33),
            world_rate: 30,
            max_msg_size: MAX_MSG_SIZE,

            handshake_interval: Duration::from_millis(500),
            handshake_attempts: 20,
            peer_timeout: Duration::from_secs(5),
            quiet_threshold: 10,

            outbound_capacity: 100,
            inbound_capacity: 100,
            world_capacity: 32,
            messages_per_tick: 50,

            input_delay: 12,
            echo_input: false,
            debug_rects: false,

            player_stats: PlayerStats::default(),
            broad_size: 96.0,
            narrow_size: 30.0,
        }
    }

    pub fn timestep_millis(&self) -> u64 {
        self.timestep.as_millis() as u64
    }

    pub fn timestep_nanos(&self) -> u64 {
        self.timestep.as_nanos() as u64
    }
}
