use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use spacesim::net::{DEFAULT_UDP_PORT, DEFAULT_WORLD_PORT};
use spacesim::SimConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub world_addr: SocketAddr,
    /// Cell bodies spawn in. The middle of the map when unset.
    pub spawn_cell: Option<(u32, u32)>,
    pub loss_percent: f32,
    pub stats_interval: Duration,
    pub sim: SimConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_UDP_PORT,
            world_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_WORLD_PORT),
            spawn_cell: None,
            loss_percent: 0.0,
            stats_interval: Duration::from_secs(10),
            sim: SimConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn udp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}
