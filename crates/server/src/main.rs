mod config;
mod server;
mod world_link;

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use spacesim::net::{DEFAULT_UDP_PORT, PROTOCOL_NAME, PROTOCOL_VERSION};
use spacesim::SimConfig;

use config::ServerConfig;
use server::GameServer;

#[derive(Parser)]
#[command(name = "spacesim-server")]
#[command(about = "Authoritative physics simulation for the space game")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    #[arg(short, long, default_value_t = DEFAULT_UDP_PORT)]
    port: u16,

    #[arg(short, long, default_value = "127.0.0.1:9494", help = "World service address")]
    world: SocketAddr,

    #[arg(long, requires = "spawn_y", help = "Spawn cell column (default: map centre)")]
    spawn_x: Option<u32>,

    #[arg(long, requires = "spawn_x", help = "Spawn cell row (default: map centre)")]
    spawn_y: Option<u32>,

    #[arg(long, default_value_t = 33, value_parser = clap::value_parser!(u64).range(1..))]
    timestep_ms: u64,

    #[arg(long, default_value_t = 30, help = "Frames between body reports to the world service")]
    world_rate: u32,

    #[arg(long, default_value_t = 12, help = "Frames added to every client input tick")]
    input_delay: i32,

    #[arg(long, help = "Send MOVESHOOT back to the player who sent it")]
    echo_input: bool,

    #[arg(long, help = "Send collision rects to the colliding player")]
    debug_rects: bool,

    #[arg(long, default_value_t = 0.0, help = "Outbound packet loss percentage (0-100)")]
    loss_percent: f32,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let mut sim = SimConfig::new(PROTOCOL_NAME, PROTOCOL_VERSION);
        sim.timestep = Duration::from_millis(self.timestep_ms);
        sim.world_rate = self.world_rate;
        sim.input_delay = self.input_delay;
        sim.echo_input = self.echo_input;
        sim.debug_rects = self.debug_rects;

        ServerConfig {
            bind: self.bind,
            port: self.port,
            world_addr: self.world,
            spawn_cell: self.spawn_x.zip(self.spawn_y),
            loss_percent: self.loss_percent,
            sim,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    log::info!(
        "{} {} (protocol id {}), timestep {:?}",
        config.sim.name,
        config.sim.version,
        config.sim.protocol_id,
        config.sim.timestep
    );

    let server = GameServer::start(config).await?;
    log::info!("server started on {}", server.local_addr()?);
    server.run().await?;
    log::info!("server stopped");
    Ok(())
}
