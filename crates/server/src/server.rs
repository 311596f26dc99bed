use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use spacesim::net::LossyTransmit;
use spacesim::{PlayerRegistry, Simulation, Transmit, WorldEvent};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::ServerConfig;
use crate::world_link::WorldLink;

const RECV_BUFFER: usize = 2048;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

pub struct GameServer {
    config: ServerConfig,
    socket: Arc<UdpSocket>,
    registry: Arc<PlayerRegistry>,
    simulation: Simulation,
    link: WorldLink,
    world_rx: mpsc::Receiver<WorldEvent>,
    shutdown: Arc<Notify>,
}

impl GameServer {
    /// Connects to the world service, loads its map and binds the UDP
    /// socket. Any failure here is fatal.
    pub async fn start(config: ServerConfig) -> Result<Self> {
        let mut link = WorldLink::connect(config.world_addr).await?;
        let map = link.read_map(config.spawn_cell).await?;

        let addr = config.udp_addr();
        let socket = Arc::new(
            UdpSocket::bind(addr)
                .await
                .with_context(|| format!("failed to bind UDP socket on {}", addr))?,
        );
        log::info!("listening on udp://{}", socket.local_addr()?);

        let transmit: Arc<dyn Transmit> = if config.loss_percent > 0.0 {
            log::warn!("simulating {}% outbound packet loss", config.loss_percent);
            Arc::new(LossyTransmit::new(Arc::clone(&socket), config.loss_percent))
        } else {
            socket.clone()
        };

        let registry = Arc::new(PlayerRegistry::new(config.sim.clone(), transmit));
        let (world_tx, world_rx) = mpsc::channel(config.sim.world_capacity);
        world_tx
            .try_send(WorldEvent::Ready {
                port: config.port as u32,
            })
            .context("world queue rejected ready")?;

        let mut simulation = Simulation::new(config.sim.clone(), Arc::clone(&registry), world_tx);
        simulation.start(Arc::new(map), Instant::now());

        Ok(Self {
            config,
            socket,
            registry,
            simulation,
            link,
            world_rx,
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Runs until ctrl-c or until the world service goes away.
    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            socket,
            registry,
            simulation,
            link,
            world_rx,
            shutdown,
        } = self;

        let (outbound, inbound) = link.spawn(world_rx, Arc::clone(&registry), Arc::clone(&shutdown));
        let receiver = tokio::spawn(receive_loop(socket, Arc::clone(&registry)));
        let ticker = tokio::spawn(tick_loop(simulation, registry, config.stats_interval));

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for ctrl-c")?;
                log::info!("received ctrl-c, shutting down");
            }
            _ = shutdown.notified() => {
                log::info!("world link ended, shutting down");
            }
        }

        receiver.abort();
        inbound.abort();
        stop(ticker).await;

        // The simulation held the last event sender, so the writer drains
        // what is queued and says goodbye.
        if tokio::time::timeout(SHUTDOWN_GRACE, outbound).await.is_err() {
            log::warn!("world link did not flush before shutdown");
        }
        Ok(())
    }
}

async fn stop(task: JoinHandle<()>) {
    task.abort();
    if let Err(e) = task.await {
        if !e.is_cancelled() {
            log::warn!("task failed during shutdown: {}", e);
        }
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, registry: Arc<PlayerRegistry>) {
    let mut buf = [0u8; RECV_BUFFER];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, addr)) => {
                let packet = buf[..len].to_vec();
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry.receive(&packet, addr, Instant::now());
                });
            }
            Err(e) => {
                log::warn!("udp receive failed: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

async fn tick_loop(mut simulation: Simulation, registry: Arc<PlayerRegistry>, stats_every: Duration) {
    let mut ticker = interval(simulation.timestep());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_report = Instant::now();

    loop {
        ticker.tick().await;
        let now = Instant::now();
        simulation.tick(now);

        if now.duration_since(last_report) >= stats_every {
            last_report = now;
            report(&simulation, &registry);
        }
    }
}

fn report(simulation: &Simulation, registry: &PlayerRegistry) {
    log::info!(
        "frame {} (seq {}), {} players, {} bodies",
        simulation.frame(),
        simulation.seq(),
        registry.len(),
        simulation.body_count()
    );
    for player in registry.snapshot() {
        let stats = player.channel_stats();
        log::debug!(
            "{} ({}) {:?}: sent {} pkts/{} B, received {} pkts/{} B, dropped {}, acked {}, rtt {:.1}±{:.1} ms",
            player.id(),
            player.ip(),
            player.status(),
            stats.packets_sent,
            stats.bytes_sent,
            stats.packets_received,
            stats.bytes_received,
            stats.packets_dropped,
            stats.messages_acked,
            stats.rtt_ms,
            stats.rtt_variance
        );
    }
}
