use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use bytes::BytesMut;
use spacesim::net::{MapHeader, WorldCommand, WorldEvent};
use spacesim::{GridMap, PlayerRegistry};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

const MAX_MAP_BYTES: u32 = 1 << 26;

/// TCP connection to the world service.
pub struct WorldLink {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

impl WorldLink {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("world service unreachable at {}", addr))?;
        stream.set_nodelay(true)?;
        log::info!("connected to world service at {}", addr);

        let (reader, writer) = stream.into_split();
        Ok(Self { reader, writer })
    }

    /// Reads the map transfer the world service sends first.
    pub async fn read_map(&mut self, spawn_cell: Option<(u32, u32)>) -> Result<GridMap> {
        let mut header = [0u8; MapHeader::SIZE];
        self.reader
            .read_exact(&mut header)
            .await
            .context("reading map header")?;
        let header = MapHeader::decode(&header)?;
        if header.byte_count > MAX_MAP_BYTES {
            bail!("map of {} bytes is too large", header.byte_count);
        }
        log::info!(
            "reading map of {} bytes, resolution {}",
            header.byte_count,
            header.resolution
        );

        let mut bits = vec![0u8; header.byte_count as usize];
        self.reader
            .read_exact(&mut bits)
            .await
            .context("reading map bits")?;

        let side = (header.byte_count as f64 * 8.0).sqrt() as u32;
        let spawn_cell = spawn_cell.unwrap_or((side / 2, side / 2));
        let map = GridMap::from_bits(&bits, header.resolution, spawn_cell)?;
        log::info!(
            "map is {0}x{0} with {1} solid cells, spawning at {2}/{3}",
            map.side(),
            map.solid_count(),
            spawn_cell.0,
            spawn_cell.1
        );
        Ok(map)
    }

    /// Splits into the task writing simulation events and the task applying
    /// world commands to the registry. A world shutdown, a closed link or a
    /// corrupt stream notifies `shutdown`.
    pub fn spawn(
        self,
        events: mpsc::Receiver<WorldEvent>,
        registry: Arc<PlayerRegistry>,
        shutdown: Arc<Notify>,
    ) -> (JoinHandle<()>, JoinHandle<()>) {
        let outbound = tokio::spawn(write_events(self.writer, events));
        let inbound = tokio::spawn(read_commands(self.reader, registry, shutdown));
        (outbound, inbound)
    }
}

// Runs until every event sender is dropped, then tells the world service the
// simulation is going away.
async fn write_events(mut writer: OwnedWriteHalf, mut events: mpsc::Receiver<WorldEvent>) {
    while let Some(event) = events.recv().await {
        let bytes = match event.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("failed to encode {:?} for the world service: {}", event.tag(), e);
                continue;
            }
        };
        if let Err(e) = writer.write_all(&bytes).await {
            log::warn!("world link write failed: {}", e);
            return;
        }
    }

    log::info!("sending shutdown to world service");
    if let Ok(bytes) = WorldEvent::Shutdown.encode() {
        if let Err(e) = writer.write_all(&bytes).await {
            log::debug!("world link closed before shutdown: {}", e);
        }
    }
    if let Err(e) = writer.shutdown().await {
        log::debug!("world link shutdown failed: {}", e);
    }
}

async fn read_commands(
    mut reader: OwnedReadHalf,
    registry: Arc<PlayerRegistry>,
    shutdown: Arc<Notify>,
) {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                log::info!("world service closed the link");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("world link read failed: {}", e);
                break;
            }
        }

        loop {
            match WorldCommand::decode(&mut buf) {
                Ok(Some(command)) => {
                    if !apply(command, &registry) {
                        shutdown.notify_one();
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("corrupt world stream: {}", e);
                    shutdown.notify_one();
                    return;
                }
            }
        }
    }
    shutdown.notify_one();
}

// False once the world asks the simulation to stop.
fn apply(command: WorldCommand, registry: &PlayerRegistry) -> bool {
    match command {
        WorldCommand::Join { player_id, ip } => {
            registry.join(player_id, ip, Instant::now());
        }
        WorldCommand::Leave { player_id } => {
            log::info!("world reports {} left", player_id);
            registry.leave(&player_id);
        }
        WorldCommand::Shutdown => {
            log::info!("world service requested shutdown");
            return false;
        }
    }
    true
}
