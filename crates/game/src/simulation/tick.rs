use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use uuid::Uuid;

use super::arena::{BodyArena, BodyHandle};
use crate::config::SimConfig;
use crate::map::WorldGeometry;
use crate::net::{BodyCell, BodyState, ServerMessage, WorldEvent, MAX_SYNC_BODIES};
use crate::physics::CollisionResolver;
use crate::player::PlayerRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimState {
    Uninitialized,
    Running,
}

/// Fixed-timestep authoritative simulation. Owns every controlled body;
/// talks to players only through the registry's queues.
pub struct Simulation {
    pub(super) config: SimConfig,
    pub(super) registry: Arc<PlayerRegistry>,
    world_tx: Sender<WorldEvent>,
    pub(super) resolver: CollisionResolver,
    pub(super) geometry: Option<Arc<dyn WorldGeometry>>,
    pub(super) arena: BodyArena,
    pub(super) bodies: HashMap<Uuid, BodyHandle>,

    pub(super) seq: u16,
    pub(super) frame: i32,
    last_sync: Instant,
    epoch_nanos: u64,
}

impl Simulation {
    pub fn new(config: SimConfig, registry: Arc<PlayerRegistry>, world_tx: Sender<WorldEvent>) -> Self {
        let resolver = CollisionResolver::new(config.broad_size, config.narrow_size);
        Self {
            config,
            registry,
            world_tx,
            resolver,
            geometry: None,
            arena: BodyArena::default(),
            bodies: HashMap::new(),
            seq: 0,
            frame: 0,
            last_sync: Instant::now(),
            epoch_nanos: 0,
        }
    }

    pub fn state(&self) -> SimState {
        if self.geometry.is_some() {
            SimState::Running
        } else {
            SimState::Uninitialized
        }
    }

    pub fn seq(&self) -> u16 {
        self.seq
    }

    /// Absolute frame counter; unlike `seq` it never wraps.
    pub fn frame(&self) -> i32 {
        self.frame
    }

    /// Live bodies. Killed ones still hold their slot until the next prune.
    pub fn body_count(&self) -> usize {
        self.arena.iter().filter(|body| !body.is_dead()).count()
    }

    pub fn body_id(&self, player_id: &Uuid) -> Option<u16> {
        self.bodies.get(player_id).map(BodyHandle::id)
    }

    pub fn body_state(&self, player_id: &Uuid) -> Option<BodyState> {
        let handle = self.bodies.get(player_id)?;
        let body = self.arena.get(*handle)?;
        Some(BodyState {
            body_id: body.id(),
            position: body.position(),
            velocity: body.velocity(),
        })
    }

    /// Starts the clock. Frames are counted from `now`.
    pub fn start(&mut self, geometry: Arc<dyn WorldGeometry>, now: Instant) {
        self.geometry = Some(geometry);
        self.seq = 0;
        self.frame = 0;
        self.last_sync = now;
        self.epoch_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or_default();
        log::info!("simulation started, timestep {:?}", self.config.timestep);
    }

    /// Processes every frame that has come due by `now`. Returns how many.
    pub fn tick(&mut self, now: Instant) -> usize {
        if self.geometry.is_none() {
            return 0;
        }
        let step = self.config.timestep_nanos().max(1) as u128;
        let due = now.saturating_duration_since(self.last_sync).as_nanos() / step;
        let frames = due as i64 - self.seq as i64;
        if frames <= 0 {
            return 0;
        }
        if frames > 1000 {
            log::warn!("simulation is {} frames behind", frames);
        }

        for _ in 0..frames {
            self.advance(now);
        }
        frames as usize
    }

    /// Wall time of the current frame in milliseconds since the Unix epoch.
    pub fn frame_time_ms(&self) -> u64 {
        (self.epoch_nanos + self.seq as u64 * self.config.timestep_nanos()) / 1_000_000
    }

    fn advance(&mut self, now: Instant) {
        self.seq = self.seq.wrapping_add(1);
        self.frame += 1;
        let wrapped = self.seq == 0;
        if wrapped {
            // Rebase so seq 1 is one timestep after the new epoch.
            let span = u16::MAX as u32;
            self.last_sync += self.config.timestep * span;
            self.epoch_nanos += span as u64 * self.config.timestep_nanos();
            self.seq = 1;
        }

        self.process_frame(now);

        if wrapped {
            self.registry.push_all(&self.sync_message());
        }
        self.registry.pack_and_send(now);
    }

    fn process_frame(&mut self, now: Instant) {
        let limit = self.config.messages_per_tick;
        for player in self.registry.snapshot() {
            for message in player.drain_inbound(limit) {
                self.dispatch(&player, message);
            }
        }

        self.step_bodies();

        if self.config.world_rate > 0 && self.frame % self.config.world_rate as i32 == 0 {
            self.report_state();
        }

        self.sweep(now);
    }

    fn step_bodies(&mut self) {
        let Some(geometry) = self.geometry.clone() else {
            return;
        };
        let frame = self.frame;
        let mut collisions = Vec::new();
        for body in self.arena.iter_mut() {
            if body.is_dead() {
                continue;
            }
            let report = body.process_frame(frame, &self.resolver, geometry.as_ref());
            if self.config.debug_rects && !report.hits.is_empty() {
                collisions.push((body.player_id(), report.hits));
            }
        }

        let seq = self.seq;
        for (player_id, hits) in collisions {
            for rect in hits {
                self.registry.push(&player_id, ServerMessage::DebugRect { seq, rect });
            }
        }

        self.arena.prune_dead();
    }

    fn report_state(&self) {
        let Some(geometry) = self.geometry.as_ref() else {
            return;
        };
        let cells: Vec<BodyCell> = self
            .arena
            .iter()
            .filter(|body| !body.is_dead())
            .map(|body| {
                let (x, y) = geometry.cell_from_position(body.position());
                BodyCell {
                    body_id: body.id(),
                    x,
                    y,
                }
            })
            .collect();
        if !cells.is_empty() {
            self.send_world(WorldEvent::State(cells));
        }
    }

    fn sweep(&mut self, now: Instant) {
        for player in self.registry.expired(now) {
            if player.should_cull() {
                log::info!("culling player {}", player.id());
            } else {
                log::info!("player {} timed out", player.id());
            }
            self.despawn(&player);
            self.registry.remove(&player.id());
        }
    }

    pub(super) fn sync_message(&self) -> ServerMessage {
        let bodies = self
            .arena
            .iter()
            .filter(|body| !body.is_dead())
            .take(MAX_SYNC_BODIES)
            .map(|body| BodyState {
                body_id: body.id(),
                position: body.position(),
                velocity: body.velocity(),
            })
            .collect();
        ServerMessage::Sync {
            seq: self.seq,
            time_ms: self.frame_time_ms(),
            bodies,
        }
    }

    pub(super) fn send_world(&self, event: WorldEvent) {
        match self.world_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::warn!("world queue is full, dropping {:?}", event.tag());
            }
            Err(TrySendError::Closed(_)) => {
                log::debug!("world link closed");
            }
        }
    }

    pub fn timestep(&self) -> Duration {
        self.config.timestep
    }
}
