use crate::net::{ClientMessage, InboundMessage, ServerMessage, WorldEvent};
use crate::physics::{Buttons, ControlledBody, InputOutcome};
use crate::player::{Player, PlayerStatus};

use super::tick::Simulation;

// After the first rollover seq runs 1..=65535, so tick arithmetic works on a
// cycle of 65535 values rather than the full u16 range.
const SEQ_CYCLE: i32 = u16::MAX as i32;

/// Signed distance from `seq` to `tick`, in (-32767, 32767].
pub(crate) fn tick_offset(seq: u16, tick: u16) -> i32 {
    let distance = (tick as i32 - seq as i32).rem_euclid(SEQ_CYCLE);
    if distance > SEQ_CYCLE / 2 {
        distance - SEQ_CYCLE
    } else {
        distance
    }
}

/// `tick` moved `frames` ahead, skipping the 0 that seq never revisits.
pub(crate) fn tick_add(tick: u16, frames: i32) -> u16 {
    if frames == 0 {
        return tick;
    }
    let sum = tick as i32 + frames;
    if (1..=SEQ_CYCLE).contains(&sum) {
        sum as u16
    } else {
        ((sum - 1).rem_euclid(SEQ_CYCLE) + 1) as u16
    }
}

impl Simulation {
    pub(super) fn dispatch(&mut self, player: &Player, inbound: InboundMessage) {
        match inbound.message {
            ClientMessage::None => {}
            ClientMessage::Sync => {
                self.registry.push(&player.id(), self.sync_message());
            }
            ClientMessage::Enter => self.spawn(player),
            ClientMessage::Exit => self.despawn(player),
            ClientMessage::MoveShoot { tick, buttons } => self.move_shoot(player, tick, buttons),
            ClientMessage::Disconnect => {
                log::info!("player {} disconnected", player.id());
                player.cull();
            }
        }
    }

    /// Maps a client's 16-bit tick onto the absolute frame counter, treating
    /// the distance from the current seq as a signed offset.
    pub fn input_frame(&self, tick: u16) -> i32 {
        self.frame + tick_offset(self.seq, tick) + self.config.input_delay
    }

    pub(super) fn spawn(&mut self, player: &Player) {
        if player.status() != PlayerStatus::Spectating {
            log::info!("player {} entered while {:?}", player.id(), player.status());
            return;
        }
        let Some(geometry) = self.geometry.clone() else {
            return;
        };

        let player_id = player.id();
        let stats = self.config.player_stats;
        let spawn = geometry.spawn_point();
        let frame = self.frame;
        let handle = match self
            .arena
            .insert(|id| ControlledBody::new(id, player_id, stats, spawn, frame))
        {
            Ok(handle) => handle,
            Err(e) => {
                log::warn!("cannot spawn player {}: {}", player_id, e);
                return;
            }
        };
        self.bodies.insert(player_id, handle);
        player.set_status(PlayerStatus::Playing);

        let (x, y) = geometry.spawn_cell();
        log::info!("spawning {} as body {} at cell {}/{}", player_id, handle.id(), x, y);
        self.registry.push_all(&ServerMessage::Enter {
            player_id,
            body_id: handle.id(),
            x,
            y,
        });
        self.send_world(WorldEvent::Spawn {
            body_id: handle.id(),
            player_id,
        });
    }

    /// Returns a playing player to spectating. No-op for anyone else.
    pub(super) fn despawn(&mut self, player: &Player) {
        let Some(handle) = self.bodies.remove(&player.id()) else {
            return;
        };
        if let Some(body) = self.arena.get_mut(handle) {
            body.kill();
        }
        if player.status() == PlayerStatus::Playing {
            player.set_status(PlayerStatus::Spectating);
        }

        let body_id = handle.id();
        log::info!("player {} left body {}", player.id(), body_id);
        self.registry.push_all(&ServerMessage::Exit { body_id });
        self.send_world(WorldEvent::Spec { body_id });
    }

    fn move_shoot(&mut self, player: &Player, tick: u16, buttons: u8) {
        let Some(handle) = self.bodies.get(&player.id()).copied() else {
            return;
        };
        let frame = self.input_frame(tick);
        let Some(body) = self.arena.get_mut(handle) else {
            return;
        };

        let outcome = body.apply_input(frame, Buttons::from_bits_truncate(buttons));
        match outcome {
            InputOutcome::Applied => {}
            InputOutcome::Duplicate => return,
            InputOutcome::Stale | InputOutcome::TooFarAhead => {
                log::debug!(
                    "{:?} input from {} for frame {} at frame {}",
                    outcome,
                    player.id(),
                    frame,
                    self.frame
                );
                return;
            }
        }

        let echo = ServerMessage::MoveShoot {
            body_id: handle.id(),
            tick: tick_add(tick, self.config.input_delay),
            buttons,
        };
        if self.config.echo_input {
            self.registry.push(&player.id(), echo.clone());
        }
        self.registry.push_excluding(&player.id(), &echo);
    }
}
