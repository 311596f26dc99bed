use glam::Vec2;
use uuid::Uuid;

use super::collider::CollisionResolver;
use super::history::{HistoricalTransform, StateHistory};
use super::input::{heading, wrap_angle, Buttons};
use crate::map::{Rect, WorldGeometry};
use crate::player::PlayerStats;

/// Advances `prev` by one frame under `buttons`.
pub fn integrate(prev: &HistoricalTransform, buttons: Buttons, stats: &PlayerStats) -> HistoricalTransform {
    let angle_delta = buttons.turn() * stats.rotation;
    let angle = wrap_angle(prev.angle + angle_delta);

    let mut velocity = prev.velocity + heading(angle) * (buttons.thrust() * stats.thrust);
    let speed = velocity.length();
    if speed > stats.max_speed {
        velocity = velocity / speed * stats.max_speed;
    }

    HistoricalTransform {
        seq: prev.seq + 1,
        angle,
        angle_delta,
        position: prev.position + velocity,
        velocity,
        velocity_delta: velocity - prev.velocity,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Applied,
    Stale,
    Duplicate,
    TooFarAhead,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub position: Vec2,
    pub hits: Vec<Rect>,
}

pub struct ControlledBody {
    id: u16,
    player_id: Uuid,
    stats: PlayerStats,
    live: HistoricalTransform,
    history: StateHistory,
    committed: i32,
    dead: bool,
}

impl ControlledBody {
    pub fn new(id: u16, player_id: Uuid, stats: PlayerStats, spawn: Vec2, frame: i32) -> Self {
        Self::with_capacity(id, player_id, stats, spawn, frame, StateHistory::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(
        id: u16,
        player_id: Uuid,
        stats: PlayerStats,
        spawn: Vec2,
        frame: i32,
        capacity: usize,
    ) -> Self {
        let initial = HistoricalTransform {
            seq: frame,
            position: spawn,
            ..Default::default()
        };
        Self {
            id,
            player_id,
            stats,
            live: initial,
            history: StateHistory::new(capacity, initial),
            committed: frame,
            dead: false,
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn player_id(&self) -> Uuid {
        self.player_id
    }

    pub fn transform(&self) -> &HistoricalTransform {
        &self.live
    }

    pub fn position(&self) -> Vec2 {
        self.live.position
    }

    pub fn velocity(&self) -> Vec2 {
        self.live.velocity
    }

    pub fn history(&self) -> &StateHistory {
        &self.history
    }

    /// Last frame made authoritative by `process_frame`.
    pub fn committed_frame(&self) -> i32 {
        self.committed
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn kill(&mut self) {
        self.dead = true;
    }

    /// Records `buttons` for `frame` and recomputes that frame from the one
    /// before it, then rebuilds every later predicted frame. Frames already
    /// committed are never rewritten.
    pub fn apply_input(&mut self, frame: i32, buttons: Buttons) -> InputOutcome {
        if frame <= self.committed {
            return InputOutcome::Stale;
        }
        if frame > self.committed + self.history.capacity() as i32 - 1 {
            return InputOutcome::TooFarAhead;
        }
        if self.history.input(frame) == Some(buttons) {
            return InputOutcome::Duplicate;
        }

        self.predict_to(frame - 1);
        let prev = self.history.get(frame - 1);
        let next = integrate(&prev, buttons, &self.stats);
        let inserted = self.history.insert(next, Some(buttons));
        debug_assert!(inserted, "frame {frame} outside history window");
        self.rebuild_after(frame);

        InputOutcome::Applied
    }

    /// Commits every frame up to `frame`, correcting each one for collisions.
    pub fn process_frame(
        &mut self,
        frame: i32,
        resolver: &CollisionResolver,
        geometry: &dyn WorldGeometry,
    ) -> FrameReport {
        let mut hits = Vec::new();

        while self.committed < frame {
            let seq = self.committed + 1;
            self.predict_to(seq);

            let prev = self.history.get(seq - 1);
            let mut current = self.history.get(seq);
            let resolution = resolver.resolve(prev.position, current.velocity, geometry);

            if resolution.collided {
                current.position = resolution.position;
                current.velocity = resolution.velocity;
                current.velocity_delta = current.velocity - prev.velocity;
                let input = self.history.input(seq);
                self.history.insert(current, input);
                self.rebuild_after(seq);
                hits.extend(resolution.hits);
            }

            self.committed = seq;
            self.live = current;
        }

        FrameReport {
            position: self.live.position,
            hits,
        }
    }

    // Coasts forward until the history reaches `frame`.
    fn predict_to(&mut self, frame: i32) {
        while self.history.newest() < frame {
            let prev = self.history.get(self.history.newest());
            let next = integrate(&prev, Buttons::empty(), &self.stats);
            self.history.insert(next, None);
        }
    }

    fn rebuild_after(&mut self, frame: i32) {
        for seq in frame + 1..=self.history.newest() {
            let prev = self.history.get(seq - 1);
            let input = self.history.input(seq);
            let next = integrate(&prev, input.unwrap_or_default(), &self.stats);
            self.history.insert(next, input);
        }
    }
}
