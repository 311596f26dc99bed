use glam::Vec2;

use crate::map::{Rect, WorldGeometry};

pub const MAX_PASSES: usize = 4;
pub const RESTITUTION: f32 = 0.5;
pub const CORNER_EPSILON: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepHit {
    pub axis: Axis,
    pub time: f32,
    pub block: Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub position: Vec2,
    pub velocity: Vec2,
    pub collided: bool,
    pub hits: Vec<Rect>,
}

// Entry and exit times along one axis, `None` when the body can never
// overlap the block on that axis during the frame.
fn axis_times(body_min: f32, body_len: f32, block_min: f32, block_len: f32, v: f32) -> Option<(f32, f32)> {
    let body_max = body_min + body_len;
    let block_max = block_min + block_len;

    if v == 0.0 {
        if body_min < block_max && body_max > block_min {
            return Some((f32::NEG_INFINITY, f32::INFINITY));
        }
        return None;
    }

    let (inv_entry, inv_exit) = if v > 0.0 {
        (block_min - body_max, block_max - body_min)
    } else {
        (block_max - body_min, block_min - body_max)
    };
    Some((inv_entry / v, inv_exit / v))
}

fn grazes(body_min: f32, body_len: f32, block_min: f32, block_len: f32, v: f32) -> bool {
    let body_max = body_min + body_len;
    let block_max = block_min + block_len;
    let shared = body_max.min(block_max) - body_min.max(block_min);
    if shared >= CORNER_EPSILON {
        return false;
    }
    if body_min < block_min {
        v <= 0.0
    } else if body_max > block_max {
        v >= 0.0
    } else {
        false
    }
}

/// Swept AABB of `body` moving by `motion` against a static `block`.
pub fn sweep(body: &Rect, motion: Vec2, block: &Rect) -> Option<SweepHit> {
    let (x_entry, x_exit) = axis_times(body.x, body.w, block.x, block.w, motion.x)?;
    let (y_entry, y_exit) = axis_times(body.y, body.h, block.y, block.h, motion.y)?;

    let entry = x_entry.max(y_entry);
    let exit = x_exit.min(y_exit);

    if entry > exit || (x_entry < 0.0 && y_entry < 0.0) || x_entry > 1.0 || y_entry > 1.0 {
        return None;
    }

    let axis = if x_entry > y_entry { Axis::X } else { Axis::Y };

    // Reject hits where the other axis only grazes the block's edge and is
    // not moving deeper into it.
    let at_contact = Rect::new(
        body.x + motion.x * entry,
        body.y + motion.y * entry,
        body.w,
        body.h,
    );
    let grazing = match axis {
        Axis::X => grazes(at_contact.y, at_contact.h, block.y, block.h, motion.y),
        Axis::Y => grazes(at_contact.x, at_contact.w, block.x, block.w, motion.x),
    };
    if grazing {
        return None;
    }

    Some(SweepHit {
        axis,
        time: entry,
        block: *block,
    })
}

/// Resolves a body's motion for one frame against static blocks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionResolver {
    broad_size: f32,
    narrow_size: f32,
}

impl Default for CollisionResolver {
    fn default() -> Self {
        Self::new(96.0, 30.0)
    }
}

impl CollisionResolver {
    pub fn new(broad_size: f32, narrow_size: f32) -> Self {
        Self {
            broad_size,
            narrow_size,
        }
    }

    pub fn narrow_phase(&self, position: Vec2) -> Rect {
        Rect::centered(position, self.narrow_size)
    }

    pub fn broad_phase(&self, position: Vec2, motion: Vec2) -> Rect {
        Rect::centered(position, self.broad_size).swept(motion)
    }

    // Centre coordinate leaving the narrow box flush against the face it hit,
    // so rounding never starts the next sweep inside the block.
    fn contact(&self, motion: f32, block_min: f32, block_len: f32) -> f32 {
        let half = self.narrow_size / 2.0;
        if motion > 0.0 {
            block_min - half
        } else {
            block_min + block_len + half
        }
    }

    /// Moves a body from `start` by `velocity`, stopping or bouncing on the
    /// earliest X and Y hits. Repeats for the bounced remainder up to
    /// `MAX_PASSES` times; any motion left after that is discarded.
    pub fn resolve(&self, start: Vec2, velocity: Vec2, geometry: &dyn WorldGeometry) -> Resolution {
        let candidates = geometry.block_rects(&self.broad_phase(start, velocity));

        let mut position = start;
        let mut velocity = velocity;
        let mut motion = velocity;
        let mut hits = Vec::new();

        for _ in 0..MAX_PASSES {
            let body = self.narrow_phase(position);
            let mut hit_x: Option<SweepHit> = None;
            let mut hit_y: Option<SweepHit> = None;

            for block in &candidates {
                let Some(hit) = sweep(&body, motion, block) else {
                    continue;
                };
                let slot = match hit.axis {
                    Axis::X => &mut hit_x,
                    Axis::Y => &mut hit_y,
                };
                if slot.is_none_or(|best| hit.time < best.time) {
                    *slot = Some(hit);
                }
            }

            if hit_x.is_none() && hit_y.is_none() {
                position += motion;
                motion = Vec2::ZERO;
                break;
            }

            let mut next = Vec2::ZERO;
            match hit_x {
                Some(hit) => {
                    position.x = self.contact(motion.x, hit.block.x, hit.block.w);
                    if velocity.x.abs() < 1.0 {
                        velocity.x = 0.0;
                    } else {
                        velocity.x *= -RESTITUTION;
                        next.x = motion.x * -RESTITUTION * (1.0 - hit.time);
                    }
                    hits.push(hit.block);
                }
                None => position.x += motion.x,
            }
            match hit_y {
                Some(hit) => {
                    position.y = self.contact(motion.y, hit.block.y, hit.block.h);
                    if velocity.y.abs() < 1.0 {
                        velocity.y = 0.0;
                    } else {
                        velocity.y *= -RESTITUTION;
                        next.y = motion.y * -RESTITUTION * (1.0 - hit.time);
                    }
                    hits.push(hit.block);
                }
                None => position.y += motion.y,
            }

            motion = next;
            if motion == Vec2::ZERO {
                break;
            }
        }

        if motion != Vec2::ZERO {
            log::trace!("collision passes exhausted at {position}, dropping {motion}");
        }

        Resolution {
            position,
            velocity,
            collided: !hits.is_empty(),
            hits,
        }
    }
}
