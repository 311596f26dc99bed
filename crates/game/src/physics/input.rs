use std::sync::LazyLock;

use bitflags::bitflags;
use glam::Vec2;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Buttons: u8 {
        const LEFT = 1 << 0;
        const RIGHT = 1 << 1;
        const FORWARD = 1 << 2;
        const BACKWARD = 1 << 3;
    }
}

impl Buttons {
    /// -1 turning left, 1 turning right, 0 for neither or both.
    pub fn turn(self) -> f32 {
        match (self.contains(Self::LEFT), self.contains(Self::RIGHT)) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        }
    }

    /// 1 thrusting forward, -1 backward, 0 for neither or both.
    pub fn thrust(self) -> f32 {
        match (self.contains(Self::FORWARD), self.contains(Self::BACKWARD)) {
            (true, false) => 1.0,
            (false, true) => -1.0,
            _ => 0.0,
        }
    }
}

// Heading for every whole degree, 0 and 360 both included.
static UNIT_CIRCLE: LazyLock<[Vec2; 361]> = LazyLock::new(|| {
    let mut table = [Vec2::ZERO; 361];
    for (degree, entry) in table.iter_mut().enumerate() {
        let radians = (degree as f32).to_radians();
        *entry = Vec2::new(-radians.sin(), radians.cos());
    }
    table
});

pub fn heading(angle: f32) -> Vec2 {
    let index = angle.round().clamp(0.0, 360.0) as usize;
    UNIT_CIRCLE[index]
}

pub fn wrap_angle(angle: f32) -> f32 {
    angle.rem_euclid(360.0)
}
