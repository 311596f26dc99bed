/// Per-frame movement limits for a controlled body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerStats {
    pub thrust: f32,
    pub rotation: f32,
    pub max_speed: f32,
}

impl Default for PlayerStats {
    fn default() -> Self {
        Self {
            thrust: 1.0,
            rotation: 9.0,
            max_speed: 20.0,
        }
    }
}
