use glam::Vec2;

/// Axis-aligned rectangle in world units, `(x, y)` is the minimum corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn centered(center: Vec2, size: f32) -> Self {
        let half = size * 0.5;
        Self::new(center.x - half, center.y - half, size, size)
    }

    pub fn min(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn max(&self) -> Vec2 {
        Vec2::new(self.x + self.w, self.y + self.h)
    }

    /// Strict overlap; rectangles sharing only an edge do not overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.x + other.w
            && self.x + self.w > other.x
            && self.y < other.y + other.h
            && self.y + self.h > other.y
    }

    /// Bounding box of this rectangle swept along `motion`.
    pub fn swept(&self, motion: Vec2) -> Rect {
        let min = self.min().min(self.min() + motion);
        let max = self.max().max(self.max() + motion);
        Rect::new(min.x, min.y, max.x - min.x, max.y - min.y)
    }

    /// Penetration depth along the shallower axis, zero when not overlapping.
    pub fn penetration(&self, other: &Rect) -> f32 {
        if !self.overlaps(other) {
            return 0.0;
        }
        let dx = (self.max().x.min(other.max().x) - self.x.max(other.x)).max(0.0);
        let dy = (self.max().y.min(other.max().y) - self.y.max(other.y)).max(0.0);
        dx.min(dy)
    }
}
