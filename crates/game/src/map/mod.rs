mod grid;
mod objects;

pub use grid::{GridMap, MapError};
pub use objects::Rect;

use glam::Vec2;

/// Static world geometry supplied by the world service. Read-only while a
/// frame is being simulated.
pub trait WorldGeometry: Send + Sync {
    fn block_rects(&self, region: &Rect) -> Vec<Rect>;

    fn spawn_point(&self) -> Vec2;

    fn spawn_cell(&self) -> (u32, u32);

    fn cell_from_position(&self, position: Vec2) -> (u16, u16);
}
