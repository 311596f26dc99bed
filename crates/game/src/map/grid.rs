use glam::Vec2;

use super::{Rect, WorldGeometry};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("map of {0} bytes is not a square grid")]
    NotSquare(usize),
    #[error("map resolution must be non-zero")]
    ZeroResolution,
}

/// Square grid of solid/empty cells, `resolution` world units per cell.
#[derive(Debug, Clone)]
pub struct GridMap {
    side: u32,
    resolution: u32,
    solid: Vec<bool>,
    spawn_cell: (u32, u32),
}

impl GridMap {
    pub fn new(side: u32, resolution: u32, spawn_cell: (u32, u32)) -> Self {
        Self {
            side,
            resolution: resolution.max(1),
            solid: vec![false; (side as usize) * (side as usize)],
            spawn_cell,
        }
    }

    /// Decodes the bit-packed map sent by the world service. Bit `i`
    /// (least significant first within each byte) is cell `(i % side, i / side)`.
    pub fn from_bits(bits: &[u8], resolution: u8, spawn_cell: (u32, u32)) -> Result<Self, MapError> {
        if resolution == 0 {
            return Err(MapError::ZeroResolution);
        }
        let cells = bits.len() * 8;
        let side = (cells as f64).sqrt() as usize;
        if side * side != cells {
            return Err(MapError::NotSquare(bits.len()));
        }

        let solid = (0..cells)
            .map(|i| bits[i / 8] & (1 << (i % 8)) != 0)
            .collect();

        Ok(Self {
            side: side as u32,
            resolution: resolution as u32,
            solid,
            spawn_cell,
        })
    }

    pub fn side(&self) -> u32 {
        self.side
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn set_solid(&mut self, x: u32, y: u32, solid: bool) {
        if x < self.side && y < self.side {
            let index = (y * self.side + x) as usize;
            self.solid[index] = solid;
        }
    }

    /// Cells outside the map are walls.
    pub fn is_solid(&self, x: i64, y: i64) -> bool {
        let side = self.side as i64;
        if x < 0 || y < 0 || x >= side || y >= side {
            return true;
        }
        self.solid[(y * side + x) as usize]
    }

    pub fn cell_center(&self, x: u32, y: u32) -> Vec2 {
        let res = self.resolution as f32;
        Vec2::new(res * x as f32 + res / 2.0, res * y as f32 + res / 2.0)
    }

    pub fn cell_rect(&self, x: i64, y: i64) -> Rect {
        let res = self.resolution as f32;
        Rect::new(x as f32 * res, y as f32 * res, res, res)
    }

    pub fn solid_count(&self) -> usize {
        self.solid.iter().filter(|s| **s).count()
    }
}

impl WorldGeometry for GridMap {
    fn block_rects(&self, region: &Rect) -> Vec<Rect> {
        let res = self.resolution as f32;
        let min_x = (region.x / res).floor() as i64;
        let min_y = (region.y / res).floor() as i64;
        let max_x = ((region.x + region.w) / res).floor() as i64;
        let max_y = ((region.y + region.h) / res).floor() as i64;

        let mut rects = Vec::new();
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                if self.is_solid(x, y) {
                    rects.push(self.cell_rect(x, y));
                }
            }
        }
        rects
    }

    fn spawn_point(&self) -> Vec2 {
        self.cell_center(self.spawn_cell.0, self.spawn_cell.1)
    }

    fn spawn_cell(&self) -> (u32, u32) {
        self.spawn_cell
    }

    fn cell_from_position(&self, position: Vec2) -> (u16, u16) {
        let res = self.resolution as f32;
        let max = self.side.saturating_sub(1).min(u16::MAX as u32) as f32;
        let x = (position.x / res).floor().clamp(0.0, max);
        let y = (position.y / res).floor().clamp(0.0, max);
        (x as u16, y as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bit_packed_map() {
        // 4x4 map, two bytes. Cell (1,0) and cell (3,3) are solid.
        let bits = [0b0000_0010, 0b1000_0000];
        let map = GridMap::from_bits(&bits, 32, (0, 0)).unwrap();

        assert_eq!(map.side(), 4);
        assert!(map.is_solid(1, 0));
        assert!(map.is_solid(3, 3));
        assert!(!map.is_solid(0, 0));
        assert_eq!(map.solid_count(), 2);
    }

    #[test]
    fn rejects_non_square() {
        assert_eq!(
            GridMap::from_bits(&[0u8; 3], 32, (0, 0)).unwrap_err(),
            MapError::NotSquare(3)
        );
        assert_eq!(
            GridMap::from_bits(&[0u8; 2], 0, (0, 0)).unwrap_err(),
            MapError::ZeroResolution
        );
    }

    #[test]
    fn cell_center_and_lookup() {
        let map = GridMap::new(100, 32, (50, 2));
        assert_eq!(map.spawn_point(), Vec2::new(1616.0, 80.0));
        assert_eq!(map.cell_from_position(Vec2::new(1616.0, 80.0)), (50, 2));
        assert_eq!(map.cell_from_position(Vec2::new(-40.0, 99999.0)), (0, 99));
    }

    #[test]
    fn block_rects_in_region() {
        let mut map = GridMap::new(10, 32, (0, 0));
        map.set_solid(2, 2, true);
        map.set_solid(5, 5, true);

        let rects = map.block_rects(&Rect::new(40.0, 40.0, 60.0, 60.0));
        assert_eq!(rects, vec![Rect::new(64.0, 64.0, 32.0, 32.0)]);
    }

    #[test]
    fn outside_is_solid() {
        let map = GridMap::new(4, 32, (0, 0));
        let rects = map.block_rects(&Rect::new(-10.0, 10.0, 5.0, 5.0));
        assert_eq!(rects, vec![Rect::new(-32.0, 0.0, 32.0, 32.0)]);
    }
}
