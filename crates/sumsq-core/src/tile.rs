//! Tile partitioning of the search square
//!
//! The square `[0, max_xy]²` is cut into disjoint square tiles of side
//! `device_step = kernel_span · grid_width − 1`, enumerated row-major with
//! `start_x` outer and `start_y` inner. Tiles at the far edges may reach past
//! `max_xy`; kernels clip them.

use crate::error::{Result, SearchError};
use std::iter::FusedIterator;

/// Square sub-region `[start_x, start_x + span) × [start_y, start_y + span)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    pub start_x: u64,
    pub start_y: u64,
    pub span: u64,
}

/// Step geometry shared by every tile of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    pub kernel_span: u64,
    pub grid_width: u32,
    pub device_step: u64,
}

impl TileGeometry {
    pub fn new(kernel_span: u64, grid_width: u32) -> Result<Self> {
        let extent = kernel_span
            .checked_mul(grid_width as u64)
            .ok_or_else(|| SearchError::overflow("kernel_span * grid_width does not fit in u64"))?;
        if extent < 2 {
            return Err(SearchError::invalid_input(format!(
                "kernel_span * grid_width must be at least 2 (got {kernel_span} * {grid_width})"
            )));
        }
        Ok(Self {
            kernel_span,
            grid_width,
            device_step: extent - 1,
        })
    }
}

/// Produces the tile sequence for one search square.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePartitioner {
    geometry: TileGeometry,
    max_xy: u64,
    /// Tile starts per axis
    per_axis: u64,
}

impl TilePartitioner {
    pub fn new(max_xy: u64, geometry: TileGeometry) -> Self {
        let per_axis = max_xy / geometry.device_step + 1;
        Self {
            geometry,
            max_xy,
            per_axis,
        }
    }

    pub fn geometry(&self) -> TileGeometry {
        self.geometry
    }

    pub fn max_xy(&self) -> u64 {
        self.max_xy
    }

    /// Total number of tiles
    pub fn len(&self) -> u64 {
        self.per_axis * self.per_axis
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Restartable iterator over the tiles in dispatch order
    pub fn tiles(&self) -> Tiles {
        Tiles {
            step: self.geometry.device_step,
            per_axis: self.per_axis,
            next: 0,
            end: self.len(),
        }
    }
}

impl IntoIterator for &TilePartitioner {
    type Item = Tile;
    type IntoIter = Tiles;

    fn into_iter(self) -> Tiles {
        self.tiles()
    }
}

/// Lazy row-major tile sequence
#[derive(Debug, Clone)]
pub struct Tiles {
    step: u64,
    per_axis: u64,
    next: u64,
    end: u64,
}

impl Tiles {
    fn tile_at(&self, index: u64) -> Tile {
        Tile {
            start_x: (index / self.per_axis) * self.step,
            start_y: (index % self.per_axis) * self.step,
            span: self.step,
        }
    }
}

impl Iterator for Tiles {
    type Item = Tile;

    fn next(&mut self) -> Option<Tile> {
        if self.next >= self.end {
            return None;
        }
        let tile = self.tile_at(self.next);
        self.next += 1;
        Some(tile)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.end - self.next).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Tiles {}
impl FusedIterator for Tiles {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn geometry_step_is_extent_minus_one() {
        let geometry = TileGeometry::new(128, 128).unwrap();
        assert_eq!(geometry.device_step, 16_383);
        assert!(TileGeometry::new(1, 1).is_err());
        assert!(TileGeometry::new(u64::MAX, 2).is_err());
    }

    #[test]
    fn small_square_order() {
        let partitioner = TilePartitioner::new(6, TileGeometry::new(2, 2).unwrap());
        let starts: Vec<(u64, u64)> = partitioner.tiles().map(|t| (t.start_x, t.start_y)).collect();
        assert_eq!(
            starts,
            vec![(0, 0), (0, 3), (0, 6), (3, 0), (3, 3), (3, 6), (6, 0), (6, 3), (6, 6)]
        );
        assert_eq!(partitioner.len(), 9);
        assert_eq!(partitioner.tiles().len(), 9);
    }

    #[test]
    fn default_geometry_on_default_inputs() {
        let partitioner = TilePartitioner::new(84_855, TileGeometry::new(128, 128).unwrap());
        // 84855 / 16383 = 5, so starts 0..=5 per axis.
        assert_eq!(partitioner.len(), 36);
    }

    #[test]
    fn tiles_restart_from_the_beginning() {
        let partitioner = TilePartitioner::new(10, TileGeometry::new(2, 2).unwrap());
        let mut first = partitioner.tiles();
        first.next();
        first.next();
        let again: Vec<Tile> = partitioner.tiles().collect();
        let twice: Vec<Tile> = (&partitioner).into_iter().collect();
        assert_eq!(again, twice);
        assert_eq!(again[0].start_x, 0);
        assert_eq!(first.len(), again.len() - 2);
    }

    proptest! {
        #[test]
        fn tiles_cover_square_exactly_once(max_xy in 0u64..60, kernel_span in 1u64..5, grid_width in 1u32..5) {
            prop_assume!(kernel_span * grid_width as u64 >= 2);
            let partitioner = TilePartitioner::new(max_xy, TileGeometry::new(kernel_span, grid_width).unwrap());

            let side = (max_xy + 1) as usize;
            let mut hits = vec![0u32; side * side];
            for tile in partitioner.tiles() {
                prop_assert!(tile.start_x <= max_xy && tile.start_y <= max_xy);
                for x in tile.start_x..(tile.start_x + tile.span).min(max_xy + 1) {
                    for y in tile.start_y..(tile.start_y + tile.span).min(max_xy + 1) {
                        hits[x as usize * side + y as usize] += 1;
                    }
                }
            }
            prop_assert!(hits.iter().all(|&h| h == 1));
        }
    }
}
