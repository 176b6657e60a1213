//! Texture coordinates of tile boundaries.

use glam::{IVec2, Vec2};

/// Boundary coordinates of a tile grid, indexed `[row][column]`.
///
/// A grid of `n × m` tiles has `(m + 1)` rows of `(n + 1)` entries. Interior
/// boundaries sit at `index * tile_size / texture_size`; the last one sits at
/// `extent / texture_size` so a padded texture's border is never sampled.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TexCoordGrid {
    rows: Vec<Vec<Vec2>>,
}

fn boundaries(tiles: i32, tile_size: i32, extent: i32, texture_size: i32) -> Vec<f32> {
    let tex = texture_size as f32;
    (0..=tiles.max(0))
        .map(|i| {
            if i == tiles {
                extent as f32 / tex
            } else {
                (i * tile_size) as f32 / tex
            }
        })
        .collect()
}

impl TexCoordGrid {
    /// Coordinates for `tiles` tiles of `tile_size` covering `extent` texels
    /// of a texture allocated at `texture_size`.
    #[must_use]
    pub fn compute(tiles: IVec2, tile_size: IVec2, extent: IVec2, texture_size: IVec2) -> Self {
        let xs = boundaries(tiles.x, tile_size.x, extent.x, texture_size.x);
        let ys = boundaries(tiles.y, tile_size.y, extent.y, texture_size.y);
        let rows = ys
            .iter()
            .map(|&y| xs.iter().map(|&x| Vec2::new(x, y)).collect())
            .collect();
        Self { rows }
    }

    /// Coordinate at grid position `(x, y)`.
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Vec2 {
        self.rows[y][x]
    }

    /// Number of boundary rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of boundaries per row.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// All rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Vec2>] {
        &self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_boundary_is_extent_over_texture_size() {
        let grid = TexCoordGrid::compute(
            IVec2::new(3, 2),
            IVec2::new(64, 64),
            IVec2::new(150, 100),
            IVec2::new(256, 128),
        );
        assert_eq!(grid.row_count(), 3);
        assert_eq!(grid.column_count(), 4);
        assert_eq!(grid.get(3, 2), Vec2::new(150.0 / 256.0, 100.0 / 128.0));
        assert_eq!(grid.get(1, 1), Vec2::new(64.0 / 256.0, 64.0 / 128.0));
        assert_eq!(grid.get(0, 0), Vec2::ZERO);
    }

    #[test]
    fn boundaries_are_monotonic() {
        let grid = TexCoordGrid::compute(
            IVec2::new(5, 4),
            IVec2::new(100, 90),
            IVec2::new(480, 350),
            IVec2::new(480, 350),
        );
        for row in grid.rows() {
            assert!(row.windows(2).all(|w| w[0].x < w[1].x));
        }
        for y in 1..grid.row_count() {
            assert!(grid.get(0, y - 1).y < grid.get(0, y).y);
        }
        assert_eq!(grid.get(5, 4), Vec2::ONE);
    }

    #[test]
    fn recovers_pixel_boundaries() {
        let tex = IVec2::new(512, 256);
        let tile = IVec2::new(128, 64);
        let extent = IVec2::new(500, 250);
        let grid = TexCoordGrid::compute(IVec2::new(4, 4), tile, extent, tex);
        for y in 0..4 {
            for x in 0..4 {
                let tc = grid.get(x, y);
                assert_eq!((tc.x * tex.x as f32).round() as i32, x as i32 * tile.x);
                assert_eq!((tc.y * tex.y as f32).round() as i32, y as i32 * tile.y);
            }
        }
        let last = grid.get(4, 4);
        assert_eq!((last * tex.as_vec2()).round().as_ivec2(), extent);
    }
}
