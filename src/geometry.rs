//! Integer rectangles and tile-corner position grids.

use glam::{IVec2, Vec2};

/// Half-open integer rectangle `[tl, br)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntRect {
    /// Top-left corner (inclusive).
    pub tl: IVec2,
    /// Bottom-right corner (exclusive).
    pub br: IVec2,
}

impl IntRect {
    /// Rectangle from its two corners.
    #[must_use]
    pub const fn new(tl: IVec2, br: IVec2) -> Self {
        Self { tl, br }
    }

    /// Rectangle anchored at the origin with the given size.
    #[must_use]
    pub const fn from_size(size: IVec2) -> Self {
        Self {
            tl: IVec2::ZERO,
            br: size,
        }
    }

    /// Horizontal extent.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.br.x - self.tl.x
    }

    /// Vertical extent.
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.br.y - self.tl.y
    }

    /// Width and height as a vector.
    #[must_use]
    pub const fn size(&self) -> IVec2 {
        IVec2::new(self.width(), self.height())
    }

    /// Number of cells covered (zero for degenerate rectangles).
    #[must_use]
    pub fn area(&self) -> usize {
        (self.width().max(0) as usize) * (self.height().max(0) as usize)
    }

    /// Both corners divided by two, matching 4:2:0 chroma subsampling.
    #[must_use]
    pub const fn halved(&self) -> Self {
        Self {
            tl: IVec2::new(self.tl.x / 2, self.tl.y / 2),
            br: IVec2::new(self.br.x / 2, self.br.y / 2),
        }
    }
}

impl std::fmt::Display for IntRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[({}, {}) - ({}, {})]",
            self.tl.x, self.tl.y, self.br.x, self.br.y
        )
    }
}

/// On-screen tile corner positions, indexed `[row][column]`.
///
/// Produced by the geometry consumer; a grid covering `n × m` tiles has
/// `(m + 1)` rows of `(n + 1)` corners.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PositionGrid {
    rows: Vec<Vec<Vec2>>,
}

impl PositionGrid {
    /// Wrap pre-computed rows of corner positions.
    #[must_use]
    pub fn from_rows(rows: Vec<Vec<Vec2>>) -> Self {
        Self { rows }
    }

    /// Regular grid: `tiles` cells of `tile_size` pixels starting at `origin`.
    #[must_use]
    pub fn regular(origin: Vec2, tile_size: Vec2, tiles: IVec2) -> Self {
        let rows = (0..=tiles.y.max(0))
            .map(|y| {
                (0..=tiles.x.max(0))
                    .map(|x| origin + tile_size * Vec2::new(x as f32, y as f32))
                    .collect()
            })
            .collect();
        Self { rows }
    }

    /// Corner at `(x, y)` in grid coordinates, `None` outside the grid.
    #[must_use]
    pub fn corner(&self, x: i32, y: i32) -> Option<Vec2> {
        let x = usize::try_from(x).ok()?;
        let y = usize::try_from(y).ok()?;
        self.rows.get(y)?.get(x).copied()
    }

    /// Number of corner rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of corners in the first row.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halved_rect_matches_chroma_subsampling() {
        let r = IntRect::new(IVec2::new(10, 20), IVec2::new(110, 220));
        let h = r.halved();
        assert_eq!(h.tl, IVec2::new(5, 10));
        assert_eq!(h.size(), IVec2::new(50, 100));
    }

    #[test]
    fn regular_grid_has_one_more_corner_than_tiles() {
        let grid =
            PositionGrid::regular(Vec2::ZERO, Vec2::splat(64.0), IVec2::new(3, 2));
        assert_eq!(grid.row_count(), 3);
        assert_eq!(grid.column_count(), 4);
        assert_eq!(grid.corner(3, 2), Some(Vec2::new(192.0, 128.0)));
        assert_eq!(grid.corner(4, 0), None);
        assert_eq!(grid.corner(0, -1), None);
    }
}
