//! Tile id to atlas rectangle lookup.

use nebula_voxel::BlockRegistry;

/// Maps a tile id to its `[u0, v0, u1, v1]` rectangle in the block atlas.
pub trait TileAtlas: Send + Sync {
    /// Atlas rectangle of `tile`. Unknown tiles map to tile 0.
    fn uv(&self, tile: u16) -> [f32; 4];
}

/// Square tiles laid out row-major on a uniform grid.
#[derive(Clone, Debug, PartialEq)]
pub struct GridAtlas {
    columns: u32,
    rows: u32,
}

impl GridAtlas {
    /// Creates a grid of `columns × rows` tiles (each at least 1).
    pub fn new(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }

    /// Smallest square grid that holds every tile referenced by `registry`.
    pub fn for_registry(registry: &BlockRegistry) -> Self {
        let max_tile = (0..=u8::MAX)
            .filter(|&id| registry.is_defined(id))
            .map(|id| {
                let d = registry.def(id);
                d.tile_top.max(d.tile_side).max(d.tile_bottom)
            })
            .max()
            .unwrap_or(0);
        let count = f64::from(max_tile) + 1.0;
        let side = count.sqrt().ceil() as u32;
        Self::new(side, side)
    }

    /// Tiles per row.
    pub fn columns(&self) -> u32 {
        self.columns
    }

    /// Tile rows.
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of addressable tiles.
    pub fn tile_count(&self) -> u32 {
        self.columns * self.rows
    }
}

impl TileAtlas for GridAtlas {
    fn uv(&self, tile: u16) -> [f32; 4] {
        let tile = if u32::from(tile) < self.tile_count() {
            u32::from(tile)
        } else {
            0
        };
        let tx = (tile % self.columns) as f32;
        let ty = (tile / self.columns) as f32;
        let w = self.columns as f32;
        let h = self.rows as f32;
        [tx / w, ty / h, (tx + 1.0) / w, (ty + 1.0) / h]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_uv() {
        let atlas = GridAtlas::new(4, 2);
        assert_eq!(atlas.uv(0), [0.0, 0.0, 0.25, 0.5]);
        assert_eq!(atlas.uv(5), [0.25, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn test_out_of_range_tile_uses_first() {
        let atlas = GridAtlas::new(2, 2);
        assert_eq!(atlas.uv(4), atlas.uv(0));
        assert_eq!(atlas.uv(u16::MAX), atlas.uv(0));
    }

    #[test]
    fn test_for_registry_is_square_and_fits() {
        // Base blocks use tiles 0..=3: a 2×2 grid.
        let base = GridAtlas::for_registry(&BlockRegistry::new());
        assert_eq!((base.columns(), base.rows()), (2, 2));

        // The built-in set reaches tile 10: eleven tiles need a 4×4 grid.
        let full = GridAtlas::for_registry(&BlockRegistry::with_defaults());
        assert_eq!((full.columns(), full.rows()), (4, 4));
    }

    #[test]
    fn test_degenerate_grid() {
        let atlas = GridAtlas::new(0, 0);
        assert_eq!(atlas.uv(0), [0.0, 0.0, 1.0, 1.0]);
    }
}
