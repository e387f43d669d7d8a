//! Chunk block generation for the three world modes.

use nebula_config::WorldMode;
use nebula_voxel::{AIR, BlockId, BlockRegistry, ChunkGenerator, local_index_with};

use crate::heightmap::{HeightmapParams, HeightmapSampler};

/// Sea level in normal worlds; columns below it are flooded.
pub const SEA_LEVEL: i32 = 62;

/// Surface height above sea level where snow replaces grass.
pub const SNOW_ABOVE_SEA: i32 = 48;

/// Depth of the dirt (or sand) layer under the surface block.
pub const TOPSOIL_DEPTH: i32 = 3;

/// World position of the only block in a `single` world.
pub const SINGLE_BLOCK_POS: (i32, i32, i32) = (0, 64, 0);

/// Block ids the generator writes, resolved from the registry by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TerrainBlocks {
    /// Surface of ordinary columns.
    pub grass: BlockId,
    /// Topsoil.
    pub dirt: BlockId,
    /// Everything below the topsoil.
    pub stone: BlockId,
    /// Sea fill.
    pub water: BlockId,
    /// Bottom layer.
    pub bedrock: BlockId,
    /// Beaches.
    pub sand: BlockId,
    /// High peaks.
    pub snow: BlockId,
}

impl TerrainBlocks {
    /// Looks the terrain blocks up by name, falling back to the base
    /// blocks when a name is not registered.
    pub fn resolve(registry: &BlockRegistry) -> Self {
        let grass = registry.id_by_name("lime_block_jitter", 1);
        let dirt = registry.id_by_name("brown_block_jitter", 2);
        let stone = registry.id_by_name("light_gray_block_jitter", 3);
        Self {
            grass,
            dirt,
            stone,
            water: registry.id_by_name("blue_water", AIR),
            bedrock: registry.id_by_name("black_block_jitter", stone),
            sand: registry.id_by_name("yellow_block_jitter", dirt),
            snow: registry.id_by_name("white_block_jitter", grass),
        }
    }
}

/// Deterministic terrain source for one world.
pub struct TerrainGenerator {
    mode: WorldMode,
    blocks: TerrainBlocks,
    heightmap: HeightmapSampler,
}

impl TerrainGenerator {
    /// Creates a generator for `seed` and `mode`.
    pub fn new(seed: i64, mode: WorldMode, registry: &BlockRegistry) -> Self {
        Self {
            mode,
            blocks: TerrainBlocks::resolve(registry),
            heightmap: HeightmapSampler::new(HeightmapParams {
                seed,
                ..Default::default()
            }),
        }
    }

    /// Mode this generator produces.
    pub fn mode(&self) -> WorldMode {
        self.mode
    }

    /// Resolved block ids.
    pub fn blocks(&self) -> &TerrainBlocks {
        &self.blocks
    }

    fn generate_flat(&self, sx: usize, sy: usize, sz: usize) -> Vec<u8> {
        let mut out = vec![AIR; sx * sy * sz];
        for y in 0..sy.min(8) {
            let id = match y {
                0 => self.blocks.bedrock,
                1..=3 => self.blocks.stone,
                4..=6 => self.blocks.dirt,
                _ => self.blocks.grass,
            };
            let start = local_index_with(0, y, 0, sx, sz);
            out[start..start + sx * sz].fill(id);
        }
        out
    }

    fn generate_single(&self, cx: i32, cz: i32, sx: usize, sy: usize, sz: usize) -> Vec<u8> {
        let mut out = vec![AIR; sx * sy * sz];
        let (wx, wy, wz) = SINGLE_BLOCK_POS;
        let base_x = i64::from(cx) * sx as i64;
        let base_z = i64::from(cz) * sz as i64;
        let lx = i64::from(wx) - base_x;
        let lz = i64::from(wz) - base_z;
        let in_chunk = (0..sx as i64).contains(&lx)
            && (0..sz as i64).contains(&lz)
            && (0..sy as i64).contains(&i64::from(wy));
        if in_chunk {
            out[local_index_with(lx as usize, wy as usize, lz as usize, sx, sz)] = self.blocks.grass;
        }
        out
    }

    fn generate_normal(&self, cx: i32, cz: i32, sx: usize, sy: usize, sz: usize) -> Vec<u8> {
        let mut out = vec![AIR; sx * sy * sz];
        if sy < 3 {
            return out;
        }
        let top = sy as i32 - 2;
        let sea = SEA_LEVEL.clamp(1, top);
        let b = &self.blocks;

        for z in 0..sz {
            for x in 0..sx {
                let wx = cx.wrapping_mul(sx as i32).wrapping_add(x as i32);
                let wz = cz.wrapping_mul(sz as i32).wrapping_add(z as i32);
                let h = self.heightmap.column_height(wx, wz, 1, top);

                let beach = h <= sea + 1;
                let (surface, soil) = if beach {
                    (b.sand, b.sand)
                } else if h > sea + SNOW_ABOVE_SEA {
                    (b.snow, b.stone)
                } else {
                    (b.grass, b.dirt)
                };

                for y in 0..sy as i32 {
                    let id = if y == 0 {
                        b.bedrock
                    } else if y == h {
                        surface
                    } else if y < h {
                        if y >= h - TOPSOIL_DEPTH { soil } else { b.stone }
                    } else if y <= sea {
                        b.water
                    } else {
                        break;
                    };
                    out[local_index_with(x, y as usize, z, sx, sz)] = id;
                }
            }
        }
        out
    }
}

impl ChunkGenerator for TerrainGenerator {
    fn generate(&self, cx: i32, cz: i32, sx: usize, sy: usize, sz: usize) -> Vec<u8> {
        match self.mode {
            WorldMode::Flat => self.generate_flat(sx, sy, sz),
            WorldMode::Single => self.generate_single(cx, cz, sx, sy, sz),
            WorldMode::Normal => self.generate_normal(cx, cz, sx, sy, sz),
        }
    }
}
