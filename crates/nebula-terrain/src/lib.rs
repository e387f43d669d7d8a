//! Procedural terrain: fBm heightmap and the per-mode chunk generator.

mod generator;
mod heightmap;

pub use generator::{
    SEA_LEVEL, SINGLE_BLOCK_POS, SNOW_ABOVE_SEA, TOPSOIL_DEPTH, TerrainBlocks, TerrainGenerator,
};
pub use heightmap::{HeightmapParams, HeightmapSampler};
