//! Block and light sampling across chunk seams.
//!
//! A [`ChunkNeighborhood`] holds the chunk being meshed plus its four axis
//! neighbors. Coordinates are chunk-local and may step one cell outside the
//! chunk along X or Z; such reads resolve through the neighbor. Cells above
//! or below the column, in a missing neighbor, or in a neighbor that is not
//! `Ready` read as air and darkness.

use std::sync::Arc;

use nebula_voxel::{AIR, BlockId, CHUNK_SX, CHUNK_SY, CHUNK_SZ, Chunk, ChunkStore};

/// Cell content needed by the mesher.
pub trait VoxelSampler {
    /// Block id at a chunk-local, possibly out-of-range cell.
    fn block(&self, lx: i32, ly: i32, lz: i32) -> BlockId;

    /// Block light level (`0..=7`) at a chunk-local, possibly out-of-range cell.
    fn light(&self, lx: i32, ly: i32, lz: i32) -> u8;
}

/// The chunk being meshed and its four axis neighbors.
#[derive(Clone, Debug)]
pub struct ChunkNeighborhood {
    center: Arc<Chunk>,
    /// -X, +X, -Z, +Z.
    neighbors: [Option<Arc<Chunk>>; 4],
}

const NEG_X: usize = 0;
const POS_X: usize = 1;
const NEG_Z: usize = 2;
const POS_Z: usize = 3;

impl ChunkNeighborhood {
    /// A neighborhood with no neighbors: everything outside reads as air.
    pub fn isolated(center: Arc<Chunk>) -> Self {
        Self {
            center,
            neighbors: [None, None, None, None],
        }
    }

    /// Captures the resident neighbors of `center` from `store`.
    pub fn from_store(store: &ChunkStore, center: Arc<Chunk>) -> Self {
        let (cx, cz) = (center.cx(), center.cz());
        let neighbors = [
            store.get(cx.wrapping_sub(1), cz),
            store.get(cx.wrapping_add(1), cz),
            store.get(cx, cz.wrapping_sub(1)),
            store.get(cx, cz.wrapping_add(1)),
        ];
        Self { center, neighbors }
    }

    /// Builder: sets the neighbor at `(dx, dz)`, one of the four unit offsets.
    pub fn with_neighbor(mut self, dx: i32, dz: i32, chunk: Arc<Chunk>) -> Self {
        if let Some(slot) = slot_for(dx, dz) {
            self.neighbors[slot] = Some(chunk);
        }
        self
    }

    /// The chunk being meshed.
    pub fn center(&self) -> &Arc<Chunk> {
        &self.center
    }

    /// Resolves a local cell to `(chunk, x, y, z)` in that chunk's space.
    fn resolve(&self, lx: i32, ly: i32, lz: i32) -> Option<(&Chunk, usize, usize, usize)> {
        const SX: i32 = CHUNK_SX as i32;
        const SY: i32 = CHUNK_SY as i32;
        const SZ: i32 = CHUNK_SZ as i32;

        if !(0..SY).contains(&ly) {
            return None;
        }
        let in_x = (0..SX).contains(&lx);
        let in_z = (0..SZ).contains(&lz);
        let (chunk, x, z) = match (in_x, in_z) {
            (true, true) => (self.center.as_ref(), lx, lz),
            (false, true) => {
                let (slot, x) = if lx < 0 { (NEG_X, lx + SX) } else { (POS_X, lx - SX) };
                (self.neighbors[slot].as_deref()?, x, lz)
            }
            (true, false) => {
                let (slot, z) = if lz < 0 { (NEG_Z, lz + SZ) } else { (POS_Z, lz - SZ) };
                (self.neighbors[slot].as_deref()?, lx, z)
            }
            (false, false) => return None,
        };
        if !(0..SX).contains(&x) || !(0..SZ).contains(&z) || !chunk.is_ready() {
            return None;
        }
        Some((chunk, x as usize, ly as usize, z as usize))
    }
}

fn slot_for(dx: i32, dz: i32) -> Option<usize> {
    match (dx, dz) {
        (-1, 0) => Some(NEG_X),
        (1, 0) => Some(POS_X),
        (0, -1) => Some(NEG_Z),
        (0, 1) => Some(POS_Z),
        _ => None,
    }
}

impl VoxelSampler for ChunkNeighborhood {
    #[inline]
    fn block(&self, lx: i32, ly: i32, lz: i32) -> BlockId {
        self.resolve(lx, ly, lz)
            .map_or(AIR, |(c, x, y, z)| c.block(x, y, z))
    }

    #[inline]
    fn light(&self, lx: i32, ly: i32, lz: i32) -> u8 {
        self.resolve(lx, ly, lz)
            .map_or(0, |(c, x, y, z)| c.light(x, y, z))
    }
}
