//! Incremental flood-fill block light across resident chunks.
//!
//! Light levels run `0..=MAX_LIGHT` and drop by one per face step. A source
//! keeps its own level even when opaque; light enters a cell when it is air,
//! a source, or not opaque.
//!
//! Every change runs a removal phase and then an addition phase. Removal
//! walks outward from cleared cells, darkening neighbors that were only lit
//! through them and handing brighter neighbors to the addition phase so they
//! can re-fill the hole. Each phase stops at a pop ceiling; a truncated pass
//! leaves cells under-lit, never over-lit.

use std::sync::Arc;

use nebula_config::LightConfig;
use nebula_voxel::{AIR, BlockId, BlockRegistry, CHUNK_SX, CHUNK_SY, CHUNK_SZ, Chunk, ChunkStore, MAX_LIGHT, RemeshSink};
use tracing::{debug, warn};

use crate::queues::{LightQueues, pack_local, unpack_local};
use crate::touched::TouchedChunks;

const SX: i32 = CHUNK_SX as i32;
const SY: i32 = CHUNK_SY as i32;
const SZ: i32 = CHUNK_SZ as i32;

/// Thickness of the neighbor border scanned when a chunk becomes ready.
const BORDER_WIDTH: usize = MAX_LIGHT as usize;

/// Splits a world X or Z coordinate into chunk coordinate and local offset.
#[inline]
fn split(w: i32) -> (i32, usize) {
    (w >> 4, (w & 15) as usize)
}

/// Owner-thread block light engine.
pub struct BlockLightSystem {
    store: Arc<ChunkStore>,
    registry: Arc<BlockRegistry>,
    sink: Arc<dyn RemeshSink>,
    queues: LightQueues,
    touched: TouchedChunks,
    max_add_pops: usize,
    max_remove_pops: usize,
    batch_depth: u32,
}

impl BlockLightSystem {
    pub fn new(
        store: Arc<ChunkStore>,
        registry: Arc<BlockRegistry>,
        sink: Arc<dyn RemeshSink>,
        config: &LightConfig,
    ) -> Self {
        Self {
            store,
            registry,
            sink,
            queues: LightQueues::new(),
            touched: TouchedChunks::new(),
            max_add_pops: config.max_add_pops,
            max_remove_pops: config.max_remove_pops,
            batch_depth: 0,
        }
    }

    /// `true` between the outermost [`begin_batch`](Self::begin_batch) and
    /// its matching [`end_batch`](Self::end_batch).
    pub fn is_batching(&self) -> bool {
        self.batch_depth > 0
    }

    /// Defers propagation and remeshing until the outermost batch ends.
    /// Batches nest.
    pub fn begin_batch(&mut self) {
        if self.batch_depth == 0 {
            self.queues.clear();
            self.touched.begin_pass();
        }
        self.batch_depth += 1;
    }

    /// Closes a batch. The outermost close propagates everything queued
    /// since the batch began and remeshes every touched chunk once.
    pub fn end_batch(&mut self) {
        if self.batch_depth == 0 {
            return;
        }
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            self.process_queues();
            self.flush_touched();
            self.queues.clear();
        }
    }

    /// Light at a world cell; zero outside the world or in a chunk that is
    /// not resident and ready.
    pub fn light_at(&self, wx: i32, wy: i32, wz: i32) -> u8 {
        if !(0..SY).contains(&wy) {
            return 0;
        }
        let (cx, lx) = split(wx);
        let (cz, lz) = split(wz);
        match self.store.get(cx, cz) {
            Some(c) if c.is_ready() => c.light(lx, wy as usize, lz),
            _ => 0,
        }
    }

    fn block_at(&self, wx: i32, wy: i32, wz: i32) -> BlockId {
        if !(0..SY).contains(&wy) {
            return AIR;
        }
        let (cx, lx) = split(wx);
        let (cz, lz) = split(wz);
        match self.store.get(cx, cz) {
            Some(c) if c.is_ready() => c.block(lx, wy as usize, lz),
            _ => AIR,
        }
    }

    /// Recomputes light for a chunk that just became ready: clears it,
    /// seeds its own sources, pulls light in from the lit borders of ready
    /// neighbors, propagates and remeshes whatever changed.
    pub fn on_chunk_ready(&mut self, chunk: &Arc<Chunk>) {
        if !chunk.is_ready() {
            return;
        }
        let batching = self.is_batching();
        if !batching {
            self.queues.clear();
            self.touched.begin_pass();
        }

        chunk.clear_light();
        self.touched.mark(chunk);

        self.seed_chunk_sources(chunk);
        self.seed_from_neighbor_borders(chunk);

        if !batching {
            self.process_queues();
            self.flush_touched();
        }
    }

    /// Updates light after the block at a world cell changed from `old_id`
    /// to `new_id`. The block array must already hold `new_id`.
    pub fn on_block_changed(&mut self, wx: i32, wy: i32, wz: i32, old_id: BlockId, new_id: BlockId) {
        if !(0..SY).contains(&wy) {
            return;
        }
        if self.is_batching() {
            self.enqueue_change(wx, wy, wz, new_id);
            return;
        }

        self.queues.clear();
        self.touched.begin_pass();
        self.enqueue_change(wx, wy, wz, new_id);
        self.process_queues();
        self.flush_touched();
        debug!(wx, wy, wz, old_id, new_id, "block light updated");
    }

    fn enqueue_change(&mut self, wx: i32, wy: i32, wz: i32, new_id: BlockId) {
        let old_level = self.light_at(wx, wy, wz);
        if old_level > 0 {
            self.set_light_world(wx, wy, wz, 0);
            self.queues.push_remove(wx, wy, wz, old_level);
        }

        let src = self.registry.light_level(new_id);
        if src > 0 {
            self.set_light_world(wx, wy, wz, src);
            self.enqueue_add_world(wx, wy, wz);
        }

        self.seed_neighbor_add(wx, wy, wz);
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    fn seed_chunk_sources(&mut self, chunk: &Arc<Chunk>) {
        for y in 0..CHUNK_SY {
            for z in 0..CHUNK_SZ {
                for x in 0..CHUNK_SX {
                    let src = self.registry.light_level(chunk.block(x, y, z));
                    if src == 0 {
                        continue;
                    }
                    self.set_light_local(chunk, x, y, z, src);
                    self.enqueue_add_local(chunk, x, y, z);
                }
            }
        }
    }

    /// Re-opens paths around a changed cell: lit or emitting neighbors spread
    /// again.
    fn seed_neighbor_add(&mut self, wx: i32, wy: i32, wz: i32) {
        for (dx, dy, dz) in NEIGHBORS_6 {
            let (nx, ny, nz) = (wx + dx, wy + dy, wz + dz);
            if !(0..SY).contains(&ny) {
                continue;
            }
            if self.light_at(nx, ny, nz) > 0 || self.registry.light_level(self.block_at(nx, ny, nz)) > 0 {
                self.enqueue_add_world(nx, ny, nz);
            }
        }
    }

    fn seed_from_neighbor_borders(&mut self, chunk: &Chunk) {
        let (cx, cz) = (chunk.cx(), chunk.cz());
        for (dx, dz) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            let Some(n) = self.store.get(cx.wrapping_add(dx), cz.wrapping_add(dz)) else {
                continue;
            };
            if !n.is_ready() {
                continue;
            }
            // The strip of the neighbor that faces this chunk.
            let (xs, zs) = match (dx, dz) {
                (1, _) => (0..BORDER_WIDTH, 0..CHUNK_SZ),
                (-1, _) => (CHUNK_SX - BORDER_WIDTH..CHUNK_SX, 0..CHUNK_SZ),
                (_, 1) => (0..CHUNK_SX, 0..BORDER_WIDTH),
                _ => (0..CHUNK_SX, CHUNK_SZ - BORDER_WIDTH..CHUNK_SZ),
            };
            for y in 0..CHUNK_SY {
                for z in zs.clone() {
                    for x in xs.clone() {
                        if n.light(x, y, z) > 0 {
                            self.enqueue_add_local(&n, x, y, z);
                        }
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Cell access
    // -----------------------------------------------------------------------

    fn set_light_world(&mut self, wx: i32, wy: i32, wz: i32, level: u8) {
        if !(0..SY).contains(&wy) {
            return;
        }
        let (cx, lx) = split(wx);
        let (cz, lz) = split(wz);
        if let Some(c) = self.store.get(cx, cz) {
            if c.is_ready() {
                self.set_light_local(&c, lx, wy as usize, lz, level);
            }
        }
    }

    fn set_light_local(&mut self, chunk: &Chunk, lx: usize, ly: usize, lz: usize, level: u8) {
        if chunk.set_light(lx, ly, lz, level) {
            self.touched.mark(chunk);
        }
    }

    fn enqueue_add_world(&mut self, wx: i32, wy: i32, wz: i32) {
        if !(0..SY).contains(&wy) {
            return;
        }
        let (cx, lx) = split(wx);
        let (cz, lz) = split(wz);
        if let Some(c) = self.store.get(cx, cz) {
            if c.is_ready() {
                self.enqueue_add_local(&c, lx, wy as usize, lz);
            }
        }
    }

    fn enqueue_add_local(&mut self, chunk: &Chunk, lx: usize, ly: usize, lz: usize) {
        self.queues.push_add(chunk.key(), pack_local(lx, ly, lz));
    }

    fn can_light_enter(&self, id: BlockId) -> bool {
        id == AIR || self.registry.light_level(id) > 0 || !self.registry.is_opaque(id)
    }

    // -----------------------------------------------------------------------
    // Propagation
    // -----------------------------------------------------------------------

    fn process_queues(&mut self) {
        self.process_removals();
        self.process_additions();
    }

    fn process_removals(&mut self) {
        let mut pops = 0usize;
        while let Some(e) = self.queues.pop_remove() {
            pops += 1;
            if pops > self.max_remove_pops {
                warn!(
                    remaining = self.queues.remove_len() + 1,
                    "light removal pop limit hit"
                );
                return;
            }
            if e.level <= 1 {
                continue;
            }
            for (dx, dy, dz) in NEIGHBORS_6 {
                self.remove_check_neighbor(e.x + dx, e.y + dy, e.z + dz, e.level);
            }
        }
    }

    fn remove_check_neighbor(&mut self, nx: i32, ny: i32, nz: i32, old_level: u8) {
        if !(0..SY).contains(&ny) {
            return;
        }
        let level = self.light_at(nx, ny, nz);
        if level == 0 {
            return;
        }
        if level < old_level {
            self.set_light_world(nx, ny, nz, 0);
            self.queues.push_remove(nx, ny, nz, level);
            // A dimmer emitter keeps its own light and spreads it again.
            let src = self.registry.light_level(self.block_at(nx, ny, nz));
            if src > 0 {
                self.set_light_world(nx, ny, nz, src);
                self.enqueue_add_world(nx, ny, nz);
            }
        } else {
            self.enqueue_add_world(nx, ny, nz);
        }
    }

    fn process_additions(&mut self) {
        let mut pops = 0usize;
        while let Some((key, local)) = self.queues.pop_add() {
            pops += 1;
            if pops > self.max_add_pops {
                warn!(
                    remaining = self.queues.add_len() + 1,
                    "light addition pop limit hit"
                );
                return;
            }

            let Some(c) = self.store.get_by_key(key) else {
                continue;
            };
            if !c.is_ready() {
                continue;
            }
            let (lx, ly, lz) = unpack_local(local);
            let level = c.light(lx, ly, lz);
            if level <= 1 {
                continue;
            }
            let next = level - 1;
            let (ix, iy, iz) = (lx as i32, ly as i32, lz as i32);

            for (dx, dy, dz) in NEIGHBORS_6 {
                let (nx, ny, nz) = (ix + dx, iy + dy, iz + dz);
                if !(0..SY).contains(&ny) {
                    continue;
                }
                if (0..SX).contains(&nx) && (0..SZ).contains(&nz) {
                    self.try_propagate(&c, nx as usize, ny as usize, nz as usize, next);
                    continue;
                }
                let Some(n) = self.store.get(c.cx().wrapping_add(dx), c.cz().wrapping_add(dz)) else {
                    continue;
                };
                if n.is_ready() {
                    self.try_propagate(&n, nx.rem_euclid(SX) as usize, ny as usize, nz.rem_euclid(SZ) as usize, next);
                }
            }
        }
    }

    fn try_propagate(&mut self, chunk: &Chunk, lx: usize, ly: usize, lz: usize, candidate: u8) {
        if candidate == 0 || !self.can_light_enter(chunk.block(lx, ly, lz)) {
            return;
        }
        if candidate > chunk.light(lx, ly, lz) {
            self.set_light_local(chunk, lx, ly, lz, candidate);
            self.enqueue_add_local(chunk, lx, ly, lz);
        }
    }

    fn flush_touched(&mut self) {
        self.touched.flush(&self.store, self.sink.as_ref());
    }
}

const NEIGHBORS_6: [(i32, i32, i32); 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];
