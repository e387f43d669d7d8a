//! Concurrent map of resident chunks.
//!
//! Readers on any thread may look chunks up while the main thread inserts
//! and removes them; [`DashMap`] shards the map so lookups from mesh and IO
//! workers rarely contend.

use std::sync::Arc;

use dashmap::DashMap;

use crate::chunk::Chunk;
use crate::chunk_key::ChunkKey;

/// Key → chunk map shared by the world, IO, mesh and light systems.
#[derive(Default)]
pub struct ChunkStore {
    chunks: DashMap<ChunkKey, Arc<Chunk>>,
}

impl ChunkStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunk at `(cx, cz)`, if resident.
    pub fn get(&self, cx: i32, cz: i32) -> Option<Arc<Chunk>> {
        self.get_by_key(ChunkKey::new(cx, cz))
    }

    /// Chunk for `key`, if resident.
    pub fn get_by_key(&self, key: ChunkKey) -> Option<Arc<Chunk>> {
        self.chunks.get(&key).map(|entry| Arc::clone(entry.value()))
    }

    /// `true` if a chunk (in any state) is resident at `(cx, cz)`.
    pub fn contains(&self, cx: i32, cz: i32) -> bool {
        self.chunks.contains_key(&ChunkKey::new(cx, cz))
    }

    /// Returns the existing chunk or atomically inserts a fresh `Loading`
    /// placeholder. The second value is `true` when a placeholder was created.
    pub fn get_or_create_placeholder(&self, cx: i32, cz: i32) -> (Arc<Chunk>, bool) {
        let mut created = false;
        let chunk = self
            .chunks
            .entry(ChunkKey::new(cx, cz))
            .or_insert_with(|| {
                created = true;
                Arc::new(Chunk::new(cx, cz))
            })
            .value()
            .clone();
        (chunk, created)
    }

    /// Removes and returns the chunk at `key`.
    pub fn remove(&self, key: ChunkKey) -> Option<Arc<Chunk>> {
        self.chunks.remove(&key).map(|(_, chunk)| chunk)
    }

    /// Drops every chunk.
    pub fn clear(&self) {
        self.chunks.clear();
    }

    /// Number of resident chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// `true` if no chunk is resident.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Snapshot of all resident chunks. The map is not locked afterwards.
    pub fn snapshot(&self) -> Vec<Arc<Chunk>> {
        self.chunks.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Ready chunks within `radius` (Euclidean, in chunks) of `(pcx, pcz)`
    /// that have something to draw or a mesh pending, in row-major order.
    pub fn build_visible_set(&self, pcx: i32, pcz: i32, radius: i32) -> Vec<Arc<Chunk>> {
        let radius = radius.max(0);
        let r2 = i64::from(radius) * i64::from(radius);
        let mut out = Vec::new();
        for dz in -radius..=radius {
            for dx in -radius..=radius {
                if i64::from(dx) * i64::from(dx) + i64::from(dz) * i64::from(dz) > r2 {
                    continue;
                }
                let Some(chunk) = self.get(pcx.wrapping_add(dx), pcz.wrapping_add(dz)) else {
                    continue;
                };
                if !chunk.is_ready() {
                    continue;
                }
                if chunk.has_surfaces() || chunk.is_dirty_mesh() {
                    out.push(chunk);
                }
            }
        }
        out
    }

    /// Keys of resident chunks strictly farther than `radius` from
    /// `(pcx, pcz)`.
    pub fn collect_eviction_candidates(&self, pcx: i32, pcz: i32, radius: i32) -> Vec<ChunkKey> {
        let r2 = i64::from(radius) * i64::from(radius);
        self.chunks
            .iter()
            .map(|e| *e.key())
            .filter(|key| key.dist2_to(pcx, pcz) > r2)
            .collect()
    }
}
