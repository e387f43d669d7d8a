//! Dense chunk column: block ids, block light, lifecycle and version state.
//!
//! A [`Chunk`] is shared between the main thread (which owns every mutation
//! of block and light content), the IO pool (which fills a placeholder once)
//! and the mesh workers (which only read). Cell storage is a flat array of
//! `AtomicU8` accessed with relaxed ordering, so concurrent reads during a
//! main-thread edit are well defined; staleness is detected through the
//! revision counters rather than by locking.
//!
//! ## Layout
//!
//! `index = (y * CHUNK_SZ + z) * CHUNK_SX + x`: x varies fastest, then z,
//! then y. Neighbor sampling and the light packer rely on this order.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Instant;

use crate::chunk_key::ChunkKey;

/// Chunk width along X.
pub const CHUNK_SX: usize = 16;
/// Chunk height along Y.
pub const CHUNK_SY: usize = 256;
/// Chunk depth along Z.
pub const CHUNK_SZ: usize = 16;
/// Cells per chunk.
pub const CHUNK_VOLUME: usize = CHUNK_SX * CHUNK_SY * CHUNK_SZ;

/// Highest block light level.
pub const MAX_LIGHT: u8 = 7;

/// Flat index of a local cell. Callers guarantee the coordinates are in range.
#[inline]
pub const fn local_index(x: usize, y: usize, z: usize) -> usize {
    local_index_with(x, y, z, CHUNK_SX, CHUNK_SZ)
}

/// Flat index in a grid of width `sx` and depth `sz`, same axis order.
#[inline]
pub const fn local_index_with(x: usize, y: usize, z: usize, sx: usize, sz: usize) -> usize {
    (y * sz + z) * sx + x
}

/// Milliseconds since the first call in this process. Monotonic.
pub fn monotonic_ms() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    u64::try_from(epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Chunk lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkStatus {
    /// Placeholder inserted; content is being loaded or generated.
    Loading = 0,
    /// Content is valid and may be meshed, lit and edited.
    Ready = 1,
    /// Evicted; any in-flight work for it must be discarded.
    Unloaded = 2,
}

impl ChunkStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ChunkStatus::Ready,
            2 => ChunkStatus::Unloaded,
            _ => ChunkStatus::Loading,
        }
    }
}

/// A geometry buffer that has been handed to the renderer.
///
/// Implemented by whatever the render collaborator uses as its GPU mesh
/// handle. Dropping the last `Arc` releases it.
pub trait GpuMesh: Send + Sync + fmt::Debug {
    /// Number of indices to draw.
    fn index_count(&self) -> usize;
}

/// Uploaded opaque and translucent surfaces of a chunk.
#[derive(Default, Debug)]
pub struct ChunkSurfaces {
    /// Opaque layer, drawn first.
    pub opaque: Option<Arc<dyn GpuMesh>>,
    /// Alpha-blended layer.
    pub alpha: Option<Arc<dyn GpuMesh>>,
}

impl ChunkSurfaces {
    /// `true` if the opaque layer has something to draw.
    pub fn has_opaque(&self) -> bool {
        self.opaque.as_ref().is_some_and(|m| m.index_count() > 0)
    }

    /// `true` if the alpha layer has something to draw.
    pub fn has_alpha(&self) -> bool {
        self.alpha.as_ref().is_some_and(|m| m.index_count() > 0)
    }
}

/// One 16×256×16 column of the world.
pub struct Chunk {
    cx: i32,
    cz: i32,
    blocks: Box<[AtomicU8]>,
    light: Box<[AtomicU8]>,
    status: AtomicU8,

    mesh_revision: AtomicU64,
    save_revision: AtomicU64,
    saved_revision: AtomicU64,
    last_dirty_time_ms: AtomicU64,

    dirty_blocks: AtomicBool,
    dirty_mesh: AtomicBool,
    mesh_building: AtomicBool,
    remesh_queued: AtomicBool,
    save_queued: AtomicBool,

    surfaces: Mutex<ChunkSurfaces>,
}

fn zeroed_cells() -> Box<[AtomicU8]> {
    (0..CHUNK_VOLUME).map(|_| AtomicU8::new(0)).collect()
}

impl Chunk {
    /// Creates an all-air placeholder in the `Loading` state.
    pub fn new(cx: i32, cz: i32) -> Self {
        Self {
            cx,
            cz,
            blocks: zeroed_cells(),
            light: zeroed_cells(),
            status: AtomicU8::new(ChunkStatus::Loading as u8),
            mesh_revision: AtomicU64::new(0),
            save_revision: AtomicU64::new(0),
            saved_revision: AtomicU64::new(0),
            last_dirty_time_ms: AtomicU64::new(0),
            dirty_blocks: AtomicBool::new(false),
            dirty_mesh: AtomicBool::new(true),
            mesh_building: AtomicBool::new(false),
            remesh_queued: AtomicBool::new(false),
            save_queued: AtomicBool::new(false),
            surfaces: Mutex::new(ChunkSurfaces::default()),
        }
    }

    /// Chunk X coordinate.
    #[inline]
    pub fn cx(&self) -> i32 {
        self.cx
    }

    /// Chunk Z coordinate.
    #[inline]
    pub fn cz(&self) -> i32 {
        self.cz
    }

    /// Packed key of this chunk.
    #[inline]
    pub fn key(&self) -> ChunkKey {
        ChunkKey::new(self.cx, self.cz)
    }

    /// World X of local `x = 0`.
    #[inline]
    pub fn base_x(&self) -> i32 {
        self.cx.wrapping_mul(CHUNK_SX as i32)
    }

    /// World Z of local `z = 0`.
    #[inline]
    pub fn base_z(&self) -> i32 {
        self.cz.wrapping_mul(CHUNK_SZ as i32)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Current lifecycle state.
    #[inline]
    pub fn status(&self) -> ChunkStatus {
        ChunkStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Publishes a lifecycle transition. Content written before a transition
    /// to `Ready` is visible to any thread that observes `Ready`.
    pub fn set_status(&self, status: ChunkStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Atomically moves `from → to`. Returns `false` if the chunk was not in
    /// `from`, e.g. a load finishing after the chunk was already evicted.
    pub fn try_transition(&self, from: ChunkStatus, to: ChunkStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `true` while the chunk is `Ready`.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.status() == ChunkStatus::Ready
    }

    // -----------------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------------

    /// Block id at a local cell.
    #[inline]
    pub fn block(&self, x: usize, y: usize, z: usize) -> u8 {
        self.blocks[local_index(x, y, z)].load(Ordering::Relaxed)
    }

    /// Block id at a flat index.
    #[inline]
    pub fn block_at_index(&self, index: usize) -> u8 {
        self.blocks[index].load(Ordering::Relaxed)
    }

    /// Writes a block as a user edit: marks blocks and mesh dirty, stamps the
    /// edit time and bumps both the save and mesh revisions.
    pub fn set_block(&self, x: usize, y: usize, z: usize, id: u8) {
        self.blocks[local_index(x, y, z)].store(id, Ordering::Relaxed);

        self.dirty_blocks.store(true, Ordering::Release);
        self.last_dirty_time_ms
            .store(monotonic_ms(), Ordering::Release);
        self.save_revision.fetch_add(1, Ordering::AcqRel);

        self.dirty_mesh.store(true, Ordering::Release);
        self.mesh_revision.fetch_add(1, Ordering::AcqRel);
    }

    /// Bulk-fills block content from a loaded or generated array. Intended
    /// for the IO pipeline while the chunk is still `Loading`; does not touch
    /// revisions. Extra or missing input bytes are ignored / left as air.
    pub fn fill_blocks(&self, src: &[u8]) {
        for (cell, &id) in self.blocks.iter().zip(src) {
            cell.store(id, Ordering::Relaxed);
        }
    }

    /// Copies the block array. Used to hand an immutable snapshot to a
    /// background writer.
    pub fn snapshot_blocks(&self) -> Vec<u8> {
        self.blocks
            .iter()
            .map(|cell| cell.load(Ordering::Relaxed))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Light
    // -----------------------------------------------------------------------

    /// Block light level (0..=7) at a local cell.
    #[inline]
    pub fn light(&self, x: usize, y: usize, z: usize) -> u8 {
        self.light[local_index(x, y, z)].load(Ordering::Relaxed)
    }

    /// Sets a light level. Returns `true` and marks the mesh stale only if
    /// the stored value changed. Light never affects the save state.
    pub fn set_light(&self, x: usize, y: usize, z: usize, level: u8) -> bool {
        let prev = self.light[local_index(x, y, z)].swap(level, Ordering::Relaxed);
        if prev == level {
            return false;
        }
        self.dirty_mesh.store(true, Ordering::Release);
        self.mesh_revision.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Zeroes the whole light grid. Returns `true` if any cell was lit.
    pub fn clear_light(&self) -> bool {
        let mut changed = false;
        for cell in self.light.iter() {
            if cell.swap(0, Ordering::Relaxed) != 0 {
                changed = true;
            }
        }
        if changed {
            self.dirty_mesh.store(true, Ordering::Release);
            self.mesh_revision.fetch_add(1, Ordering::AcqRel);
        }
        changed
    }

    // -----------------------------------------------------------------------
    // Revisions
    // -----------------------------------------------------------------------

    /// Revision bumped on every block or light mutation and by forced remeshes.
    #[inline]
    pub fn mesh_revision(&self) -> u64 {
        self.mesh_revision.load(Ordering::Acquire)
    }

    /// Invalidates any mesh build in flight. Returns the new revision.
    pub fn bump_mesh_revision(&self) -> u64 {
        self.mesh_revision.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Revision bumped on every block edit.
    #[inline]
    pub fn save_revision(&self) -> u64 {
        self.save_revision.load(Ordering::Acquire)
    }

    /// Save revision that was last written to disk.
    #[inline]
    pub fn saved_revision(&self) -> u64 {
        self.saved_revision.load(Ordering::Acquire)
    }

    /// Records that the content at `rev` has been persisted.
    pub fn set_saved_revision(&self, rev: u64) {
        self.saved_revision.store(rev, Ordering::Release);
    }

    /// Time of the last block edit, from [`monotonic_ms`].
    #[inline]
    pub fn last_dirty_time_ms(&self) -> u64 {
        self.last_dirty_time_ms.load(Ordering::Acquire)
    }

    /// `true` if some edit has not been persisted yet.
    pub fn has_unsaved_edits(&self) -> bool {
        self.saved_revision() != self.save_revision()
    }

    // -----------------------------------------------------------------------
    // Flags
    // -----------------------------------------------------------------------

    /// Block content differs from what is on disk.
    #[inline]
    pub fn is_dirty_blocks(&self) -> bool {
        self.dirty_blocks.load(Ordering::Acquire)
    }

    /// Sets or clears the unsaved-content flag.
    pub fn set_dirty_blocks(&self, dirty: bool) {
        self.dirty_blocks.store(dirty, Ordering::Release);
    }

    /// Mesh no longer reflects content.
    #[inline]
    pub fn is_dirty_mesh(&self) -> bool {
        self.dirty_mesh.load(Ordering::Acquire)
    }

    /// Sets or clears the stale-mesh flag.
    pub fn set_dirty_mesh(&self, dirty: bool) {
        self.dirty_mesh.store(dirty, Ordering::Release);
    }

    /// A worker is currently building this chunk's mesh.
    #[inline]
    pub fn is_mesh_building(&self) -> bool {
        self.mesh_building.load(Ordering::Acquire)
    }

    /// Marks the start or end of a mesh build.
    pub fn set_mesh_building(&self, building: bool) {
        self.mesh_building.store(building, Ordering::Release);
    }

    /// A mesh task for this chunk sits in the scheduler queue or is running.
    #[inline]
    pub fn is_remesh_queued(&self) -> bool {
        self.remesh_queued.load(Ordering::Acquire)
    }

    /// Claims the remesh slot. Returns `false` if it was already claimed.
    pub fn try_mark_remesh_queued(&self) -> bool {
        self.remesh_queued
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases the remesh slot.
    pub fn clear_remesh_queued(&self) {
        self.remesh_queued.store(false, Ordering::Release);
    }

    /// Claims the save slot. Returns `false` if a save is already queued.
    pub fn try_mark_save_queued(&self) -> bool {
        self.save_queued
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases the save slot.
    pub fn clear_save_queued(&self) {
        self.save_queued.store(false, Ordering::Release);
    }

    /// `true` while a coalesced save is queued or running.
    pub fn is_save_queued(&self) -> bool {
        self.save_queued.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Surfaces (render owner only)
    // -----------------------------------------------------------------------

    /// Locks the uploaded surfaces.
    pub fn surfaces(&self) -> MutexGuard<'_, ChunkSurfaces> {
        self.surfaces.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `true` if either layer has drawable geometry.
    pub fn has_surfaces(&self) -> bool {
        let s = self.surfaces();
        s.has_opaque() || s.has_alpha()
    }

    /// Replaces both layers, dropping the previous buffers. Ignored unless
    /// the chunk is `Ready`.
    pub fn apply_surfaces(&self, opaque: Option<Arc<dyn GpuMesh>>, alpha: Option<Arc<dyn GpuMesh>>) {
        if !self.is_ready() {
            return;
        }
        let mut s = self.surfaces();
        s.opaque = opaque.filter(|m| m.index_count() > 0);
        s.alpha = alpha.filter(|m| m.index_count() > 0);
    }

    /// Releases both layers.
    pub fn dispose_surfaces(&self) {
        let mut s = self.surfaces();
        s.opaque = None;
        s.alpha = None;
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("cx", &self.cx)
            .field("cz", &self.cz)
            .field("status", &self.status())
            .field("mesh_revision", &self.mesh_revision())
            .field("save_revision", &self.save_revision())
            .field("saved_revision", &self.saved_revision())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FakeMesh(usize);

    impl GpuMesh for FakeMesh {
        fn index_count(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn test_index_order_x_then_z_then_y() {
        assert_eq!(local_index(0, 0, 0), 0);
        assert_eq!(local_index(1, 0, 0), 1);
        assert_eq!(local_index(0, 0, 1), CHUNK_SX);
        assert_eq!(local_index(0, 1, 0), CHUNK_SX * CHUNK_SZ);
        assert_eq!(local_index(15, 255, 15), CHUNK_VOLUME - 1);
    }

    #[test]
    fn test_new_chunk_is_loading_air() {
        let c = Chunk::new(3, -4);
        assert_eq!(c.status(), ChunkStatus::Loading);
        assert_eq!(c.key(), ChunkKey::new(3, -4));
        assert_eq!(c.block(5, 100, 5), 0);
        assert_eq!(c.base_x(), 48);
        assert_eq!(c.base_z(), -64);
        assert!(c.is_dirty_mesh());
        assert!(!c.is_dirty_blocks());
    }

    #[test]
    fn test_transition_requires_expected_state() {
        let c = Chunk::new(0, 0);
        c.set_status(ChunkStatus::Unloaded);
        assert!(!c.try_transition(ChunkStatus::Loading, ChunkStatus::Ready));
        assert_eq!(c.status(), ChunkStatus::Unloaded);

        let d = Chunk::new(0, 0);
        assert!(d.try_transition(ChunkStatus::Loading, ChunkStatus::Ready));
        assert!(d.is_ready());
    }

    #[test]
    fn test_set_block_bumps_revisions() {
        let c = Chunk::new(0, 0);
        let mesh_rev = c.mesh_revision();
        c.set_block(1, 2, 3, 9);
        assert_eq!(c.block(1, 2, 3), 9);
        assert_eq!(c.mesh_revision(), mesh_rev + 1);
        assert_eq!(c.save_revision(), 1);
        assert!(c.is_dirty_blocks());
        assert!(c.is_dirty_mesh());
        assert!(c.has_unsaved_edits());
    }

    #[test]
    fn test_set_light_only_bumps_on_change() {
        let c = Chunk::new(0, 0);
        c.set_dirty_mesh(false);
        let rev = c.mesh_revision();

        assert!(c.set_light(0, 0, 0, 5));
        assert_eq!(c.mesh_revision(), rev + 1);
        assert!(c.is_dirty_mesh());

        c.set_dirty_mesh(false);
        assert!(!c.set_light(0, 0, 0, 5));
        assert_eq!(c.mesh_revision(), rev + 1);
        assert!(!c.is_dirty_mesh());
        assert_eq!(c.save_revision(), 0, "light must not affect saving");
    }

    #[test]
    fn test_clear_light_reports_change() {
        let c = Chunk::new(0, 0);
        assert!(!c.clear_light());
        c.set_light(4, 4, 4, 7);
        assert!(c.clear_light());
        assert_eq!(c.light(4, 4, 4), 0);
    }

    #[test]
    fn test_fill_and_snapshot() {
        let c = Chunk::new(0, 0);
        let mut src = vec![0u8; CHUNK_VOLUME];
        src[local_index(2, 3, 4)] = 7;
        c.fill_blocks(&src);
        assert_eq!(c.block(2, 3, 4), 7);
        assert_eq!(c.save_revision(), 0);
        assert_eq!(c.snapshot_blocks(), src);
    }

    #[test]
    fn test_queue_flags_are_exclusive() {
        let c = Chunk::new(0, 0);
        assert!(c.try_mark_remesh_queued());
        assert!(!c.try_mark_remesh_queued());
        c.clear_remesh_queued();
        assert!(c.try_mark_remesh_queued());

        assert!(c.try_mark_save_queued());
        assert!(!c.try_mark_save_queued());
        c.clear_save_queued();
        assert!(!c.is_save_queued());
    }

    #[test]
    fn test_surfaces_apply_only_when_ready() {
        let c = Chunk::new(0, 0);
        c.apply_surfaces(Some(Arc::new(FakeMesh(6))), None);
        assert!(!c.has_surfaces());

        c.set_status(ChunkStatus::Ready);
        c.apply_surfaces(Some(Arc::new(FakeMesh(6))), Some(Arc::new(FakeMesh(0))));
        assert!(c.has_surfaces());
        assert!(c.surfaces().alpha.is_none(), "empty layers are dropped");

        c.dispose_surfaces();
        assert!(!c.has_surfaces());
    }
}
