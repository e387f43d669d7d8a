//! Nearest-first mesh scheduling with stale-result rejection.
//!
//! Remesh requests go into a bounded priority queue ordered by squared chunk
//! distance to the observer. A pool of `mesh-worker-N` threads pops tasks,
//! builds geometry and sends it back over a channel; the render owner applies
//! results with [`MeshSystem::pump_uploads`].
//!
//! Every result carries the chunk's mesh revision at build start. A result
//! whose revision no longer matches is discarded, and the chunk is queued
//! again if it is still dirty.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};
use nebula_config::MeshConfig;
use nebula_voxel::{Chunk, ChunkKey, ChunkStore, GpuMesh, RemeshSink};
use tracing::{debug, error, info, warn};

use crate::chunk_mesher::ChunkMesher;
use crate::neighborhood::ChunkNeighborhood;
use crate::vertex::{ChunkMeshData, MeshData};

/// Smallest accepted queue capacity.
pub const MIN_QUEUE_CAPACITY: usize = 64;

/// Turns CPU geometry into a drawable handle. Runs on the render owner.
pub trait MeshUploader {
    /// Uploads one layer. Empty meshes may return `None`.
    fn upload(&self, mesh: MeshData) -> Option<Arc<dyn GpuMesh>>;
}

/// Keeps geometry in CPU memory. Used headless and in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuUploader;

impl MeshUploader for CpuUploader {
    fn upload(&self, mesh: MeshData) -> Option<Arc<dyn GpuMesh>> {
        if mesh.is_empty() {
            None
        } else {
            Some(Arc::new(mesh))
        }
    }
}

/// Snapshot of scheduler load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MeshStats {
    /// Tasks waiting in the priority queue.
    pub queued: usize,
    /// Finished builds waiting for [`MeshSystem::pump_uploads`].
    pub pending_uploads: usize,
    /// Live worker threads.
    pub workers: usize,
}

struct MeshUpload {
    key: ChunkKey,
    revision: u64,
    data: ChunkMeshData,
}

struct MeshTask {
    chunk: Arc<Chunk>,
    /// Squared chunk distance to the observer; smaller is sooner.
    priority: i64,
    /// Submission order, breaks ties.
    seq: u64,
}

impl MeshTask {
    fn rank(&self) -> (i64, u64) {
        (self.priority, self.seq)
    }
}

impl PartialEq for MeshTask {
    fn eq(&self, other: &Self) -> bool {
        self.rank() == other.rank()
    }
}

impl Eq for MeshTask {}

impl PartialOrd for MeshTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for MeshTask {
    // Reversed so the max-heap pops the lowest rank first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.rank().cmp(&self.rank())
    }
}

struct QueueState {
    heap: BinaryHeap<MeshTask>,
    closed: bool,
}

/// Bounded priority queue with a blocking `take`.
struct MeshQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    not_empty: Condvar,
}

impl MeshQueue {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(MIN_QUEUE_CAPACITY),
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn len(&self) -> usize {
        self.lock().heap.len()
    }

    /// Inserts `task`. When full, the worst queued task is evicted only if
    /// `task` ranks strictly better; the evicted chunk's queued flag is
    /// released so a later rescan can pick it up again.
    fn offer(&self, task: MeshTask) -> bool {
        let mut s = self.lock();
        if s.closed {
            return false;
        }
        if s.heap.len() < self.capacity {
            s.heap.push(task);
            self.not_empty.notify_one();
            return true;
        }

        let mut tasks = std::mem::take(&mut s.heap).into_vec();
        let worst = tasks
            .iter()
            .enumerate()
            .max_by_key(|(_, t)| t.rank())
            .map(|(i, t)| (i, t.rank()));
        let accepted = match worst {
            Some((idx, rank)) if task.rank() < rank => {
                let evicted = tasks.swap_remove(idx);
                evicted.chunk.clear_remesh_queued();
                tasks.push(task);
                true
            }
            _ => false,
        };
        s.heap = BinaryHeap::from(tasks);
        if accepted {
            self.not_empty.notify_one();
        }
        accepted
    }

    /// Blocks until a task is available. `None` once the queue is closed.
    fn take(&self) -> Option<MeshTask> {
        let mut s = self.lock();
        loop {
            if s.closed {
                return None;
            }
            if let Some(task) = s.heap.pop() {
                return Some(task);
            }
            s = self
                .not_empty
                .wait(s)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn try_take(&self) -> Option<MeshTask> {
        let mut s = self.lock();
        if s.closed {
            return None;
        }
        s.heap.pop()
    }

    /// Drops every queued task and wakes all waiters for good.
    fn close(&self) {
        let mut s = self.lock();
        s.closed = true;
        for task in s.heap.drain() {
            task.chunk.clear_remesh_queued();
        }
        self.not_empty.notify_all();
    }
}

/// State shared between the owner and the mesh workers.
struct MeshShared {
    store: Arc<ChunkStore>,
    mesher: ChunkMesher,
    queue: MeshQueue,
    seq: AtomicU64,
    closing: AtomicBool,
    player_cx: AtomicI32,
    player_cz: AtomicI32,
    upload_tx: Sender<MeshUpload>,
}

impl MeshShared {
    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    fn priority(&self, chunk: &Chunk) -> i64 {
        chunk.key().dist2_to(
            self.player_cx.load(Ordering::Relaxed),
            self.player_cz.load(Ordering::Relaxed),
        )
    }

    /// Queues a chunk whose queued flag the caller has just claimed.
    fn enqueue(&self, chunk: &Arc<Chunk>) {
        let task = MeshTask {
            chunk: Arc::clone(chunk),
            priority: self.priority(chunk),
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
        };
        if !self.queue.offer(task) {
            chunk.clear_remesh_queued();
        }
    }

    fn request_remesh(&self, chunk: &Arc<Chunk>) {
        if self.is_closing() || !chunk.is_ready() {
            return;
        }
        chunk.set_dirty_mesh(true);
        if chunk.try_mark_remesh_queued() {
            self.enqueue(chunk);
        }
    }

    fn request_remesh_force(&self, chunk: &Arc<Chunk>) {
        if self.is_closing() || !chunk.is_ready() {
            return;
        }
        chunk.set_dirty_mesh(true);
        // Invalidates a queued or running build and any finished result
        // still waiting in the upload channel.
        chunk.bump_mesh_revision();
        if chunk.try_mark_remesh_queued() {
            self.enqueue(chunk);
        }
    }

    fn run_task(&self, task: MeshTask) {
        let chunk = task.chunk;
        let rev_at_start = self.begin_build(&chunk);

        let built = catch_unwind(AssertUnwindSafe(|| self.build_and_send(&chunk, rev_at_start)));
        if built.is_err() {
            error!(cx = chunk.cx(), cz = chunk.cz(), "mesh build panicked");
        }

        self.finish_build(&chunk, rev_at_start);
    }

    /// Marks the chunk as building and returns the revision being built.
    fn begin_build(&self, chunk: &Chunk) -> u64 {
        let rev = chunk.mesh_revision();
        chunk.set_mesh_building(true);
        rev
    }

    /// Releases the build flags and re-queues the chunk if it changed
    /// while the build ran.
    fn finish_build(&self, chunk: &Arc<Chunk>, rev_at_start: u64) {
        chunk.set_mesh_building(false);
        chunk.clear_remesh_queued();
        if !self.is_closing()
            && chunk.is_ready()
            && (chunk.is_dirty_mesh() || chunk.mesh_revision() != rev_at_start)
        {
            self.request_remesh(chunk);
        }
    }

    fn build_and_send(&self, chunk: &Arc<Chunk>, rev_at_start: u64) {
        if self.is_closing() || !chunk.is_ready() {
            return;
        }
        if !chunk.is_dirty_mesh() && chunk.has_surfaces() {
            return;
        }

        let area = ChunkNeighborhood::from_store(&self.store, Arc::clone(chunk));
        let data = self.mesher.build(&area);

        if self.is_closing() || !chunk.is_ready() {
            return;
        }
        if chunk.mesh_revision() != rev_at_start {
            debug!(cx = chunk.cx(), cz = chunk.cz(), revision = rev_at_start, "discarding stale mesh build");
            return;
        }
        chunk.set_dirty_mesh(false);
        // The receiver lives as long as the owning system.
        let _ = self.upload_tx.send(MeshUpload {
            key: chunk.key(),
            revision: rev_at_start,
            data,
        });
    }
}

/// Mesh scheduler and upload pump for one world.
pub struct MeshSystem {
    shared: Arc<MeshShared>,
    upload_rx: Receiver<MeshUpload>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    upload_budget: usize,
}

impl MeshSystem {
    /// Starts the worker pool sized by `config`.
    pub fn new(store: Arc<ChunkStore>, mesher: ChunkMesher, config: &MeshConfig) -> Self {
        Self::with_workers(store, mesher, config, config.effective_workers())
    }

    /// Starts exactly `workers` threads. With zero workers, queued builds
    /// run on the caller inside [`pump_uploads`](Self::pump_uploads).
    pub fn with_workers(
        store: Arc<ChunkStore>,
        mesher: ChunkMesher,
        config: &MeshConfig,
        workers: usize,
    ) -> Self {
        let (upload_tx, upload_rx) = unbounded();
        let shared = Arc::new(MeshShared {
            store,
            mesher,
            queue: MeshQueue::new(config.effective_queue_capacity()),
            seq: AtomicU64::new(0),
            closing: AtomicBool::new(false),
            player_cx: AtomicI32::new(0),
            player_cz: AtomicI32::new(0),
            upload_tx,
        });

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let shared = Arc::clone(&shared);
            let spawned = std::thread::Builder::new()
                .name(format!("mesh-worker-{i}"))
                .spawn(move || {
                    debug!("mesh worker started");
                    while let Some(task) = shared.queue.take() {
                        if shared.is_closing() {
                            break;
                        }
                        shared.run_task(task);
                    }
                    debug!("mesh worker stopped");
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!("failed to spawn mesh worker {i}: {e}"),
            }
        }
        info!("mesh pool started with {} workers", handles.len());

        Self {
            shared,
            upload_rx,
            workers: Mutex::new(handles),
            upload_budget: config.upload_budget.max(1),
        }
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.lock_workers().len()
    }

    /// Tasks waiting in the priority queue.
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Finished builds not yet applied.
    pub fn pending_upload_count(&self) -> usize {
        self.upload_rx.len()
    }

    /// Current load figures.
    pub fn stats(&self) -> MeshStats {
        MeshStats {
            queued: self.queue_len(),
            pending_uploads: self.pending_upload_count(),
            workers: self.worker_count(),
        }
    }

    /// Moves the observer used for task priority.
    pub fn set_player_chunk(&self, cx: i32, cz: i32) {
        self.shared.player_cx.store(cx, Ordering::Relaxed);
        self.shared.player_cz.store(cz, Ordering::Relaxed);
    }

    /// Observer chunk used for task priority.
    pub fn player_chunk(&self) -> (i32, i32) {
        (
            self.shared.player_cx.load(Ordering::Relaxed),
            self.shared.player_cz.load(Ordering::Relaxed),
        )
    }

    /// Marks a `Ready` chunk dirty and queues it unless already queued.
    /// A full queue may drop the request; a later rescan retries.
    pub fn request_remesh(&self, chunk: &Arc<Chunk>) {
        self.shared.request_remesh(chunk);
    }

    /// Like [`request_remesh`](Self::request_remesh), but also bumps the
    /// mesh revision so that no build started earlier, queued, running or
    /// awaiting upload, is ever applied.
    pub fn request_remesh_force(&self, chunk: &Arc<Chunk>) {
        self.shared.request_remesh_force(chunk);
    }

    /// Forces a remesh of a newly ready chunk and its four resident
    /// neighbors, whose seam faces were built without it.
    pub fn on_chunk_ready(&self, chunk: &Arc<Chunk>) {
        if !chunk.is_ready() {
            return;
        }
        self.request_remesh_force(chunk);
        let (cx, cz) = (chunk.cx(), chunk.cz());
        for (dx, dz) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            if let Some(n) = self.shared.store.get(cx.wrapping_add(dx), cz.wrapping_add(dz)) {
                if n.is_ready() {
                    self.request_remesh_force(&n);
                }
            }
        }
    }

    /// Invalidates any build in flight for an evicted chunk.
    pub fn on_chunk_unloaded(&self, chunk: &Chunk) {
        chunk.bump_mesh_revision();
        chunk.clear_remesh_queued();
        chunk.set_dirty_mesh(false);
    }

    /// Re-queues up to `budget` dirty, unqueued `Ready` chunks within
    /// `radius` of the observer. Returns how many were requested.
    pub fn reschedule_dirty_near(&self, radius: i32, budget: usize) -> usize {
        if self.shared.is_closing() {
            return 0;
        }
        let (pcx, pcz) = self.player_chunk();
        let r2 = i64::from(radius) * i64::from(radius);
        let mut requested = 0;
        for chunk in self.shared.store.snapshot() {
            if requested >= budget {
                break;
            }
            if !chunk.is_ready() || !chunk.is_dirty_mesh() || chunk.is_remesh_queued() {
                continue;
            }
            if chunk.key().dist2_to(pcx, pcz) > r2 {
                continue;
            }
            self.request_remesh(&chunk);
            requested += 1;
        }
        requested
    }

    /// Runs up to `max` queued builds on the calling thread.
    pub fn run_queued_inline(&self, max: usize) -> usize {
        let mut ran = 0;
        while ran < max {
            let Some(task) = self.shared.queue.try_take() else {
                break;
            };
            self.shared.run_task(task);
            ran += 1;
        }
        ran
    }

    /// Applies up to the upload budget of finished builds. Call on the
    /// render owner. Results for evicted chunks are dropped; stale results
    /// are dropped and their chunk re-queued if still dirty. Returns the
    /// number of chunks whose surfaces were replaced.
    pub fn pump_uploads(&self, uploader: &dyn MeshUploader) -> usize {
        if self.worker_count() == 0 {
            self.run_queued_inline(self.upload_budget);
        }
        self.apply_pending(uploader)
    }

    /// Applies finished builds already in the upload channel.
    fn apply_pending(&self, uploader: &dyn MeshUploader) -> usize {
        let mut applied = 0;
        for _ in 0..self.upload_budget {
            let Ok(upload) = self.upload_rx.try_recv() else {
                break;
            };
            let Some(chunk) = self.shared.store.get_by_key(upload.key) else {
                continue;
            };
            if !chunk.is_ready() {
                continue;
            }
            if chunk.mesh_revision() != upload.revision {
                if chunk.is_dirty_mesh() {
                    self.request_remesh(&chunk);
                }
                continue;
            }

            let ChunkMeshData { opaque, alpha } = upload.data;
            chunk.apply_surfaces(uploader.upload(opaque), uploader.upload(alpha));
            chunk.set_dirty_mesh(false);
            applied += 1;
        }
        applied
    }

    /// Stops scheduling, drops queued tasks and joins the workers. Builds in
    /// progress finish but their results are never applied.
    pub fn shutdown(&self) {
        self.shared.closing.store(true, Ordering::Release);
        self.shared.queue.close();

        let handles = std::mem::take(&mut *self.lock_workers());
        for handle in handles {
            if handle.join().is_err() {
                warn!("mesh worker panicked");
            }
        }
        while self.upload_rx.try_recv().is_ok() {}
    }
}

impl RemeshSink for MeshSystem {
    fn request_remesh_force(&self, chunk: &Arc<Chunk>) {
        self.shared.request_remesh_force(chunk);
    }
}

impl Drop for MeshSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::GridAtlas;
    use nebula_voxel::{BlockRegistry, ChunkStatus};
    use std::time::{Duration, Instant};

    const STONE: u8 = 3;

    fn mesher() -> ChunkMesher {
        let registry = Arc::new(BlockRegistry::with_defaults());
        let atlas = Arc::new(GridAtlas::for_registry(&registry));
        ChunkMesher::new(registry, atlas)
    }

    fn system(store: &Arc<ChunkStore>, workers: usize) -> MeshSystem {
        MeshSystem::with_workers(Arc::clone(store), mesher(), &MeshConfig::default(), workers)
    }

    fn ready(store: &ChunkStore, cx: i32, cz: i32) -> Arc<Chunk> {
        let (c, _) = store.get_or_create_placeholder(cx, cz);
        c.set_status(ChunkStatus::Ready);
        c
    }

    fn task(chunk: &Arc<Chunk>, priority: i64, seq: u64) -> MeshTask {
        MeshTask {
            chunk: Arc::clone(chunk),
            priority,
            seq,
        }
    }

    #[test]
    fn test_queue_pops_nearest_then_oldest() {
        let c = Arc::new(Chunk::new(0, 0));
        let q = MeshQueue::new(0);
        for (p, s) in [(5, 1), (1, 2), (3, 3), (1, 4)] {
            assert!(q.offer(task(&c, p, s)));
        }
        let order: Vec<_> = std::iter::from_fn(|| q.try_take().map(|t| t.rank())).collect();
        assert_eq!(order, vec![(1, 2), (1, 4), (3, 3), (5, 1)]);
    }

    #[test]
    fn test_full_queue_replaces_only_strictly_better() {
        let q = MeshQueue::new(10);
        assert_eq!(q.capacity, MIN_QUEUE_CAPACITY);

        let far = Arc::new(Chunk::new(9, 9));
        for s in 0..MIN_QUEUE_CAPACITY as u64 {
            assert!(q.offer(task(&far, 10, s)));
        }
        far.try_mark_remesh_queued();

        // Same distance, later sequence: worse than everything queued.
        assert!(!q.offer(task(&far, 10, 1000)));
        assert!(far.is_remesh_queued());

        let near = Arc::new(Chunk::new(0, 0));
        assert!(q.offer(task(&near, 1, 1001)));
        assert_eq!(q.len(), MIN_QUEUE_CAPACITY);
        assert!(!far.is_remesh_queued(), "evicted chunk must be released");
        assert_eq!(q.try_take().map(|t| t.rank()), Some((1, 1001)));
    }

    #[test]
    fn test_closed_queue_refuses_and_wakes() {
        let q = Arc::new(MeshQueue::new(64));
        let waiter = {
            let q = Arc::clone(&q);
            std::thread::spawn(move || q.take().is_none())
        };
        std::thread::sleep(Duration::from_millis(10));
        q.close();
        assert!(waiter.join().unwrap());
        assert!(!q.offer(task(&Arc::new(Chunk::new(0, 0)), 0, 0)));
    }

    #[test]
    fn test_request_is_deduplicated() {
        let store = Arc::new(ChunkStore::new());
        let sys = system(&store, 0);
        let c = ready(&store, 0, 0);
        sys.request_remesh(&c);
        sys.request_remesh(&c);
        assert_eq!(sys.queue_len(), 1);
        assert!(c.is_remesh_queued());
    }

    #[test]
    fn test_loading_chunk_is_not_scheduled() {
        let store = Arc::new(ChunkStore::new());
        let sys = system(&store, 0);
        let (c, _) = store.get_or_create_placeholder(0, 0);
        sys.request_remesh(&c);
        sys.request_remesh_force(&c);
        assert_eq!(sys.queue_len(), 0);
    }

    #[test]
    fn test_inline_build_and_upload() {
        let store = Arc::new(ChunkStore::new());
        let sys = system(&store, 0);
        let c = ready(&store, 0, 0);
        c.set_block(1, 1, 1, STONE);

        sys.request_remesh(&c);
        assert_eq!(sys.pump_uploads(&CpuUploader), 1);
        assert!(c.has_surfaces());
        assert_eq!(c.surfaces().opaque.as_ref().map(|m| m.index_count()), Some(36));
        assert!(c.surfaces().alpha.is_none());
        assert!(!c.is_dirty_mesh());
        assert!(!c.is_remesh_queued());
    }

    #[test]
    fn test_force_always_bumps_revision() {
        let store = Arc::new(ChunkStore::new());
        let sys = system(&store, 0);
        let c = ready(&store, 0, 0);

        let r0 = c.mesh_revision();
        sys.request_remesh_force(&c);
        assert_eq!(c.mesh_revision(), r0 + 1);
        assert_eq!(sys.queue_len(), 1);

        sys.request_remesh_force(&c);
        assert_eq!(c.mesh_revision(), r0 + 2);
        assert_eq!(sys.queue_len(), 1, "still one task");
    }

    #[test]
    fn test_force_during_build_discards_result_and_requeues() {
        let store = Arc::new(ChunkStore::new());
        let sys = system(&store, 0);
        let c = ready(&store, 0, 0);
        c.set_block(1, 1, 1, STONE);
        sys.request_remesh(&c);

        let task = sys.shared.queue.try_take().unwrap();
        let rev = sys.shared.begin_build(&task.chunk);
        // A neighbor arrives while the worker is meshing.
        c.set_block(2, 1, 1, STONE);
        sys.request_remesh_force(&c);
        assert_eq!(sys.queue_len(), 0, "queued flag is still held by the build");

        sys.shared.build_and_send(&c, rev);
        assert_eq!(sys.pending_upload_count(), 0, "stale build must not be sent");
        sys.shared.finish_build(&c, rev);
        assert!(!c.is_mesh_building());
        assert_eq!(sys.queue_len(), 1, "changed chunk is re-queued");

        assert_eq!(sys.pump_uploads(&CpuUploader), 1);
        assert_eq!(c.surfaces().opaque.as_ref().map(|m| m.index_count()), Some(36));
        assert!(!c.is_dirty_mesh());
    }

    #[test]
    fn test_force_supersedes_result_awaiting_upload() {
        let store = Arc::new(ChunkStore::new());
        let sys = system(&store, 0);
        let west = ready(&store, 0, 0);
        west.set_block(15, 1, 1, STONE);
        sys.request_remesh(&west);
        assert_eq!(sys.run_queued_inline(8), 1);
        assert_eq!(sys.pending_upload_count(), 1);

        // The east neighbor arrives and hides the +X face before the
        // pending result is applied.
        let east = ready(&store, 1, 0);
        east.set_block(0, 1, 1, STONE);
        sys.on_chunk_ready(&east);

        assert_eq!(sys.apply_pending(&CpuUploader), 0);
        assert!(!west.has_surfaces());
        assert!(west.is_dirty_mesh());

        assert_eq!(sys.pump_uploads(&CpuUploader), 2);
        assert_eq!(west.surfaces().opaque.as_ref().map(|m| m.index_count()), Some(30));
        assert_eq!(east.surfaces().opaque.as_ref().map(|m| m.index_count()), Some(30));
    }

    #[test]
    fn test_stale_result_is_discarded_and_requeued() {
        let store = Arc::new(ChunkStore::new());
        let sys = system(&store, 0);
        let c = ready(&store, 0, 0);
        c.set_block(1, 1, 1, STONE);

        sys.request_remesh(&c);
        assert_eq!(sys.run_queued_inline(8), 1);
        assert_eq!(sys.pending_upload_count(), 1);

        // Edited after the build finished but before the upload.
        c.set_block(2, 1, 1, STONE);
        assert_eq!(sys.apply_pending(&CpuUploader), 0);
        assert!(!c.has_surfaces());
        assert_eq!(sys.queue_len(), 1, "dirty chunk must be re-queued");

        assert_eq!(sys.pump_uploads(&CpuUploader), 1);
        // Two merged cubes: six quads.
        assert_eq!(c.surfaces().opaque.as_ref().map(|m| m.index_count()), Some(36));
    }

    #[test]
    fn test_unloaded_chunk_result_is_dropped() {
        let store = Arc::new(ChunkStore::new());
        let sys = system(&store, 0);
        let c = ready(&store, 0, 0);
        c.set_block(1, 1, 1, STONE);
        sys.request_remesh(&c);
        sys.run_queued_inline(8);

        sys.on_chunk_unloaded(&c);
        c.set_status(ChunkStatus::Unloaded);
        store.remove(c.key());

        assert_eq!(sys.pump_uploads(&CpuUploader), 0);
        assert_eq!(sys.pending_upload_count(), 0);
        assert!(!c.has_surfaces());
    }

    #[test]
    fn test_chunk_ready_forces_neighbors() {
        let store = Arc::new(ChunkStore::new());
        let sys = system(&store, 0);
        let center = ready(&store, 0, 0);
        for (cx, cz) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            ready(&store, cx, cz);
        }
        ready(&store, 1, 1);
        store.get_or_create_placeholder(2, 0);

        sys.on_chunk_ready(&center);
        assert_eq!(sys.queue_len(), 5);
    }

    #[test]
    fn test_priority_follows_player() {
        let store = Arc::new(ChunkStore::new());
        let sys = system(&store, 0);
        sys.set_player_chunk(10, 0);
        let near = ready(&store, 9, 0);
        let far = ready(&store, 0, 0);
        sys.request_remesh(&far);
        sys.request_remesh(&near);

        let first = sys.shared.queue.try_take().map(|t| t.chunk.key());
        assert_eq!(first, Some(near.key()));
    }

    #[test]
    fn test_reschedule_dirty_near_respects_radius_and_budget() {
        let store = Arc::new(ChunkStore::new());
        let sys = system(&store, 0);
        for cx in 0..5 {
            ready(&store, cx, 0);
        }
        let far = ready(&store, 40, 0);

        assert_eq!(sys.reschedule_dirty_near(8, 3), 3);
        assert_eq!(sys.queue_len(), 3);
        assert_eq!(sys.reschedule_dirty_near(8, 10), 2);
        assert!(!far.is_remesh_queued());
    }

    #[test]
    fn test_workers_build_in_background() {
        let store = Arc::new(ChunkStore::new());
        let sys = system(&store, 2);
        assert_eq!(sys.worker_count(), 2);
        let c = ready(&store, 0, 0);
        c.set_block(4, 4, 4, STONE);
        sys.request_remesh(&c);

        let start = Instant::now();
        while !c.has_surfaces() {
            sys.pump_uploads(&CpuUploader);
            assert!(start.elapsed() < Duration::from_secs(5), "mesh never arrived");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(!c.is_dirty_mesh());
    }

    #[test]
    fn test_shutdown_stops_scheduling() {
        let store = Arc::new(ChunkStore::new());
        let sys = system(&store, 2);
        let c = ready(&store, 0, 0);
        sys.shutdown();
        assert_eq!(sys.worker_count(), 0);
        sys.request_remesh(&c);
        assert_eq!(sys.queue_len(), 0);
        assert!(!c.is_remesh_queued());
    }

    #[test]
    fn test_cpu_uploader_skips_empty() {
        assert!(CpuUploader.upload(MeshData::new()).is_none());
    }
}
