//! Asynchronous chunk load/generate/save pipeline.
//!
//! A fixed pool of `chunk-io-N` threads consumes boxed jobs from a bounded
//! channel. When the channel is full the submitting thread runs the job
//! itself, so the pipeline applies back-pressure instead of dropping work.
//!
//! Loads fill a `Loading` placeholder and publish it as `Ready`; the chunk is
//! then handed back to the main thread through [`ChunkIoSystem::poll_ready`].
//! Saves are coalesced: only chunks whose last edit is older than the quiet
//! delay are written, each chunk has at most one save queued, and every save
//! works on a snapshot of the block array.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};
use dashmap::DashMap;
use nebula_config::IoConfig;
use tracing::{debug, error, info, warn};

use crate::chunk::{CHUNK_SX, CHUNK_SY, CHUNK_SZ, Chunk, ChunkStatus};
use crate::chunk_key::ChunkKey;
use crate::chunk_store::ChunkStore;
use crate::chunk_storage::ChunkStorage;
use crate::generator::ChunkGenerator;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Number of striped write locks; keys hash onto one of them.
const WRITE_LOCK_STRIPES: usize = 64;

/// Snapshot waiting to be written. Restaging a key replaces the entry, so
/// the most recent snapshot is the only one that reaches the disk.
#[derive(Clone)]
struct PendingSave {
    seq: u64,
    rev: u64,
    blocks: Arc<[u8]>,
    chunk: Arc<Chunk>,
}

/// State shared between the owner and the IO workers.
struct IoShared {
    storage: ChunkStorage,
    generator: Arc<dyn ChunkGenerator>,
    closing: AtomicBool,
    ready_tx: Sender<Arc<Chunk>>,
    pending: DashMap<ChunkKey, PendingSave>,
    write_locks: Vec<Mutex<()>>,
    stage_seq: AtomicU64,
    writes: AtomicU64,
}

impl IoShared {
    fn new(
        storage: ChunkStorage,
        generator: Arc<dyn ChunkGenerator>,
        ready_tx: Sender<Arc<Chunk>>,
    ) -> Self {
        Self {
            storage,
            generator,
            closing: AtomicBool::new(false),
            ready_tx,
            pending: DashMap::new(),
            write_locks: (0..WRITE_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            stage_seq: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Body of a load job.
    fn load_or_generate(&self, chunk: &Arc<Chunk>) {
        if self.is_closing() {
            return;
        }
        let (cx, cz) = (chunk.cx(), chunk.cz());
        // A snapshot still waiting for its write is newer than the file.
        let staged = self.pending.get(&chunk.key()).map(|p| p.blocks.to_vec());
        let blocks = match staged.or_else(|| self.storage.try_load(cx, cz)) {
            Some(blocks) => blocks,
            None => self
                .generator
                .generate(cx, cz, CHUNK_SX, CHUNK_SY, CHUNK_SZ),
        };
        if self.is_closing() || chunk.status() != ChunkStatus::Loading {
            return;
        }

        chunk.fill_blocks(&blocks);
        chunk.set_dirty_blocks(false);
        chunk.set_saved_revision(chunk.save_revision());
        chunk.set_dirty_mesh(true);

        if !chunk.try_transition(ChunkStatus::Loading, ChunkStatus::Ready) {
            debug!("chunk ({cx}, {cz}) evicted while loading");
            return;
        }
        // The receiver lives as long as the owning system.
        let _ = self.ready_tx.send(Arc::clone(chunk));
    }

    /// Records a snapshot of `chunk` as the next content of its file,
    /// replacing any snapshot of the same key that was not written yet.
    fn stage(&self, chunk: &Arc<Chunk>) {
        let save = PendingSave {
            seq: self.stage_seq.fetch_add(1, Ordering::AcqRel),
            rev: chunk.save_revision(),
            blocks: chunk.snapshot_blocks().into(),
            chunk: Arc::clone(chunk),
        };
        self.pending.insert(chunk.key(), save);
    }

    fn write_lock(&self, key: ChunkKey) -> &Mutex<()> {
        let mixed = (key.0 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32;
        &self.write_locks[mixed as usize % self.write_locks.len()]
    }

    /// Writes the newest staged snapshot of `key`, if any. Writers of the
    /// same key are serialized; a writer that finds the entry already taken
    /// by an earlier one has nothing to do. Returns `false` if the write
    /// failed.
    fn flush(&self, key: ChunkKey) -> bool {
        let _guard = self
            .write_lock(key)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(save) = self.pending.get(&key).map(|p| p.value().clone()) else {
            return true;
        };

        let ok = self.write(key.x(), key.z(), &save.blocks);
        if ok && save.chunk.saved_revision() < save.rev {
            save.chunk.set_saved_revision(save.rev);
        }
        // A failed write is dropped too; the chunk stays dirty if resident.
        self.pending.remove_if(&key, |_, p| p.seq == save.seq);
        ok
    }

    /// Writes a snapshot. Errors are logged and reported as `false`.
    fn write(&self, cx: i32, cz: i32, blocks: &[u8]) -> bool {
        match self.storage.save(cx, cz, blocks) {
            Ok(()) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                error!(cx, cz, error = %e, "saving chunk failed");
                false
            }
        }
    }
}

/// Background loader and coalescing saver for one world.
pub struct ChunkIoSystem {
    shared: Arc<IoShared>,
    store: Arc<ChunkStore>,
    job_tx: Mutex<Option<Sender<Job>>>,
    ready_rx: Receiver<Arc<Chunk>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    save_delay_ms: u64,
    scan_interval_ms: u64,
    save_budget: usize,
    shutdown_grace: Duration,
    last_scan_ms: Mutex<Option<u64>>,
}

impl ChunkIoSystem {
    /// Starts the IO pool.
    pub fn new(
        store: Arc<ChunkStore>,
        storage: ChunkStorage,
        generator: Arc<dyn ChunkGenerator>,
        config: &IoConfig,
    ) -> Self {
        let (job_tx, job_rx) = bounded::<Job>(config.queue_capacity.max(1));
        let (ready_tx, ready_rx) = unbounded();

        let shared = Arc::new(IoShared::new(storage, generator, ready_tx));

        let worker_count = config.effective_workers();
        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let rx = job_rx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("chunk-io-{i}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        job();
                    }
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => warn!("failed to spawn chunk IO worker {i}: {e}"),
            }
        }
        info!("chunk IO pool started with {} workers", workers.len());

        Self {
            shared,
            store,
            job_tx: Mutex::new(Some(job_tx)),
            ready_rx,
            workers: Mutex::new(workers),
            save_delay_ms: config.save_delay_ms,
            scan_interval_ms: config.save_scan_interval_ms,
            save_budget: config.save_budget_per_scan,
            shutdown_grace: Duration::from_millis(config.shutdown_grace_ms),
            last_scan_ms: Mutex::new(None),
        }
    }

    /// Storage backing this world.
    pub fn storage(&self) -> &ChunkStorage {
        &self.shared.storage
    }

    /// `true` once shutdown has begun.
    pub fn is_closing(&self) -> bool {
        self.shared.is_closing()
    }

    /// Chunk files written successfully since startup.
    pub fn saves_written(&self) -> u64 {
        self.shared.writes.load(Ordering::Relaxed)
    }

    /// Snapshots staged for writing that have not reached the disk yet.
    pub fn pending_saves(&self) -> usize {
        self.shared.pending.len()
    }

    /// Jobs waiting in the channel.
    pub fn queue_len(&self) -> usize {
        self.job_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, Sender::len)
    }

    /// Hands a job to the pool, or runs it on the caller when the pool is
    /// saturated or has no workers. Returns `false` only after shutdown.
    fn submit(&self, job: Job) -> bool {
        if self.is_closing() {
            return false;
        }
        let tx = self
            .job_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(tx) = tx else {
            return false;
        };

        let has_workers = !self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty();
        if !has_workers {
            job();
            return true;
        }

        match tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) | Err(TrySendError::Disconnected(job)) => {
                job();
                true
            }
        }
    }

    /// Makes sure `(cx, cz)` is resident. A missing chunk gets a `Loading`
    /// placeholder and a background job that loads it from disk, or
    /// generates it when no valid file exists. Returns `true` if a load was
    /// scheduled.
    pub fn ensure_async(&self, cx: i32, cz: i32) -> bool {
        if self.is_closing() || self.store.contains(cx, cz) {
            return false;
        }
        let (chunk, created) = self.store.get_or_create_placeholder(cx, cz);
        if !created {
            return false;
        }

        let shared = Arc::clone(&self.shared);
        self.submit(Box::new(move || shared.load_or_generate(&chunk)))
    }

    /// Drains chunks that became `Ready` since the last call. Call on the
    /// main thread.
    pub fn poll_ready(&self) -> Vec<Arc<Chunk>> {
        self.ready_rx.try_iter().collect()
    }

    /// Periodic save scan. At most once per scan interval, schedules up to
    /// the per-scan budget of chunks whose last edit is older than the quiet
    /// delay. `now_ms` is on the [`monotonic_ms`](crate::chunk::monotonic_ms)
    /// clock.
    pub fn pump_saves_delayed(&self, now_ms: u64) {
        if self.is_closing() {
            return;
        }
        {
            let mut last = self
                .last_scan_ms
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(prev) = *last {
                if now_ms.saturating_sub(prev) < self.scan_interval_ms {
                    return;
                }
            }
            *last = Some(now_ms);
        }

        let mut budget = self.save_budget;
        for chunk in self.store.snapshot() {
            if budget == 0 {
                break;
            }
            if !chunk.is_ready() {
                continue;
            }
            if chunk.is_dirty_blocks() && !chunk.has_unsaved_edits() {
                chunk.set_dirty_blocks(false);
            }
            if !chunk.is_dirty_blocks() {
                continue;
            }
            if now_ms.saturating_sub(chunk.last_dirty_time_ms()) < self.save_delay_ms {
                continue;
            }
            self.request_save_coalesced(&chunk);
            budget -= 1;
        }
    }

    /// Queues one background save of a dirty `Ready` chunk unless one is
    /// already queued. Returns `true` if a save was scheduled.
    pub fn request_save_coalesced(&self, chunk: &Arc<Chunk>) -> bool {
        if self.is_closing() || !chunk.is_ready() || !chunk.is_dirty_blocks() {
            return false;
        }
        if !chunk.try_mark_save_queued() {
            return false;
        }

        self.shared.stage(chunk);
        let key = chunk.key();
        let shared = Arc::clone(&self.shared);
        let target = Arc::clone(chunk);

        let scheduled = self.submit(Box::new(move || {
            shared.flush(key);
            target.clear_save_queued();
        }));
        if !scheduled {
            chunk.clear_save_queued();
        }
        scheduled
    }

    /// Writes a snapshot of a dirty chunk right away: inline while shutting
    /// down, otherwise on the pool. Used when evicting. The snapshot
    /// supersedes any older one still queued for the same chunk, and loads
    /// of that chunk read it until it is on disk.
    pub fn force_save_snapshot_now(&self, chunk: &Arc<Chunk>) {
        if !chunk.is_dirty_blocks() {
            return;
        }
        let key = chunk.key();
        self.shared.stage(chunk);

        if self.is_closing() {
            self.shared.flush(key);
            return;
        }

        let shared = Arc::clone(&self.shared);
        let job: Job = Box::new(move || {
            shared.flush(key);
        });
        if !self.submit(job) {
            debug!("pool closed, saving chunk {key} on the caller");
            self.shared.flush(key);
        }
    }

    /// Saves a dirty chunk on the calling thread and marks it clean on
    /// success. Returns `false` if the write failed.
    pub fn force_save_sync(&self, chunk: &Arc<Chunk>) -> bool {
        if !chunk.is_dirty_blocks() {
            return true;
        }
        let rev = chunk.save_revision();
        self.shared.stage(chunk);
        if !self.shared.flush(chunk.key()) {
            return false;
        }
        if chunk.save_revision() == rev {
            chunk.set_dirty_blocks(false);
        }
        true
    }

    /// Sets the closing flag. New loads and coalesced saves are refused and
    /// loads already queued are skipped; queued saves still run.
    pub fn begin_shutdown(&self) {
        self.shared.closing.store(true, Ordering::Release);
    }

    /// Closes the job channel and waits up to the grace period for workers
    /// to drain it. Workers still busy afterwards are detached.
    pub fn shutdown_gracefully(&self) {
        self.begin_shutdown();
        drop(
            self.job_tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let handles = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let deadline = Instant::now() + self.shutdown_grace;
        let mut detached = 0usize;
        for handle in handles {
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(2));
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    warn!("chunk IO worker panicked");
                }
            } else {
                detached += 1;
            }
        }
        if detached > 0 {
            warn!("{detached} chunk IO workers still busy after grace period, detaching");
        } else {
            info!("chunk IO pool stopped");
        }
    }
}

impl Drop for ChunkIoSystem {
    fn drop(&mut self) {
        self.begin_shutdown();
        if let Ok(mut tx) = self.job_tx.lock() {
            tx.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{CHUNK_VOLUME, local_index, monotonic_ms};
    use std::sync::atomic::AtomicUsize;

    /// Fills layer y=0 with a fixed id and counts calls.
    struct FloorGenerator {
        id: u8,
        calls: AtomicUsize,
    }

    impl FloorGenerator {
        fn new(id: u8) -> Arc<Self> {
            Arc::new(Self {
                id,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl ChunkGenerator for FloorGenerator {
        fn generate(&self, _cx: i32, _cz: i32, sx: usize, sy: usize, sz: usize) -> Vec<u8> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut out = vec![0; sx * sy * sz];
            out[..sx * sz].fill(self.id);
            out
        }
    }

    fn config() -> IoConfig {
        IoConfig {
            worker_threads: 2,
            ..Default::default()
        }
    }

    fn system(dir: &std::path::Path, generator: Arc<FloorGenerator>) -> (ChunkIoSystem, Arc<ChunkStore>) {
        let store = Arc::new(ChunkStore::new());
        let storage = ChunkStorage::open(dir).unwrap();
        let io = ChunkIoSystem::new(Arc::clone(&store), storage, generator, &config());
        (io, store)
    }

    fn wait_ready(io: &ChunkIoSystem, count: usize) -> Vec<Arc<Chunk>> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut ready = Vec::new();
        while ready.len() < count && Instant::now() < deadline {
            ready.extend(io.poll_ready());
            std::thread::sleep(Duration::from_millis(2));
        }
        ready
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn test_ensure_generates_missing_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let generator = FloorGenerator::new(3);
        let (io, store) = system(dir.path(), Arc::clone(&generator));

        assert!(io.ensure_async(2, -1));
        let ready = wait_ready(&io, 1);
        assert_eq!(ready.len(), 1);
        let chunk = &ready[0];
        assert_eq!((chunk.cx(), chunk.cz()), (2, -1));
        assert!(chunk.is_ready());
        assert!(chunk.is_dirty_mesh());
        assert!(!chunk.is_dirty_blocks());
        assert_eq!(chunk.block(0, 0, 0), 3);
        assert_eq!(chunk.block(0, 1, 0), 0);
        assert!(Arc::ptr_eq(chunk, &store.get(2, -1).unwrap()));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        io.shutdown_gracefully();
    }

    #[test]
    fn test_concurrent_ensure_creates_single_instance() {
        let dir = tempfile::tempdir().unwrap();
        let generator = FloorGenerator::new(1);
        let (io, store) = system(dir.path(), Arc::clone(&generator));
        let io = Arc::new(io);

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let io = Arc::clone(&io);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        io.ensure_async(5, 5);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(wait_ready(&io, 1).len(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        io.shutdown_gracefully();
    }

    #[test]
    fn test_saved_chunk_is_loaded_not_generated() {
        let dir = tempfile::tempdir().unwrap();
        let mut blocks = vec![0u8; CHUNK_VOLUME];
        blocks[local_index(4, 70, 9)] = 42;
        ChunkStorage::open(dir.path()).unwrap().save(1, 1, &blocks).unwrap();

        let generator = FloorGenerator::new(1);
        let (io, _store) = system(dir.path(), Arc::clone(&generator));
        io.ensure_async(1, 1);
        let ready = wait_ready(&io, 1);
        assert_eq!(ready[0].block(4, 70, 9), 42);
        assert_eq!(ready[0].block(0, 0, 0), 0);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        io.shutdown_gracefully();
    }

    #[test]
    fn test_corrupt_file_regenerates() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ChunkStorage::open(dir.path()).unwrap();
        std::fs::write(storage.chunk_path(0, 0), b"\x78\x01broken").unwrap();

        let generator = FloorGenerator::new(2);
        let (io, _store) = system(dir.path(), Arc::clone(&generator));
        io.ensure_async(0, 0);
        let ready = wait_ready(&io, 1);
        assert_eq!(ready[0].block(3, 0, 3), 2);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        io.shutdown_gracefully();
    }

    #[test]
    fn test_delayed_save_waits_for_quiet_period() {
        let dir = tempfile::tempdir().unwrap();
        let (io, _store) = system(dir.path(), FloorGenerator::new(1));
        io.ensure_async(0, 0);
        let chunk = wait_ready(&io, 1).remove(0);

        for i in 0..10 {
            chunk.set_block(1, 1, 1, i);
        }
        let path = io.storage().chunk_path(0, 0);

        // Edit is fresh: nothing is written.
        io.pump_saves_delayed(chunk.last_dirty_time_ms());
        std::thread::sleep(Duration::from_millis(50));
        assert!(!path.exists());

        // Quiet period elapsed and scan interval passed: one save.
        let later = chunk.last_dirty_time_ms() + 5_000;
        io.pump_saves_delayed(later);
        assert!(wait_until(|| chunk.saved_revision() == chunk.save_revision()));
        assert!(path.exists());
        assert!(wait_until(|| !chunk.is_save_queued()));

        // Next scan clears the dirty flag without writing again.
        io.pump_saves_delayed(later + 1_000);
        assert!(!chunk.is_dirty_blocks());

        let stored = io.storage().try_load(0, 0).unwrap();
        assert_eq!(stored[local_index(1, 1, 1)], 9);
        io.shutdown_gracefully();
    }

    #[test]
    fn test_scan_interval_limits_scans() {
        let dir = tempfile::tempdir().unwrap();
        let (io, _store) = system(dir.path(), FloorGenerator::new(1));
        io.ensure_async(0, 0);
        let chunk = wait_ready(&io, 1).remove(0);

        let t0 = monotonic_ms() + 10_000;
        io.pump_saves_delayed(t0);
        chunk.set_block(0, 5, 0, 1);
        // Within the scan interval: skipped even though the chunk is dirty.
        io.pump_saves_delayed(t0 + 10);
        std::thread::sleep(Duration::from_millis(50));
        assert!(chunk.has_unsaved_edits());
        io.shutdown_gracefully();
    }

    #[test]
    fn test_coalesced_request_is_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let (io, _store) = system(dir.path(), FloorGenerator::new(1));
        io.ensure_async(0, 0);
        let chunk = wait_ready(&io, 1).remove(0);

        // Claim the slot as if a save were already in flight.
        assert!(chunk.try_mark_save_queued());
        chunk.set_block(2, 2, 2, 5);
        assert!(!io.request_save_coalesced(&chunk));
        chunk.clear_save_queued();
        assert!(io.request_save_coalesced(&chunk));
        assert!(wait_until(|| chunk.saved_revision() == chunk.save_revision()));
        io.shutdown_gracefully();
    }

    #[test]
    fn test_force_save_sync_marks_clean() {
        let dir = tempfile::tempdir().unwrap();
        let (io, _store) = system(dir.path(), FloorGenerator::new(1));
        io.ensure_async(3, 3);
        let chunk = wait_ready(&io, 1).remove(0);
        chunk.set_block(8, 8, 8, 7);

        assert!(io.force_save_sync(&chunk));
        assert!(!chunk.is_dirty_blocks());
        assert!(!chunk.has_unsaved_edits());
        assert_eq!(io.storage().try_load(3, 3).unwrap()[local_index(8, 8, 8)], 7);
        io.shutdown_gracefully();
    }

    #[test]
    fn test_force_snapshot_inline_when_closing() {
        let dir = tempfile::tempdir().unwrap();
        let (io, _store) = system(dir.path(), FloorGenerator::new(1));
        io.ensure_async(0, 0);
        let chunk = wait_ready(&io, 1).remove(0);
        chunk.set_block(0, 9, 0, 4);

        io.begin_shutdown();
        io.force_save_snapshot_now(&chunk);
        // Written synchronously: visible immediately.
        assert!(io.storage().chunk_path(0, 0).exists());
        io.shutdown_gracefully();
    }

    #[test]
    fn test_shutdown_refuses_new_work() {
        let dir = tempfile::tempdir().unwrap();
        let (io, store) = system(dir.path(), FloorGenerator::new(1));
        io.shutdown_gracefully();
        assert!(io.is_closing());
        assert!(!io.ensure_async(0, 0));
        assert!(store.is_empty());
        assert_eq!(io.queue_len(), 0);
    }

    fn bare_shared(dir: &std::path::Path) -> (IoShared, Receiver<Arc<Chunk>>) {
        let (tx, rx) = unbounded();
        let shared = IoShared::new(ChunkStorage::open(dir).unwrap(), FloorGenerator::new(1), tx);
        (shared, rx)
    }

    #[test]
    fn test_evicted_placeholder_is_not_published() {
        let dir = tempfile::tempdir().unwrap();
        let chunk = Arc::new(Chunk::new(0, 0));
        chunk.set_status(ChunkStatus::Unloaded);
        let (shared, rx) = bare_shared(dir.path());
        shared.load_or_generate(&chunk);
        assert_eq!(chunk.status(), ChunkStatus::Unloaded);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_older_snapshot_never_overwrites_newer() {
        let dir = tempfile::tempdir().unwrap();
        let (shared, _rx) = bare_shared(dir.path());
        let chunk = Arc::new(Chunk::new(4, 4));
        chunk.set_status(ChunkStatus::Ready);

        // A coalesced save stages the first edit, then eviction stages the
        // second before either job has run.
        chunk.set_block(1, 1, 1, 5);
        shared.stage(&chunk);
        chunk.set_block(2, 2, 2, 6);
        shared.stage(&chunk);

        // Both jobs run; whichever goes first writes the newest snapshot.
        assert!(shared.flush(chunk.key()));
        assert!(shared.flush(chunk.key()));

        let stored = shared.storage.try_load(4, 4).unwrap();
        assert_eq!(stored[local_index(1, 1, 1)], 5);
        assert_eq!(stored[local_index(2, 2, 2)], 6);
        assert_eq!(shared.writes.load(Ordering::SeqCst), 1);
        assert!(shared.pending.is_empty());
        assert_eq!(chunk.saved_revision(), chunk.save_revision());
    }

    #[test]
    fn test_load_reads_snapshot_not_yet_written() {
        let dir = tempfile::tempdir().unwrap();
        let (shared, rx) = bare_shared(dir.path());

        // An older file is on disk; the evicted chunk's newer edit is
        // staged but its write has not landed.
        let mut old = vec![0u8; CHUNK_VOLUME];
        old[local_index(3, 3, 3)] = 1;
        shared.storage.save(-2, 5, &old).unwrap();
        let evicted = Arc::new(Chunk::new(-2, 5));
        evicted.fill_blocks(&old);
        evicted.set_status(ChunkStatus::Ready);
        evicted.set_block(3, 3, 3, 9);
        shared.stage(&evicted);

        let reloaded = Arc::new(Chunk::new(-2, 5));
        shared.load_or_generate(&reloaded);
        assert_eq!(reloaded.status(), ChunkStatus::Ready);
        assert_eq!(reloaded.block(3, 3, 3), 9);
        assert!(Arc::ptr_eq(&rx.try_recv().unwrap(), &reloaded));

        // Once flushed, the file agrees.
        assert!(shared.flush(evicted.key()));
        assert_eq!(shared.storage.try_load(-2, 5).unwrap()[local_index(3, 3, 3)], 9);
    }

    #[test]
    fn test_eviction_after_queued_coalesced_save_keeps_latest_edit() {
        let dir = tempfile::tempdir().unwrap();
        let (io, store) = system(dir.path(), FloorGenerator::new(1));
        io.ensure_async(1, 0);
        let chunk = wait_ready(&io, 1).remove(0);

        chunk.set_block(5, 5, 5, 2);
        assert!(io.request_save_coalesced(&chunk));
        chunk.set_block(5, 5, 5, 3);
        io.force_save_snapshot_now(&chunk);
        store.remove(ChunkKey::new(1, 0));

        assert!(wait_until(|| io.pending_saves() == 0));
        assert!(wait_until(|| !chunk.is_save_queued()));
        assert_eq!(io.storage().try_load(1, 0).unwrap()[local_index(5, 5, 5)], 3);
        io.shutdown_gracefully();
    }

    #[test]
    fn test_coalesced_saves_write_once_per_quiet_period() {
        let dir = tempfile::tempdir().unwrap();
        let (io, _store) = system(dir.path(), FloorGenerator::new(1));
        io.ensure_async(0, 0);
        let chunk = wait_ready(&io, 1).remove(0);
        assert_eq!(io.saves_written(), 0);

        // A burst of edits, scanned repeatedly while still fresh.
        for i in 0..20u8 {
            chunk.set_block(usize::from(i % 16), 10, 0, i + 1);
            io.pump_saves_delayed(chunk.last_dirty_time_ms());
        }
        let now = chunk.last_dirty_time_ms();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(io.saves_written(), 0);

        io.pump_saves_delayed(now + 10_000);
        assert!(wait_until(|| !chunk.has_unsaved_edits() && !chunk.is_save_queued()));
        assert_eq!(io.saves_written(), 1);

        // Clean chunk: later scans write nothing.
        for k in 1..5 {
            io.pump_saves_delayed(now + 10_000 + k * 5_000);
        }
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(io.saves_written(), 1);
        assert!(!chunk.is_dirty_blocks());
        io.shutdown_gracefully();
    }
}
