//! The world facade owned by the main thread.
//!
//! Each frame the owner calls [`World::update`] with the observer position
//! and [`World::pump_mesh_uploads`] from the render loop. Everything else is
//! block-level reads and edits; edits update light synchronously and
//! schedule remeshing of the edited chunk and any neighbor sharing the face.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nebula_config::{Config, NewWorldSettings, WorldConfig};
use nebula_lighting::BlockLightSystem;
use nebula_mesh::{ChunkMesher, CpuUploader, GridAtlas, MeshSystem, MeshUploader, TileAtlas};
use nebula_terrain::TerrainGenerator;
use nebula_voxel::{
    AIR, BlockDef, BlockId, BlockRegistry, CHUNK_SX, CHUNK_SY, CHUNK_SZ, Chunk, ChunkGenerator,
    ChunkIoSystem, ChunkStatus, ChunkStorage, ChunkStore, RemeshSink, monotonic_ms,
};
use tracing::{debug, info};

use crate::error::WorldError;

/// Surface height reported for columns with no solid block.
const DEFAULT_SURFACE_Y: i32 = 64;

const SY: i32 = CHUNK_SY as i32;

/// Splits a world X or Z block coordinate into chunk coordinate and local
/// offset.
#[inline]
pub fn chunk_coord(w: i32) -> (i32, usize) {
    (w.div_euclid(CHUNK_SX as i32), w.rem_euclid(CHUNK_SX as i32) as usize)
}

/// Load and queue figures for overlays and logs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorldStats {
    pub loaded_chunks: usize,
    pub visible_chunks: usize,
    pub io_queue: usize,
    pub mesh_queue: usize,
    pub pending_uploads: usize,
}

/// Configures and opens a [`World`].
pub struct WorldBuilder {
    world_dir: PathBuf,
    config: Config,
    registry: Option<Arc<BlockRegistry>>,
    generator: Option<Arc<dyn ChunkGenerator>>,
    atlas: Option<Arc<dyn TileAtlas>>,
    uploader: Option<Box<dyn MeshUploader>>,
    mesh_workers: Option<usize>,
}

impl WorldBuilder {
    pub fn new(world_dir: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            world_dir: world_dir.into(),
            config: config.clone(),
            registry: None,
            generator: None,
            atlas: None,
            uploader: None,
            mesh_workers: None,
        }
    }

    /// Block definitions. Defaults to [`BlockRegistry::with_defaults`].
    pub fn registry(mut self, registry: Arc<BlockRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Loads block definitions from a JSON file.
    pub fn registry_file(self, path: &Path) -> Result<Self, WorldError> {
        let registry = BlockRegistry::load_json_file(path)?;
        Ok(self.registry(Arc::new(registry)))
    }

    /// Terrain source. Defaults to a [`TerrainGenerator`] for the world's
    /// seed and mode.
    pub fn generator(mut self, generator: Arc<dyn ChunkGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Tile atlas. Defaults to a square [`GridAtlas`] sized to the registry.
    pub fn atlas(mut self, atlas: Arc<dyn TileAtlas>) -> Self {
        self.atlas = Some(atlas);
        self
    }

    /// Mesh uploader. Defaults to [`CpuUploader`].
    pub fn uploader(mut self, uploader: Box<dyn MeshUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Exact mesh worker count, overriding the config. Zero builds meshes on
    /// the caller of [`World::pump_mesh_uploads`].
    pub fn mesh_workers(mut self, workers: usize) -> Self {
        self.mesh_workers = Some(workers);
        self
    }

    pub fn open(self) -> Result<World, WorldError> {
        let settings = NewWorldSettings::from_config(&self.config);
        let world_config = WorldConfig::load_or_create(&self.world_dir, &settings)?;
        let storage = ChunkStorage::open(&self.world_dir)?;

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(BlockRegistry::with_defaults()));
        let generator = self.generator.unwrap_or_else(|| {
            Arc::new(TerrainGenerator::new(
                world_config.seed,
                world_config.mode,
                &registry,
            ))
        });
        let atlas = self
            .atlas
            .unwrap_or_else(|| Arc::new(GridAtlas::for_registry(&registry)));

        let store = Arc::new(ChunkStore::new());
        let io = ChunkIoSystem::new(Arc::clone(&store), storage, generator, &self.config.io);

        let mesher = ChunkMesher::new(Arc::clone(&registry), atlas);
        let mesh_workers = self
            .mesh_workers
            .unwrap_or_else(|| self.config.mesh.effective_workers());
        let mesh = Arc::new(MeshSystem::with_workers(
            Arc::clone(&store),
            mesher,
            &self.config.mesh,
            mesh_workers,
        ));

        let sink: Arc<dyn RemeshSink> = mesh.clone();
        let light = BlockLightSystem::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            sink,
            &self.config.light,
        );

        info!(
            dir = %self.world_dir.display(),
            seed = world_config.seed,
            mode = %world_config.mode,
            render_distance = world_config.render_distance,
            "world opened"
        );

        Ok(World {
            world_dir: self.world_dir,
            render_distance: world_config.render_distance,
            unload_slack: i32::try_from(self.config.streaming.unload_slack).unwrap_or(0),
            reschedule_budget: self.config.streaming.reschedule_budget,
            world_config,
            registry,
            store,
            io,
            mesh,
            light,
            uploader: self.uploader.unwrap_or_else(|| Box::new(CpuUploader)),
            player_cx: 0,
            player_cz: 0,
            visible: Vec::new(),
            disposed: false,
        })
    }
}

/// A streamed voxel world.
pub struct World {
    world_dir: PathBuf,
    world_config: WorldConfig,
    render_distance: i32,
    unload_slack: i32,
    reschedule_budget: usize,

    registry: Arc<BlockRegistry>,
    store: Arc<ChunkStore>,
    io: ChunkIoSystem,
    mesh: Arc<MeshSystem>,
    light: BlockLightSystem,
    uploader: Box<dyn MeshUploader>,

    player_cx: i32,
    player_cz: i32,
    visible: Vec<Arc<Chunk>>,
    disposed: bool,
}

impl World {
    /// Opens or creates the world in `world_dir` with default collaborators.
    pub fn open(world_dir: impl Into<PathBuf>, config: &Config) -> Result<Self, WorldError> {
        WorldBuilder::new(world_dir, config).open()
    }

    pub fn world_dir(&self) -> &Path {
        &self.world_dir
    }

    pub fn world_config(&self) -> &WorldConfig {
        &self.world_config
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<ChunkStore> {
        &self.store
    }

    /// Chunk files of this world.
    pub fn storage(&self) -> &ChunkStorage {
        self.io.storage()
    }

    /// Streaming radius in chunks.
    pub fn render_distance(&self) -> i32 {
        self.render_distance
    }

    /// Chunk holding the observer as of the last [`update`](Self::update).
    pub fn player_chunk(&self) -> (i32, i32) {
        (self.player_cx, self.player_cz)
    }

    // -----------------------------------------------------------------------
    // Frame
    // -----------------------------------------------------------------------

    /// Advances streaming for an observer at `player_pos`: requests missing
    /// chunks in range, integrates chunks that finished loading, rebuilds
    /// the visible list, evicts far chunks, re-queues stragglers and
    /// schedules delayed saves.
    pub fn update(&mut self, player_pos: [f32; 3]) {
        if self.disposed {
            return;
        }
        self.player_cx = chunk_coord(player_pos[0].floor() as i32).0;
        self.player_cz = chunk_coord(player_pos[2].floor() as i32).0;
        self.mesh.set_player_chunk(self.player_cx, self.player_cz);

        self.stream_ensure_chunks();
        self.integrate_ready_chunks();

        self.visible = self
            .store
            .build_visible_set(self.player_cx, self.player_cz, self.render_distance);

        self.unload_far_chunks();
        self.mesh
            .reschedule_dirty_near(self.render_distance + 1, self.reschedule_budget);
        self.io.pump_saves_delayed(monotonic_ms());
    }

    fn stream_ensure_chunks(&self) {
        if self.io.is_closing() {
            return;
        }
        let r = self.render_distance;
        let r2 = i64::from(r) * i64::from(r);
        for dz in -r..=r {
            for dx in -r..=r {
                if i64::from(dx * dx + dz * dz) > r2 {
                    continue;
                }
                self.io
                    .ensure_async(self.player_cx + dx, self.player_cz + dz);
            }
        }
    }

    /// Lights and meshes chunks that became ready on the IO pool.
    fn integrate_ready_chunks(&mut self) {
        for chunk in self.io.poll_ready() {
            if !chunk.is_ready() {
                continue;
            }
            self.light.on_chunk_ready(&chunk);
            self.mesh.on_chunk_ready(&chunk);
        }
    }

    fn unload_far_chunks(&mut self) {
        let radius = self.render_distance + self.unload_slack;
        let keys = self
            .store
            .collect_eviction_candidates(self.player_cx, self.player_cz, radius);
        for key in keys {
            let Some(chunk) = self.store.get_by_key(key) else {
                continue;
            };
            if chunk.is_dirty_blocks() && chunk.is_ready() {
                self.io.force_save_snapshot_now(&chunk);
                chunk.set_saved_revision(chunk.save_revision());
                chunk.set_dirty_blocks(false);
            }
            self.mesh.on_chunk_unloaded(&chunk);
            chunk.set_status(ChunkStatus::Unloaded);
            chunk.dispose_surfaces();
            self.store.remove(key);
            debug!(cx = chunk.cx(), cz = chunk.cz(), "chunk unloaded");
        }
    }

    /// Applies finished meshes. Call from the render owner every frame.
    pub fn pump_mesh_uploads(&self) -> usize {
        self.mesh.pump_uploads(self.uploader.as_ref())
    }

    /// Ready chunks in range with something to draw, as of the last update.
    pub fn visible_chunks(&self) -> &[Arc<Chunk>] {
        &self.visible
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub fn loaded_chunk_count(&self) -> usize {
        self.store.len()
    }

    pub fn pending_upload_count(&self) -> usize {
        self.mesh.pending_upload_count()
    }

    pub fn io_queue_len(&self) -> usize {
        self.io.queue_len()
    }

    pub fn mesh_queue_len(&self) -> usize {
        self.mesh.queue_len()
    }

    pub fn stats(&self) -> WorldStats {
        WorldStats {
            loaded_chunks: self.loaded_chunk_count(),
            visible_chunks: self.visible.len(),
            io_queue: self.io_queue_len(),
            mesh_queue: self.mesh_queue_len(),
            pending_uploads: self.pending_upload_count(),
        }
    }

    // -----------------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------------

    fn ready_chunk_at(&self, wx: i32, wy: i32, wz: i32) -> Option<(Arc<Chunk>, usize, usize)> {
        if !(0..SY).contains(&wy) {
            return None;
        }
        let (cx, lx) = chunk_coord(wx);
        let (cz, lz) = chunk_coord(wz);
        let chunk = self.store.get(cx, cz)?;
        chunk.is_ready().then_some((chunk, lx, lz))
    }

    /// Block id at a world cell; air when out of range or not loaded.
    pub fn get_block(&self, wx: i32, wy: i32, wz: i32) -> BlockId {
        self.ready_chunk_at(wx, wy, wz)
            .map_or(AIR, |(c, lx, lz)| c.block(lx, wy as usize, lz))
    }

    /// Block light at a world cell; zero when out of range or not loaded.
    pub fn get_block_light(&self, wx: i32, wy: i32, wz: i32) -> u8 {
        self.ready_chunk_at(wx, wy, wz)
            .map_or(0, |(c, lx, lz)| c.light(lx, wy as usize, lz))
    }

    /// Replaces the block at a world cell. Returns `false` when `wy` is out
    /// of range, the chunk is not ready, or the cell already holds `id`.
    pub fn set_block(&mut self, wx: i32, wy: i32, wz: i32, id: BlockId) -> bool {
        let Some((chunk, lx, lz)) = self.ready_chunk_at(wx, wy, wz) else {
            return false;
        };
        let ly = wy as usize;
        let old = chunk.block(lx, ly, lz);
        if old == id {
            return false;
        }

        chunk.set_block(lx, ly, lz, id);
        self.light.on_block_changed(wx, wy, wz, old, id);
        self.mesh.request_remesh(&chunk);

        let (cx, cz) = (chunk.cx(), chunk.cz());
        if lx == 0 {
            self.force_neighbor_mesh(cx - 1, cz);
        }
        if lx == CHUNK_SX - 1 {
            self.force_neighbor_mesh(cx + 1, cz);
        }
        if lz == 0 {
            self.force_neighbor_mesh(cx, cz - 1);
        }
        if lz == CHUNK_SZ - 1 {
            self.force_neighbor_mesh(cx, cz + 1);
        }
        true
    }

    fn force_neighbor_mesh(&self, cx: i32, cz: i32) {
        if let Some(n) = self.store.get(cx, cz) {
            if n.is_ready() {
                self.mesh.request_remesh_force(&n);
            }
        }
    }

    /// Defers light propagation across many [`set_block`](Self::set_block)
    /// calls until the matching [`end_light_batch`](Self::end_light_batch).
    pub fn begin_light_batch(&mut self) {
        self.light.begin_batch();
    }

    pub fn end_light_batch(&mut self) {
        self.light.end_batch();
    }

    /// Y of the highest solid block in a column, or 64 when there is none
    /// or the column is not loaded.
    pub fn get_surface_y(&self, wx: i32, wz: i32) -> i32 {
        (0..SY)
            .rev()
            .find(|&y| self.is_solid_at(wx, y, wz))
            .unwrap_or(DEFAULT_SURFACE_Y)
    }

    pub fn is_solid_at(&self, wx: i32, wy: i32, wz: i32) -> bool {
        let id = self.get_block(wx, wy, wz);
        id != AIR && self.registry.is_solid(id)
    }

    /// `true` if the cell containing the point holds a fluid.
    pub fn is_water_at(&self, x: f32, y: f32, z: f32) -> bool {
        let id = self.get_block(x.floor() as i32, y.floor() as i32, z.floor() as i32);
        self.registry.is_fluid(id)
    }

    pub fn def_at(&self, wx: i32, wy: i32, wz: i32) -> &BlockDef {
        self.registry.def(self.get_block(wx, wy, wz))
    }

    /// Registered name, or `id=N` for an undefined id.
    pub fn block_name(&self, id: BlockId) -> String {
        if self.registry.is_defined(id) {
            self.registry.name_of(id).to_string()
        } else {
            format!("id={id}")
        }
    }

    pub fn id_by_name(&self, name: &str, fallback: BlockId) -> BlockId {
        self.registry.id_by_name(name, fallback)
    }

    pub fn ids_matching(&self, expr: &str, fallback: BlockId) -> Vec<BlockId> {
        self.registry.ids_matching(expr, fallback)
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Stops both pools and saves every dirty chunk synchronously. Later
    /// calls do nothing.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        self.io.begin_shutdown();
        self.mesh.shutdown();
        self.io.shutdown_gracefully();

        let mut saved = 0usize;
        for chunk in self.store.snapshot() {
            if chunk.is_dirty_blocks() && chunk.is_ready() && self.io.force_save_sync(&chunk) {
                saved += 1;
            }
            chunk.dispose_surfaces();
            chunk.set_status(ChunkStatus::Unloaded);
        }
        self.store.clear();
        self.visible.clear();
        info!(dir = %self.world_dir.display(), saved, "world closed");
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.dispose();
    }
}
