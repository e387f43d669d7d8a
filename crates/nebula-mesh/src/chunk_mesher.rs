//! Chunk mesh construction: greedy opaque cubes, then slopes, then
//! translucent cubes.

use std::sync::Arc;

use nebula_voxel::{AIR, BlockId, BlockRegistry, MAX_LIGHT};

use crate::alpha::emit_alpha_cubes;
use crate::atlas::TileAtlas;
use crate::greedy::emit_opaque_greedy;
use crate::neighborhood::{ChunkNeighborhood, VoxelSampler};
use crate::slope::emit_slopes;
use crate::vertex::{ChunkMeshData, ChunkVertex, MeshData};

/// Vertices reserved up front for the opaque buffer.
const OPAQUE_RESERVE: usize = 8192;
/// Vertices reserved up front for the alpha buffer.
const ALPHA_RESERVE: usize = 4096;

/// Per-build view shared by the three passes.
pub(crate) struct MeshContext<'a, S: VoxelSampler> {
    pub registry: &'a BlockRegistry,
    pub atlas: &'a dyn TileAtlas,
    pub sampler: &'a S,
}

impl<S: VoxelSampler> MeshContext<'_, S> {
    /// `true` if `id` hides the adjacent face on `axis`. Only opaque-layer
    /// blocks covering the whole face occlude.
    #[inline]
    pub fn occludes(&self, id: BlockId, axis: usize, positive_face: bool) -> bool {
        id != AIR
            && self.registry.is_occluder_opaque_layer(id)
            && self.registry.blocks_full_face(id, axis, positive_face)
    }

    /// Light at a cell scaled to `0.0..=1.0`.
    #[inline]
    pub fn light01(&self, lx: i32, ly: i32, lz: i32) -> f32 {
        f32::from(self.sampler.light(lx, ly, lz)) / f32::from(MAX_LIGHT)
    }

    /// Writes a quad whose four vertices share a normal, tile and emission.
    pub fn quad(
        &self,
        mesh: &mut MeshData,
        corners: [[f32; 3]; 4],
        normal: [f32; 3],
        uvs: [[f32; 2]; 4],
        tile: u16,
        emission: f32,
    ) -> bool {
        let atlas_rect = self.atlas.uv(tile);
        let v = |i: usize| ChunkVertex {
            position: corners[i],
            normal,
            local_uv: uvs[i],
            atlas_rect,
            emission,
        };
        mesh.push_quad([v(0), v(1), v(2), v(3)])
    }

    /// Writes a single triangle.
    pub fn tri(
        &self,
        mesh: &mut MeshData,
        corners: [[f32; 3]; 3],
        normal: [f32; 3],
        uvs: [[f32; 2]; 3],
        tile: u16,
        emission: f32,
    ) -> bool {
        let atlas_rect = self.atlas.uv(tile);
        let v = |i: usize| ChunkVertex {
            position: corners[i],
            normal,
            local_uv: uvs[i],
            atlas_rect,
            emission,
        };
        mesh.push_tri([v(0), v(1), v(2)])
    }
}

/// Builds opaque and translucent geometry for chunks.
///
/// Stateless apart from its shared registry and atlas, so a single instance
/// serves every mesh worker.
#[derive(Clone)]
pub struct ChunkMesher {
    registry: Arc<BlockRegistry>,
    atlas: Arc<dyn TileAtlas>,
}

impl ChunkMesher {
    /// Creates a mesher over `registry` and `atlas`.
    pub fn new(registry: Arc<BlockRegistry>, atlas: Arc<dyn TileAtlas>) -> Self {
        Self { registry, atlas }
    }

    /// Block registry used for occlusion and tiles.
    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    /// Meshes the center of `area`. A chunk that is not `Ready` yields two
    /// empty buffers.
    pub fn build(&self, area: &ChunkNeighborhood) -> ChunkMeshData {
        if !area.center().is_ready() {
            return ChunkMeshData::default();
        }
        self.build_with(area)
    }

    /// Meshes whatever `sampler` reports for the local cells.
    pub fn build_with<S: VoxelSampler>(&self, sampler: &S) -> ChunkMeshData {
        let ctx = MeshContext {
            registry: &self.registry,
            atlas: self.atlas.as_ref(),
            sampler,
        };
        let mut opaque = MeshData::with_capacity(OPAQUE_RESERVE);
        let mut alpha = MeshData::with_capacity(ALPHA_RESERVE);

        emit_opaque_greedy(&ctx, &mut opaque);
        emit_slopes(&ctx, &mut opaque);
        emit_alpha_cubes(&ctx, &mut alpha);

        ChunkMeshData { opaque, alpha }
    }
}

impl std::fmt::Debug for ChunkMesher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkMesher")
            .field("blocks", &self.registry.len())
            .finish_non_exhaustive()
    }
}
