//! Chunk vertex layout and CPU-side mesh buffers.
//!
//! [`ChunkVertex`] is 13 `f32`s (52 bytes), laid out exactly as the chunk
//! shader reads it. Index buffers are `u16`, so a single buffer is capped at
//! [`VERT_LIMIT`] vertices; geometry beyond the cap is silently dropped.

use nebula_voxel::GpuMesh;

/// Vertex cap per buffer, kept below `u16::MAX` with some headroom.
pub const VERT_LIMIT: usize = 32760;

/// Floats per vertex.
pub const FLOATS_PER_VERTEX: usize = 13;

/// One chunk vertex.
///
/// Layout (52 bytes total):
///   - `position`   `[f32; 3]` chunk-local position
///   - `normal`     `[f32; 3]` face normal
///   - `local_uv`   `[f32; 2]` per-face UV, scaled by merged width/height
///   - `atlas_rect` `[f32; 4]` `u0, v0, u1, v1` of the tile in the atlas
///   - `emission`   `f32` block light at the face, `0.0..=1.0`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ChunkVertex {
    /// Position relative to the chunk origin.
    pub position: [f32; 3],
    /// Face normal.
    pub normal: [f32; 3],
    /// Tiling coordinates inside the face.
    pub local_uv: [f32; 2],
    /// Atlas rectangle of the face's tile.
    pub atlas_rect: [f32; 4],
    /// Light scalar.
    pub emission: f32,
}

static_assertions::assert_eq_size!(ChunkVertex, [f32; FLOATS_PER_VERTEX]);
static_assertions::assert_eq_size!(ChunkVertex, [u8; 52]);

/// Shader attribute of [`ChunkVertex`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Attribute name in the chunk shader.
    pub name: &'static str,
    /// Number of `f32` components.
    pub components: usize,
    /// Byte offset inside the vertex.
    pub offset: usize,
}

/// Attribute table matching [`ChunkVertex`] field order.
pub const VERTEX_ATTRIBUTES: [VertexAttribute; 5] = [
    VertexAttribute {
        name: "a_position",
        components: 3,
        offset: 0,
    },
    VertexAttribute {
        name: "a_normal",
        components: 3,
        offset: 12,
    },
    VertexAttribute {
        name: "a_localUV",
        components: 2,
        offset: 24,
    },
    VertexAttribute {
        name: "a_atlasRect",
        components: 4,
        offset: 32,
    },
    VertexAttribute {
        name: "a_emission",
        components: 1,
        offset: 48,
    },
];

/// Vertex and index buffers of one render layer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    /// Vertex buffer.
    pub vertices: Vec<ChunkVertex>,
    /// Triangle list indices into `vertices`.
    pub indices: Vec<u16>,
}

impl MeshData {
    /// Creates an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty mesh with room for `vertices` vertices.
    pub fn with_capacity(vertices: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertices),
            indices: Vec::with_capacity(vertices / 4 * 6),
        }
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of indices.
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Returns `true` if the mesh has nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Raw vertex bytes for upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Raw index bytes for upload.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Appends four prepared vertices as two triangles `0,1,2` and `0,2,3`.
    ///
    /// Returns `false` and writes nothing when the quad would reach
    /// [`VERT_LIMIT`].
    pub fn push_quad(&mut self, verts: [ChunkVertex; 4]) -> bool {
        let start = self.vertices.len();
        if start + 4 >= VERT_LIMIT {
            return false;
        }
        self.vertices.extend_from_slice(&verts);
        let base = start as u16;
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        true
    }

    /// Appends one triangle. Same cap rule as [`push_quad`](Self::push_quad)
    /// with three vertices.
    pub fn push_tri(&mut self, verts: [ChunkVertex; 3]) -> bool {
        let start = self.vertices.len();
        if start + 3 >= VERT_LIMIT {
            return false;
        }
        self.vertices.extend_from_slice(&verts);
        let base = start as u16;
        self.indices.extend_from_slice(&[base, base + 1, base + 2]);
        true
    }
}

impl GpuMesh for MeshData {
    fn index_count(&self) -> usize {
        self.indices.len()
    }
}

/// Opaque and translucent geometry built for one chunk.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkMeshData {
    /// Greedy cubes and slopes.
    pub opaque: MeshData,
    /// Translucent cubes, drawn after the opaque pass.
    pub alpha: MeshData,
}

impl ChunkMeshData {
    /// `true` if neither layer has geometry.
    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.alpha.is_empty()
    }
}
