//! Chunk meshing: greedy opaque faces, slope ramps, translucent cubes, and
//! the nearest-first scheduler that builds and uploads them off-thread.

pub mod alpha;
pub mod atlas;
pub mod chunk_mesher;
pub mod greedy;
pub mod mesh_system;
pub mod neighborhood;
pub mod slope;
pub mod vertex;

pub use atlas::{GridAtlas, TileAtlas};
pub use chunk_mesher::ChunkMesher;
pub use greedy::{light_to_e8, pack_mask};
pub use mesh_system::{CpuUploader, MeshStats, MeshSystem, MeshUploader};
pub use neighborhood::{ChunkNeighborhood, VoxelSampler};
pub use vertex::{ChunkMeshData, ChunkVertex, MeshData, VERT_LIMIT, VERTEX_ATTRIBUTES, VertexAttribute};
