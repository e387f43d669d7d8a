//! Chunk storage, block registry, and the asynchronous chunk IO pipeline.

pub mod chunk;
pub mod chunk_io;
pub mod chunk_key;
pub mod chunk_serial;
pub mod chunk_storage;
pub mod chunk_store;
pub mod generator;
pub mod registry;
pub mod remesh;

pub use chunk::{
    CHUNK_SX, CHUNK_SY, CHUNK_SZ, CHUNK_VOLUME, Chunk, ChunkStatus, ChunkSurfaces, GpuMesh,
    MAX_LIGHT, local_index, local_index_with, monotonic_ms,
};
pub use chunk_io::ChunkIoSystem;
pub use chunk_key::ChunkKey;
pub use chunk_serial::{ChunkDims, ChunkSerError};
pub use chunk_storage::{ChunkStorage, StorageError};
pub use chunk_store::ChunkStore;
pub use generator::{ChunkGenerator, EmptyGenerator};
pub use registry::{AIR, BlockDef, BlockId, BlockRegistry, FluidDef, RegistryError, RenderLayer, Shape};
pub use remesh::RemeshSink;
