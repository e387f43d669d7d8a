//! Seam between systems that change chunk content and the mesh scheduler.

use std::sync::Arc;

use crate::chunk::Chunk;

/// Receives forced remesh requests.
///
/// Implemented by the mesh scheduler; the light system depends only on this
/// trait so it can be built and tested without meshing.
pub trait RemeshSink: Send + Sync {
    /// Marks `chunk` stale and schedules it, invalidating any build in flight.
    fn request_remesh_force(&self, chunk: &Arc<Chunk>);
}
