//! Incremental block light: flood-fill propagation and retraction across
//! chunk seams, with batched edits.

pub mod block_light;
pub mod queues;
pub mod touched;

pub use block_light::BlockLightSystem;
pub use queues::{LightQueues, RemoveEntry, pack_local, unpack_local};
pub use touched::TouchedChunks;
