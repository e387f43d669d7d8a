//! World facade: ties chunk streaming, meshing and block light together
//! behind block-level queries and edits.

mod error;
mod world;

pub use error::WorldError;
pub use world::{World, WorldBuilder, WorldStats, chunk_coord};
