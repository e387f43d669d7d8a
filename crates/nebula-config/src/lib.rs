//! Configuration for the Nebula voxel runtime.
//!
//! Two layers live here: the engine-wide [`Config`] persisted as `config.ron`
//! (streaming, IO, meshing and lighting knobs, CLI-overridable), and the
//! per-world [`WorldConfig`] persisted as `world.json`, which is locked once a
//! world is created and passed by value into every subsystem that needs it.

mod cli;
mod config;
mod error;
mod world;

pub use cli::CliArgs;
pub use config::{
    Config, DebugConfig, IoConfig, LightConfig, MeshConfig, NewWorldConfig, StreamingConfig,
};
pub use error::ConfigError;
pub use world::{
    MAX_RENDER_DISTANCE, MIN_RENDER_DISTANCE, NewWorldSettings, WORLD_FILE_NAME,
    WORLD_SCHEMA_VERSION, WorldConfig, WorldMode, default_saves_dir, normalize_render_distance,
};
