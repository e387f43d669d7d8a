//! World open errors.

use nebula_config::ConfigError;
use nebula_voxel::{RegistryError, StorageError};

/// Errors that can occur while opening a world.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// `world.json` could not be read, created or migrated.
    #[error("world metadata: {0}")]
    Config(#[from] ConfigError),

    /// Block definitions could not be loaded.
    #[error("block registry: {0}")]
    Registry(#[from] RegistryError),

    /// The chunk directory could not be created.
    #[error("chunk storage: {0}")]
    Storage(#[from] StorageError),
}
