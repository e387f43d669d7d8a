//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Chunk streaming around the observer.
    pub streaming: StreamingConfig,
    /// Chunk load/generate/save pipeline.
    pub io: IoConfig,
    /// Mesh scheduling and upload.
    pub mesh: MeshConfig,
    /// Block light propagation limits.
    pub light: LightConfig,
    /// Settings used only when a world is created for the first time.
    pub new_world: NewWorldConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Chunk streaming configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamingConfig {
    /// Render distance in chunks for newly created worlds. Existing worlds
    /// keep the value stored in their `world.json`.
    pub render_distance: u32,
    /// Extra ring of chunks kept resident beyond the render distance before
    /// eviction.
    pub unload_slack: u32,
    /// Maximum dirty chunks re-enqueued for meshing per frame.
    pub reschedule_budget: usize,
}

/// Chunk IO pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IoConfig {
    /// IO worker threads (0 = cores - 1, at least 1).
    pub worker_threads: usize,
    /// Bounded job queue length. A full queue runs the job on the caller.
    pub queue_capacity: usize,
    /// Quiet time after the last edit before a dirty chunk is written.
    pub save_delay_ms: u64,
    /// Minimum time between two dirty-chunk scans.
    pub save_scan_interval_ms: u64,
    /// Maximum saves scheduled per scan.
    pub save_budget_per_scan: usize,
    /// How long shutdown waits for queued IO before giving up on the pool.
    pub shutdown_grace_ms: u64,
}

/// Mesh scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeshConfig {
    /// Mesh worker threads (0 = cores - 1, at least 1).
    pub worker_threads: usize,
    /// Priority queue capacity (never below 64).
    pub queue_capacity: usize,
    /// Maximum mesh uploads applied per `pump_uploads` call.
    pub upload_budget: usize,
}

/// Block light propagation limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LightConfig {
    /// Pop ceiling for the addition phase of one propagation run.
    pub max_add_pops: usize,
    /// Pop ceiling for the removal phase of one propagation run.
    pub max_remove_pops: usize,
}

/// Settings applied when a world directory has no `world.json` yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NewWorldConfig {
    /// World mode name: `normal`, `flat` or `single`.
    pub mode: String,
    /// Fixed seed; a random one is drawn when absent.
    pub seed: Option<i64>,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            render_distance: 8,
            unload_slack: 2,
            reschedule_budget: 64,
        }
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            queue_capacity: 512,
            save_delay_ms: 2000,
            save_scan_interval_ms: 200,
            save_budget_per_scan: 4,
            shutdown_grace_ms: 800,
        }
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            queue_capacity: 2048,
            upload_budget: 32,
        }
    }
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            max_add_pops: 800_000,
            max_remove_pops: 800_000,
        }
    }
}

impl Default for NewWorldConfig {
    fn default() -> Self {
        Self {
            mode: "normal".to_string(),
            seed: None,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Resolves a `0 = auto` worker count to `cores - 1`, never below one.
pub(crate) fn resolve_workers(requested: usize) -> usize {
    if requested > 0 {
        requested
    } else {
        num_workers_auto()
    }
}

fn num_workers_auto() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

impl IoConfig {
    /// Worker count with `0` resolved to the automatic value.
    pub fn effective_workers(&self) -> usize {
        resolve_workers(self.worker_threads)
    }
}

impl MeshConfig {
    /// Worker count with `0` resolved to the automatic value.
    pub fn effective_workers(&self) -> usize {
        resolve_workers(self.worker_threads)
    }

    /// Queue capacity with the floor of 64 applied.
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.max(64)
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
