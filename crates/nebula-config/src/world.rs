//! Per-world metadata persisted as `world.json`.
//!
//! The file is authoritative once it exists: seed, mode and render distance
//! are locked by the save, and the engine-level [`Config`](crate::Config)
//! only supplies values for worlds that are being created.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;

/// File name of the world metadata inside a world directory.
pub const WORLD_FILE_NAME: &str = "world.json";

/// Current `world.json` schema. Version 1 had no render distance.
pub const WORLD_SCHEMA_VERSION: u32 = 2;

/// Smallest accepted render distance, in chunks.
pub const MIN_RENDER_DISTANCE: i32 = 1;

/// Largest accepted render distance, in chunks.
pub const MAX_RENDER_DISTANCE: i32 = 64;

/// Terrain generation mode of a world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WorldMode {
    /// Noise-driven terrain with a water level.
    #[default]
    Normal,
    /// Superflat layers, no water.
    Flat,
    /// Empty world with a single block at the origin.
    Single,
}

impl WorldMode {
    /// Parses a mode name leniently: trimmed, case-insensitive, and anything
    /// unknown falls back to [`WorldMode::Normal`].
    pub fn normalize(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "flat" => WorldMode::Flat,
            "single" => WorldMode::Single,
            _ => WorldMode::Normal,
        }
    }

    /// Canonical lowercase name as written to disk.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorldMode::Normal => "normal",
            WorldMode::Flat => "flat",
            WorldMode::Single => "single",
        }
    }
}

impl fmt::Display for WorldMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for WorldMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for WorldMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|s| WorldMode::normalize(&s)).unwrap_or_default())
    }
}

/// Clamps a render distance into `[MIN_RENDER_DISTANCE, MAX_RENDER_DISTANCE]`.
pub fn normalize_render_distance(r: i32) -> i32 {
    r.clamp(MIN_RENDER_DISTANCE, MAX_RENDER_DISTANCE)
}

/// Values used to create a world, or to migrate one from an older schema.
#[derive(Clone, Debug, PartialEq)]
pub struct NewWorldSettings {
    /// Seed for the new world; random when `None`.
    pub seed: Option<i64>,
    /// Generation mode.
    pub mode: WorldMode,
    /// Render distance in chunks.
    pub render_distance: i32,
    /// Version string stamped into the file at creation.
    pub version: String,
}

impl Default for NewWorldSettings {
    fn default() -> Self {
        Self {
            seed: None,
            mode: WorldMode::Normal,
            render_distance: 8,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl NewWorldSettings {
    /// Builds creation settings from the engine config.
    pub fn from_config(config: &crate::Config) -> Self {
        Self {
            seed: config.new_world.seed,
            mode: WorldMode::normalize(&config.new_world.mode),
            render_distance: i32::try_from(config.streaming.render_distance)
                .unwrap_or(MAX_RENDER_DISTANCE),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Immutable per-world configuration, the in-memory form of `world.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Schema version of the file this value was read from or will be written as.
    #[serde(default)]
    pub schema: u32,
    /// World seed.
    #[serde(default)]
    pub seed: i64,
    /// Generation mode.
    #[serde(default, rename = "worldMode", alias = "world_mode")]
    pub mode: WorldMode,
    /// Render distance in chunks.
    #[serde(default, rename = "renderDistance", alias = "render_distance")]
    pub render_distance: i32,
    /// Version string written when the world was created.
    #[serde(default)]
    pub version: String,
}

impl WorldConfig {
    /// Creates a fresh world config from creation settings.
    pub fn create(settings: &NewWorldSettings) -> Self {
        Self {
            schema: WORLD_SCHEMA_VERSION,
            seed: settings.seed.unwrap_or_else(rand::random::<i64>),
            mode: settings.mode,
            render_distance: normalize_render_distance(settings.render_distance),
            version: settings.version.clone(),
        }
    }

    /// Loads `world.json` from `world_dir`, creating or repairing it as needed.
    ///
    /// - Missing file: a new world is created from `settings` and saved.
    /// - Unreadable or unparsable file: logged, recreated from `settings`.
    /// - Schema older than [`WORLD_SCHEMA_VERSION`]: the render distance is
    ///   taken from `settings` and the migrated file is saved.
    pub fn load_or_create(
        world_dir: &Path,
        settings: &NewWorldSettings,
    ) -> Result<Self, ConfigError> {
        std::fs::create_dir_all(world_dir).map_err(ConfigError::WriteError)?;
        let path = world_dir.join(WORLD_FILE_NAME);

        if !path.exists() {
            let created = Self::create(settings);
            created.save(world_dir)?;
            log::info!(
                "Created world {} (seed {}, mode {})",
                world_dir.display(),
                created.seed,
                created.mode
            );
            return Ok(created);
        }

        let parsed = std::fs::read_to_string(&path)
            .map_err(ConfigError::ReadError)
            .and_then(|text| {
                serde_json::from_str::<WorldConfig>(&text).map_err(ConfigError::JsonError)
            });

        let mut loaded = match parsed {
            Ok(loaded) => loaded,
            Err(e) => {
                log::warn!("{} unreadable ({e}), recreating", path.display());
                let recreated = Self::create(settings);
                recreated.save(world_dir)?;
                return Ok(recreated);
            }
        };

        let old_schema = if loaded.schema == 0 { 1 } else { loaded.schema };
        loaded.schema = WORLD_SCHEMA_VERSION;

        if old_schema < WORLD_SCHEMA_VERSION {
            loaded.render_distance = normalize_render_distance(settings.render_distance);
            loaded.save(world_dir)?;
            log::info!("Migrated {} from schema {old_schema}", path.display());
        } else {
            loaded.render_distance = normalize_render_distance(loaded.render_distance);
        }

        Ok(loaded)
    }

    /// Writes this config to `world_dir/world.json` as pretty JSON.
    pub fn save(&self, world_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(world_dir).map_err(ConfigError::WriteError)?;

        let mut out = self.clone();
        out.schema = WORLD_SCHEMA_VERSION;
        out.render_distance = normalize_render_distance(out.render_distance);

        let text = serde_json::to_string_pretty(&out).map_err(ConfigError::JsonError)?;
        std::fs::write(world_dir.join(WORLD_FILE_NAME), text).map_err(ConfigError::WriteError)
    }
}

/// Default root for world saves: `<data dir>/nebula/saves`, or `./saves`
/// when the platform has no data directory.
pub fn default_saves_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("nebula").join("saves"))
        .unwrap_or_else(|| PathBuf::from("saves"))
}
