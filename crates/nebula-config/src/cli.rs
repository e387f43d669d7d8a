//! Command-line argument parsing for the Nebula voxel runtime.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Nebula command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "nebula", about = "Nebula voxel world runtime")]
pub struct CliArgs {
    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// World name (directory under the saves dir).
    #[arg(long, default_value = "world")]
    pub world: String,

    /// Root directory holding world saves.
    #[arg(long)]
    pub saves_dir: Option<PathBuf>,

    /// Render distance in chunks for a newly created world.
    #[arg(long)]
    pub render_distance: Option<u32>,

    /// World mode for a newly created world (normal, flat, single).
    #[arg(long)]
    pub mode: Option<String>,

    /// Seed for a newly created world.
    #[arg(long)]
    pub seed: Option<i64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Number of simulated frames to run.
    #[arg(long, default_value_t = 600)]
    pub frames: u32,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(rd) = args.render_distance {
            self.streaming.render_distance = rd;
        }
        if let Some(ref mode) = args.mode {
            self.new_world.mode = mode.clone();
        }
        if let Some(seed) = args.seed {
            self.new_world.seed = Some(seed);
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
