//! Headless driver for the Nebula voxel runtime.
//!
//! Opens (or creates) a world under the saves directory, walks an observer
//! across it for a fixed number of frames, drops a few light sources near the
//! start, then saves and exits.
//!
//! Run with `cargo run -p nebula-demo -- --world demo --mode flat --frames 300`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use nebula_config::{CliArgs, Config, default_saves_dir};
use nebula_voxel::BlockId;
use nebula_world::World;
use tracing::{error, info};

/// Target frame time of the simulated loop.
const FRAME: Duration = Duration::from_millis(16);

/// Observer speed in blocks per frame.
const WALK_SPEED: f32 = 0.5;

/// Frames between stats lines.
const STATS_EVERY: u32 = 60;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nebula-engine")
    });

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    nebula_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let saves_dir = args.saves_dir.clone().unwrap_or_else(default_saves_dir);
    let world_dir = saves_dir.join(&args.world);

    let mut world = match World::open(&world_dir, &config) {
        Ok(world) => world,
        Err(e) => {
            error!(dir = %world_dir.display(), "failed to open world: {e}");
            return ExitCode::FAILURE;
        }
    };

    run(&mut world, args.frames);
    world.dispose();
    ExitCode::SUCCESS
}

fn run(world: &mut World, frames: u32) {
    let mut pos = [8.0_f32, 0.0, 8.0];
    let started = Instant::now();
    let mut lamps_placed = false;

    for frame in 0..frames {
        let frame_start = Instant::now();

        pos[0] += WALK_SPEED;
        pos[1] = world.get_surface_y(pos[0] as i32, pos[2] as i32) as f32 + 2.0;
        world.update(pos);
        world.pump_mesh_uploads();

        if !lamps_placed && world.visible_chunks().len() > 1 {
            lamps_placed = place_lamps(world, pos);
        }

        if frame % STATS_EVERY == 0 {
            let stats = world.stats();
            info!(
                frame,
                x = pos[0],
                loaded = stats.loaded_chunks,
                visible = stats.visible_chunks,
                io_queue = stats.io_queue,
                mesh_queue = stats.mesh_queue,
                uploads = stats.pending_uploads,
                "frame"
            );
        }

        if let Some(rest) = FRAME.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    let stats = world.stats();
    info!(
        frames,
        elapsed_ms = started.elapsed().as_millis() as u64,
        loaded = stats.loaded_chunks,
        visible = stats.visible_chunks,
        "run finished"
    );
}

/// Places a ring of light sources on the surface around the observer inside
/// one light batch. Returns `false` if nothing could be placed yet.
fn place_lamps(world: &mut World, pos: [f32; 3]) -> bool {
    let glow: BlockId = world.id_by_name("glowstone", 0);
    let dim: BlockId = world.id_by_name("lamp_dim", 0);
    if glow == 0 {
        return true;
    }

    let (ox, oz) = (pos[0] as i32, pos[2] as i32);
    let mut placed = 0;
    world.begin_light_batch();
    for (i, (dx, dz)) in [(4, 0), (0, 4), (-4, 0), (0, -4), (6, 6), (-6, -6)]
        .into_iter()
        .enumerate()
    {
        let (wx, wz) = (ox + dx, oz + dz);
        let y = world.get_surface_y(wx, wz) + 1;
        let id = if i % 2 == 0 || dim == 0 { glow } else { dim };
        if world.set_block(wx, y, wz, id) {
            placed += 1;
        }
    }
    world.end_light_batch();

    if placed > 0 {
        info!(
            placed,
            light = world.get_block_light(ox + 4, world.get_surface_y(ox + 4, oz), oz),
            "light sources placed"
        );
    }
    placed > 0
}
