//! Headless runner for the section scheduler.
//!
//! Streams synthetic terrain around a camera flying along +X, applies random
//! block edits near it and ticks the scheduler once per frame, logging queue
//! statistics as it goes.
//!
//! Run with: `cargo run -p strata-app -- --frames 300 --view-distance 6`

mod driver;
mod terrain;

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use clap::Parser;
use glam::{IVec2, IVec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use strata_config::{CliArgs, Config};
use strata_mesh::{
    ChunkMeshingQueue, MeshingLimits, SectionScheduler, ThreadWorkerPool, resolve_worker_threads,
};
use strata_voxel::{SECTION_WIDTH, SectionWorld};
use tracing::{debug, error, info};

use crate::driver::{CountingPreparer, DistanceVisibility};
use crate::terrain::{Palette, TerrainGenerator, build_registry};

/// Frames the camera spends in one chunk before moving on.
const FRAMES_PER_CHUNK: u32 = 20;
/// Finished meshes the fake upload path consumes per frame.
const UPLOADS_PER_FRAME: usize = 24;
const EDITS_PER_FRAME: usize = 4;
const FRAME_TIME: Duration = Duration::from_millis(4);

fn main() {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("strata")
    });

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    let log_dir = config
        .debug
        .log_dir
        .clone()
        .unwrap_or_else(|| config_dir.join("logs"));
    if let Err(e) = strata_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config)) {
        eprintln!("Failed to initialise logging: {e}");
    }

    if let Err(e) = run(&config) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let (registry, palette) = build_registry()?;
    let world = Arc::new(RwLock::new(SectionWorld::new(
        registry,
        config.world.min_section,
        config.world.max_section,
    )));
    let generator = TerrainGenerator::new(config.world.seed, palette);

    let threads = resolve_worker_threads(config.meshing.worker_threads);
    let pool = Arc::new(ThreadWorkerPool::new("strata-mesh", threads)?);
    let limits = MeshingLimits::from_config(&config.meshing);
    info!(
        threads,
        max_preparing_tasks = limits.max_preparing_tasks,
        max_meshes_to_load = limits.max_meshes_to_load,
        "meshing limits"
    );

    let visibility = Arc::new(DistanceVisibility::new(
        Arc::clone(&world),
        config.world.view_distance,
    ));
    let preparer = Arc::new(CountingPreparer::new(Arc::clone(&world)));
    let meshing = ChunkMeshingQueue::new(limits, pool.clone(), preparer.clone());
    let scheduler = SectionScheduler::new(Arc::clone(&world), visibility.clone(), meshing);

    let view_distance = i32::try_from(config.world.view_distance).unwrap_or(i32::MAX);
    let mut rng = ChaCha8Rng::seed_from_u64(config.world.seed);
    let started = Instant::now();
    let mut edits = 0usize;

    for frame in 0..config.debug.frames {
        let camera_chunk = IVec2::new(i32::try_from(frame / FRAMES_PER_CHUNK)?, 0);
        let surface = generator.surface_height(
            camera_chunk.x * SECTION_WIDTH as i32,
            camera_chunk.y * SECTION_WIDTH as i32,
        );
        let camera = IVec3::new(
            camera_chunk.x,
            (surface + 8).div_euclid(SECTION_WIDTH as i32),
            camera_chunk.y,
        );
        visibility.set_camera(camera);
        scheduler.set_camera(camera);

        stream_columns(&scheduler, &generator, camera_chunk, view_distance);
        edits += random_edits(&scheduler, &mut rng, palette, camera, surface);

        let stats = scheduler.tick();
        let uploaded = preparer.upload(UPLOADS_PER_FRAME);
        debug!(frame, ?stats, uploaded, "frame");
        if frame % 60 == 0 {
            info!(
                frame,
                backlog = stats.backlog,
                culled = stats.culled,
                in_flight = stats.in_flight,
                dispatched = stats.dispatched,
                promoted = stats.promoted,
                prepared = preparer.prepared(),
                "scheduler"
            );
        }
        std::thread::sleep(FRAME_TIME);
    }

    scheduler.unload_world();
    pool.shutdown();
    info!(
        frames = config.debug.frames,
        edits,
        prepared = preparer.prepared(),
        faces = preparer.faces(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "run finished"
    );
    Ok(())
}

/// Loads columns entering the view square and unloads those two chunks beyond it.
fn stream_columns(
    scheduler: &SectionScheduler,
    generator: &TerrainGenerator,
    camera_chunk: IVec2,
    view_distance: i32,
) {
    let keep = view_distance + 2;
    let far: Vec<IVec2> = scheduler
        .world()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .chunk_positions()
        .filter(|chunk| {
            let offset = *chunk - camera_chunk;
            offset.x.abs().max(offset.y.abs()) > keep
        })
        .collect();
    for chunk in far {
        scheduler.unload_chunk(chunk);
    }

    for dz in -view_distance..=view_distance {
        for dx in -view_distance..=view_distance {
            let chunk = camera_chunk + IVec2::new(dx, dz);
            let column = {
                let world = scheduler.world().read().unwrap_or_else(PoisonError::into_inner);
                if world.is_loaded(chunk) {
                    continue;
                }
                generator.generate_column(&world, chunk)
            };
            scheduler
                .world()
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .load_column(chunk, column);
            scheduler.queue_column(chunk);
        }
    }
}

/// Digs or places a few blocks around the surface near the camera.
fn random_edits(
    scheduler: &SectionScheduler,
    rng: &mut ChaCha8Rng,
    palette: Palette,
    camera: IVec3,
    surface: i32,
) -> usize {
    let width = SECTION_WIDTH as i32;
    let mut applied = 0;
    for _ in 0..EDITS_PER_FRAME {
        let pos = IVec3::new(
            camera.x * width + rng.random_range(-24..24),
            surface + rng.random_range(-6..4),
            camera.z * width + rng.random_range(-24..24),
        );
        let value = match rng.random_range(0..4) {
            0 => Some(palette.stone),
            1 => Some(palette.glass),
            _ => None,
        };
        match scheduler.set_block(pos, value) {
            Ok(_) => applied += 1,
            Err(e) => debug!(%pos, "edit skipped: {e}"),
        }
    }
    applied
}
