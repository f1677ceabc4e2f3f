//! Command-line overrides for the headless runner.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Command-line arguments. Values given here override `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "strata", about = "Section occlusion and meshing scheduler")]
pub struct CliArgs {
    /// Worker threads for section preparation (0 = one per CPU).
    #[arg(long)]
    pub worker_threads: Option<usize>,

    /// Memory budget in bytes; selects the finished-mesh cap.
    #[arg(long)]
    pub memory_budget: Option<u64>,

    /// Visible radius in chunks.
    #[arg(long)]
    pub view_distance: Option<u32>,

    /// Number of frames to simulate.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Applies CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(threads) = args.worker_threads {
            self.meshing.worker_threads = threads;
        }
        if let Some(bytes) = args.memory_budget {
            self.meshing.memory_budget_bytes = bytes;
        }
        if let Some(distance) = args.view_distance {
            self.world.view_distance = distance;
        }
        if let Some(frames) = args.frames {
            self.debug.frames = frames;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
