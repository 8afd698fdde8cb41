//! Glint CLI - headless runner for particle systems and keyframe tracks

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{simulate, track};

#[derive(Parser)]
#[command(name = "glint")]
#[command(about = "Frame-stepped particle emission and keyframe animation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a particle system headlessly and report what each frame emitted
    Simulate {
        /// Path to the system config (TOML)
        config: String,

        /// Number of frames to run
        #[arg(long, default_value = "60")]
        frames: u64,

        /// Simulated frame length in milliseconds
        #[arg(long, default_value = "16.667")]
        frame_ms: f64,

        /// Random seed for the emitter
        #[arg(long, default_value = "1")]
        seed: u32,

        /// Sleep between frames and measure elapsed time with the wall clock
        #[arg(long)]
        realtime: bool,

        /// Print a stats line every K frames (0 = summary only)
        #[arg(long, default_value = "10")]
        report_every: u64,
    },

    /// Sample a keyframe track definition at a fixed step
    Track {
        /// Path to the track definition (TOML)
        track: String,

        /// Sampling step in seconds
        #[arg(long, default_value = "0.1")]
        step: f32,

        /// How long to sample for (default: the track's own duration)
        #[arg(long)]
        duration: Option<f32>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            frames,
            frame_ms,
            seed,
            realtime,
            report_every,
        } => simulate::run(simulate::SimulateArgs {
            config,
            frames,
            frame_ms,
            seed,
            realtime,
            report_every,
        }),
        Commands::Track {
            track,
            step,
            duration,
        } => track::run(&track, step, duration),
    }
}
