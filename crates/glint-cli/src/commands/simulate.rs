//! Headless simulation command

use anyhow::{bail, Context, Result};
use glam::{Mat4, Vec3};
use glint_core::ParticleRng;
use glint_particles::{FrameClock, ParticleEmitter, ParticleGenerator, SystemConfig, TickStats};
use glint_render::RecordingDevice;
use std::path::Path;
use std::time::Duration;

pub struct SimulateArgs {
    pub config: String,
    pub frames: u64,
    pub frame_ms: f64,
    pub seed: u32,
    pub realtime: bool,
    pub report_every: u64,
}

pub fn run(args: SimulateArgs) -> Result<()> {
    if !(args.frame_ms.is_finite() && args.frame_ms > 0.0) {
        bail!("--frame-ms must be positive, got {}", args.frame_ms);
    }

    let config = SystemConfig::from_file(Path::new(&args.config))
        .with_context(|| format!("Failed to load {}", args.config))?;

    let mut device = RecordingDevice::new();
    let mut generator = config
        .build(ParticleRng::new(args.seed), &mut device)
        .context("Failed to build particle system")?;
    generator.set_perspective(camera(config.generator.viewport))?;
    log::debug!(
        "built system from {} (seed {}, {} framebuffers live)",
        args.config,
        args.seed,
        device.live_framebuffers()
    );

    println!(
        "Simulating {} {} particles ({} active) for {} frames",
        generator.buffer().capacity(),
        generator.buffer().particle_type().name(),
        generator.buffer().active_count(),
        args.frames
    );

    let step = Duration::from_secs_f64(args.frame_ms / 1000.0);
    let mut clock = if args.realtime {
        FrameClock::wall()
    } else {
        FrameClock::fixed(step)
    };

    let result = drive(&mut generator, &mut device, &mut clock, &args, step);
    let live_before = device.live_framebuffers();
    let sim_time = generator.sim_time();
    let write_offset = generator.write_offset();
    generator.destroy(&mut device);
    if let Err(err) = &result {
        log::warn!("simulation stopped after {} frames: {err}", clock.frames);
    }
    let released = result.context("Simulation aborted")?;

    println!();
    println!("Summary:");
    println!("  frames:              {}", clock.frames);
    println!("  simulated time:      {sim_time:.3}s");
    println!("  particles released:  {released}");
    println!("  write offset:        {write_offset}");
    println!("  draw calls:          {}", device.draw_calls());
    println!("  particles submitted: {}", device.particles_submitted());
    println!(
        "  framebuffers:        {live_before} live during run, {} after destroy",
        device.live_framebuffers()
    );

    Ok(())
}

fn drive<E: ParticleEmitter>(
    generator: &mut ParticleGenerator<E>,
    device: &mut RecordingDevice,
    clock: &mut FrameClock,
    args: &SimulateArgs,
    step: Duration,
) -> Result<usize> {
    let mut released = 0;
    for _ in 0..args.frames {
        if args.realtime {
            std::thread::sleep(step);
        }
        let elapsed = clock.tick();
        let stats = generator.tick(device, elapsed)?;
        released += stats.released;

        let commands = device.take_commands().len();
        if args.report_every > 0 && stats.frame % args.report_every == 0 {
            print_frame(&stats, commands);
        }
    }
    Ok(released)
}

fn print_frame(stats: &TickStats, commands: usize) {
    let mut flags = Vec::new();
    if stats.offscreen {
        flags.push("offscreen");
    }
    if stats.frame_capped {
        flags.push("frame capped");
    }
    if stats.rate_capped {
        flags.push("rate capped");
    }
    println!(
        "frame {:>6}  {:>7.2}ms  released {:>5}/{:<5}  offset {:>7}  t={:>8.3}s  {:>2} cmds  {}",
        stats.frame,
        stats.elapsed_millis,
        stats.released,
        stats.requested,
        stats.write_offset,
        stats.sim_time,
        commands,
        flags.join(", ")
    );
}

/// Camera 10 units back on +Z looking at the origin
fn camera(viewport: [u32; 2]) -> Mat4 {
    let aspect = viewport[0] as f32 / viewport[1].max(1) as f32;
    let proj = Mat4::perspective_rh(60f32.to_radians(), aspect, 0.1, 100.0);
    let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
    proj * view
}
