//! Track sampling command

use anyhow::{bail, Context, Result};
use glint_animation::load_track_from_file;
use std::path::Path;

pub fn run(path: &str, step: f32, duration: Option<f32>) -> Result<()> {
    if !(step.is_finite() && step > 0.0) {
        bail!("--step must be positive, got {step}");
    }

    let def = load_track_from_file(Path::new(path))
        .with_context(|| format!("Failed to load track {path}"))?;
    let mut track = def.build()?;
    let duration = duration.unwrap_or(track.duration());

    let name: &str = if def.name.is_empty() { path } else { &def.name };
    println!(
        "Track '{}': {} keyframes x {} channel(s), {:.3}s, {:?}, {:?}, {:?}",
        name,
        track.keyframe_count(),
        track.stride(),
        track.duration(),
        track.interpolation(),
        track.loop_policy(),
        track.write_mode()
    );

    let mut target = vec![0.0; track.stride()];
    let mut elapsed = 0.0f32;
    print_row(elapsed, track.values(), 0, false);

    let samples = (duration / step).round() as u64;
    for _ in 0..samples {
        let looped = track.animate(step, &mut target);
        elapsed += step;
        print_row(elapsed, track.values(), track.current_loop(), looped);
        if track.is_finished() {
            println!("  finished after {elapsed:.3}s");
            break;
        }
    }

    Ok(())
}

fn print_row(elapsed: f32, values: &[f32], current_loop: u32, looped: bool) {
    let formatted: Vec<String> = values.iter().map(|v| format!("{v:>9.4}")).collect();
    println!(
        "  t={elapsed:>8.3}  loop {current_loop:>3}  [{}]{}",
        formatted.join(" "),
        if looped { "  (wrapped)" } else { "" }
    );
}
