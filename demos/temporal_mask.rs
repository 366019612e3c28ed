//! Temporal mask example
//!
//! Builds the temporal validity mask for a synthetic panning shot and shows
//! which pixels have no source in the neighboring frames.
//!
//! Usage:
//!   cargo run --example temporal_mask -- [shift]

use densify::densify_core::motion::masked_difference;
use densify::densify_core::{OcclusionConfig, TemporalMaskConfig};
use densify::{MotionField, TemporalMaskBuilder, TemporalWindow};
use ndarray::Array3;
use std::error::Error;
use tracing::info;

const WIDTH: usize = 16;
const HEIGHT: usize = 6;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let shift: f32 = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 2.0,
    };

    // Content moves left by `shift` pixels per frame.
    let window = TemporalWindow {
        prev_to_current: MotionField::constant(WIDTH, HEIGHT, shift, 0.0),
        current_to_prev: MotionField::constant(WIDTH, HEIGHT, -shift, 0.0),
        next_to_current: MotionField::constant(WIDTH, HEIGHT, -shift, 0.0),
        current_to_next: MotionField::constant(WIDTH, HEIGHT, shift, 0.0),
    };

    let builder = TemporalMaskBuilder::new(TemporalMaskConfig {
        occlusion: OcclusionConfig::new().with_artifact_filter_size(0),
    });
    let mask = builder.build(&window)?;

    info!(
        "Coverage: previous {:.3}, next {:.3}, combined {:.3}",
        mask.previous.coverage_ratio(),
        mask.next.coverage_ratio(),
        mask.combined.coverage_ratio()
    );
    for y in 0..HEIGHT {
        let row: String = (0..WIDTH)
            .map(|x| if mask.combined.is_valid(x, y) { '#' } else { '.' })
            .collect();
        println!("{}", row);
    }

    // current(x) = previous(x + shift)
    let previous = Array3::from_shape_fn((1, HEIGHT, WIDTH), |(_, _, x)| x as f32);
    let current = Array3::from_shape_fn((1, HEIGHT, WIDTH), |(_, _, x)| x as f32 + shift);
    let compensated = builder.compensate(previous.view(), &window.prev_to_current)?;
    let error = masked_difference(&mask.previous, compensated.view(), current.view())?;
    info!("Masked error against the previous frame: {:.4}", error.sum());

    Ok(())
}
