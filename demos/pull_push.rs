//! Pull-Push example
//!
//! Runs the reference Pull-Push engine over a sparse point rendering and
//! writes input and output as PNG.
//!
//! Usage:
//!   cargo run --example pull_push -- [output_dir]

use densify::PyramidEngine;
use densify::densify_core::field::NonFiniteReport;
use densify::densify_data::save_png;
use ndarray::{Array3, s};
use std::error::Error;
use std::path::PathBuf;
use tracing::info;

const WIDTH: usize = 160;
const HEIGHT: usize = 90;
const STRIDE: usize = 7;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("pull_push_output"));
    std::fs::create_dir_all(&out_dir)?;

    // A smooth gradient seen only at every STRIDE-th pixel.
    let sparse = Array3::from_shape_fn((3, HEIGHT, WIDTH), |(c, y, x)| {
        if x % STRIDE != 0 || y % STRIDE != 0 {
            return 0.0;
        }
        match c {
            0 => x as f32 / WIDTH as f32,
            1 => y as f32 / HEIGHT as f32,
            _ => 0.5,
        }
    });

    let engine = PyramidEngine::averaging(3);
    let (dense, trace) = engine.process_traced(sparse.view())?;

    info!(
        "{} levels, {} pull and {} push steps",
        trace.levels, trace.pull_steps, trace.push_steps
    );
    for (level, ((h, w), (pad_h, pad_w))) in trace.sizes.iter().zip(&trace.paddings).enumerate() {
        info!("Level {}: {}x{} padded by {}x{}", level, w, h, pad_w, pad_h);
    }

    let report = NonFiniteReport::scan(&dense);
    let gap = dense[[0, 3, 3]];
    let row = dense.slice(s![0, HEIGHT / 2, ..]);
    info!(
        "Gap pixel (3, 3): {:.3}, mid row range {:.3}..{:.3}, {} non-finite",
        gap,
        row.fold(f32::INFINITY, |a, &b| a.min(b)),
        row.fold(f32::NEG_INFINITY, |a, &b| a.max(b)),
        report.total()
    );

    save_png(&sparse, out_dir.join("sparse.png"))?;
    save_png(&dense, out_dir.join("dense.png"))?;
    info!("Wrote {}", out_dir.display());
    Ok(())
}
