//! The subcommands of the `densify` tool.

use crate::config::PipelineConfig;
use crate::errors::AppError;
use densify_core::field::{NonFiniteReport, non_finite_count};
use densify_core::pyramid::{ChannelMix, PyramidEngine, StagedReconstructor};
use densify_core::{GridCache, Resampler, TemporalMaskBuilder};
use densify_data::{FrameDataset, read_container, save_png};
use ndarray::Array3;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One line per texture of a container.
pub fn inspect(file: &Path) -> Result<Vec<String>, AppError> {
    let records = read_container(file)?;
    let lines = records
        .iter()
        .map(|record| {
            let report = NonFiniteReport::scan(&record.map);
            format!(
                "{}: {}x{}x{} ({} bytes/element), {} non-finite",
                record.name,
                record.width(),
                record.height(),
                record.channels(),
                record.format.size(),
                report.total()
            )
        })
        .collect();
    Ok(lines)
}

/// Write every texture of a container as `<out>/<name>.png`.
pub fn export(file: &Path, out: &Path) -> Result<usize, AppError> {
    let records = read_container(file)?;
    std::fs::create_dir_all(out)?;
    for record in &records {
        let path = out.join(format!("{}.png", record.name));
        save_png(&record.map, &path)?;
        debug!("Exported {}", path.display());
    }
    info!("Exported {} textures to {}", records.len(), out.display());
    Ok(records.len())
}

/// Coverage of the temporal validity mask of one dataset window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskSummary {
    pub previous: f32,
    pub next: f32,
    pub combined: f32,
    pub non_finite: usize,
}

pub fn mask(
    dataset_dir: &Path,
    index: usize,
    config: &PipelineConfig,
    out: Option<&Path>,
) -> Result<MaskSummary, AppError> {
    let dataset = FrameDataset::open(dataset_dir)?;
    let window = dataset.window(index)?;
    let motion = window.temporal_window(&config.forward_flow, &config.backward_flow)?;

    let resampler = Resampler::with_cache(Arc::new(GridCache::new()));
    let builder = TemporalMaskBuilder::new(config.mask).with_resampler(resampler);
    let mask = builder.build(&motion)?;

    let summary = MaskSummary {
        previous: mask.previous.coverage_ratio(),
        next: mask.next.coverage_ratio(),
        combined: mask.combined.coverage_ratio(),
        non_finite: non_finite_count(&mask.combined.view()),
    };
    if summary.non_finite > 0 {
        warn!(
            "Window {} has {} non-finite mask values; check the motion textures",
            index, summary.non_finite
        );
    }

    if let Some(out) = out {
        save_png(&mask.combined.into_feature_map(), out)?;
        info!("Wrote mask to {}", out.display());
    }
    Ok(summary)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchParams {
    pub width: usize,
    pub height: usize,
    pub in_channels: usize,
    pub inner_channels: usize,
    pub out_channels: usize,
    pub iterations: usize,
}

impl Default for BenchParams {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            in_channels: 8,
            inner_channels: 16,
            out_channels: 7,
            iterations: 10,
        }
    }
}

/// Average milliseconds per Pull-Push pass with the reference transforms.
pub fn bench(params: &BenchParams) -> Result<f64, AppError> {
    let BenchParams {
        width,
        height,
        in_channels,
        inner_channels,
        out_channels,
        iterations,
    } = *params;

    let model = StagedReconstructor::builder(inner_channels)
        .head(ChannelMix::from_fn(in_channels, inner_channels, |(o, i)| {
            if o % in_channels == i { 1.0 } else { 0.0 }
        }))
        .bottleneck(PyramidEngine::averaging(inner_channels))
        .tail(ChannelMix::from_fn(inner_channels, out_channels, |_| {
            1.0 / inner_channels as f32
        }))
        .build()?;

    let input = Array3::from_shape_fn((in_channels, height, width), |(c, y, x)| {
        ((c * 31 + y * 17 + x * 7) % 255) as f32 / 255.0
    });

    let start = Instant::now();
    for _ in 0..iterations.max(1) {
        model.process(input.view())?;
    }
    let average = start.elapsed().as_secs_f64() * 1000.0 / iterations.max(1) as f64;

    info!(
        "Pull-Push {}x{} ({} -> {} -> {} channels): {:.2} ms per pass",
        width, height, in_channels, inner_channels, out_channels, average
    );
    Ok(average)
}

#[cfg(test)]
mod tests {
    use super::*;
    use densify_data::{ElementFormat, TextureRecord, write_container};

    fn write_sample(path: &Path) {
        let mut depth = Array3::from_elem((1, 2, 3), 0.5);
        depth[[0, 1, 2]] = f32::NAN;
        let records = vec![
            TextureRecord::new("MeshDepth", ElementFormat::Single, depth),
            TextureRecord::new("MeshColor", ElementFormat::Half, Array3::ones((4, 2, 3))),
        ];
        write_container(path, &records).unwrap();
    }

    #[test]
    fn test_inspect_lists_records() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("frame.textures");
        write_sample(&file);

        let lines = inspect(&file).unwrap();
        assert_eq!(
            lines,
            vec![
                "MeshDepth: 3x2x1 (4 bytes/element), 1 non-finite".to_string(),
                "MeshColor: 3x2x4 (2 bytes/element), 0 non-finite".to_string(),
            ]
        );
    }

    #[test]
    fn test_export_writes_pngs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("frame.textures");
        write_sample(&file);

        let out = dir.path().join("png");
        assert_eq!(export(&file, &out).unwrap(), 2);
        assert!(out.join("MeshDepth.png").is_file());
        assert!(out.join("MeshColor.png").is_file());
    }

    #[test]
    fn test_bench_small_input() {
        let params = BenchParams {
            width: 37,
            height: 21,
            iterations: 2,
            ..BenchParams::default()
        };
        let average = bench(&params).unwrap();
        assert!(average >= 0.0);
    }
}
