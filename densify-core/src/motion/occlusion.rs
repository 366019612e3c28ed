//! Forward-splat coverage and disocclusion detection.

use crate::batch::{map_samples, stack_samples};
use crate::field::{FeatureBatch, FieldError, MotionField, OcclusionMask};
use crate::motion::resample::Resampler;
use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// Parameters of the occlusion estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcclusionConfig {
    /// Scale applied to the motion field, like [`Resampler::warp`]'s `distance`.
    pub distance: f32,
    /// Radius of the morphological closing; 0 disables it.
    pub artifact_filter_size: usize,
}

impl Default for OcclusionConfig {
    fn default() -> Self {
        Self {
            distance: 1.0,
            artifact_filter_size: 1,
        }
    }
}

impl OcclusionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_distance(mut self, distance: f32) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_artifact_filter_size(mut self, size: usize) -> Self {
        self.artifact_filter_size = size;
        self
    }

    /// Side length of the closing kernel, `2 * size + 1`.
    pub fn kernel_size(&self) -> usize {
        2 * self.artifact_filter_size + 1
    }
}

/// Estimates which pixels of a warped frame have a real source.
///
/// The pixel grid is pushed through the [`Resampler`] with the motion field
/// inverted, which reads the backward warp forward: each pixel yields the cell
/// its content lands on. Landing cells are rounded to the nearest pixel,
/// clamped into the frame and marked with 1; several pixels landing on one
/// cell mark it once. Grid samples that leave the frame read as the origin and
/// so land on cell `(0, 0)`. Cells nobody lands on are disoccluded and stay 0.
#[derive(Debug, Clone, Default)]
pub struct OcclusionEstimator {
    config: OcclusionConfig,
    resampler: Resampler,
}

impl OcclusionEstimator {
    pub fn new(config: OcclusionConfig) -> Self {
        Self {
            config,
            resampler: Resampler::new(),
        }
    }

    /// Share a resampler (and its grid cache) with other stages.
    pub fn with_resampler(mut self, resampler: Resampler) -> Self {
        self.resampler = resampler;
        self
    }

    pub fn config(&self) -> &OcclusionConfig {
        &self.config
    }

    /// Coverage mask for `motion`: 1 where some pixel lands, 0 where none does.
    ///
    /// Pixels whose landing position is not finite are written as NaN at their
    /// own location after the closing, so a corrupt motion field stays visible.
    pub fn estimate(&self, motion: &MotionField) -> Result<OcclusionMask, FieldError> {
        let (width, height) = (motion.width(), motion.height());
        let grid = self.resampler.pixel_grid(width, height);
        let landing = self
            .resampler
            .warp(grid.view(), motion, -self.config.distance)?;

        let mut coverage = Array2::<f32>::zeros((height, width));
        let mut corrupt = Vec::new();
        let (max_x, max_y) = (width.saturating_sub(1) as f32, height.saturating_sub(1) as f32);

        for y in 0..height {
            for x in 0..width {
                let (lx, ly) = (landing[[0, y, x]], landing[[1, y, x]]);
                if !lx.is_finite() || !ly.is_finite() {
                    corrupt.push((y, x));
                    continue;
                }
                let tx = (lx - 0.5).round().clamp(0.0, max_x) as usize;
                let ty = (ly - 0.5).round().clamp(0.0, max_y) as usize;
                coverage[[ty, tx]] = 1.0;
            }
        }

        if self.config.artifact_filter_size > 0 {
            coverage = morphological_close(coverage.view(), self.config.artifact_filter_size);
        }

        if !corrupt.is_empty() {
            warn!(
                "{} pixels have non-finite landing positions; marking them NaN",
                corrupt.len()
            );
            for (y, x) in corrupt {
                coverage[[y, x]] = f32::NAN;
            }
        }

        trace!("Estimated occlusion for {}x{} motion field", width, height);
        OcclusionMask::from_feature_map(coverage.insert_axis(Axis(0)))
    }

    /// One mask per motion field, each scattered into its own buffer.
    pub fn estimate_many(&self, motion: &[MotionField]) -> Result<Vec<OcclusionMask>, FieldError> {
        motion.par_iter().map(|m| self.estimate(m)).collect()
    }

    /// `(N, 2, H, W)` motion batch to `(N, 1, H, W)` mask batch.
    pub fn estimate_batch(&self, motion: &FeatureBatch) -> Result<FeatureBatch, FieldError> {
        let masks = map_samples(motion, |_, sample| {
            let field = MotionField::new(sample.to_owned())?;
            self.estimate(&field).map(OcclusionMask::into_feature_map)
        })?;
        stack_samples(&masks)
    }
}

/// Max over a `(2r + 1)` square window; cells outside the map are ignored.
pub fn dilate(mask: ArrayView2<'_, f32>, radius: usize) -> Array2<f32> {
    window_reduce(mask, radius, f32::NEG_INFINITY, f32::max)
}

/// Min over a `(2r + 1)` square window; cells outside the map are ignored.
pub fn erode(mask: ArrayView2<'_, f32>, radius: usize) -> Array2<f32> {
    window_reduce(mask, radius, f32::INFINITY, f32::min)
}

/// Dilate then erode, filling gaps narrower than the kernel.
pub fn morphological_close(mask: ArrayView2<'_, f32>, radius: usize) -> Array2<f32> {
    let dilated = dilate(mask, radius);
    erode(dilated.view(), radius)
}

fn window_reduce(
    mask: ArrayView2<'_, f32>,
    radius: usize,
    identity: f32,
    reduce: fn(f32, f32) -> f32,
) -> Array2<f32> {
    let (height, width) = mask.dim();
    Array2::from_shape_fn((height, width), |(y, x)| {
        let (y0, y1) = (y.saturating_sub(radius), (y + radius).min(height - 1));
        let (x0, x1) = (x.saturating_sub(radius), (x + radius).min(width - 1));
        let mut acc = identity;
        for wy in y0..=y1 {
            for wx in x0..=x1 {
                acc = reduce(acc, mask[[wy, wx]]);
            }
        }
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Array4};

    fn estimator(filter: usize) -> OcclusionEstimator {
        OcclusionEstimator::new(OcclusionConfig::new().with_artifact_filter_size(filter))
    }

    #[test]
    fn test_zero_motion_full_coverage() {
        for &(w, h) in &[(1, 1), (6, 4), (9, 13)] {
            let mask = estimator(0).estimate(&MotionField::zeros(w, h)).unwrap();
            assert!(mask.view().iter().all(|&v| v == 1.0), "{}x{}", w, h);
        }
    }

    #[test]
    fn test_horizontal_motion_disoccludes_last_columns() {
        let (w, h) = (10, 6);
        for k in 1..w {
            let motion = MotionField::constant(w, h, k as f32, 0.0);
            let mask = estimator(0).estimate(&motion).unwrap();
            for y in 0..h {
                for x in 0..w {
                    let expected = if x >= w - k { 0.0 } else { 1.0 };
                    assert_eq!(mask.get(x, y), Some(expected), "k={} at ({}, {})", k, x, y);
                }
            }
        }
    }

    #[test]
    fn test_vertical_motion_disoccludes_last_rows() {
        let (w, h) = (5, 7);
        let motion = MotionField::constant(w, h, 0.0, 2.0);
        let mask = estimator(0).estimate(&motion).unwrap();
        for y in 0..h {
            for x in 0..w {
                assert_eq!(mask.is_valid(x, y), y < h - 2);
            }
        }
    }

    #[test]
    fn test_particles_leaving_frame_land_on_origin() {
        let (w, h) = (6, 3);
        let motion = MotionField::constant(w, h, -2.0, 0.0);
        let mask = estimator(0).estimate(&motion).unwrap();
        for y in 0..h {
            for x in 0..w {
                let expected = x >= 2 || (x == 0 && y == 0);
                assert_eq!(mask.is_valid(x, y), expected, "at ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_distance_scales_motion() {
        let (w, h) = (8, 2);
        let motion = MotionField::constant(w, h, 1.0, 0.0);
        let config = OcclusionConfig::new()
            .with_artifact_filter_size(0)
            .with_distance(3.0);
        let mask = OcclusionEstimator::new(config).estimate(&motion).unwrap();
        for x in 0..w {
            assert_eq!(mask.is_valid(x, 1), x < w - 3);
        }
    }

    #[test]
    fn test_collisions_mark_once() {
        // Every pixel of a 4-wide row lands on column 0.
        let mut data = Array3::zeros((2, 1, 4));
        for x in 0..4 {
            data[[0, 0, x]] = x as f32;
        }
        let mask = estimator(0)
            .estimate(&MotionField::new(data).unwrap())
            .unwrap();
        assert_eq!(mask.get(0, 0), Some(1.0));
        assert_eq!(mask.view().sum(), 1.0);
    }

    #[test]
    fn test_closing_fills_single_gap() {
        let mut mask = Array2::<f32>::ones((5, 5));
        mask[[2, 2]] = 0.0;
        let closed = morphological_close(mask.view(), 1);
        assert!(closed.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_closing_keeps_wide_gap() {
        let mut mask = Array2::<f32>::ones((5, 5));
        for y in 1..4 {
            for x in 1..4 {
                mask[[y, x]] = 0.0;
            }
        }
        let closed = morphological_close(mask.view(), 1);
        assert_eq!(closed, mask);
    }

    #[test]
    fn test_closing_does_not_grow_isolated_cell() {
        let mut mask = Array2::<f32>::zeros((5, 5));
        mask[[2, 2]] = 1.0;
        let closed = morphological_close(mask.view(), 1);
        assert_eq!(closed, mask);
    }

    #[test]
    fn test_dilate_and_erode_at_borders() {
        let mut mask = Array2::<f32>::zeros((3, 3));
        mask[[0, 0]] = 1.0;
        let dilated = dilate(mask.view(), 1);
        assert_eq!(dilated[[1, 1]], 1.0);
        assert_eq!(dilated[[2, 2]], 0.0);

        let eroded = erode(Array2::<f32>::ones((3, 3)).view(), 1);
        assert!(eroded.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_estimate_closes_rounding_gap() {
        // A 2x stretch leaves every other column empty; closing fills them.
        let (w, h) = (8, 3);
        let data = Array3::from_shape_fn((2, h, w), |(c, _, x)| {
            if c == 0 { -(x as f32) } else { 0.0 }
        });
        let motion = MotionField::new(data).unwrap();

        let raw = estimator(0).estimate(&motion).unwrap();
        assert!(!raw.is_valid(1, 1));
        let closed = estimator(1).estimate(&motion).unwrap();
        assert!(closed.is_valid(1, 1));
    }

    #[test]
    fn test_nan_motion_marks_source_pixel() {
        let mut data = Array3::zeros((2, 3, 3));
        data[[0, 2, 2]] = f32::NAN;
        let mask = estimator(0)
            .estimate(&MotionField::new(data).unwrap())
            .unwrap();
        assert!(mask.get(2, 2).is_some_and(f32::is_nan));
        assert_eq!(crate::field::non_finite_count(&mask.view()), 1);
    }

    #[test]
    fn test_batch_scatter_is_isolated() {
        let (w, h) = (6, 4);
        let fields = [
            MotionField::constant(w, h, 3.0, 0.0),
            MotionField::zeros(w, h),
            MotionField::constant(w, h, 0.0, 1.0),
        ];
        let mut batch = Array4::zeros((3, 2, h, w));
        for (n, field) in fields.iter().enumerate() {
            batch.index_axis_mut(Axis(0), n).assign(&field.view());
        }

        let est = estimator(0);
        let masks = est.estimate_batch(&batch).unwrap();
        assert_eq!(masks.dim(), (3, 1, h, w));
        for (n, field) in fields.iter().enumerate() {
            let single = est.estimate(field).unwrap();
            assert_eq!(masks.index_axis(Axis(0), n), single.view());
        }

        let many = est.estimate_many(&fields).unwrap();
        assert_eq!(many.len(), 3);
        assert_eq!(many[1].coverage_ratio(), 1.0);
    }

    #[test]
    fn test_config_roundtrips_through_json() {
        let config = OcclusionConfig::new().with_artifact_filter_size(2);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: OcclusionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.kernel_size(), 5);

        let defaults: OcclusionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(defaults, OcclusionConfig::default());
    }
}
