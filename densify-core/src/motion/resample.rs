//! Backward (pull) warping with bilinear sampling.

use crate::batch::{ensure_batch_len, map_samples, stack_samples};
use crate::field::{FeatureBatch, FeatureMap, FieldError, MotionField, ensure_size};
use crate::motion::grid::{GridCache, PixelGrid};
use glam::Vec2;
use ndarray::{Array3, ArrayView3};
use std::sync::Arc;

/// Backward warper.
///
/// Every destination pixel `p` samples the source at
/// `grid(p) + distance * motion(p)`. Positions whose normalized coordinate
/// leaves `[-1, 1]` on either axis sample as exactly zero; so do the bilinear
/// taps of an in-range position that fall off the map. Non-finite sample
/// positions yield NaN in every channel.
#[derive(Debug, Clone, Default)]
pub struct Resampler {
    cache: Option<Arc<GridCache>>,
}

impl Resampler {
    /// A resampler that builds its pixel grid on every call.
    pub fn new() -> Self {
        Self { cache: None }
    }

    /// A resampler that reuses grids from a caller-owned cache.
    pub fn with_cache(cache: Arc<GridCache>) -> Self {
        Self { cache: Some(cache) }
    }

    /// Pixel grid for `width` x `height`, from the cache when there is one.
    pub fn pixel_grid(&self, width: usize, height: usize) -> Arc<PixelGrid> {
        match &self.cache {
            Some(cache) => cache.get(width, height),
            None => Arc::new(PixelGrid::new(width, height)),
        }
    }

    /// Warp `source` by `motion` scaled with `distance`.
    pub fn warp(
        &self,
        source: ArrayView3<'_, f32>,
        motion: &MotionField,
        distance: f32,
    ) -> Result<FeatureMap, FieldError> {
        let (channels, height, width) = source.dim();
        ensure_size(&motion.view(), width, height)?;

        let grid = self.pixel_grid(width, height);
        let coords = grid.view();
        let (dx, dy) = (motion.dx(), motion.dy());
        let mut output = Array3::zeros((channels, height, width));

        for y in 0..height {
            for x in 0..width {
                let pixel = Vec2::new(coords[[0, y, x]], coords[[1, y, x]]);
                let position = pixel + distance * Vec2::new(dx[[y, x]], dy[[y, x]]);

                if !position.is_finite() {
                    for c in 0..channels {
                        output[[c, y, x]] = f32::NAN;
                    }
                    continue;
                }

                let Some(taps) = BilinearTaps::at(position, width, height) else {
                    continue;
                };
                for c in 0..channels {
                    output[[c, y, x]] = taps.sample(&source, c);
                }
            }
        }

        Ok(output)
    }

    /// Warp every sample of a batch by its own motion field.
    pub fn warp_batch(
        &self,
        source: &FeatureBatch,
        motion: &[MotionField],
        distance: f32,
    ) -> Result<FeatureBatch, FieldError> {
        ensure_batch_len(source, motion.len())?;
        let warped = map_samples(source, |index, sample| {
            self.warp(sample, &motion[index], distance)
        })?;
        stack_samples(&warped)
    }
}

/// The four bilinear taps around a sample position, in pixel-index space.
#[derive(Debug, Clone, Copy)]
struct BilinearTaps {
    x0: i64,
    y0: i64,
    fx: f32,
    fy: f32,
    width: i64,
    height: i64,
}

impl BilinearTaps {
    /// `None` when the position is outside the normalized `[-1, 1]` range.
    ///
    /// The normalized coordinate `2 * pos / size - 1` is inside `[-1, 1]`
    /// exactly when `pos` is inside `[0, size]`, so the test runs on pixel
    /// coordinates directly.
    fn at(position: Vec2, width: usize, height: usize) -> Option<Self> {
        let (w, h) = (width as f32, height as f32);
        if position.x < 0.0 || position.x > w || position.y < 0.0 || position.y > h {
            return None;
        }

        // Pixel centers sit at +0.5.
        let ix = position.x - 0.5;
        let iy = position.y - 0.5;
        let x0 = ix.floor();
        let y0 = iy.floor();

        Some(Self {
            x0: x0 as i64,
            y0: y0 as i64,
            fx: ix - x0,
            fy: iy - y0,
            width: width as i64,
            height: height as i64,
        })
    }

    fn sample(&self, source: &ArrayView3<'_, f32>, channel: usize) -> f32 {
        let weights = [
            (0, 0, (1.0 - self.fx) * (1.0 - self.fy)),
            (1, 0, self.fx * (1.0 - self.fy)),
            (0, 1, (1.0 - self.fx) * self.fy),
            (1, 1, self.fx * self.fy),
        ];

        let mut value = 0.0;
        for (ox, oy, weight) in weights {
            let (x, y) = (self.x0 + ox, self.y0 + oy);
            if x < 0 || y < 0 || x >= self.width || y >= self.height {
                continue;
            }
            value += weight * source[[channel, y as usize, x as usize]];
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn ramp(channels: usize, height: usize, width: usize) -> FeatureMap {
        Array3::from_shape_fn((channels, height, width), |(c, y, x)| {
            (c * 100 + y * width + x) as f32 * 0.37 - 3.0
        })
    }

    #[test]
    fn test_zero_motion_is_exact_identity() {
        let resampler = Resampler::new();
        for &(w, h) in &[(1, 1), (7, 5), (16, 9), (3, 11)] {
            let source = ramp(3, h, w);
            let motion = MotionField::zeros(w, h);
            let warped = resampler.warp(source.view(), &motion, 1.0).unwrap();
            assert_eq!(warped, source, "identity warp changed a {}x{} map", w, h);
        }
    }

    #[test]
    fn test_integer_shift_pulls_from_offset() {
        let resampler = Resampler::new();
        let source = ramp(1, 4, 6);
        let motion = MotionField::constant(6, 4, 2.0, 1.0);
        let warped = resampler.warp(source.view(), &motion, 1.0).unwrap();

        for y in 0..4 {
            for x in 0..6 {
                let expected = if x + 2 < 6 && y + 1 < 4 {
                    source[[0, y + 1, x + 2]]
                } else {
                    0.0
                };
                assert_eq!(warped[[0, y, x]], expected, "at ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_negative_distance_inverts_direction() {
        let resampler = Resampler::new();
        let source = ramp(1, 3, 8);
        let motion = MotionField::constant(8, 3, 3.0, 0.0);
        let forward = resampler.warp(source.view(), &motion, -1.0).unwrap();

        for x in 0..8 {
            let expected = if x >= 3 { source[[0, 1, x - 3]] } else { 0.0 };
            assert_eq!(forward[[0, 1, x]], expected);
        }
    }

    #[test]
    fn test_half_pixel_shift_blends_neighbors() {
        let resampler = Resampler::new();
        let mut source = Array3::zeros((1, 1, 4));
        source[[0, 0, 1]] = 2.0;
        source[[0, 0, 2]] = 4.0;
        let motion = MotionField::constant(4, 1, 0.5, 0.0);
        let warped = resampler.warp(source.view(), &motion, 1.0).unwrap();

        assert!((warped[[0, 0, 1]] - 3.0).abs() < 1e-6);
        assert!((warped[[0, 0, 0]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_samples_are_zero() {
        let resampler = Resampler::new();
        let source = Array3::from_elem((2, 4, 4), 7.0);
        let motion = MotionField::constant(4, 4, -10.0, 0.0);
        let warped = resampler.warp(source.view(), &motion, 1.0).unwrap();
        assert!(warped.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_nan_motion_is_observable() {
        let resampler = Resampler::new();
        let source = Array3::from_elem((2, 3, 3), 1.0);
        let mut data = Array3::zeros((2, 3, 3));
        data[[0, 1, 1]] = f32::NAN;
        let motion = MotionField::new(data).unwrap();
        let warped = resampler.warp(source.view(), &motion, 1.0).unwrap();

        assert!(warped[[0, 1, 1]].is_nan());
        assert!(warped[[1, 1, 1]].is_nan());
        assert_eq!(crate::field::non_finite_count(&warped), 2);
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let resampler = Resampler::new();
        let source = Array3::zeros((1, 4, 4));
        let motion = MotionField::zeros(5, 4);
        assert!(resampler.warp(source.view(), &motion, 1.0).is_err());
    }

    #[test]
    fn test_cached_resampler_matches_uncached() {
        let cache = Arc::new(GridCache::new());
        let cached = Resampler::with_cache(Arc::clone(&cache));
        let plain = Resampler::new();
        let motion = MotionField::constant(5, 4, 0.25, -0.75);

        for &(w, h) in &[(5, 4), (5, 4)] {
            let source = ramp(2, h, w);
            let a = cached.warp(source.view(), &motion, 1.0).unwrap();
            let b = plain.warp(source.view(), &motion, 1.0).unwrap();
            assert_eq!(a, b);
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_warp_batch_uses_per_sample_motion() {
        let resampler = Resampler::new();
        let mut source = Array4::zeros((2, 1, 1, 4));
        for x in 0..4 {
            source[[0, 0, 0, x]] = x as f32;
            source[[1, 0, 0, x]] = 10.0 + x as f32;
        }
        let motion = vec![
            MotionField::zeros(4, 1),
            MotionField::constant(4, 1, 1.0, 0.0),
        ];

        let warped = resampler.warp_batch(&source, &motion, 1.0).unwrap();
        assert_eq!(warped[[0, 0, 0, 2]], 2.0);
        assert_eq!(warped[[1, 0, 0, 2]], 13.0);
        assert_eq!(warped[[1, 0, 0, 3]], 0.0);
    }

    #[test]
    fn test_warp_batch_length_mismatch() {
        let resampler = Resampler::new();
        let source = Array4::zeros((2, 1, 2, 2));
        let motion = vec![MotionField::zeros(2, 2)];
        assert!(matches!(
            resampler.warp_batch(&source, &motion, 1.0),
            Err(FieldError::BatchMismatch { .. })
        ));
    }
}
