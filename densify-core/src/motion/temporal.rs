//! Temporal validity masks over a previous/current/next frame window.

use crate::field::{FeatureMap, FieldError, MotionField, OcclusionMask, ensure_size};
use crate::motion::occlusion::{OcclusionConfig, OcclusionEstimator};
use crate::motion::resample::Resampler;
use ndarray::{ArrayView3, Axis, Zip};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Motion fields relating a frame to both of its neighbors.
///
/// `a_to_b` displaces pixels of frame `b` to where they are read from in
/// frame `a`, matching [`Resampler::warp`].
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalWindow {
    pub prev_to_current: MotionField,
    pub current_to_prev: MotionField,
    pub next_to_current: MotionField,
    pub current_to_next: MotionField,
}

impl TemporalWindow {
    pub fn width(&self) -> usize {
        self.prev_to_current.width()
    }

    pub fn height(&self) -> usize {
        self.prev_to_current.height()
    }

    fn validate(&self) -> Result<(), FieldError> {
        let (w, h) = (self.width(), self.height());
        for field in [&self.current_to_prev, &self.next_to_current, &self.current_to_next] {
            ensure_size(&field.view(), w, h)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalMaskConfig {
    pub occlusion: OcclusionConfig,
}

/// Per-direction masks and their product.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalMask {
    pub previous: OcclusionMask,
    pub next: OcclusionMask,
    pub combined: OcclusionMask,
}

/// Builds the mask under which a warped neighbor may be compared to the current frame.
#[derive(Debug, Clone, Default)]
pub struct TemporalMaskBuilder {
    estimator: OcclusionEstimator,
    resampler: Resampler,
}

impl TemporalMaskBuilder {
    pub fn new(config: TemporalMaskConfig) -> Self {
        Self {
            estimator: OcclusionEstimator::new(config.occlusion),
            resampler: Resampler::new(),
        }
    }

    /// Share a resampler (and its grid cache) with the occlusion estimator.
    pub fn with_resampler(mut self, resampler: Resampler) -> Self {
        self.estimator = self.estimator.with_resampler(resampler.clone());
        self.resampler = resampler;
        self
    }

    pub fn estimator(&self) -> &OcclusionEstimator {
        &self.estimator
    }

    /// Validity mask for one neighbor.
    ///
    /// `toward` is the neighbor-to-current motion, `back` the current-to-neighbor
    /// motion. A pixel is valid when the neighbor has a source for it and that
    /// source is itself covered looking back:
    /// `warp(occlusion(back), toward) * occlusion(toward)`.
    pub fn direction_mask(
        &self,
        toward: &MotionField,
        back: &MotionField,
    ) -> Result<OcclusionMask, FieldError> {
        let distance = self.estimator.config().distance;
        let back_coverage = self.estimator.estimate(back)?;
        let carried = self
            .resampler
            .warp(back_coverage.view(), toward, distance)?;
        let carried = OcclusionMask::from_feature_map(carried)?;
        let coverage = self.estimator.estimate(toward)?;
        carried.product(&coverage)
    }

    pub fn build(&self, window: &TemporalWindow) -> Result<TemporalMask, FieldError> {
        window.validate()?;
        let (previous, next) = rayon::join(
            || self.direction_mask(&window.prev_to_current, &window.current_to_prev),
            || self.direction_mask(&window.next_to_current, &window.current_to_next),
        );
        let (previous, next) = (previous?, next?);
        let combined = previous.product(&next)?;

        debug!(
            "Temporal mask {}x{}: previous {:.3}, next {:.3}, combined {:.3}",
            window.width(),
            window.height(),
            previous.coverage_ratio(),
            next.coverage_ratio(),
            combined.coverage_ratio()
        );

        Ok(TemporalMask {
            previous,
            next,
            combined,
        })
    }

    /// Warp a neighbor's map onto the current frame and zero its disoccluded pixels.
    pub fn compensate(
        &self,
        neighbor: ArrayView3<'_, f32>,
        toward: &MotionField,
    ) -> Result<FeatureMap, FieldError> {
        let distance = self.estimator.config().distance;
        let mut warped = self.resampler.warp(neighbor, toward, distance)?;
        let coverage = self.estimator.estimate(toward)?;
        let plane = coverage.plane();
        for mut channel in warped.axis_iter_mut(Axis(0)) {
            Zip::from(&mut channel).and(&plane).for_each(|v, &m| *v *= m);
        }
        Ok(warped)
    }
}

/// `mask * |warped - current|`, broadcast over channels.
pub fn masked_difference(
    mask: &OcclusionMask,
    warped: ArrayView3<'_, f32>,
    current: ArrayView3<'_, f32>,
) -> Result<FeatureMap, FieldError> {
    let (channels, height, width) = current.dim();
    ensure_size(&warped, width, height)?;
    ensure_size(&mask.view(), width, height)?;
    if warped.dim().0 != channels {
        return Err(FieldError::ChannelCount {
            expected: channels,
            actual: warped.dim().0,
        });
    }

    let mut diff = &warped - &current;
    let plane = mask.plane();
    for mut channel in diff.axis_iter_mut(Axis(0)) {
        Zip::from(&mut channel)
            .and(&plane)
            .for_each(|v, &m| *v = m * v.abs());
    }
    Ok(diff)
}
