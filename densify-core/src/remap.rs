//! Reversible min/max remapping into `[0, 1]`.
//!
//! Both directions use the same denominator `max - min + REMAP_EPSILON`, so a
//! remap followed by its inverse reproduces the input up to rounding, and a
//! constant input maps to zeros instead of NaN.

use crate::batch::ensure_batch_len;
use crate::field::{FeatureBatch, FeatureMap, FieldError};
use ndarray::{ArrayView3, Axis, Zip};
use rayon::prelude::*;

/// Tolerance added to every range.
pub const REMAP_EPSILON: f32 = 1e-8;

/// Where the extrema of a remap come from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeMode {
    /// The same range for every sample.
    Known { min: f32, max: f32 },
    /// Extrema computed independently for each sample over all its channels.
    PerSample,
}

/// Extrema used for each sample of a remapped batch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleExtrema {
    pub min: Vec<f32>,
    pub max: Vec<f32>,
}

impl SampleExtrema {
    pub fn len(&self) -> usize {
        self.min.len()
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_empty()
    }

    /// `(min, max)` of sample `index`.
    pub fn get(&self, index: usize) -> Option<(f32, f32)> {
        Some((*self.min.get(index)?, *self.max.get(index)?))
    }
}

/// Finite extrema of a map; `(0, 0)` when it has no finite entries.
pub fn extrema(map: &ArrayView3<'_, f32>) -> (f32, f32) {
    let (min, max) = map
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if min > max { (0.0, 0.0) } else { (min, max) }
}

/// Remap one map; returns the extrema used alongside the result.
pub fn map_to_unit_range(map: ArrayView3<'_, f32>, mode: RangeMode) -> (f32, f32, FeatureMap) {
    let (min, max) = match mode {
        RangeMode::Known { min, max } => (min, max),
        RangeMode::PerSample => extrema(&map),
    };
    let scale = max - min + REMAP_EPSILON;
    (min, max, map.mapv(|x| (x - min) / scale))
}

/// Inverse of [`map_to_unit_range`].
pub fn map_from_unit_range(min: f32, max: f32, map: ArrayView3<'_, f32>) -> FeatureMap {
    let scale = max - min + REMAP_EPSILON;
    map.mapv(|y| min + y * scale)
}

/// Remap every sample of a `(N, C, H, W)` batch.
pub fn to_unit_range(batch: &FeatureBatch, mode: RangeMode) -> (SampleExtrema, FeatureBatch) {
    let mut output = batch.clone();
    let samples: Vec<_> = output.outer_iter_mut().collect();
    let ranges: Vec<(f32, f32)> = samples
        .into_par_iter()
        .map(|mut sample| {
            let (min, max) = match mode {
                RangeMode::Known { min, max } => (min, max),
                RangeMode::PerSample => extrema(&sample.view()),
            };
            let scale = max - min + REMAP_EPSILON;
            sample.mapv_inplace(|x| (x - min) / scale);
            (min, max)
        })
        .collect();

    let (min, max) = ranges.into_iter().unzip();
    (SampleExtrema { min, max }, output)
}

/// Inverse of [`to_unit_range`].
pub fn from_unit_range(
    extrema: &SampleExtrema,
    batch: &FeatureBatch,
) -> Result<FeatureBatch, FieldError> {
    ensure_batch_len(batch, extrema.len())?;
    ensure_batch_len(batch, extrema.max.len())?;

    let mut output = batch.clone();
    for (index, mut sample) in output.axis_iter_mut(Axis(0)).enumerate() {
        let (min, max) = (extrema.min[index], extrema.max[index]);
        let scale = max - min + REMAP_EPSILON;
        sample.mapv_inplace(|y| min + y * scale);
    }
    Ok(output)
}

/// Normalize the entries selected by `mask` to `[0, 1]` and zero the rest.
///
/// Extrema are taken over the masked entries only. With no masked entry the
/// result is all zeros.
pub fn normalize_masked(
    values: ArrayView3<'_, f32>,
    mask: ArrayView3<'_, bool>,
) -> Result<FeatureMap, FieldError> {
    if values.dim() != mask.dim() {
        let ((_, vh, vw), (_, mh, mw)) = (values.dim(), mask.dim());
        return Err(FieldError::SpatialMismatch {
            expected_width: vw,
            expected_height: vh,
            actual_width: mw,
            actual_height: mh,
        });
    }

    let (min, max) = Zip::from(&values).and(&mask).fold(
        (f32::INFINITY, f32::NEG_INFINITY),
        |(lo, hi), &v, &m| if m { (lo.min(v), hi.max(v)) } else { (lo, hi) },
    );
    if min > max {
        return Ok(FeatureMap::zeros(values.dim()));
    }

    let scale = max - min + REMAP_EPSILON;
    let mut output = FeatureMap::zeros(values.dim());
    Zip::from(&mut output)
        .and(&values)
        .and(&mask)
        .for_each(|o, &v, &m| {
            if m {
                *o = (v - min) / scale;
            }
        });
    Ok(output)
}
