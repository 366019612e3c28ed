//! Data-parallel helpers over the batch dimension.
//!
//! Samples are independent: each one is handed to the worker as its own view
//! and produces its own output buffer, so no sample can write into another.

use crate::field::{FeatureBatch, FeatureMap, FieldError};
use ndarray::{Array4, ArrayView3, Axis};
use rayon::prelude::*;

/// Apply `f` to every sample of `batch` on the rayon pool, preserving order.
pub fn map_samples<T, E, F>(batch: &FeatureBatch, f: F) -> Result<Vec<T>, E>
where
    T: Send,
    E: Send,
    F: Fn(usize, ArrayView3<'_, f32>) -> Result<T, E> + Sync + Send,
{
    let samples: Vec<ArrayView3<'_, f32>> = batch.outer_iter().collect();
    samples
        .into_par_iter()
        .enumerate()
        .map(|(index, sample)| f(index, sample))
        .collect()
}

/// Stack same-shaped maps into a `(N, C, H, W)` batch.
pub fn stack_samples(samples: &[FeatureMap]) -> Result<FeatureBatch, FieldError> {
    let Some(first) = samples.first() else {
        return Ok(Array4::zeros((0, 0, 0, 0)));
    };
    let (channels, height, width) = first.dim();

    for sample in samples {
        let (c, h, w) = sample.dim();
        if c != channels {
            return Err(FieldError::ChannelCount {
                expected: channels,
                actual: c,
            });
        }
        if h != height || w != width {
            return Err(FieldError::SpatialMismatch {
                expected_width: width,
                expected_height: height,
                actual_width: w,
                actual_height: h,
            });
        }
    }

    let mut batch = Array4::zeros((samples.len(), channels, height, width));
    for (index, sample) in samples.iter().enumerate() {
        batch.index_axis_mut(Axis(0), index).assign(sample);
    }
    Ok(batch)
}

/// Fail unless `batch` holds exactly `expected` samples.
pub fn ensure_batch_len(batch: &FeatureBatch, expected: usize) -> Result<(), FieldError> {
    let actual = batch.dim().0;
    if actual != expected {
        return Err(FieldError::BatchMismatch { expected, actual });
    }
    Ok(())
}
