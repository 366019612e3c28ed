//! Dense per-pixel maps shared by every stage of the reconstruction core.
//!
//! All maps are planar `(channels, height, width)` arrays. What a channel means
//! (color, depth, normal, mask, motion) is a caller convention; the core only
//! distinguishes motion fields (2 channels) and occlusion masks (1 channel).

pub mod diagnostics;

use ndarray::{Array3, ArrayView2, ArrayView3, Array4, Axis, Zip};

pub use diagnostics::{NonFiniteReport, first_non_finite, is_all_finite, non_finite_count};

/// A dense `(channels, height, width)` feature map.
pub type FeatureMap = Array3<f32>;

/// A batch of feature maps, `(samples, channels, height, width)`.
pub type FeatureBatch = Array4<f32>;

/// Masks compare against this value to decide valid/invalid.
pub const MASK_THRESHOLD: f32 = 0.5;

/// Errors raised when a map does not have the shape an operation requires.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("Expected {expected} channels, got {actual}")]
    ChannelCount { expected: usize, actual: usize },
    #[error("Spatial size mismatch: expected {expected_width}x{expected_height}, got {actual_width}x{actual_height}")]
    SpatialMismatch {
        expected_width: usize,
        expected_height: usize,
        actual_width: usize,
        actual_height: usize,
    },
    #[error("Batch size mismatch: expected {expected}, got {actual}")]
    BatchMismatch { expected: usize, actual: usize },
}

/// Width of a `(C, H, W)` map.
pub fn width_of(map: &ArrayView3<f32>) -> usize {
    map.dim().2
}

/// Height of a `(C, H, W)` map.
pub fn height_of(map: &ArrayView3<f32>) -> usize {
    map.dim().1
}

/// Fails unless `map` is `width` x `height`.
pub fn ensure_size(map: &ArrayView3<f32>, width: usize, height: usize) -> Result<(), FieldError> {
    let (_, h, w) = map.dim();
    if w != width || h != height {
        return Err(FieldError::SpatialMismatch {
            expected_width: width,
            expected_height: height,
            actual_width: w,
            actual_height: h,
        });
    }
    Ok(())
}

/// A per-pixel displacement field.
///
/// Channel 0 is the horizontal and channel 1 the vertical displacement, in
/// source-pixel units. A pixel `p` of a map warped with this field pulls its
/// value from `p + motion(p)` in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionField {
    data: Array3<f32>,
}

impl MotionField {
    /// Wrap a `(2, H, W)` array.
    pub fn new(data: Array3<f32>) -> Result<Self, FieldError> {
        let channels = data.dim().0;
        if channels != 2 {
            return Err(FieldError::ChannelCount {
                expected: 2,
                actual: channels,
            });
        }
        Ok(Self { data })
    }

    /// A field without motion.
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            data: Array3::zeros((2, height, width)),
        }
    }

    /// The same displacement `(dx, dy)` everywhere.
    pub fn constant(width: usize, height: usize, dx: f32, dy: f32) -> Self {
        let mut data = Array3::zeros((2, height, width));
        data.index_axis_mut(Axis(0), 0).fill(dx);
        data.index_axis_mut(Axis(0), 1).fill(dy);
        Self { data }
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    /// Displacement `(dx, dy)` at pixel `(x, y)`.
    pub fn get(&self, x: usize, y: usize) -> Option<(f32, f32)> {
        let dx = *self.data.get((0, y, x))?;
        let dy = *self.data.get((1, y, x))?;
        Some((dx, dy))
    }

    /// Horizontal component.
    pub fn dx(&self) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), 0)
    }

    /// Vertical component.
    pub fn dy(&self) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), 1)
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    pub fn into_inner(self) -> Array3<f32> {
        self.data
    }

    /// Split a `(N, 2, H, W)` batch into per-sample fields.
    pub fn from_batch(batch: &Array4<f32>) -> Result<Vec<Self>, FieldError> {
        batch
            .outer_iter()
            .map(|sample| Self::new(sample.to_owned()))
            .collect()
    }
}

/// A single-channel validity mask: 1 where a comparison is meaningful, 0 where not.
///
/// Values are conventionally in `[0, 1]` and read as valid when `>= 0.5`.
#[derive(Debug, Clone, PartialEq)]
pub struct OcclusionMask {
    data: Array3<f32>,
}

impl OcclusionMask {
    /// Every pixel valid.
    pub fn all_valid(width: usize, height: usize) -> Self {
        Self {
            data: Array3::ones((1, height, width)),
        }
    }

    /// Every pixel invalid.
    pub fn all_invalid(width: usize, height: usize) -> Self {
        Self {
            data: Array3::zeros((1, height, width)),
        }
    }

    /// Wrap a `(1, H, W)` feature map.
    pub fn from_feature_map(data: FeatureMap) -> Result<Self, FieldError> {
        let channels = data.dim().0;
        if channels != 1 {
            return Err(FieldError::ChannelCount {
                expected: 1,
                actual: channels,
            });
        }
        Ok(Self { data })
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    /// Raw mask value at `(x, y)`.
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        self.data.get((0, y, x)).copied()
    }

    pub fn is_valid(&self, x: usize, y: usize) -> bool {
        self.get(x, y).is_some_and(|v| v >= MASK_THRESHOLD)
    }

    /// Fraction of pixels that read as valid.
    pub fn coverage_ratio(&self) -> f32 {
        let total = self.data.len();
        if total == 0 {
            return 0.0;
        }
        let valid = self.data.iter().filter(|&&v| v >= MASK_THRESHOLD).count();
        valid as f32 / total as f32
    }

    /// Per-pixel product, i.e. logical AND under the `[0, 1]` convention.
    pub fn product(&self, other: &OcclusionMask) -> Result<OcclusionMask, FieldError> {
        ensure_size(&other.data.view(), self.width(), self.height())?;
        let mut data = self.data.clone();
        Zip::from(&mut data)
            .and(&other.data)
            .for_each(|a, &b| *a *= b);
        Ok(OcclusionMask { data })
    }

    /// Values as a `(H, W)` plane.
    pub fn plane(&self) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), 0)
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    pub fn into_feature_map(self) -> FeatureMap {
        self.data
    }
}
