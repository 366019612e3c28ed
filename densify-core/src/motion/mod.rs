//! Motion compensation: backward warping, disocclusion detection and
//! temporal validity masks.

pub mod grid;
pub mod occlusion;
pub mod resample;
pub mod temporal;

pub use grid::{GridCache, PixelGrid};
pub use occlusion::{OcclusionConfig, OcclusionEstimator, dilate, erode, morphological_close};
pub use resample::Resampler;
pub use temporal::{
    TemporalMask, TemporalMaskBuilder, TemporalMaskConfig, TemporalWindow, masked_difference,
};
