//! Densify Core
//!
//! Numerical core for reconstructing dense, temporally stable frames from sparse
//! point renderings. Everything here is a pure function of its inputs; batches
//! are processed sample by sample on the rayon pool.
//!
//! ## Modules
//!
//! - [`field`]: Feature maps, motion fields, occlusion masks and non-finite diagnostics
//! - [`motion`]: Backward warping, disocclusion detection and temporal validity masks
//! - [`remap`]: Reversible min/max remapping into `[0, 1]`
//! - [`pyramid`]: The Pull-Push engine and the staged encoder/decoder around it
//! - [`batch`]: Per-sample parallel helpers

pub mod batch;
pub mod field;
pub mod motion;
pub mod pyramid;
pub mod remap;

pub use field::{FeatureBatch, FeatureMap, FieldError, MotionField, OcclusionMask};
pub use motion::{
    GridCache, OcclusionConfig, OcclusionEstimator, PixelGrid, Resampler, TemporalMask,
    TemporalMaskBuilder, TemporalMaskConfig, TemporalWindow,
};
pub use pyramid::{LearnedTransform, PyramidEngine, PyramidError, StagedReconstructor};
pub use remap::{RangeMode, SampleExtrema};
