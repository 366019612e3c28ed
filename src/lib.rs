//! Densify
//!
//! Dense, temporally stable frames from sparse point renderings.
//!
//! - [`densify_core`]: Pull-Push reconstruction, warping and temporal occlusion masks
//! - [`densify_data`]: The `.textures` frame container and frame sequences on disk

pub use densify_core;
pub use densify_data;

pub use densify_core::{
    FeatureMap, MotionField, OcclusionMask, PyramidEngine, StagedReconstructor,
    TemporalMaskBuilder, TemporalWindow,
};
pub use densify_data::{Frame, FrameDataset, TextureRecord};
