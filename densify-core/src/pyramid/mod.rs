//! Multiresolution Pull-Push reconstruction.
//!
//! [`PyramidEngine`] runs one down/up/fuse transform triple over a recursive
//! scale-space pyramid; [`StagedReconstructor`] wraps an engine in a fixed-depth
//! encoder/decoder.

pub mod engine;
pub mod staged;
pub mod state;
pub mod transform;

pub use engine::{PyramidEngine, PyramidError, PyramidTrace, level_count};
pub use staged::{Stage, StagedReconstructor, StagedReconstructorBuilder};
pub use state::{PyramidLevel, PyramidState};
pub use transform::{
    AveragePool2, Chain, ChannelMix, FnTransform, LearnedTransform, NearestUpsample2,
    TransformError,
};

use crate::field::FeatureMap;
use ndarray::{ArrayView3, s};

/// Padding that brings `size` up to a multiple of `multiple`.
pub fn padding_to_multiple(size: usize, multiple: usize) -> usize {
    (multiple - size % multiple) % multiple
}

/// Zero-pad `map` with `pad_h` rows at the bottom and `pad_w` columns at the right.
pub fn pad_bottom_right(map: ArrayView3<'_, f32>, pad_h: usize, pad_w: usize) -> FeatureMap {
    let (channels, height, width) = map.dim();
    let mut padded = FeatureMap::zeros((channels, height + pad_h, width + pad_w));
    padded.slice_mut(s![.., ..height, ..width]).assign(&map);
    padded
}

/// Remove `pad_h` rows from the bottom and `pad_w` columns from the right.
///
/// Panics when the crop exceeds the map.
pub fn crop_bottom_right(map: FeatureMap, pad_h: usize, pad_w: usize) -> FeatureMap {
    if pad_h == 0 && pad_w == 0 {
        return map;
    }
    let (_, height, width) = map.dim();
    assert!(
        pad_h <= height && pad_w <= width,
        "crop of {}x{} exceeds {}x{} map",
        pad_w,
        pad_h,
        width,
        height
    );
    map.slice(s![.., ..height - pad_h, ..width - pad_w]).to_owned()
}

/// Channel-wise concatenation of two maps with the same spatial size.
pub(crate) fn join_channels(a: ArrayView3<'_, f32>, b: ArrayView3<'_, f32>) -> FeatureMap {
    let (ca, height, width) = a.dim();
    let cb = b.dim().0;
    let mut joined = FeatureMap::zeros((ca + cb, height, width));
    joined.slice_mut(s![..ca, .., ..]).assign(&a);
    joined.slice_mut(s![ca.., .., ..]).assign(&b);
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding_to_multiple() {
        assert_eq!(padding_to_multiple(5, 2), 1);
        assert_eq!(padding_to_multiple(6, 2), 0);
        assert_eq!(padding_to_multiple(5, 8), 3);
        assert_eq!(padding_to_multiple(16, 8), 0);
        assert_eq!(padding_to_multiple(1, 1), 0);
    }

    #[test]
    fn test_pad_then_crop_restores() {
        let map = FeatureMap::from_shape_fn((2, 3, 5), |(c, y, x)| (c * 100 + y * 10 + x) as f32);
        let padded = pad_bottom_right(map.view(), 1, 3);
        assert_eq!(padded.dim(), (2, 4, 8));
        assert_eq!(padded[[1, 3, 7]], 0.0);
        assert_eq!(padded[[1, 2, 4]], map[[1, 2, 4]]);
        assert_eq!(crop_bottom_right(padded, 1, 3), map);
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn test_crop_too_large_panics() {
        crop_bottom_right(FeatureMap::zeros((1, 2, 2)), 3, 0);
    }

    #[test]
    fn test_join_channels() {
        let a = FeatureMap::ones((1, 2, 2));
        let b = FeatureMap::from_elem((2, 2, 2), 3.0);
        let joined = join_channels(a.view(), b.view());
        assert_eq!(joined.dim(), (3, 2, 2));
        assert_eq!(joined[[0, 1, 1]], 1.0);
        assert_eq!(joined[[2, 1, 1]], 3.0);
    }
}
