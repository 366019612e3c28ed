//! Turning decoded container records into network-ready frame textures.

use crate::container::TextureRecord;
use crate::dataset::DatasetError;
use densify_core::remap::normalize_masked;
use densify_core::{FeatureMap, MotionField};
use ndarray::{Array3, ArrayView3, Zip, s};
use std::collections::BTreeMap;
use tracing::trace;

/// View whose depth texture carries coverage in channel 3.
const PULL_PUSH_VIEW: &str = "PullPush";

/// Textures of one frame, keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    textures: BTreeMap<String, FeatureMap>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, map: FeatureMap) {
        self.textures.insert(name.into(), map);
    }

    pub fn get(&self, name: &str) -> Option<&FeatureMap> {
        self.textures.get(name)
    }

    /// The texture `name`, or [`DatasetError::MissingTexture`].
    pub fn texture(&self, name: &str) -> Result<&FeatureMap, DatasetError> {
        self.get(name)
            .ok_or_else(|| DatasetError::MissingTexture(name.to_string()))
    }

    /// The first two channels of `name` as a motion field.
    pub fn motion(&self, name: &str) -> Result<MotionField, DatasetError> {
        let texture = self.texture(name)?;
        let channels = texture.dim().0;
        if channels < 2 {
            return Err(DatasetError::MissingChannels {
                name: name.to_string(),
                expected: 2,
                actual: channels,
            });
        }
        Ok(MotionField::new(texture.slice(s![..2, .., ..]).to_owned())?)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.textures.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureMap)> {
        self.textures.iter().map(|(name, map)| (name.as_str(), map))
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

/// Prepare decoded records the way the reconstruction networks consume them.
///
/// Depth textures are normalized to `[0, 1]` over their foreground, their
/// background is zeroed and `<View>Foreground` / `<View>Background` masks are
/// added. The `PullPush` view takes its masks from channel 3 (coverage) and
/// keeps only channel 0 as depth; other views treat depth `< 1` as foreground.
/// Every other texture keeps at most its first three channels.
pub fn prepare_frame(records: Vec<TextureRecord>) -> Result<Frame, DatasetError> {
    let mut frame = Frame::new();

    for record in records {
        let key = record
            .name
            .split('.')
            .next()
            .unwrap_or(record.name.as_str())
            .to_string();

        let Some(view) = key.find("Depth").map(|at| key[..at].to_string()) else {
            let channels = record.map.dim().0.min(3);
            frame.insert(key, record.map.slice(s![..channels, .., ..]).to_owned());
            continue;
        };

        let (depth, foreground, background) = if view == PULL_PUSH_VIEW {
            let channels = record.map.dim().0;
            if channels < 4 {
                return Err(DatasetError::MissingChannels {
                    name: record.name,
                    expected: 4,
                    actual: channels,
                });
            }
            let coverage = record.map.slice(s![3..4, .., ..]);
            (
                record.map.slice(s![0..1, .., ..]).to_owned(),
                coverage.mapv(|a| a >= 1.0),
                coverage.mapv(|a| a <= 0.0),
            )
        } else {
            let foreground = record.map.mapv(|d| d < 1.0);
            let background = foreground.mapv(|f| !f);
            (record.map, foreground, background)
        };

        let normalized = normalize_depth(depth.view(), foreground.view(), background.view())?;
        trace!("Prepared depth texture {} for view {}", key, view);

        frame.insert(format!("{}Foreground", view), as_mask(&foreground));
        frame.insert(format!("{}Background", view), as_mask(&background));
        frame.insert(key, normalized);
    }

    Ok(frame)
}

/// Foreground normalized to `[0, 1]`, background zeroed, anything else kept.
fn normalize_depth(
    depth: ArrayView3<'_, f32>,
    foreground: ArrayView3<'_, bool>,
    background: ArrayView3<'_, bool>,
) -> Result<FeatureMap, DatasetError> {
    let mut normalized = normalize_masked(depth, foreground)?;
    Zip::from(&mut normalized)
        .and(&depth)
        .and(&foreground)
        .and(&background)
        .for_each(|out, &d, &fg, &bg| {
            if !fg && !bg {
                *out = d;
            }
        });
    Ok(normalized)
}

fn as_mask(mask: &Array3<bool>) -> FeatureMap {
    mask.mapv(|m| if m { 1.0 } else { 0.0 })
}
