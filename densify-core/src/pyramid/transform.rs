//! The learned-transform boundary and a few fixed reference transforms.
//!
//! Parameters of a real transform are trained elsewhere; the pyramid only relies
//! on the channel contract and on `forward`. The reference transforms below are
//! parameter-free (or explicitly parameterized) stand-ins used by tests, the
//! benchmark and the CLI.

use crate::field::FeatureMap;
use ndarray::{Array1, Array2, Array3, ArrayView3, Axis};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("Expected {expected} input channels, got {actual}")]
    InputChannels { expected: usize, actual: usize },
    #[error("Invalid transform parameters: {0}")]
    Parameters(String),
    #[error("Transform failed: {0}")]
    Failed(String),
}

/// A map from `in_channels` to `out_channels` feature maps.
pub trait LearnedTransform: Send + Sync {
    fn in_channels(&self) -> usize;

    fn out_channels(&self) -> usize;

    fn forward(&self, input: ArrayView3<'_, f32>) -> Result<FeatureMap, TransformError>;

    /// Label used in logs and debug output.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<T: LearnedTransform + ?Sized> LearnedTransform for Box<T> {
    fn in_channels(&self) -> usize {
        (**self).in_channels()
    }

    fn out_channels(&self) -> usize {
        (**self).out_channels()
    }

    fn forward(&self, input: ArrayView3<'_, f32>) -> Result<FeatureMap, TransformError> {
        (**self).forward(input)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: LearnedTransform + ?Sized> LearnedTransform for Arc<T> {
    fn in_channels(&self) -> usize {
        (**self).in_channels()
    }

    fn out_channels(&self) -> usize {
        (**self).out_channels()
    }

    fn forward(&self, input: ArrayView3<'_, f32>) -> Result<FeatureMap, TransformError> {
        (**self).forward(input)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

fn ensure_input(expected: usize, input: &ArrayView3<'_, f32>) -> Result<(), TransformError> {
    let actual = input.dim().0;
    if actual != expected {
        return Err(TransformError::InputChannels { expected, actual });
    }
    Ok(())
}

/// Stride-2 reduction averaging each 2x2 block.
///
/// Blocks cut by an odd edge average the cells they have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AveragePool2 {
    channels: usize,
}

impl AveragePool2 {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl LearnedTransform for AveragePool2 {
    fn in_channels(&self) -> usize {
        self.channels
    }

    fn out_channels(&self) -> usize {
        self.channels
    }

    fn forward(&self, input: ArrayView3<'_, f32>) -> Result<FeatureMap, TransformError> {
        ensure_input(self.channels, &input)?;
        let (channels, height, width) = input.dim();
        let output = Array3::from_shape_fn(
            (channels, height.div_ceil(2), width.div_ceil(2)),
            |(c, y, x)| {
                let mut sum = 0.0;
                let mut count = 0;
                for sy in 2 * y..(2 * y + 2).min(height) {
                    for sx in 2 * x..(2 * x + 2).min(width) {
                        sum += input[[c, sy, sx]];
                        count += 1;
                    }
                }
                sum / count as f32
            },
        );
        Ok(output)
    }

    fn name(&self) -> &str {
        "average_pool_2"
    }
}

/// Stride-2 expansion repeating every cell into a 2x2 block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NearestUpsample2 {
    channels: usize,
}

impl NearestUpsample2 {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl LearnedTransform for NearestUpsample2 {
    fn in_channels(&self) -> usize {
        self.channels
    }

    fn out_channels(&self) -> usize {
        self.channels
    }

    fn forward(&self, input: ArrayView3<'_, f32>) -> Result<FeatureMap, TransformError> {
        ensure_input(self.channels, &input)?;
        let (channels, height, width) = input.dim();
        Ok(Array3::from_shape_fn(
            (channels, 2 * height, 2 * width),
            |(c, y, x)| input[[c, y / 2, x / 2]],
        ))
    }

    fn name(&self) -> &str {
        "nearest_upsample_2"
    }
}

/// Per-pixel linear projection: `out[o] = bias[o] + sum_i weights[o, i] * in[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMix {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl ChannelMix {
    /// `weights` is `(out_channels, in_channels)`.
    pub fn new(weights: Array2<f32>, bias: Array1<f32>) -> Result<Self, TransformError> {
        if weights.nrows() != bias.len() {
            return Err(TransformError::Parameters(format!(
                "{} output rows but {} biases",
                weights.nrows(),
                bias.len()
            )));
        }
        Ok(Self { weights, bias })
    }

    /// Unbiased projection with `weights[o, i] = f(o, i)`.
    pub fn from_fn(
        in_channels: usize,
        out_channels: usize,
        f: impl FnMut((usize, usize)) -> f32,
    ) -> Self {
        Self {
            weights: Array2::from_shape_fn((out_channels, in_channels), f),
            bias: Array1::zeros(out_channels),
        }
    }

    pub fn identity(channels: usize) -> Self {
        Self::from_fn(channels, channels, |(o, i)| if o == i { 1.0 } else { 0.0 })
    }

    /// `2C -> C`: the mean of channel `c` and channel `C + c`.
    pub fn mean_of_halves(channels: usize) -> Self {
        Self::from_fn(2 * channels, channels, |(o, i)| {
            if i == o || i == o + channels { 0.5 } else { 0.0 }
        })
    }

    /// `C -> 2C`: every channel written twice.
    pub fn duplicate(channels: usize) -> Self {
        Self::from_fn(channels, 2 * channels, |(o, i)| {
            if o % channels == i { 1.0 } else { 0.0 }
        })
    }

    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    pub fn bias(&self) -> &Array1<f32> {
        &self.bias
    }
}

impl LearnedTransform for ChannelMix {
    fn in_channels(&self) -> usize {
        self.weights.ncols()
    }

    fn out_channels(&self) -> usize {
        self.weights.nrows()
    }

    fn forward(&self, input: ArrayView3<'_, f32>) -> Result<FeatureMap, TransformError> {
        ensure_input(self.in_channels(), &input)?;
        let (_, height, width) = input.dim();
        let mut output = Array3::zeros((self.out_channels(), height, width));

        for (o, mut plane) in output.axis_iter_mut(Axis(0)).enumerate() {
            plane.fill(self.bias[o]);
            for (i, source) in input.axis_iter(Axis(0)).enumerate() {
                let weight = self.weights[[o, i]];
                if weight != 0.0 {
                    plane.scaled_add(weight, &source);
                }
            }
        }
        Ok(output)
    }

    fn name(&self) -> &str {
        "channel_mix"
    }
}

/// Transforms applied in sequence.
pub struct Chain {
    stages: Vec<Box<dyn LearnedTransform>>,
}

impl Chain {
    pub fn new(stages: Vec<Box<dyn LearnedTransform>>) -> Result<Self, TransformError> {
        if stages.is_empty() {
            return Err(TransformError::Parameters("empty chain".to_string()));
        }
        for pair in stages.windows(2) {
            if pair[0].out_channels() != pair[1].in_channels() {
                return Err(TransformError::Parameters(format!(
                    "{} outputs {} channels but {} takes {}",
                    pair[0].name(),
                    pair[0].out_channels(),
                    pair[1].name(),
                    pair[1].in_channels()
                )));
            }
        }
        Ok(Self { stages })
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|s| s.name()))
            .finish()
    }
}

impl LearnedTransform for Chain {
    fn in_channels(&self) -> usize {
        self.stages.first().map_or(0, |s| s.in_channels())
    }

    fn out_channels(&self) -> usize {
        self.stages.last().map_or(0, |s| s.out_channels())
    }

    fn forward(&self, input: ArrayView3<'_, f32>) -> Result<FeatureMap, TransformError> {
        let mut current: Option<FeatureMap> = None;
        for stage in &self.stages {
            let next = match &current {
                Some(map) => stage.forward(map.view())?,
                None => stage.forward(input)?,
            };
            current = Some(next);
        }
        current.ok_or_else(|| TransformError::Failed("empty chain".to_string()))
    }

    fn name(&self) -> &str {
        "chain"
    }
}

/// Closure adapter.
pub struct FnTransform<F> {
    in_channels: usize,
    out_channels: usize,
    f: F,
}

impl<F> FnTransform<F>
where
    F: Fn(ArrayView3<'_, f32>) -> Result<FeatureMap, TransformError> + Send + Sync,
{
    pub fn new(in_channels: usize, out_channels: usize, f: F) -> Self {
        Self {
            in_channels,
            out_channels,
            f,
        }
    }
}

impl<F> LearnedTransform for FnTransform<F>
where
    F: Fn(ArrayView3<'_, f32>) -> Result<FeatureMap, TransformError> + Send + Sync,
{
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn forward(&self, input: ArrayView3<'_, f32>) -> Result<FeatureMap, TransformError> {
        ensure_input(self.in_channels, &input)?;
        (self.f)(input)
    }

    fn name(&self) -> &str {
        "fn"
    }
}
