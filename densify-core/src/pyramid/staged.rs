//! Fixed-depth encoder/decoder around a Pull-Push bottleneck.

use crate::batch::{map_samples, stack_samples};
use crate::field::{FeatureBatch, FeatureMap};
use crate::pyramid::engine::{PyramidEngine, PyramidError, apply_checked, check_contract};
use crate::pyramid::transform::LearnedTransform;
use crate::pyramid::{crop_bottom_right, pad_bottom_right, padding_to_multiple};
use ndarray::ArrayView3;
use tracing::debug;

/// A transform together with the channel counts it was validated against.
pub struct Stage {
    transform: Box<dyn LearnedTransform>,
    in_channels: usize,
    out_channels: usize,
}

impl Stage {
    pub fn new(transform: impl LearnedTransform + 'static) -> Self {
        Self {
            in_channels: transform.in_channels(),
            out_channels: transform.out_channels(),
            transform: Box::new(transform),
        }
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn transform(&self) -> &dyn LearnedTransform {
        &*self.transform
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("transform", &self.transform.name())
            .field("in_channels", &self.in_channels)
            .field("out_channels", &self.out_channels)
            .finish()
    }
}

/// Encoder stages halve the resolution and double the channels, decoder stages
/// undo one encoder stage each and add that stage's input back. The bottleneck
/// engine runs between them on the widest activation. Input is padded to a
/// multiple of `2^depth` up front and cropped back at the end.
#[derive(Debug)]
pub struct StagedReconstructor {
    base_channels: usize,
    head: Option<Stage>,
    encoder: Vec<Stage>,
    bottleneck: PyramidEngine,
    decoder: Vec<Stage>,
    tail: Option<Stage>,
}

#[derive(Debug)]
pub struct StagedReconstructorBuilder {
    base_channels: usize,
    head: Option<Stage>,
    encoder: Vec<Stage>,
    bottleneck: Option<PyramidEngine>,
    decoder: Vec<Stage>,
    tail: Option<Stage>,
}

impl StagedReconstructorBuilder {
    /// Projection from the input channels to `base_channels`.
    pub fn head(mut self, transform: impl LearnedTransform + 'static) -> Self {
        self.head = Some(Stage::new(transform));
        self
    }

    /// Next encoder stage, `C -> 2C` at half resolution.
    pub fn encoder(mut self, transform: impl LearnedTransform + 'static) -> Self {
        self.encoder.push(Stage::new(transform));
        self
    }

    pub fn bottleneck(mut self, engine: PyramidEngine) -> Self {
        self.bottleneck = Some(engine);
        self
    }

    /// Next decoder stage, `2C -> C` at double resolution.
    pub fn decoder(mut self, transform: impl LearnedTransform + 'static) -> Self {
        self.decoder.push(Stage::new(transform));
        self
    }

    /// Projection from `base_channels` to the output channels.
    pub fn tail(mut self, transform: impl LearnedTransform + 'static) -> Self {
        self.tail = Some(Stage::new(transform));
        self
    }

    pub fn build(self) -> Result<StagedReconstructor, PyramidError> {
        let base = self.base_channels;
        let depth = self.encoder.len();
        if self.decoder.len() != depth {
            return Err(PyramidError::StageCount {
                encoder: depth,
                decoder: self.decoder.len(),
            });
        }

        if let Some(head) = &self.head {
            check_contract("head", head.transform(), head.in_channels(), base)?;
        }
        for (index, stage) in self.encoder.iter().enumerate() {
            let channels = base << index;
            check_contract(&format!("encoder {}", index), stage.transform(), channels, 2 * channels)?;
        }
        for (index, stage) in self.decoder.iter().enumerate() {
            let channels = base << (depth - index);
            check_contract(&format!("decoder {}", index), stage.transform(), channels, channels / 2)?;
        }
        if let Some(tail) = &self.tail {
            check_contract("tail", tail.transform(), base, tail.out_channels())?;
        }

        let bottleneck = self.bottleneck.ok_or(PyramidError::MissingBottleneck)?;
        let widest = base << depth;
        if bottleneck.channels() != widest {
            return Err(PyramidError::ChannelContract {
                role: "bottleneck".to_string(),
                expected_in: widest,
                expected_out: widest,
                actual_in: bottleneck.channels(),
                actual_out: bottleneck.channels(),
            });
        }

        debug!("Built staged reconstructor: depth {}, base {} channels", depth, base);
        Ok(StagedReconstructor {
            base_channels: base,
            head: self.head,
            encoder: self.encoder,
            bottleneck,
            decoder: self.decoder,
            tail: self.tail,
        })
    }
}

impl StagedReconstructor {
    pub fn builder(base_channels: usize) -> StagedReconstructorBuilder {
        StagedReconstructorBuilder {
            base_channels,
            head: None,
            encoder: Vec::new(),
            bottleneck: None,
            decoder: Vec::new(),
            tail: None,
        }
    }

    /// Number of encoder (and decoder) stages.
    pub fn depth(&self) -> usize {
        self.encoder.len()
    }

    pub fn in_channels(&self) -> usize {
        self.head.as_ref().map_or(self.base_channels, Stage::in_channels)
    }

    pub fn out_channels(&self) -> usize {
        self.tail.as_ref().map_or(self.base_channels, Stage::out_channels)
    }

    pub fn bottleneck(&self) -> &PyramidEngine {
        &self.bottleneck
    }

    #[tracing::instrument(skip_all, fields(height = input.dim().1, width = input.dim().2))]
    pub fn process(&self, input: ArrayView3<'_, f32>) -> Result<FeatureMap, PyramidError> {
        let (channels, height, width) = input.dim();
        if channels != self.in_channels() {
            return Err(PyramidError::InputChannels {
                expected: self.in_channels(),
                actual: channels,
            });
        }
        if height == 0 || width == 0 {
            return Err(PyramidError::EmptyInput { width, height });
        }

        let mut current = match &self.head {
            Some(head) => apply_checked(
                "head",
                head.transform(),
                input,
                (self.base_channels, height, width),
            )?,
            None => input.to_owned(),
        };

        let multiple = 1 << self.depth();
        let (pad_h, pad_w) = (
            padding_to_multiple(height, multiple),
            padding_to_multiple(width, multiple),
        );
        current = pad_bottom_right(current.view(), pad_h, pad_w);

        let mut skips = Vec::with_capacity(self.depth());
        for (index, stage) in self.encoder.iter().enumerate() {
            let (_, h, w) = current.dim();
            let expected = (stage.out_channels(), h / 2, w / 2);
            let next = apply_checked(
                &format!("encoder {}", index),
                stage.transform(),
                current.view(),
                expected,
            )?;
            skips.push(current);
            current = next;
        }

        current = self.bottleneck.process(current.view())?;

        let stages = self.decoder.iter().enumerate();
        for ((index, stage), skip) in stages.zip(skips.into_iter().rev()) {
            let (_, h, w) = current.dim();
            let expected = (stage.out_channels(), 2 * h, 2 * w);
            let expanded = apply_checked(
                &format!("decoder {}", index),
                stage.transform(),
                current.view(),
                expected,
            )?;
            current = expanded + &skip;
        }

        current = crop_bottom_right(current, pad_h, pad_w);

        match &self.tail {
            Some(tail) => apply_checked(
                "tail",
                tail.transform(),
                current.view(),
                (tail.out_channels(), height, width),
            ),
            None => Ok(current),
        }
    }

    pub fn process_batch(&self, batch: &FeatureBatch) -> Result<FeatureBatch, PyramidError> {
        let outputs = map_samples(batch, |_, sample| self.process(sample))?;
        Ok(stack_samples(&outputs)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::transform::{AveragePool2, Chain, ChannelMix, NearestUpsample2};
    use ndarray::{Array3, Array4};

    fn down_stage(channels: usize) -> Chain {
        Chain::new(vec![
            Box::new(AveragePool2::new(channels)),
            Box::new(ChannelMix::duplicate(channels)),
        ])
        .unwrap()
    }

    fn up_stage(channels: usize) -> Chain {
        Chain::new(vec![
            Box::new(NearestUpsample2::new(channels)),
            Box::new(ChannelMix::from_fn(channels, channels / 2, |(o, i)| {
                if i == o { 1.0 } else { 0.0 }
            })),
        ])
        .unwrap()
    }

    fn reconstructor(base: usize, depth: usize) -> StagedReconstructor {
        let mut builder = StagedReconstructor::builder(base)
            .head(ChannelMix::from_fn(3, base, |_| 1.0 / 3.0))
            .tail(ChannelMix::from_fn(base, 1, |_| 1.0 / base as f32));
        for index in 0..depth {
            builder = builder.encoder(down_stage(base << index));
        }
        builder = builder.bottleneck(PyramidEngine::averaging(base << depth));
        for index in 0..depth {
            builder = builder.decoder(up_stage(base << (depth - index)));
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_shape_restored_for_odd_sizes() {
        let model = reconstructor(2, 2);
        assert_eq!(model.depth(), 2);
        assert_eq!((model.in_channels(), model.out_channels()), (3, 1));

        for (h, w) in [(1, 1), (5, 7), (9, 4), (16, 16), (33, 18)] {
            let input = Array3::from_shape_fn((3, h, w), |(c, y, x)| ((c + y + x) % 4) as f32);
            let output = model.process(input.view()).unwrap();
            assert_eq!(output.dim(), (1, h, w), "{}x{}", w, h);
            assert!(output.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_stage_count_mismatch() {
        let result = StagedReconstructor::builder(1)
            .encoder(down_stage(1))
            .bottleneck(PyramidEngine::averaging(2))
            .build();
        assert!(matches!(
            result,
            Err(PyramidError::StageCount {
                encoder: 1,
                decoder: 0
            })
        ));
    }

    #[test]
    fn test_encoder_must_double_channels() {
        let result = StagedReconstructor::builder(2)
            .encoder(AveragePool2::new(2))
            .bottleneck(PyramidEngine::averaging(4))
            .decoder(up_stage(4))
            .build();
        assert!(matches!(
            result,
            Err(PyramidError::ChannelContract { ref role, .. }) if role == "encoder 0"
        ));
    }

    #[test]
    fn test_bottleneck_width() {
        let result = StagedReconstructor::builder(1)
            .encoder(down_stage(1))
            .bottleneck(PyramidEngine::averaging(1))
            .decoder(up_stage(2))
            .build();
        assert!(matches!(
            result,
            Err(PyramidError::ChannelContract { ref role, .. }) if role == "bottleneck"
        ));
        assert!(matches!(
            StagedReconstructor::builder(1).build(),
            Err(PyramidError::MissingBottleneck)
        ));
    }

    #[test]
    fn test_depth_zero_is_bare_engine() {
        let model = StagedReconstructor::builder(2)
            .bottleneck(PyramidEngine::averaging(2))
            .build()
            .unwrap();
        let input = Array3::from_shape_fn((2, 6, 5), |(c, y, x)| (c * 30 + y * 5 + x) as f32);
        let staged = model.process(input.view()).unwrap();
        let bare = PyramidEngine::averaging(2).process(input.view()).unwrap();
        assert_eq!(staged, bare);
    }

    #[test]
    fn test_batch() {
        let model = reconstructor(1, 1);
        let batch = Array4::from_elem((2, 3, 7, 5), 0.5);
        let output = model.process_batch(&batch).unwrap();
        assert_eq!(output.dim(), (2, 1, 7, 5));
        assert_eq!(
            output.index_axis(ndarray::Axis(0), 0),
            output.index_axis(ndarray::Axis(0), 1)
        );
    }
}
