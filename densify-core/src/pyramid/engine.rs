use crate::batch::{map_samples, stack_samples};
use crate::field::{FeatureBatch, FeatureMap, FieldError};
use crate::pyramid::state::{PyramidLevel, PyramidState};
use crate::pyramid::transform::{
    AveragePool2, ChannelMix, LearnedTransform, NearestUpsample2, TransformError,
};
use crate::pyramid::{crop_bottom_right, join_channels, pad_bottom_right, padding_to_multiple};
use ndarray::ArrayView3;
use tracing::trace;

#[derive(Debug, thiserror::Error)]
pub enum PyramidError {
    #[error("Input has no pixels ({width}x{height})")]
    EmptyInput { width: usize, height: usize },
    #[error("Input has {actual} channels, expected {expected}")]
    InputChannels { expected: usize, actual: usize },
    #[error(
        "{role} maps {actual_in}->{actual_out} channels, expected {expected_in}->{expected_out}"
    )]
    ChannelContract {
        role: String,
        expected_in: usize,
        expected_out: usize,
        actual_in: usize,
        actual_out: usize,
    },
    #[error("{role} produced {actual:?}, expected {expected:?}")]
    OutputShape {
        role: String,
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },
    #[error("Encoder has {encoder} stages but decoder has {decoder}")]
    StageCount { encoder: usize, decoder: usize },
    #[error("Staged reconstructor needs a bottleneck engine")]
    MissingBottleneck,
    #[error("{role} failed: {source}")]
    Transform {
        role: String,
        #[source]
        source: TransformError,
    },
    #[error(transparent)]
    Field(#[from] FieldError),
}

/// Number of pull (and push) steps for a `height` x `width` map:
/// `ceil(log2(max(height, width)))`, 0 for a single pixel.
pub fn level_count(height: usize, width: usize) -> usize {
    let size = height.max(width);
    if size <= 1 {
        return 0;
    }
    (usize::BITS - (size - 1).leading_zeros()) as usize
}

/// Run `transform` and check it produced exactly `expected`.
pub(crate) fn apply_checked(
    role: &str,
    transform: &dyn LearnedTransform,
    input: ArrayView3<'_, f32>,
    expected: (usize, usize, usize),
) -> Result<FeatureMap, PyramidError> {
    let output = transform
        .forward(input)
        .map_err(|source| PyramidError::Transform {
            role: role.to_string(),
            source,
        })?;
    if output.dim() != expected {
        return Err(PyramidError::OutputShape {
            role: role.to_string(),
            expected,
            actual: output.dim(),
        });
    }
    Ok(output)
}

pub(crate) fn check_contract(
    role: &str,
    transform: &dyn LearnedTransform,
    expected_in: usize,
    expected_out: usize,
) -> Result<(), PyramidError> {
    let (actual_in, actual_out) = (transform.in_channels(), transform.out_channels());
    if actual_in != expected_in || actual_out != expected_out {
        return Err(PyramidError::ChannelContract {
            role: role.to_string(),
            expected_in,
            expected_out,
            actual_in,
            actual_out,
        });
    }
    Ok(())
}

/// What a single [`PyramidEngine::process_traced`] run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PyramidTrace {
    pub levels: usize,
    pub pull_steps: usize,
    pub push_steps: usize,
    /// `(pad_h, pad_w)` of every pull step, finest first.
    pub paddings: Vec<(usize, usize)>,
    /// `(height, width)` entering every pull step, finest first.
    pub sizes: Vec<(usize, usize)>,
    /// Levels left in the state once the push phase finished.
    pub state_len_after_push: usize,
}

/// The Pull-Push layer.
///
/// The pull phase pads the activation to even size, reduces it with `down` and
/// remembers the unpadded activation; this repeats [`level_count`] times. The
/// push phase expands with `up`, crops the padding of the matching pull step,
/// fuses `[up, residual]` back to `C` channels with `fuse` and adds the
/// residual. Output shape always equals input shape.
pub struct PyramidEngine {
    channels: usize,
    down: Box<dyn LearnedTransform>,
    up: Box<dyn LearnedTransform>,
    fuse: Box<dyn LearnedTransform>,
}

impl std::fmt::Debug for PyramidEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PyramidEngine")
            .field("channels", &self.channels)
            .field("down", &self.down.name())
            .field("up", &self.up.name())
            .field("fuse", &self.fuse.name())
            .finish()
    }
}

impl PyramidEngine {
    /// `down` and `up` must map `C -> C`, `fuse` must map `2C -> C`.
    pub fn new(
        down: impl LearnedTransform + 'static,
        up: impl LearnedTransform + 'static,
        fuse: impl LearnedTransform + 'static,
    ) -> Result<Self, PyramidError> {
        let channels = down.in_channels();
        check_contract("down", &down, channels, channels)?;
        check_contract("up", &up, channels, channels)?;
        check_contract("fuse", &fuse, 2 * channels, channels)?;

        Ok(Self {
            channels,
            down: Box::new(down),
            up: Box::new(up),
            fuse: Box::new(fuse),
        })
    }

    /// Average-pool down, nearest-neighbor up, mean fuse.
    pub fn averaging(channels: usize) -> Self {
        Self {
            channels,
            down: Box::new(AveragePool2::new(channels)),
            up: Box::new(NearestUpsample2::new(channels)),
            fuse: Box::new(ChannelMix::mean_of_halves(channels)),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn process(&self, input: ArrayView3<'_, f32>) -> Result<FeatureMap, PyramidError> {
        self.process_traced(input).map(|(output, _)| output)
    }

    #[tracing::instrument(skip_all, fields(channels = input.dim().0, height = input.dim().1, width = input.dim().2))]
    pub fn process_traced(
        &self,
        input: ArrayView3<'_, f32>,
    ) -> Result<(FeatureMap, PyramidTrace), PyramidError> {
        let (channels, height, width) = input.dim();
        if channels != self.channels {
            return Err(PyramidError::InputChannels {
                expected: self.channels,
                actual: channels,
            });
        }
        if height == 0 || width == 0 {
            return Err(PyramidError::EmptyInput { width, height });
        }

        let levels = level_count(height, width);
        let mut state = PyramidState::with_capacity(levels);
        let mut trace = PyramidTrace {
            levels,
            ..PyramidTrace::default()
        };
        let mut current = input.to_owned();

        for level in 0..levels {
            let (_, h, w) = current.dim();
            let (pad_h, pad_w) = (padding_to_multiple(h, 2), padding_to_multiple(w, 2));
            let padded = pad_bottom_right(current.view(), pad_h, pad_w);
            let expected = (self.channels, (h + pad_h) / 2, (w + pad_w) / 2);
            let reduced = apply_checked("down", &*self.down, padded.view(), expected)?;

            trace!(
                "Pull level {}: {}x{} (+{}x{}) -> {}x{}",
                level, w, h, pad_w, pad_h, expected.2, expected.1
            );
            trace.paddings.push((pad_h, pad_w));
            trace.sizes.push((h, w));
            trace.pull_steps += 1;

            state.push(PyramidLevel {
                pad_h,
                pad_w,
                residual: current,
            });
            current = reduced;
        }

        for level in (0..levels).rev() {
            let PyramidLevel {
                pad_h,
                pad_w,
                residual,
            } = state.pop();
            let (_, h, w) = current.dim();
            let expanded = apply_checked(
                "up",
                &*self.up,
                current.view(),
                (self.channels, 2 * h, 2 * w),
            )?;
            let expanded = crop_bottom_right(expanded, pad_h, pad_w);

            let joined = join_channels(expanded.view(), residual.view());
            let fused = apply_checked("fuse", &*self.fuse, joined.view(), residual.dim())?;
            current = fused + &residual;

            trace!("Push level {}: {}x{} -> {}x{}", level, w, h, residual.dim().2, residual.dim().1);
            trace.push_steps += 1;
        }

        trace.state_len_after_push = state.len();
        assert!(
            state.is_empty(),
            "pyramid state holds {} levels after the push phase",
            state.len()
        );
        Ok((current, trace))
    }

    /// Process every sample of a `(N, C, H, W)` batch independently.
    pub fn process_batch(&self, batch: &FeatureBatch) -> Result<FeatureBatch, PyramidError> {
        let outputs = map_samples(batch, |_, sample| self.process(sample))?;
        Ok(stack_samples(&outputs)?)
    }
}
