//! Directory-backed frame sequences.

use crate::container::{ContainerError, TextureRecord, read_container};
use crate::frame::{Frame, prepare_frame};
use densify_core::{FieldError, TemporalWindow};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File extension of frame containers.
pub const FRAME_EXTENSION: &str = "textures";

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),
    #[error("Field error: {0}")]
    Field(#[from] FieldError),
    #[error("Missing texture {0}")]
    MissingTexture(String),
    #[error("Texture {name} has {actual} channels, need at least {expected}")]
    MissingChannels {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("Frame {index} out of range ({count} frames)")]
    FrameOutOfRange { index: usize, count: usize },
    #[error("Window {index} out of range ({count} windows)")]
    WindowOutOfRange { index: usize, count: usize },
}

/// Previous, current and next frame of a sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameWindow {
    pub previous: Frame,
    pub current: Frame,
    pub next: Frame,
}

impl FrameWindow {
    /// Motion fields relating the current frame to its neighbors.
    ///
    /// Every frame stores `forward_flow` (motion from its previous frame) and
    /// `backward_flow` (motion from its next frame), both sampled on its own
    /// pixel grid.
    pub fn temporal_window(
        &self,
        forward_flow: &str,
        backward_flow: &str,
    ) -> Result<TemporalWindow, DatasetError> {
        Ok(TemporalWindow {
            prev_to_current: self.current.motion(forward_flow)?,
            current_to_prev: self.previous.motion(backward_flow)?,
            next_to_current: self.current.motion(backward_flow)?,
            current_to_next: self.next.motion(forward_flow)?,
        })
    }
}

/// Sorted `.textures` files of one directory, one per frame.
#[derive(Debug, Clone)]
pub struct FrameDataset {
    directory: PathBuf,
    frames: Vec<PathBuf>,
}

impl FrameDataset {
    #[tracing::instrument(skip_all, fields(directory = %directory.as_ref().display()))]
    pub fn open(directory: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let directory = directory.as_ref().to_path_buf();
        let mut frames = Vec::new();

        for entry in fs::read_dir(&directory)? {
            let path = entry?.path();
            let is_frame = path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(FRAME_EXTENSION));
            if is_frame {
                frames.push(path);
            }
        }
        frames.sort();

        let dataset = Self { directory, frames };
        info!(
            "Opened dataset {}: {} frames, {} sequences",
            dataset.directory.display(),
            dataset.frame_count(),
            dataset.sequence_count()
        );
        Ok(dataset)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Number of full previous/current/next windows.
    pub fn sequence_count(&self) -> usize {
        self.frames.len().saturating_sub(2)
    }

    pub fn frame_path(&self, index: usize) -> Result<&Path, DatasetError> {
        self.frames
            .get(index)
            .map(PathBuf::as_path)
            .ok_or(DatasetError::FrameOutOfRange {
                index,
                count: self.frames.len(),
            })
    }

    /// Records of frame `index`, as stored.
    pub fn raw_frame(&self, index: usize) -> Result<Vec<TextureRecord>, DatasetError> {
        Ok(read_container(self.frame_path(index)?)?)
    }

    /// Prepared textures of frame `index`.
    pub fn frame(&self, index: usize) -> Result<Frame, DatasetError> {
        let frame = prepare_frame(self.raw_frame(index)?)?;
        debug!("Loaded frame {} with {} textures", index, frame.len());
        Ok(frame)
    }

    /// Window `index` covers frames `index`, `index + 1` and `index + 2`.
    pub fn window(&self, index: usize) -> Result<FrameWindow, DatasetError> {
        if index >= self.sequence_count() {
            return Err(DatasetError::WindowOutOfRange {
                index,
                count: self.sequence_count(),
            });
        }
        Ok(FrameWindow {
            previous: self.frame(index)?,
            current: self.frame(index + 1)?,
            next: self.frame(index + 2)?,
        })
    }
}
