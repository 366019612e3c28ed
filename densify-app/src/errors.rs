//! Error types for the command line tool.

use densify_core::{FieldError, PyramidError};
use densify_data::{ContainerError, DatasetError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Field error: {0}")]
    Field(#[from] FieldError),

    #[error("Pyramid error: {0}")]
    Pyramid(#[from] PyramidError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
