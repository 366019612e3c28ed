//! Densify Data Crate
//!
//! Reading and writing the `.textures` frame container, preparing decoded
//! textures for the reconstruction core, and walking frame sequences on disk.
//! Nothing here touches the numerical core beyond its map types.

pub mod container;
pub mod dataset;
pub mod frame;
pub mod image_export;

pub use container::{
    ContainerError, ElementFormat, TextureRecord, decode_records, decode_texture, encode_records,
    encode_texture, read_container, write_container,
};
pub use dataset::{DatasetError, FrameDataset, FrameWindow};
pub use frame::{Frame, prepare_frame};
pub use image_export::{save_png, to_rgb_image};
