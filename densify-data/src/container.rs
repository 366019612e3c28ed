//! The `.textures` binary container.
//!
//! A container is a sequence of records, each:
//!
//! ```text
//! u32  name length in bytes
//! [u8] name, UTF-16LE
//! i32  width
//! i32  height
//! i32  channels
//! i32  element size (2 = half, 4 = single precision)
//! [u8] width * height * channels elements, row-major, channels interleaved
//! ```
//!
//! All integers are little-endian. The single-texture variant is one header
//! without a name, followed by pixel data up to the end of the buffer.

use bytemuck::{Pod, Zeroable};
use densify_core::FeatureMap;
use half::f16;
use ndarray::{Array3, ArrayView3};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const HEADER_SIZE: usize = std::mem::size_of::<RecordHeader>();
const BYTE_ORDER_MARK: u16 = 0xFEFF;

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("Truncated container: need {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("Unsupported element size {0}")]
    UnsupportedElementSize(i32),
    #[error("Negative texture dimensions {width}x{height}x{channels}")]
    NegativeDimension {
        width: i32,
        height: i32,
        channels: i32,
    },
    #[error("Texture size overflows: {width}x{height}x{channels}")]
    SizeOverflow {
        width: usize,
        height: usize,
        channels: usize,
    },
    #[error("Invalid UTF-16 texture name at offset {offset}")]
    InvalidName { offset: usize },
    #[error("Texture payload is {actual} bytes, header describes {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage precision of texture elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementFormat {
    Half,
    Single,
}

impl ElementFormat {
    pub fn from_size(size: i32) -> Result<Self, ContainerError> {
        match size {
            2 => Ok(Self::Half),
            4 => Ok(Self::Single),
            other => Err(ContainerError::UnsupportedElementSize(other)),
        }
    }

    /// Bytes per element.
    pub fn size(self) -> usize {
        match self {
            Self::Half => 2,
            Self::Single => 4,
        }
    }
}

/// A named texture, stored planar as `(channels, height, width)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureRecord {
    pub name: String,
    pub format: ElementFormat,
    pub map: FeatureMap,
}

impl TextureRecord {
    pub fn new(name: impl Into<String>, format: ElementFormat, map: FeatureMap) -> Self {
        Self {
            name: name.into(),
            format,
            map,
        }
    }

    pub fn width(&self) -> usize {
        self.map.dim().2
    }

    pub fn height(&self) -> usize {
        self.map.dim().1
    }

    pub fn channels(&self) -> usize {
        self.map.dim().0
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RecordHeader {
    width: i32,
    height: i32,
    channels: i32,
    element_size: i32,
}

impl RecordHeader {
    fn from_le_bytes(bytes: &[u8]) -> Self {
        let raw: RecordHeader = bytemuck::pod_read_unaligned(bytes);
        Self {
            width: i32::from_le(raw.width),
            height: i32::from_le(raw.height),
            channels: i32::from_le(raw.channels),
            element_size: i32::from_le(raw.element_size),
        }
    }

    fn to_le(self) -> Self {
        Self {
            width: self.width.to_le(),
            height: self.height.to_le(),
            channels: self.channels.to_le(),
            element_size: self.element_size.to_le(),
        }
    }

    /// Validated `(width, height, channels, format, payload bytes)`.
    fn layout(&self) -> Result<(usize, usize, usize, ElementFormat, usize), ContainerError> {
        if self.width < 0 || self.height < 0 || self.channels < 0 {
            return Err(ContainerError::NegativeDimension {
                width: self.width,
                height: self.height,
                channels: self.channels,
            });
        }
        let format = ElementFormat::from_size(self.element_size)?;
        let (width, height, channels) =
            (self.width as usize, self.height as usize, self.channels as usize);
        let bytes = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(channels))
            .and_then(|n| n.checked_mul(format.size()))
            .ok_or(ContainerError::SizeOverflow {
                width,
                height,
                channels,
            })?;
        Ok((width, height, channels, format, bytes))
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], ContainerError> {
        if needed > self.remaining() {
            return Err(ContainerError::Truncated {
                offset: self.offset,
                needed,
                available: self.remaining(),
            });
        }
        let slice = &self.bytes[self.offset..self.offset + needed];
        self.offset += needed;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32, ContainerError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_name(&mut self) -> Result<String, ContainerError> {
        let offset = self.offset;
        let length = self.read_u32()? as usize;
        let bytes = self.take(length)?;
        if length % 2 != 0 {
            return Err(ContainerError::InvalidName { offset });
        }

        let mut units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        if units.first() == Some(&BYTE_ORDER_MARK) {
            units.remove(0);
        }
        String::from_utf16(&units).map_err(|_| ContainerError::InvalidName { offset })
    }

    fn read_texture(&mut self) -> Result<(ElementFormat, FeatureMap), ContainerError> {
        let header = RecordHeader::from_le_bytes(self.take(HEADER_SIZE)?);
        let (width, height, channels, format, bytes) = header.layout()?;
        let payload = self.take(bytes)?;
        Ok((format, decode_pixels(payload, format, width, height, channels)))
    }
}

/// Interleaved `(height, width, channels)` elements to a planar map.
fn decode_pixels(
    payload: &[u8],
    format: ElementFormat,
    width: usize,
    height: usize,
    channels: usize,
) -> FeatureMap {
    let values: Vec<f32> = match format {
        ElementFormat::Half => payload
            .chunks_exact(2)
            .map(|b| f16::from_le_bytes([b[0], b[1]]).to_f32())
            .collect(),
        ElementFormat::Single => payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    };
    Array3::from_shape_fn((channels, height, width), |(c, y, x)| {
        values[(y * width + x) * channels + c]
    })
}

fn encode_pixels(map: &ArrayView3<'_, f32>, format: ElementFormat, out: &mut Vec<u8>) {
    let (channels, height, width) = map.dim();
    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let v = map[[c, y, x]];
                match format {
                    ElementFormat::Half => out.extend_from_slice(&f16::from_f32(v).to_le_bytes()),
                    ElementFormat::Single => out.extend_from_slice(&v.to_le_bytes()),
                }
            }
        }
    }
}

fn encode_header(
    map: &ArrayView3<'_, f32>,
    format: ElementFormat,
    out: &mut Vec<u8>,
) -> Result<(), ContainerError> {
    let (channels, height, width) = map.dim();
    let overflow = ContainerError::SizeOverflow {
        width,
        height,
        channels,
    };
    let (Ok(w), Ok(h), Ok(c)) = (
        i32::try_from(width),
        i32::try_from(height),
        i32::try_from(channels),
    ) else {
        return Err(overflow);
    };
    let header = RecordHeader {
        width: w,
        height: h,
        channels: c,
        element_size: format.size() as i32,
    }
    .to_le();
    out.extend_from_slice(bytemuck::bytes_of(&header));
    Ok(())
}

/// Decode every record of a container.
///
/// Fails as a whole on the first malformed record.
#[tracing::instrument(skip_all, fields(bytes = bytes.len()))]
pub fn decode_records(bytes: &[u8]) -> Result<Vec<TextureRecord>, ContainerError> {
    let mut reader = Reader::new(bytes);
    let mut records = Vec::new();

    while reader.remaining() > 0 {
        let name = reader.read_name()?;
        let (format, map) = reader.read_texture()?;
        debug!("Decoded texture {} {:?} ({:?})", name, map.dim(), format);
        records.push(TextureRecord { name, format, map });
    }

    Ok(records)
}

pub fn encode_records(records: &[TextureRecord]) -> Result<Vec<u8>, ContainerError> {
    let mut out = Vec::new();
    for record in records {
        let units: Vec<u16> = record.name.encode_utf16().collect();
        let length = u32::try_from(units.len() * 2).map_err(|_| ContainerError::SizeOverflow {
            width: record.width(),
            height: record.height(),
            channels: record.channels(),
        })?;
        out.extend_from_slice(&length.to_le_bytes());
        for unit in units {
            out.extend_from_slice(&unit.to_le_bytes());
        }

        let view = record.map.view();
        encode_header(&view, record.format, &mut out)?;
        encode_pixels(&view, record.format, &mut out);
    }
    Ok(out)
}

/// Decode the single-texture variant.
pub fn decode_texture(bytes: &[u8]) -> Result<(ElementFormat, FeatureMap), ContainerError> {
    let mut reader = Reader::new(bytes);
    let header = RecordHeader::from_le_bytes(reader.take(HEADER_SIZE)?);
    let (width, height, channels, format, expected) = header.layout()?;
    if reader.remaining() != expected {
        return Err(ContainerError::LengthMismatch {
            expected,
            actual: reader.remaining(),
        });
    }
    let payload = reader.take(expected)?;
    Ok((format, decode_pixels(payload, format, width, height, channels)))
}

pub fn encode_texture(
    map: ArrayView3<'_, f32>,
    format: ElementFormat,
) -> Result<Vec<u8>, ContainerError> {
    let mut out = Vec::with_capacity(HEADER_SIZE + map.len() * format.size());
    encode_header(&map, format, &mut out)?;
    encode_pixels(&map, format, &mut out);
    Ok(out)
}

#[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn read_container(path: impl AsRef<Path>) -> Result<Vec<TextureRecord>, ContainerError> {
    let bytes = fs::read(path.as_ref())?;
    let records = decode_records(&bytes)?;
    info!("Read {} textures", records.len());
    Ok(records)
}

pub fn write_container(
    path: impl AsRef<Path>,
    records: &[TextureRecord],
) -> Result<(), ContainerError> {
    let bytes = encode_records(records)?;
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-assembled record: "Ab", 2x1 pixels, 2 channels, single precision.
    fn single_record_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[b'A', 0, b'b', 0]);
        for v in [2i32, 1, 2, 4] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        // Pixel (0, 0) = (1, 2), pixel (1, 0) = (3, 4).
        for v in [1.0f32, 2.0, 3.0, 4.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_decode_known_bytes() {
        let records = decode_records(&single_record_bytes()).unwrap();
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.name, "Ab");
        assert_eq!(record.format, ElementFormat::Single);
        assert_eq!(record.map.dim(), (2, 1, 2));
        assert_eq!(record.map[[0, 0, 0]], 1.0);
        assert_eq!(record.map[[1, 0, 0]], 2.0);
        assert_eq!(record.map[[0, 0, 1]], 3.0);
        assert_eq!(record.map[[1, 0, 1]], 4.0);
    }

    #[test]
    fn test_encode_matches_known_bytes() {
        let mut map = FeatureMap::zeros((2, 1, 2));
        map[[0, 0, 0]] = 1.0;
        map[[1, 0, 0]] = 2.0;
        map[[0, 0, 1]] = 3.0;
        map[[1, 0, 1]] = 4.0;
        let record = TextureRecord::new("Ab", ElementFormat::Single, map);
        assert_eq!(encode_records(&[record]).unwrap(), single_record_bytes());
    }

    #[test]
    fn test_several_records_with_half_precision() {
        let depth = FeatureMap::from_shape_fn((1, 3, 4), |(_, y, x)| (y * 4 + x) as f32 * 0.25);
        let color = FeatureMap::from_shape_fn((4, 2, 2), |(c, y, x)| (c + y + x) as f32 * 0.5);
        let records = vec![
            TextureRecord::new("PointsSparseDepth", ElementFormat::Half, depth),
            TextureRecord::new("PointsSparseColor", ElementFormat::Single, color),
        ];

        let decoded = decode_records(&encode_records(&records).unwrap()).unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_byte_order_mark_is_stripped() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&6u32.to_le_bytes());
        bytes.extend_from_slice(&[0xFF, 0xFE, b'X', 0, b'y', 0]);
        for v in [1i32, 1, 1, 2] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&f16::from_f32(0.5).to_le_bytes());

        let records = decode_records(&bytes).unwrap();
        assert_eq!(records[0].name, "Xy");
        assert_eq!(records[0].map[[0, 0, 0]], 0.5);
    }

    #[test]
    fn test_truncated_payload_fails_whole_decode() {
        let mut bytes = single_record_bytes();
        bytes.extend_from_slice(&single_record_bytes());
        bytes.pop();
        assert!(matches!(
            decode_records(&bytes),
            Err(ContainerError::Truncated { needed: 16, available: 15, .. })
        ));
    }

    #[test]
    fn test_rejects_bad_headers() {
        let mut bytes = single_record_bytes();
        bytes[20..24].copy_from_slice(&8i32.to_le_bytes());
        assert!(matches!(
            decode_records(&bytes),
            Err(ContainerError::UnsupportedElementSize(8))
        ));

        let mut bytes = single_record_bytes();
        bytes[8..12].copy_from_slice(&(-2i32).to_le_bytes());
        assert!(matches!(
            decode_records(&bytes),
            Err(ContainerError::NegativeDimension { width: -2, .. })
        ));

        let mut bytes = single_record_bytes();
        bytes[0..4].copy_from_slice(&3u32.to_le_bytes());
        assert!(decode_records(&bytes).is_err());
    }

    #[test]
    fn test_empty_buffer_has_no_records() {
        assert!(decode_records(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_single_texture_variant() {
        let map = FeatureMap::from_shape_fn((4, 2, 3), |(c, y, x)| (c * 6 + y * 3 + x) as f32);
        let bytes = encode_texture(map.view(), ElementFormat::Half).unwrap();
        assert_eq!(bytes.len(), 16 + 4 * 2 * 3 * 2);

        let (format, decoded) = decode_texture(&bytes).unwrap();
        assert_eq!(format, ElementFormat::Half);
        assert_eq!(decoded, map);

        assert!(matches!(
            decode_texture(&bytes[..bytes.len() - 2]),
            Err(ContainerError::LengthMismatch { .. })
        ));
    }
}
