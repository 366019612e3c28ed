//! Feature maps as 8-bit images.

use densify_core::FeatureMap;
use image::{Rgb, RgbImage};
use std::path::Path;

/// Values scaled by 255 and clamped. One channel is replicated to gray, two
/// channels fill red and green, channels past the third are dropped.
pub fn to_rgb_image(map: &FeatureMap) -> RgbImage {
    let (channels, height, width) = map.dim();
    let to_u8 = |v: f32| (v * 255.0).clamp(0.0, 255.0) as u8;

    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let value = |c: usize| to_u8(map[[c, y, x]]);
        match channels {
            0 => Rgb([0, 0, 0]),
            1 => {
                let v = value(0);
                Rgb([v, v, v])
            }
            2 => Rgb([value(0), value(1), 0]),
            _ => Rgb([value(0), value(1), value(2)]),
        }
    })
}

pub fn save_png(map: &FeatureMap, path: impl AsRef<Path>) -> Result<(), image::ImageError> {
    to_rgb_image(map).save_with_format(path, image::ImageFormat::Png)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray_and_clamping() {
        let map = FeatureMap::from_shape_vec((1, 1, 3), vec![-1.0, 0.5, 2.0]).unwrap();
        let image = to_rgb_image(&map);
        assert_eq!(image.dimensions(), (3, 1));
        assert_eq!(image.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(image.get_pixel(1, 0), &Rgb([127, 127, 127]));
        assert_eq!(image.get_pixel(2, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_extra_channels_dropped() {
        let mut map = FeatureMap::zeros((4, 2, 1));
        map[[0, 1, 0]] = 1.0;
        map[[2, 1, 0]] = 1.0;
        map[[3, 1, 0]] = 1.0;
        let image = to_rgb_image(&map);
        assert_eq!(image.get_pixel(0, 1), &Rgb([255, 0, 255]));
    }

    #[test]
    fn test_save_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        save_png(&FeatureMap::ones((1, 4, 5)), &path).unwrap();

        let loaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(loaded.dimensions(), (5, 4));
        assert_eq!(loaded.get_pixel(4, 3), &Rgb([255, 255, 255]));
    }
}
