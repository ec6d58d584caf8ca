use image::imageops::{self, FilterType};

use crate::source::NamedImage;

/// Square resolution the detector was trained at.
pub const TARGET_SIZE: u32 = 640;

/// Resizes straight to `TARGET_SIZE`×`TARGET_SIZE`; aspect ratio is not kept.
pub fn preprocess(image: &NamedImage) -> NamedImage {
    resize_to(image, TARGET_SIZE)
}

pub fn resize_to(image: &NamedImage, size: u32) -> NamedImage {
    if image.dimensions() == (size, size) {
        return image.clone();
    }
    let pixels = imageops::resize(image.pixels(), size, size, FilterType::CatmullRom);
    NamedImage::new(image.name(), pixels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_resizes_without_keeping_aspect() {
        let wide = NamedImage::new("wide.png", RgbImage::from_pixel(1280, 320, Rgb([1, 2, 3])));
        let resized = preprocess(&wide);

        assert_eq!(resized.dimensions(), (TARGET_SIZE, TARGET_SIZE));
        assert_eq!(resized.name(), "wide.png");
        assert_eq!(resized.pixels().get_pixel(320, 320), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_upscales_small_images() {
        let tiny = NamedImage::new("tiny.jpg", RgbImage::new(3, 5));
        assert_eq!(preprocess(&tiny).dimensions(), (640, 640));
    }
}
