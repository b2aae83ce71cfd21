use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;

use crate::error::ClassifyError;

/// Side length of the square CLIP ViT-B/32 input.
pub const IMAGE_SIZE: u32 = 224;

// CLIP normalization constants
const MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Center-crops the largest square, resizes it to 224x224 and normalizes into
/// a `[1, 3, 224, 224]` NCHW tensor.
pub fn preprocess(image: &RgbImage) -> Result<Array4<f32>, ClassifyError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ClassifyError::EmptyImage);
    }

    let (left, top, side) = center_square(width, height);
    let square = imageops::crop_imm(image, left, top, side, side).to_image();
    let resized = imageops::resize(&square, IMAGE_SIZE, IMAGE_SIZE, FilterType::CatmullRom);

    let size = IMAGE_SIZE as usize;
    let tensor = Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
        let pixel = resized.get_pixel(x as u32, y as u32);
        (pixel[c] as f32 / 255.0 - MEAN[c]) / STD[c]
    });
    Ok(tensor)
}

/// Offset and side of the largest centered square.
fn center_square(width: u32, height: u32) -> (u32, u32, u32) {
    let side = width.min(height);
    ((width - side) / 2, (height - side) / 2, side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn square_is_centered_on_the_long_side() {
        assert_eq!(center_square(640, 480), (80, 0, 480));
        assert_eq!(center_square(480, 640), (0, 80, 480));
        assert_eq!(center_square(100, 100), (0, 0, 100));
        assert_eq!(center_square(1, 10_000), (0, 4_999, 1));
    }

    #[test]
    fn output_has_nchw_shape() {
        let image = RgbImage::from_pixel(320, 180, Rgb([10, 200, 30]));
        let tensor = preprocess(&image).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);

        let sliver = RgbImage::from_pixel(2, 5_000, Rgb([10, 200, 30]));
        assert_eq!(preprocess(&sliver).unwrap().shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn pixels_are_normalized_per_channel() {
        let image = RgbImage::from_pixel(50, 80, Rgb([255, 0, 128]));
        let tensor = preprocess(&image).unwrap();

        let red = tensor[[0, 0, 112, 112]];
        let green = tensor[[0, 1, 112, 112]];
        let blue = tensor[[0, 2, 112, 112]];
        assert!((red - (1.0 - MEAN[0]) / STD[0]).abs() < 1e-3);
        assert!((green - (0.0 - MEAN[1]) / STD[1]).abs() < 1e-3);
        assert!((blue - (128.0 / 255.0 - MEAN[2]) / STD[2]).abs() < 1e-2);
    }

    #[test]
    fn crop_is_centered() {
        // Left and right thirds black, middle white: after the crop only white remains.
        let image = RgbImage::from_fn(672, 224, |x, _| {
            if (224..448).contains(&x) {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let tensor = preprocess(&image).unwrap();
        let white = (1.0 - MEAN[0]) / STD[0];
        assert!((tensor[[0, 0, 112, 10]] - white).abs() < 1e-3);
        assert!((tensor[[0, 0, 112, 213]] - white).abs() < 1e-3);
    }

    #[test]
    fn empty_image_is_rejected() {
        let image = RgbImage::new(0, 10);
        assert!(matches!(preprocess(&image), Err(ClassifyError::EmptyImage)));
    }
}
