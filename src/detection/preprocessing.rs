use image::{GrayImage, Luma, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::map::map_colors;

/// Convert an aligned image to grayscale
pub fn to_grayscale(img: &RgbImage) -> GrayImage {
    image::imageops::grayscale(img)
}

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    gaussian_blur_f32(img, sigma)
}

/// Detect edges using Canny edge detector
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(img, low_threshold, high_threshold)
}

/// Global binarization at the Otsu level: brighter than the level becomes 255.
pub fn binarize_otsu(img: &GrayImage) -> GrayImage {
    let level = otsu_level(img);
    map_colors(img, |p| if p[0] > level { Luma([255u8]) } else { Luma([0u8]) })
}

/// Gaussian sigma matching a square smoothing window of `block_size` pixels.
pub fn sigma_for_block(block_size: u32) -> f32 {
    0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Inverted adaptive threshold against a Gaussian-weighted local mean.
///
/// A pixel becomes foreground (255) when it is at least `c` levels darker
/// than its neighbourhood, so ink reads bright on a dark background and slow
/// lighting gradients across the form cancel out.
pub fn adaptive_threshold_inverted(img: &GrayImage, block_size: u32, c: i32) -> GrayImage {
    if img.width() == 0 || img.height() == 0 {
        return img.clone();
    }

    let local_mean = gaussian_blur_f32(img, sigma_for_block(block_size));
    let mut output = GrayImage::new(img.width(), img.height());
    for (x, y, pixel) in img.enumerate_pixels() {
        let mean = local_mean.get_pixel(x, y)[0] as i32;
        if pixel[0] as i32 - mean <= -c {
            output.put_pixel(x, y, Luma([255u8]));
        }
    }
    output
}

/// Number of non-zero pixels
pub fn count_foreground(img: &GrayImage) -> u32 {
    img.pixels().filter(|p| p[0] != 0).count() as u32
}
