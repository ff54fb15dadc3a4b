//! Binary morphology with rectangular structuring elements.
//!
//! The element is anchored at `(width / 2, height / 2)`. Erosion treats
//! pixels outside the patch as foreground and dilation treats them as
//! background, so a structure touching the patch edge is not eaten away.

use image::{GrayImage, Luma};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct StructuringElement {
    pub width: u32,
    pub height: u32,
}

impl StructuringElement {
    pub const fn rect(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn anchor(&self) -> (i64, i64) {
        ((self.width / 2) as i64, (self.height / 2) as i64)
    }
}

fn is_set(img: &GrayImage, x: i64, y: i64, outside: bool) -> bool {
    if x < 0 || y < 0 || x >= img.width() as i64 || y >= img.height() as i64 {
        return outside;
    }
    img.get_pixel(x as u32, y as u32)[0] != 0
}

pub fn erode(img: &GrayImage, element: StructuringElement) -> GrayImage {
    let (ax, ay) = element.anchor();
    let mut out = GrayImage::new(img.width(), img.height());
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let (x, y) = (x as i64, y as i64);
        let covered = (0..element.height as i64).all(|ky| {
            (0..element.width as i64).all(|kx| is_set(img, x - ax + kx, y - ay + ky, true))
        });
        if covered {
            *pixel = Luma([255]);
        }
    }
    out
}

/// Dilation by the reflected element, so that `open` = union of every
/// placement of the element that fits inside the foreground.
pub fn dilate(img: &GrayImage, element: StructuringElement) -> GrayImage {
    let (ax, ay) = element.anchor();
    let mut out = GrayImage::new(img.width(), img.height());
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let (x, y) = (x as i64, y as i64);
        let hit = (0..element.height as i64).any(|ky| {
            (0..element.width as i64).any(|kx| is_set(img, x + ax - kx, y + ay - ky, false))
        });
        if hit {
            *pixel = Luma([255]);
        }
    }
    out
}

/// Opening: `iterations` erosions followed by as many dilations.
pub fn open(img: &GrayImage, element: StructuringElement, iterations: u32) -> GrayImage {
    let mut result = img.clone();
    for _ in 0..iterations {
        result = erode(&result, element);
    }
    for _ in 0..iterations {
        result = dilate(&result, element);
    }
    result
}
