use formmark::{Region, RegionCatalog, RegionShape};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::geometric_transformations::{Interpolation, Projection, warp};
use imageproc::rect::Rect;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Template size used by the alignment tests.
pub const TEMPLATE_WIDTH: u32 = 400;
pub const TEMPLATE_HEIGHT: u32 = 300;

/// Regions of the synthetic template all sit below this row; the texture above it.
pub const FORM_AREA_TOP: u32 = 200;

/// Creates a blank white page.
pub fn white_page(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, WHITE)
}

/// Creates a template with a band of random gray rectangles across the top
/// (plenty of corners to match on) and an empty form area below.
pub fn textured_template(seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut img = white_page(TEMPLATE_WIDTH, TEMPLATE_HEIGHT);
    let band = FORM_AREA_TOP - 20;

    for _ in 0..70 {
        let w = rng.random_range(8..40u32);
        let h = rng.random_range(8..40u32);
        let x = rng.random_range(0..TEMPLATE_WIDTH - w);
        let y = rng.random_range(0..band - h);
        let v = rng.random_range(0..200u8);
        draw_filled_rect_mut(&mut img, Rect::at(x as i32, y as i32).of_size(w, h), Rgb([v, v, v]));
    }
    img
}

/// Shift `img` by (dx, dy) pixels, filling uncovered pixels with white.
pub fn translated(img: &RgbImage, dx: u32, dy: u32) -> RgbImage {
    let mut out = white_page(img.width(), img.height());
    for (x, y, pixel) in img.enumerate_pixels() {
        let (tx, ty) = (x + dx, y + dy);
        if tx < out.width() && ty < out.height() {
            out.put_pixel(tx, ty, *pixel);
        }
    }
    out
}

/// Rotation by `degrees` and uniform scaling about the image centre.
pub fn about_center(img: &RgbImage, degrees: f32, scale: f32) -> Projection {
    let (cx, cy) = (img.width() as f32 / 2.0, img.height() as f32 / 2.0);
    Projection::translate(cx, cy)
        * Projection::rotate(degrees.to_radians())
        * Projection::scale(scale, scale)
        * Projection::translate(-cx, -cy)
}

/// Photograph `img` through `projection`, with paper showing where the
/// form does not reach.
pub fn photographed(img: &RgbImage, projection: &Projection) -> RgbImage {
    warp(img, projection, Interpolation::Bilinear, WHITE)
}

/// Paint a solid black box.
pub fn fill_box(img: &mut RgbImage, x: u32, y: u32, width: u32, height: u32) {
    draw_filled_rect_mut(img, Rect::at(x as i32, y as i32).of_size(width, height), BLACK);
}

/// Draw a one pixel black rectangle outline, like a printed checkbox.
pub fn outline_box(img: &mut RgbImage, x: u32, y: u32, width: u32, height: u32) {
    printed_box(img, x, y, width, height, 1);
}

/// Draw a black rectangle outline `thickness` pixels wide, growing inwards.
pub fn printed_box(img: &mut RgbImage, x: u32, y: u32, width: u32, height: u32, thickness: u32) {
    for k in 0..thickness {
        for i in x..x + width {
            img.put_pixel(i, y + k, BLACK);
            img.put_pixel(i, y + height - 1 - k, BLACK);
        }
        for j in y..y + height {
            img.put_pixel(x + k, j, BLACK);
            img.put_pixel(x + width - 1 - k, j, BLACK);
        }
    }
}

/// Empty binary patch.
pub fn blank_mask(width: u32, height: u32) -> GrayImage {
    GrayImage::new(width, height)
}

pub fn foreground(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p[0] != 0).count()
}

pub fn set_pixel(mask: &mut GrayImage, x: u32, y: u32) {
    mask.put_pixel(x, y, Luma([255]));
}

/// Build a catalog in code from (label, x, y, width, height) tuples.
pub fn catalog(regions: &[(&str, i64, i64, u32, u32)]) -> RegionCatalog {
    RegionCatalog::new(
        regions
            .iter()
            .map(|&(label, x, y, w, h)| Region::new(label, RegionShape::new(x, y, w, h)))
            .collect(),
    )
}

/// Annotation JSON for (label, x, y, width, height) tuples.
pub fn catalog_json(regions: &[(&str, i64, i64, u32, u32)]) -> String {
    let entries: Vec<serde_json::Value> = regions
        .iter()
        .map(|&(label, x, y, w, h)| {
            serde_json::json!({
                "shape_attributes": {"name": "rect", "x": x, "y": y, "width": w, "height": h},
                "region_attributes": {"type": label}
            })
        })
        .collect();
    serde_json::json!({"data": {"regions": entries}}).to_string()
}

/// Write annotation JSON for the given regions into `dir`.
pub fn write_catalog(dir: &Path, regions: &[(&str, i64, i64, u32, u32)]) -> PathBuf {
    let path = dir.join("regions.json");
    std::fs::write(&path, catalog_json(regions)).expect("Failed to write catalog");
    path
}

/// Save an image as PNG into `dir`.
pub fn write_png(dir: &Path, name: &str, img: &RgbImage) -> PathBuf {
    let path = dir.join(name);
    img.save_with_format(&path, image::ImageFormat::Png)
        .expect("Failed to save test image");
    path
}

/// Largest per-channel difference between two same-sized images, ignoring
/// a `border` pixel frame.
pub fn max_interior_diff(a: &RgbImage, b: &RgbImage, border: u32) -> u8 {
    let mut worst = 0u8;
    for y in border..a.height() - border {
        for x in border..a.width() - border {
            let pa = a.get_pixel(x, y);
            let pb = b.get_pixel(x, y);
            for c in 0..3 {
                worst = worst.max(pa[c].abs_diff(pb[c]));
            }
        }
    }
    worst
}
