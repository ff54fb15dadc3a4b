//! Multi-scale interest point detection.
//!
//! Points are FAST-9 corners found on every level of a downscaled image
//! pyramid, thinned by non-maximum suppression and capped per level so that
//! coarse levels still contribute. Descriptors are later computed on a
//! smoothed copy of the level a point was found on.

use image::imageops::{self, FilterType};
use image::GrayImage;
use imageproc::corners::corners_fast9;
use imageproc::filter::gaussian_blur_f32;
use serde::Deserialize;

use crate::error::{FormError, Result};

/// Pixels kept clear of the level border so descriptor patches stay inside.
pub const EDGE_MARGIN: u32 = 20;

/// Radius within which a stronger corner suppresses weaker ones.
const NMS_RADIUS: i64 = 3;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Upper bound on keypoints kept across all levels.
    pub max_features: usize,
    /// FAST intensity threshold.
    pub fast_threshold: u8,
    /// Number of pyramid levels, including the full-resolution one.
    pub levels: usize,
    /// Downscale factor between consecutive levels.
    pub scale_factor: f32,
    /// Blur applied to a level before descriptors sample it.
    pub smoothing_sigma: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_features: 2000,
            fast_threshold: 20,
            levels: 4,
            scale_factor: std::f32::consts::SQRT_2,
            smoothing_sigma: 1.2,
        }
    }
}

impl DetectorConfig {
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_levels(mut self, levels: usize, scale_factor: f32) -> Self {
        self.levels = levels;
        self.scale_factor = scale_factor;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.levels == 0 {
            return Err(FormError::InvalidConfig("pyramid needs at least one level".into()));
        }
        if self.scale_factor <= 1.0 {
            return Err(FormError::InvalidConfig(format!(
                "pyramid scale factor must exceed 1.0, got {}",
                self.scale_factor
            )));
        }
        if self.smoothing_sigma <= 0.0 {
            return Err(FormError::InvalidConfig(format!(
                "smoothing sigma must be positive, got {}",
                self.smoothing_sigma
            )));
        }
        Ok(())
    }
}

/// Interest point located on one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// Position in full-resolution pixel coordinates.
    pub x: f32,
    pub y: f32,
    /// Position on its own pyramid level.
    pub level_x: u32,
    pub level_y: u32,
    pub level: usize,
    /// Full-resolution pixels per level pixel.
    pub scale: f32,
    /// Orientation in radians, assigned by the descriptor.
    pub angle: f32,
    pub response: f32,
}

/// One level of the image pyramid.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    pub image: GrayImage,
    pub smoothed: GrayImage,
    pub scale: f32,
}

pub fn build_pyramid(gray: &GrayImage, config: &DetectorConfig) -> Vec<PyramidLevel> {
    let (width, height) = gray.dimensions();
    let min_side = 2 * EDGE_MARGIN + 1;
    let mut levels = Vec::with_capacity(config.levels);

    for level in 0..config.levels {
        let scale = config.scale_factor.powi(level as i32);
        let level_w = (width as f32 / scale).round() as u32;
        let level_h = (height as f32 / scale).round() as u32;
        if level_w < min_side || level_h < min_side {
            break;
        }

        let image = if level == 0 {
            gray.clone()
        } else {
            imageops::resize(gray, level_w, level_h, FilterType::Triangle)
        };
        let smoothed = gaussian_blur_f32(&image, config.smoothing_sigma);
        levels.push(PyramidLevel {
            image,
            smoothed,
            scale: width as f32 / level_w as f32,
        });
    }

    levels
}

/// Share of `max_features` given to each level, shrinking geometrically
/// with the level area.
fn level_quotas(max_features: usize, levels: usize, scale_factor: f32) -> Vec<usize> {
    let factor = 1.0 / (scale_factor * scale_factor);
    let first = max_features as f32 * (1.0 - factor) / (1.0 - factor.powi(levels as i32));

    let mut quotas = Vec::with_capacity(levels);
    let mut assigned = 0usize;
    for level in 0..levels {
        let quota = if level + 1 == levels {
            max_features.saturating_sub(assigned)
        } else {
            (first * factor.powi(level as i32)).round() as usize
        };
        assigned += quota;
        quotas.push(quota);
    }
    quotas
}

/// Detect keypoints on every level, strongest first within each level.
pub fn detect_keypoints(pyramid: &[PyramidLevel], config: &DetectorConfig) -> Vec<Keypoint> {
    let quotas = level_quotas(config.max_features, pyramid.len(), config.scale_factor);
    let mut keypoints = Vec::new();

    for (level, (pyramid_level, quota)) in pyramid.iter().zip(quotas).enumerate() {
        let (width, height) = pyramid_level.image.dimensions();
        let mut corners: Vec<_> = corners_fast9(&pyramid_level.image, config.fast_threshold)
            .into_iter()
            .filter(|c| {
                c.x >= EDGE_MARGIN
                    && c.y >= EDGE_MARGIN
                    && c.x < width - EDGE_MARGIN
                    && c.y < height - EDGE_MARGIN
            })
            .collect();

        // Stable sort keeps scan order among equal scores.
        corners.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut occupied = vec![false; (width * height) as usize];
        let mut kept = 0usize;
        for corner in corners {
            if kept >= quota {
                break;
            }
            let idx = (corner.y * width + corner.x) as usize;
            if occupied[idx] {
                continue;
            }

            let cx = corner.x as i64;
            let cy = corner.y as i64;
            for y in (cy - NMS_RADIUS).max(0)..=(cy + NMS_RADIUS).min(height as i64 - 1) {
                for x in (cx - NMS_RADIUS).max(0)..=(cx + NMS_RADIUS).min(width as i64 - 1) {
                    occupied[(y * width as i64 + x) as usize] = true;
                }
            }

            keypoints.push(Keypoint {
                x: corner.x as f32 * pyramid_level.scale,
                y: corner.y as f32 * pyramid_level.scale,
                level_x: corner.x,
                level_y: corner.y,
                level,
                scale: pyramid_level.scale,
                angle: 0.0,
                response: corner.score,
            });
            kept += 1;
        }
    }

    keypoints
}

/// Orientation from the intensity centroid of a disc around the point.
pub fn intensity_centroid_angle(image: &GrayImage, x: u32, y: u32, radius: i32) -> f32 {
    let mut m01 = 0.0f32;
    let mut m10 = 0.0f32;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let value = pixel(image, x as i32 + dx, y as i32 + dy);
            m10 += dx as f32 * value;
            m01 += dy as f32 * value;
        }
    }
    m01.atan2(m10)
}

/// Orientation from the peak of a magnitude-weighted gradient histogram.
pub fn dominant_gradient_angle(image: &GrayImage, x: u32, y: u32, radius: i32) -> f32 {
    const BINS: usize = 36;
    let mut histogram = [0.0f32; BINS];
    let sigma = radius as f32 / 2.0;

    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let px = x as i32 + dx;
            let py = y as i32 + dy;
            let gx = pixel(image, px + 1, py) - pixel(image, px - 1, py);
            let gy = pixel(image, px, py + 1) - pixel(image, px, py - 1);
            let magnitude = (gx * gx + gy * gy).sqrt();
            if magnitude == 0.0 {
                continue;
            }
            let weight = (-((dx * dx + dy * dy) as f32) / (2.0 * sigma * sigma)).exp();
            let theta = gy.atan2(gx).rem_euclid(std::f32::consts::TAU);
            let bin = ((theta / std::f32::consts::TAU) * BINS as f32) as usize % BINS;
            histogram[bin] += magnitude * weight;
        }
    }

    let mut peak = 0;
    for (bin, &value) in histogram.iter().enumerate() {
        if value > histogram[peak] {
            peak = bin;
        }
    }
    (peak as f32 + 0.5) * std::f32::consts::TAU / BINS as f32
}

fn pixel(image: &GrayImage, x: i32, y: i32) -> f32 {
    let x = x.clamp(0, image.width() as i32 - 1) as u32;
    let y = y.clamp(0, image.height() as i32 - 1) as u32;
    image.get_pixel(x, y)[0] as f32
}

/// Bilinear sample with border clamping.
pub fn sample_bilinear(image: &GrayImage, x: f32, y: f32) -> f32 {
    let x = x.clamp(0.0, (image.width() - 1) as f32);
    let y = y.clamp(0.0, (image.height() - 1) as f32);
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let top = pixel(image, x0, y0) * (1.0 - fx) + pixel(image, x0 + 1, y0) * fx;
    let bottom = pixel(image, x0, y0 + 1) * (1.0 - fx) + pixel(image, x0 + 1, y0 + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_quotas_sum_to_budget() {
        let quotas = level_quotas(3000, 8, 1.2);
        assert_eq!(quotas.len(), 8);
        assert_eq!(quotas.iter().sum::<usize>(), 3000);
        assert!(quotas[0] > quotas[7]);
    }

    #[test]
    fn pyramid_stops_before_levels_get_too_small() {
        let gray = GrayImage::new(100, 100);
        let config = DetectorConfig::default().with_levels(8, 2.0);
        let pyramid = build_pyramid(&gray, &config);
        // 100 -> 50 -> 25 (< 41 px) stops.
        assert_eq!(pyramid.len(), 2);
        assert!((pyramid[1].scale - 2.0).abs() < 1e-6);
    }

    /// 41x41 patch, dark except where `bright(x, y)` holds.
    fn split_patch(bright: impl Fn(u32, u32) -> bool) -> GrayImage {
        GrayImage::from_fn(41, 41, |x, y| image::Luma([if bright(x, y) { 255 } else { 0 }]))
    }

    fn angle_diff(a: f32, b: f32) -> f32 {
        let d = (a - b).rem_euclid(std::f32::consts::TAU);
        d.min(std::f32::consts::TAU - d)
    }

    #[test]
    fn centroid_angle_points_at_the_bright_side() {
        use std::f32::consts::{FRAC_PI_2, PI};
        let tol = 10f32.to_radians();

        let right = split_patch(|x, _| x > 20);
        assert!(angle_diff(intensity_centroid_angle(&right, 20, 20, 15), 0.0) < tol);
        let below = split_patch(|_, y| y > 20);
        assert!(angle_diff(intensity_centroid_angle(&below, 20, 20, 15), FRAC_PI_2) < tol);
        let left = split_patch(|x, _| x < 20);
        assert!(angle_diff(intensity_centroid_angle(&left, 20, 20, 15), PI) < tol);
    }

    #[test]
    fn gradient_angle_follows_the_edge_normal() {
        use std::f32::consts::FRAC_PI_2;
        let tol = 10f32.to_radians();

        let right = split_patch(|x, _| x >= 20);
        assert!(angle_diff(dominant_gradient_angle(&right, 20, 20, 8), 0.0) < tol);
        let below = split_patch(|_, y| y >= 20);
        assert!(angle_diff(dominant_gradient_angle(&below, 20, 20, 8), FRAC_PI_2) < tol);
        // Rotating the picture rotates the orientation with it.
        let diagonal = split_patch(|x, y| x + y >= 40);
        assert!(angle_diff(dominant_gradient_angle(&diagonal, 20, 20, 8), FRAC_PI_2 / 2.0) < tol);
    }

    #[test]
    fn uniform_image_has_no_keypoints() {
        let gray = GrayImage::from_pixel(120, 90, image::Luma([255u8]));
        let config = DetectorConfig::default();
        let pyramid = build_pyramid(&gray, &config);
        assert!(detect_keypoints(&pyramid, &config).is_empty());
    }
}
