//! The two interchangeable feature strategies.
//!
//! [`GradientFeatures`] describes each point with a 4x4 grid of 8-bin
//! gradient orientation histograms (128 floats) and matches with a
//! nearest/second-nearest ratio test. [`BinaryFeatures`] describes each
//! point with 256 rotated intensity comparisons and matches by Hamming
//! distance, keeping only the closest fraction of all matches.

use image::GrayImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Deserialize;
use std::f32::consts::TAU;

use super::keypoints::{
    build_pyramid, detect_keypoints, dominant_gradient_angle, intensity_centroid_angle,
    sample_bilinear, DetectorConfig, Keypoint,
};
use super::matching::{keep_best_fraction, nearest_hamming_matches, ratio_test_matches, Match};
use super::{FeatureExtractor, Features};
use crate::error::{FormError, Result};

pub const GRADIENT_DESCRIPTOR_LEN: usize = 128;
pub type GradientDescriptor = [f32; GRADIENT_DESCRIPTOR_LEN];

pub const BINARY_DESCRIPTOR_BITS: usize = 256;
pub type BinaryDescriptor = [u64; BINARY_DESCRIPTOR_BITS / 64];

const GRID_CELLS: usize = 4;
const CELL_SIZE: usize = 4;
const ORIENTATION_BINS: usize = 8;
const ORIENTATION_RADIUS: i32 = 8;
const HISTOGRAM_CLIP: f32 = 0.2;

const PATTERN_RADIUS: i32 = 13;
const CENTROID_RADIUS: i32 = 15;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GradientConfig {
    pub detector: DetectorConfig,
    /// Best match must be closer than `ratio` x the second best.
    pub ratio: f32,
}

impl Default for GradientConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            ratio: 0.75,
        }
    }
}

impl GradientConfig {
    pub fn validate(&self) -> Result<()> {
        self.detector.validate()?;
        if !(self.ratio > 0.0 && self.ratio <= 1.0) {
            return Err(FormError::InvalidConfig(format!(
                "ratio test threshold must be in (0, 1], got {}",
                self.ratio
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BinaryConfig {
    pub detector: DetectorConfig,
    /// Share of the sorted matches kept for estimation.
    pub keep_fraction: f32,
    /// Seed of the comparison pattern; template and query must agree.
    pub pattern_seed: u64,
}

impl Default for BinaryConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default()
                .with_max_features(3000)
                .with_levels(8, 1.2),
            keep_fraction: 0.2,
            pattern_seed: 0x5eed,
        }
    }
}

impl BinaryConfig {
    pub fn validate(&self) -> Result<()> {
        self.detector.validate()?;
        if !(self.keep_fraction > 0.0 && self.keep_fraction <= 1.0) {
            return Err(FormError::InvalidConfig(format!(
                "keep fraction must be in (0, 1], got {}",
                self.keep_fraction
            )));
        }
        Ok(())
    }
}

/// Gradient-histogram descriptors with ratio-test matching.
#[derive(Debug, Clone, Default)]
pub struct GradientFeatures {
    config: GradientConfig,
}

impl GradientFeatures {
    pub fn new(config: GradientConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GradientConfig {
        &self.config
    }
}

impl FeatureExtractor for GradientFeatures {
    type Descriptor = GradientDescriptor;

    fn name(&self) -> &'static str {
        "gradient"
    }

    fn detect_and_compute(&self, gray: &GrayImage) -> Features<GradientDescriptor> {
        let pyramid = build_pyramid(gray, &self.config.detector);
        let mut keypoints = detect_keypoints(&pyramid, &self.config.detector);

        let descriptors = keypoints
            .par_iter_mut()
            .map(|kp| {
                let smoothed = &pyramid[kp.level].smoothed;
                kp.angle =
                    dominant_gradient_angle(smoothed, kp.level_x, kp.level_y, ORIENTATION_RADIUS);
                gradient_descriptor(smoothed, kp)
            })
            .collect();

        Features {
            keypoints,
            descriptors,
        }
    }

    fn correspond(&self, query: &[GradientDescriptor], template: &[GradientDescriptor]) -> Vec<Match> {
        ratio_test_matches(query, template, self.config.ratio)
    }
}

fn gradient_descriptor(image: &GrayImage, kp: &Keypoint) -> GradientDescriptor {
    let mut descriptor = [0.0f32; GRADIENT_DESCRIPTOR_LEN];
    let (sin, cos) = kp.angle.sin_cos();
    let cx = kp.level_x as f32;
    let cy = kp.level_y as f32;
    let half = (GRID_CELLS * CELL_SIZE) as f32 / 2.0;
    let sigma = half;

    for v in 0..GRID_CELLS * CELL_SIZE {
        for u in 0..GRID_CELLS * CELL_SIZE {
            let du = u as f32 - half + 0.5;
            let dv = v as f32 - half + 0.5;
            let px = cx + cos * du - sin * dv;
            let py = cy + sin * du + cos * dv;

            let gx = sample_bilinear(image, px + 1.0, py) - sample_bilinear(image, px - 1.0, py);
            let gy = sample_bilinear(image, px, py + 1.0) - sample_bilinear(image, px, py - 1.0);
            let magnitude = (gx * gx + gy * gy).sqrt();
            if magnitude == 0.0 {
                continue;
            }

            let theta = (gy.atan2(gx) - kp.angle).rem_euclid(TAU);
            let bin = ((theta / TAU) * ORIENTATION_BINS as f32) as usize % ORIENTATION_BINS;
            let cell = (v / CELL_SIZE) * GRID_CELLS + u / CELL_SIZE;
            let weight = (-(du * du + dv * dv) / (2.0 * sigma * sigma)).exp();
            descriptor[cell * ORIENTATION_BINS + bin] += magnitude * weight;
        }
    }

    normalize(&mut descriptor);
    for value in descriptor.iter_mut() {
        *value = value.min(HISTOGRAM_CLIP);
    }
    normalize(&mut descriptor);
    descriptor
}

fn normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in values.iter_mut() {
            *value /= norm;
        }
    }
}

/// Binary intensity-comparison descriptors with Hamming matching.
#[derive(Debug, Clone)]
pub struct BinaryFeatures {
    config: BinaryConfig,
    /// Point pairs `[x1, y1, x2, y2]` relative to the keypoint, unrotated.
    pattern: Vec<[f32; 4]>,
}

impl BinaryFeatures {
    pub fn new(config: BinaryConfig) -> Result<Self> {
        config.validate()?;
        let pattern = comparison_pattern(config.pattern_seed);
        Ok(Self { config, pattern })
    }

    pub fn config(&self) -> &BinaryConfig {
        &self.config
    }
}

impl Default for BinaryFeatures {
    fn default() -> Self {
        let config = BinaryConfig::default();
        let pattern = comparison_pattern(config.pattern_seed);
        Self { config, pattern }
    }
}

fn comparison_pattern(seed: u64) -> Vec<[f32; 4]> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..BINARY_DESCRIPTOR_BITS)
        .map(|_| {
            let (x1, y1) = point_in_disc(&mut rng);
            let (x2, y2) = point_in_disc(&mut rng);
            [x1, y1, x2, y2]
        })
        .collect()
}

fn point_in_disc(rng: &mut StdRng) -> (f32, f32) {
    loop {
        let x = rng.random_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
        let y = rng.random_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
        if x * x + y * y <= PATTERN_RADIUS * PATTERN_RADIUS {
            return (x as f32, y as f32);
        }
    }
}

impl FeatureExtractor for BinaryFeatures {
    type Descriptor = BinaryDescriptor;

    fn name(&self) -> &'static str {
        "binary"
    }

    fn detect_and_compute(&self, gray: &GrayImage) -> Features<BinaryDescriptor> {
        let pyramid = build_pyramid(gray, &self.config.detector);
        let mut keypoints = detect_keypoints(&pyramid, &self.config.detector);

        let descriptors = keypoints
            .par_iter_mut()
            .map(|kp| {
                let smoothed = &pyramid[kp.level].smoothed;
                kp.angle =
                    intensity_centroid_angle(smoothed, kp.level_x, kp.level_y, CENTROID_RADIUS);
                self.binary_descriptor(smoothed, kp)
            })
            .collect();

        Features {
            keypoints,
            descriptors,
        }
    }

    fn correspond(&self, query: &[BinaryDescriptor], template: &[BinaryDescriptor]) -> Vec<Match> {
        let matches = nearest_hamming_matches(query, template);
        keep_best_fraction(matches, self.config.keep_fraction)
    }
}

impl BinaryFeatures {
    fn binary_descriptor(&self, image: &GrayImage, kp: &Keypoint) -> BinaryDescriptor {
        let mut descriptor = [0u64; BINARY_DESCRIPTOR_BITS / 64];
        let (sin, cos) = kp.angle.sin_cos();
        let cx = kp.level_x as f32;
        let cy = kp.level_y as f32;

        for (bit, [x1, y1, x2, y2]) in self.pattern.iter().copied().enumerate() {
            let a = sample_bilinear(image, cx + cos * x1 - sin * y1, cy + sin * x1 + cos * y1);
            let b = sample_bilinear(image, cx + cos * x2 - sin * y2, cy + sin * x2 + cos * y2);
            if a < b {
                descriptor[bit / 64] |= 1u64 << (bit % 64);
            }
        }
        descriptor
    }
}
