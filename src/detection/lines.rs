//! Printed gridline detection and erasure.
//!
//! Long straight structures are isolated with a thin morphological opening,
//! found with a progressive probabilistic Hough transform, gated by angle,
//! and painted out of the un-opened patch.

use image::{GrayImage, Luma};
use imageproc::drawing::draw_line_segment_mut;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::f64::consts::PI;
use tracing::trace;

use super::morphology::{StructuringElement, open};
use crate::error::{FormError, Result};

/// Fixed-point precision used while walking along a candidate line.
const WALK_SHIFT: u32 = 16;

/// Accumulator angle bins (1° resolution over half a turn).
const ANGLE_BINS: usize = 180;

/// Which family of gridlines a removal pass targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineOrientation {
    Horizontal,
    Vertical,
}

impl LineOrientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Horizontal => "horizontal",
            Self::Vertical => "vertical",
        }
    }
}

/// One gridline removal pass.
///
/// A segment is erased when `min_angle < |θ| < max_angle`, where θ is its
/// angle from horizontal in degrees, in (-90, 90].
#[derive(Debug, Clone, Deserialize)]
pub struct LineRemovalConfig {
    pub orientation: LineOrientation,
    pub kernel: StructuringElement,
    pub iterations: u32,
    pub vote_threshold: u32,
    pub min_line_length: u32,
    pub max_line_gap: u32,
    pub min_angle: f64,
    pub max_angle: f64,
    #[serde(default)]
    pub seed: u64,
}

impl LineRemovalConfig {
    pub fn horizontal() -> Self {
        Self {
            orientation: LineOrientation::Horizontal,
            kernel: StructuringElement::rect(4, 1),
            iterations: 2,
            vote_threshold: 20,
            min_line_length: 10,
            max_line_gap: 0,
            min_angle: -6.0,
            max_angle: 6.0,
            seed: 0,
        }
    }

    pub fn vertical() -> Self {
        Self {
            orientation: LineOrientation::Vertical,
            kernel: StructuringElement::rect(1, 4),
            iterations: 1,
            vote_threshold: 12,
            min_line_length: 4,
            max_line_gap: 0,
            min_angle: 84.0,
            max_angle: 96.0,
            seed: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn accepts(&self, segment: &Segment) -> bool {
        let angle = segment.angle_degrees().abs();
        angle > self.min_angle && angle < self.max_angle
    }

    pub fn validate(&self) -> Result<()> {
        if self.kernel.width == 0 || self.kernel.height == 0 {
            return Err(FormError::InvalidConfig(format!(
                "{} line kernel must be non-empty, got {}x{}",
                self.orientation.as_str(),
                self.kernel.width,
                self.kernel.height
            )));
        }
        if self.vote_threshold == 0 {
            return Err(FormError::InvalidConfig(format!(
                "{} line vote threshold must be positive",
                self.orientation.as_str()
            )));
        }
        if self.min_angle >= self.max_angle {
            return Err(FormError::InvalidConfig(format!(
                "{} line angle band ({}, {}) is empty",
                self.orientation.as_str(),
                self.min_angle,
                self.max_angle
            )));
        }
        Ok(())
    }
}

/// A detected line segment, endpoints in patch pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Segment {
    /// Angle from horizontal in degrees. Vertical segments come out as ±90.
    pub fn angle_degrees(&self) -> f64 {
        let dy = (self.y2 - self.y1) as f64;
        let dx = (self.x2 - self.x1) as f64 + 1e-8;
        (dy / dx).atan().to_degrees()
    }

    pub fn length(&self) -> f64 {
        let dx = (self.x2 - self.x1) as f64;
        let dy = (self.y2 - self.y1) as f64;
        dx.hypot(dy)
    }
}

struct Accumulator {
    cos: Vec<f64>,
    sin: Vec<f64>,
    rho_bins: usize,
    votes: Vec<i32>,
}

impl Accumulator {
    fn new(width: u32, height: u32) -> Self {
        let rho_bins = ((width + height) * 2 + 1) as usize;
        let step = PI / ANGLE_BINS as f64;
        Self {
            cos: (0..ANGLE_BINS).map(|n| (n as f64 * step).cos()).collect(),
            sin: (0..ANGLE_BINS).map(|n| (n as f64 * step).sin()).collect(),
            rho_bins,
            votes: vec![0; ANGLE_BINS * rho_bins],
        }
    }

    fn bin(&self, n: usize, x: i64, y: i64) -> usize {
        let rho = (x as f64 * self.cos[n] + y as f64 * self.sin[n]).round() as i64;
        n * self.rho_bins + (rho + (self.rho_bins as i64 - 1) / 2) as usize
    }

    /// Add the point's votes and return the first strongest angle bin it hit.
    fn vote(&mut self, x: i64, y: i64) -> (usize, i32) {
        let mut best = (0, 0);
        for n in 0..ANGLE_BINS {
            let idx = self.bin(n, x, y);
            self.votes[idx] += 1;
            if self.votes[idx] > best.1 {
                best = (n, self.votes[idx]);
            }
        }
        best
    }

    fn unvote(&mut self, x: i64, y: i64) {
        for n in 0..ANGLE_BINS {
            let idx = self.bin(n, x, y);
            self.votes[idx] -= 1;
        }
    }
}

/// Fixed-point walker along the line through a seed pixel.
#[derive(Clone, Copy)]
struct Walk {
    x: i64,
    y: i64,
    dx: i64,
    dy: i64,
    x_major: bool,
}

impl Walk {
    fn new(px: i64, py: i64, sin: f64, cos: f64) -> Self {
        // Direction along the line is perpendicular to the normal (cos, sin).
        let a = -sin;
        let b = cos;
        let half = 1i64 << (WALK_SHIFT - 1);
        if a.abs() > b.abs() {
            Self {
                x: px,
                y: (py << WALK_SHIFT) + half,
                dx: if a > 0.0 { 1 } else { -1 },
                dy: (b * (1i64 << WALK_SHIFT) as f64 / a.abs()).round() as i64,
                x_major: true,
            }
        } else {
            Self {
                x: (px << WALK_SHIFT) + half,
                y: py,
                dx: (a * (1i64 << WALK_SHIFT) as f64 / b.abs()).round() as i64,
                dy: if b > 0.0 { 1 } else { -1 },
                x_major: false,
            }
        }
    }

    fn reversed(self) -> Self {
        Self {
            dx: -self.dx,
            dy: -self.dy,
            ..self
        }
    }

    fn pixel(&self) -> (i64, i64) {
        if self.x_major {
            (self.x, self.y >> WALK_SHIFT)
        } else {
            (self.x >> WALK_SHIFT, self.y)
        }
    }

    fn step(&mut self) {
        self.x += self.dx;
        self.y += self.dy;
    }
}

/// Progressive probabilistic Hough transform over the foreground of `binary`.
///
/// Foreground pixels are visited in a seeded random order. Each votes in a
/// 1 px by 1° accumulator; once a vote reaches `threshold`, the line through
/// that pixel is walked both ways, tolerating up to `max_line_gap` missing
/// pixels. Walked pixels leave the candidate set, and if the span covers at
/// least `min_line_length` along x or y the segment is reported and its
/// pixels' votes are withdrawn.
pub fn detect_segments(
    binary: &GrayImage,
    threshold: u32,
    min_line_length: u32,
    max_line_gap: u32,
    seed: u64,
) -> Vec<Segment> {
    let (width, height) = binary.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let mut mask: Vec<bool> = binary.pixels().map(|p| p[0] != 0).collect();
    let mut points: Vec<(i64, i64)> = binary
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0] != 0)
        .map(|(x, y, _)| (x as i64, y as i64))
        .collect();

    let index = |x: i64, y: i64| y as usize * width as usize + x as usize;
    let inside = |x: i64, y: i64| x >= 0 && y >= 0 && x < width as i64 && y < height as i64;

    let mut acc = Accumulator::new(width, height);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut segments = Vec::new();

    while !points.is_empty() {
        let pick = rng.random_range(0..points.len());
        let (px, py) = points.swap_remove(pick);

        // Already consumed by an earlier walk.
        if !mask[index(px, py)] {
            continue;
        }

        let (best_n, best_votes) = acc.vote(px, py);
        if best_votes < threshold as i32 {
            continue;
        }

        let start = Walk::new(px, py, acc.sin[best_n], acc.cos[best_n]);
        let walks = [start, start.reversed()];
        let mut ends = [(px, py); 2];

        for (k, walk) in walks.iter().enumerate() {
            let mut walk = *walk;
            let mut gap = 0;
            loop {
                let (x, y) = walk.pixel();
                if !inside(x, y) {
                    break;
                }
                if mask[index(x, y)] {
                    gap = 0;
                    ends[k] = (x, y);
                } else {
                    gap += 1;
                    if gap > max_line_gap {
                        break;
                    }
                }
                walk.step();
            }
        }

        let long_enough = (ends[1].0 - ends[0].0).abs() >= min_line_length as i64
            || (ends[1].1 - ends[0].1).abs() >= min_line_length as i64;

        for (k, walk) in walks.iter().enumerate() {
            let mut walk = *walk;
            loop {
                let (x, y) = walk.pixel();
                if !inside(x, y) {
                    break;
                }
                let idx = index(x, y);
                if mask[idx] {
                    if long_enough {
                        acc.unvote(x, y);
                    }
                    mask[idx] = false;
                }
                if (x, y) == ends[k] {
                    break;
                }
                walk.step();
            }
        }

        if long_enough {
            segments.push(Segment {
                x1: ends[0].0 as i32,
                y1: ends[0].1 as i32,
                x2: ends[1].0 as i32,
                y2: ends[1].1 as i32,
            });
        }
    }

    segments
}

/// Paint `segment` as background, shifted by up to `thickness / 2` pixels
/// along both axes.
///
/// A thickness of 2 clears a 3 px band, which covers both rows of a 2 px
/// printed rule whichever row the detector walked.
pub fn erase_segment(patch: &mut GrayImage, segment: &Segment, thickness: u32) {
    let radius = (thickness / 2) as i32;
    for oy in -radius..=radius {
        for ox in -radius..=radius {
            draw_line_segment_mut(
                patch,
                ((segment.x1 + ox) as f32, (segment.y1 + oy) as f32),
                ((segment.x2 + ox) as f32, (segment.y2 + oy) as f32),
                Luma([0u8]),
            );
        }
    }
}

/// Erase the gridlines `config` targets from a binary patch.
///
/// Detection runs on the opened patch; erasure happens on a copy of the
/// input. Returns the cleaned patch and the segments that were erased.
pub fn remove_lines(
    binary: &GrayImage,
    config: &LineRemovalConfig,
    thickness: u32,
) -> (GrayImage, Vec<Segment>) {
    let structure = open(binary, config.kernel, config.iterations);
    let candidates = detect_segments(
        &structure,
        config.vote_threshold,
        config.min_line_length,
        config.max_line_gap,
        config.seed,
    );

    let mut cleaned = binary.clone();
    let mut erased = Vec::new();
    for segment in candidates {
        if config.accepts(&segment) {
            erase_segment(&mut cleaned, &segment, thickness);
            erased.push(segment);
        } else {
            trace!(
                orientation = config.orientation.as_str(),
                angle = segment.angle_degrees(),
                "Segment outside angle band kept"
            );
        }
    }

    (cleaned, erased)
}
