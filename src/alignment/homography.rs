//! Projective transform estimation and warping.
//!
//! - Direct Linear Transform from >= 4 correspondences, with Hartley
//!   normalisation of both point sets.
//! - Seeded RANSAC with adaptive termination and a final refit on all inliers.
//! - Warping of a query image into the template frame.

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use nalgebra::{DMatrix, Matrix3, SymmetricEigen, Vector3};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use serde::Deserialize;
use tracing::debug;

use crate::error::{FormError, MIN_CORRESPONDENCES, Result};

/// Fill for template pixels that have no source pixel in the query.
pub const PAPER_WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Twice the triangle area below which three sample points count as collinear.
const COLLINEAR_EPS: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    pub max_iters: usize,
    /// Reprojection error (px) under which a correspondence is an inlier.
    pub reprojection_threshold: f64,
    /// Probability of drawing at least one all-inlier sample; drives early exit.
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            reprojection_threshold: 3.0,
            confidence: 0.995,
            seed: 0,
        }
    }
}

impl RansacConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iters == 0 {
            return Err(FormError::InvalidConfig("RANSAC needs at least one iteration".into()));
        }
        if self.reprojection_threshold <= 0.0 {
            return Err(FormError::InvalidConfig(format!(
                "reprojection threshold must be positive, got {}",
                self.reprojection_threshold
            )));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(FormError::InvalidConfig(format!(
                "RANSAC confidence must be in (0, 1), got {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// A fitted homography and the support it found.
#[derive(Debug, Clone)]
pub struct HomographyFit {
    /// Maps query pixel coordinates to template pixel coordinates.
    pub matrix: Matrix3<f64>,
    pub inlier_mask: Vec<bool>,
    pub inliers: usize,
    pub iterations: usize,
}

/// Apply `h` to a point.
pub fn project(h: &Matrix3<f64>, x: f64, y: f64) -> [f64; 2] {
    let p = h * Vector3::new(x, y, 1.0);
    if p[2].abs() < 1e-15 {
        return [f64::NAN, f64::NAN];
    }
    [p[0] / p[2], p[1] / p[2]]
}

pub fn reprojection_error(h: &Matrix3<f64>, src: &[f64; 2], dst: &[f64; 2]) -> f64 {
    let p = project(h, src[0], src[1]);
    let dx = p[0] - dst[0];
    let dy = p[1] - dst[1];
    (dx * dx + dy * dy).sqrt()
}

/// Translate the centroid to the origin and scale to mean distance sqrt(2).
fn normalize_points(pts: &[[f64; 2]]) -> (Matrix3<f64>, Vec<[f64; 2]>) {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p[1]).sum::<f64>() / n;
    let mean_dist = pts
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = pts.iter().map(|p| [s * (p[0] - cx), s * (p[1] - cy)]).collect();
    (t, normalized)
}

/// Homography `H` with `dst ~ H * src`, least squares over all points.
pub fn estimate_dlt(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Result<Matrix3<f64>> {
    let n = src.len().min(dst.len());
    if n < MIN_CORRESPONDENCES {
        return Err(FormError::InsufficientCorrespondences {
            found: n,
            required: MIN_CORRESPONDENCES,
        });
    }
    if src.len() != dst.len() {
        return Err(FormError::AlignmentFailed(
            "source and destination point lists differ in length".into(),
        ));
    }

    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    let mut a = DMatrix::zeros(2 * n, 9);
    for i in 0..n {
        let [sx, sy] = src_n[i];
        let [dx, dy] = dst_n[i];

        a[(2 * i, 3)] = -sx;
        a[(2 * i, 4)] = -sy;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = dy * sx;
        a[(2 * i, 7)] = dy * sy;
        a[(2 * i, 8)] = dy;

        a[(2 * i + 1, 0)] = sx;
        a[(2 * i + 1, 1)] = sy;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -dx * sx;
        a[(2 * i + 1, 7)] = -dx * sy;
        a[(2 * i + 1, 8)] = -dx;
    }

    // h is the eigenvector of A^T A with the smallest eigenvalue.
    let ata = a.transpose() * &a;
    let eig = SymmetricEigen::new(ata);
    let mut min_idx = 0;
    for i in 1..9 {
        if eig.eigenvalues[i].abs() < eig.eigenvalues[min_idx].abs() {
            min_idx = i;
        }
    }
    let h = eig.eigenvectors.column(min_idx);
    let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| FormError::AlignmentFailed("degenerate destination points".into()))?;
    let h = t_dst_inv * h_norm * t_src;

    let scale = h[(2, 2)];
    let h = if scale.abs() > 1e-15 { h / scale } else { h };
    if !is_usable(&h) {
        return Err(FormError::AlignmentFailed("singular transform".into()));
    }
    Ok(h)
}

fn is_usable(h: &Matrix3<f64>) -> bool {
    h.iter().all(|v| v.is_finite()) && h.determinant().abs() > 1e-12
}

fn has_collinear_triple(pts: &[[f64; 2]]) -> bool {
    let n = pts.len();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let [ax, ay] = pts[i];
                let [bx, by] = pts[j];
                let [cx, cy] = pts[k];
                let cross = (bx - ax) * (cy - ay) - (by - ay) * (cx - ax);
                if cross.abs() < COLLINEAR_EPS {
                    return true;
                }
            }
        }
    }
    false
}

/// Iterations needed to reach `confidence` at the given inlier ratio.
fn required_iterations(confidence: f64, inlier_ratio: f64, max_iters: usize) -> usize {
    let all_inliers = inlier_ratio.powi(MIN_CORRESPONDENCES as i32);
    if all_inliers >= 1.0 {
        return 0;
    }
    if all_inliers <= 0.0 {
        return max_iters;
    }
    let needed = (1.0 - confidence).ln() / (1.0 - all_inliers).ln();
    if needed.is_finite() {
        (needed.ceil() as usize).min(max_iters)
    } else {
        max_iters
    }
}

/// Outlier-tolerant homography fit mapping `src` onto `dst`.
pub fn fit_ransac(src: &[[f64; 2]], dst: &[[f64; 2]], config: &RansacConfig) -> Result<HomographyFit> {
    let n = src.len().min(dst.len());
    if n < MIN_CORRESPONDENCES {
        return Err(FormError::InsufficientCorrespondences {
            found: n,
            required: MIN_CORRESPONDENCES,
        });
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<(Matrix3<f64>, Vec<bool>, usize)> = None;
    let mut iteration_budget = config.max_iters;
    let mut iterations = 0;

    while iterations < iteration_budget {
        iterations += 1;

        let sample = index::sample(&mut rng, n, MIN_CORRESPONDENCES);
        let s4: Vec<[f64; 2]> = sample.iter().map(|i| src[i]).collect();
        let d4: Vec<[f64; 2]> = sample.iter().map(|i| dst[i]).collect();
        if has_collinear_triple(&s4) || has_collinear_triple(&d4) {
            continue;
        }

        let h = match estimate_dlt(&s4, &d4) {
            Ok(h) => h,
            Err(_) => continue,
        };

        let mask: Vec<bool> = (0..n)
            .map(|i| reprojection_error(&h, &src[i], &dst[i]) < config.reprojection_threshold)
            .collect();
        let count = mask.iter().filter(|&&inlier| inlier).count();

        if best.as_ref().is_none_or(|(_, _, best_count)| count > *best_count) {
            iteration_budget = required_iterations(config.confidence, count as f64 / n as f64, config.max_iters)
                .max(iterations);
            best = Some((h, mask, count));
        }
    }

    let (best_h, mask, count) = best.ok_or_else(|| {
        FormError::AlignmentFailed(format!(
            "no non-degenerate sample among {n} correspondences"
        ))
    })?;
    if count < MIN_CORRESPONDENCES {
        return Err(FormError::AlignmentFailed(format!(
            "consensus too small: {count} inliers of {n} correspondences"
        )));
    }

    let inlier_src: Vec<[f64; 2]> = (0..n).filter(|&i| mask[i]).map(|i| src[i]).collect();
    let inlier_dst: Vec<[f64; 2]> = (0..n).filter(|&i| mask[i]).map(|i| dst[i]).collect();
    let matrix = estimate_dlt(&inlier_src, &inlier_dst).unwrap_or(best_h);

    debug!(inliers = count, correspondences = n, iterations, "RANSAC converged");
    Ok(HomographyFit {
        matrix,
        inlier_mask: mask,
        inliers: count,
        iterations,
    })
}

/// Resample `query` into a `width` x `height` frame through `h`.
pub fn warp_to_frame(query: &RgbImage, h: &Matrix3<f64>, width: u32, height: u32) -> Result<RgbImage> {
    let mut transform = [0.0f32; 9];
    for row in 0..3 {
        for col in 0..3 {
            transform[row * 3 + col] = h[(row, col)] as f32;
        }
    }
    let projection = Projection::from_matrix(transform)
        .ok_or_else(|| FormError::AlignmentFailed("transform is not invertible".into()))?;

    let mut aligned = RgbImage::new(width, height);
    warp_into(query, &projection, Interpolation::Bilinear, PAPER_WHITE, &mut aligned);
    Ok(aligned)
}
