//! Alignment of a photographed form onto its template.
//!
//! An aligner ingests the template once (grayscale image, keypoints and
//! descriptors) and then maps any number of query photos into the template's
//! pixel frame: detect and describe query features, match them against the
//! template, fit a homography robustly, and warp.

pub mod descriptors;
pub mod homography;
pub mod keypoints;
pub mod matching;

use std::path::Path;

use image::{DynamicImage, GrayImage, RgbImage};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::config::FormConfig;
use crate::error::{FormError, MIN_CORRESPONDENCES, Result};
use descriptors::{BinaryFeatures, GradientFeatures};
use homography::{HomographyFit, RansacConfig, fit_ransac, warp_to_frame};
use keypoints::Keypoint;
use matching::Match;

/// Maps query images into a template's coordinate frame.
pub trait Aligner: Send + Sync {
    /// Warp `query` onto the template. The result has the template's dimensions.
    fn align(&self, query: &DynamicImage) -> Result<RgbImage>;

    /// Template width and height in pixels.
    fn template_dimensions(&self) -> (u32, u32);

    fn name(&self) -> &str;
}

/// Keypoints with one descriptor each, index-aligned.
#[derive(Debug, Clone)]
pub struct Features<D> {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<D>,
}

impl<D> Features<D> {
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// A detection + description + matching strategy.
pub trait FeatureExtractor: Send + Sync {
    type Descriptor: Send + Sync;

    fn name(&self) -> &'static str;

    fn detect_and_compute(&self, gray: &GrayImage) -> Features<Self::Descriptor>;

    /// Accepted correspondences, `query_idx` into `query` and `train_idx` into `template`.
    fn correspond(&self, query: &[Self::Descriptor], template: &[Self::Descriptor]) -> Vec<Match>;
}

/// What an aligner keeps about its template.
#[derive(Debug, Clone)]
pub struct TemplateModel<D> {
    gray: GrayImage,
    features: Features<D>,
}

impl<D> TemplateModel<D> {
    pub fn keypoints(&self) -> &[Keypoint] {
        &self.features.keypoints
    }

    pub fn descriptors(&self) -> &[D] {
        &self.features.descriptors
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.gray.dimensions()
    }
}

/// Result of matching a query against the template, before warping.
#[derive(Debug, Clone)]
pub struct Estimate {
    pub fit: HomographyFit,
    pub query_keypoints: usize,
    pub correspondences: usize,
}

/// Sparse-feature aligner, generic over the feature strategy.
pub struct FeatureAligner<F: FeatureExtractor> {
    features: F,
    template: TemplateModel<F::Descriptor>,
    ransac: RansacConfig,
}

/// Gradient-histogram descriptors, ratio-test matching.
pub type GradientAligner = FeatureAligner<GradientFeatures>;

/// Binary descriptors, Hamming matching with a global keep fraction.
pub type BinaryAligner = FeatureAligner<BinaryFeatures>;

impl<F: FeatureExtractor> FeatureAligner<F> {
    /// Ingest `template` with the given strategy.
    #[instrument(skip_all, fields(extractor = features.name()))]
    pub fn with_features(template: &DynamicImage, features: F, ransac: RansacConfig) -> Result<Self> {
        ransac.validate()?;

        let gray = template.to_luma8();
        let template_features = features.detect_and_compute(&gray);
        info!(
            width = gray.width(),
            height = gray.height(),
            keypoints = template_features.len(),
            "Template ingested"
        );
        if template_features.len() < MIN_CORRESPONDENCES {
            warn!(
                keypoints = template_features.len(),
                "Template has too few features; every alignment will fail"
            );
        }

        Ok(Self {
            features,
            template: TemplateModel {
                gray,
                features: template_features,
            },
            ransac,
        })
    }

    pub fn template(&self) -> &TemplateModel<F::Descriptor> {
        &self.template
    }

    /// Match `query` against the template and fit the query-to-template homography.
    #[instrument(skip_all, fields(extractor = self.features.name()))]
    pub fn estimate(&self, query: &DynamicImage) -> Result<Estimate> {
        let gray = query.to_luma8();
        let query_features = self.features.detect_and_compute(&gray);
        let matches = self
            .features
            .correspond(&query_features.descriptors, self.template.descriptors());
        debug!(
            query_keypoints = query_features.len(),
            correspondences = matches.len(),
            "Descriptors matched"
        );

        if matches.len() < MIN_CORRESPONDENCES {
            return Err(FormError::InsufficientCorrespondences {
                found: matches.len(),
                required: MIN_CORRESPONDENCES,
            });
        }

        let mut query_pts = Vec::with_capacity(matches.len());
        let mut template_pts = Vec::with_capacity(matches.len());
        for m in &matches {
            let q = &query_features.keypoints[m.query_idx];
            let t = &self.template.keypoints()[m.train_idx];
            query_pts.push([q.x as f64, q.y as f64]);
            template_pts.push([t.x as f64, t.y as f64]);
        }

        let fit = fit_ransac(&query_pts, &template_pts, &self.ransac)?;
        Ok(Estimate {
            fit,
            query_keypoints: query_features.len(),
            correspondences: matches.len(),
        })
    }
}

impl<F: FeatureExtractor> Aligner for FeatureAligner<F> {
    #[instrument(skip_all, fields(extractor = self.features.name()))]
    fn align(&self, query: &DynamicImage) -> Result<RgbImage> {
        let estimate = self.estimate(query)?;
        let (width, height) = self.template.dimensions();
        let aligned = warp_to_frame(&query.to_rgb8(), &estimate.fit.matrix, width, height)?;
        info!(
            correspondences = estimate.correspondences,
            inliers = estimate.fit.inliers,
            "Query aligned to template"
        );
        Ok(aligned)
    }

    fn template_dimensions(&self) -> (u32, u32) {
        self.template.dimensions()
    }

    fn name(&self) -> &str {
        self.features.name()
    }
}

impl GradientAligner {
    pub fn new(template: &DynamicImage) -> Result<Self> {
        Self::with_features(template, GradientFeatures::default(), RansacConfig::default())
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(&image::open(path)?)
    }
}

impl BinaryAligner {
    pub fn new(template: &DynamicImage) -> Result<Self> {
        Self::with_features(template, BinaryFeatures::default(), RansacConfig::default())
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(&image::open(path)?)
    }
}

/// Aligner variants selectable from configuration or the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AlignerKind {
    #[default]
    Gradient,
    Binary,
}

/// Build the requested aligner over `template`.
pub fn build_aligner(
    kind: AlignerKind,
    template: &DynamicImage,
    config: &FormConfig,
) -> Result<Box<dyn Aligner>> {
    Ok(match kind {
        AlignerKind::Gradient => Box::new(FeatureAligner::with_features(
            template,
            GradientFeatures::new(config.gradient.clone())?,
            config.ransac.clone(),
        )?),
        AlignerKind::Binary => Box::new(FeatureAligner::with_features(
            template,
            BinaryFeatures::new(config.binary.clone())?,
            config.ransac.clone(),
        )?),
    })
}
