//! Edge-density presence test.
//!
//! The whole aligned image is turned into an edge map once; each region's
//! score is the number of edge pixels inside its rectangle. Cheap, but any
//! printed border inside a region counts as ink.

use std::path::Path;

use image::{GrayImage, RgbImage};
use rayon::prelude::*;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{RegionExtractor, preprocessing, region_windows};
use crate::catalog::RegionCatalog;
use crate::error::{FormError, Result};
use crate::models::RegionDecision;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EdgeDensityConfig {
    /// Gaussian sigma applied before binarization (≈ a 5x5 kernel).
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Presence threshold on the edge pixel count.
    pub threshold: u32,
}

impl Default for EdgeDensityConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.1,
            canny_low: 220.0,
            canny_high: 250.0,
            threshold: 90,
        }
    }
}

impl EdgeDensityConfig {
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.blur_sigma.is_nan() || self.blur_sigma <= 0.0 {
            return Err(FormError::InvalidConfig(format!(
                "edge blur sigma must be positive, got {}",
                self.blur_sigma
            )));
        }
        if self.canny_low < 0.0 || self.canny_low > self.canny_high {
            return Err(FormError::InvalidConfig(format!(
                "canny thresholds must satisfy 0 <= low <= high, got {} and {}",
                self.canny_low, self.canny_high
            )));
        }
        Ok(())
    }
}

pub struct EdgeDensityExtractor {
    config: EdgeDensityConfig,
    // No cleanup steps; only used to dump region crops in debug mode.
    pipeline: Pipeline,
}

impl Default for EdgeDensityExtractor {
    fn default() -> Self {
        Self {
            config: EdgeDensityConfig::default(),
            pipeline: Pipeline::new(),
        }
    }
}

impl EdgeDensityExtractor {
    pub fn new(config: EdgeDensityConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            pipeline: Pipeline::new(),
        })
    }

    /// Save each region's edge crop under `dir`.
    pub fn with_debug(mut self, dir: impl AsRef<Path>) -> Result<Self> {
        self.pipeline = self.pipeline.with_debug(dir.as_ref())?;
        Ok(self)
    }

    pub fn config(&self) -> &EdgeDensityConfig {
        &self.config
    }

    /// Blur, binarize at the Otsu level, then trace edges.
    pub fn edge_map(&self, aligned: &RgbImage) -> GrayImage {
        let gray = preprocessing::to_grayscale(aligned);
        let blurred = preprocessing::apply_blur(&gray, self.config.blur_sigma);
        let binary = preprocessing::binarize_otsu(&blurred);
        preprocessing::detect_edges(&binary, self.config.canny_low, self.config.canny_high)
    }
}

impl RegionExtractor for EdgeDensityExtractor {
    #[instrument(skip_all, fields(extractor = "edge-density", regions = catalog.len()))]
    fn decide(&self, aligned: &RgbImage, catalog: &RegionCatalog) -> Result<Vec<RegionDecision>> {
        let edges = self.edge_map(aligned);
        let windows = region_windows(catalog, edges.width(), edges.height());

        windows
            .par_iter()
            .map(|window| {
                let data = self.pipeline.run(window.patch_data(&edges))?;
                let ink = preprocessing::count_foreground(&data.patch);
                let decision =
                    RegionDecision::from_count(&window.region.label, ink, self.config.threshold, window.clipped);
                debug!(region = %decision.label, ink, present = decision.present, "Region scored");
                Ok(decision)
            })
            .collect()
    }

    fn threshold(&self) -> u32 {
        self.config.threshold
    }

    fn name(&self) -> &str {
        "edge-density"
    }
}
