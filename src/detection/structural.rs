//! Structural-noise-filtered presence test.
//!
//! Each region is cut from the grayscale aligned image and cleaned on its
//! own: adaptive binarization, speckle removal, horizontal then vertical
//! gridline removal, and a second speckle pass for the fragments line
//! erasure leaves behind. Whatever foreground survives counts as ink.

use std::path::Path;

use image::RgbImage;
use rayon::prelude::*;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::lines::LineRemovalConfig;
use super::steps::{AdaptiveThresholdStep, GridlineRemovalStep, SpeckleRemovalStep};
use super::{RegionExtractor, preprocessing, region_windows};
use crate::catalog::RegionCatalog;
use crate::error::{FormError, Result};
use crate::models::RegionDecision;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StructuralConfig {
    /// Side of the adaptive threshold neighbourhood; odd, at least 3.
    pub block_size: u32,
    /// How much darker than its neighbourhood a pixel must be to count as ink.
    pub c: i32,
    /// Components below this many pixels are erased as speckle.
    pub min_component_area: u32,
    pub horizontal: LineRemovalConfig,
    pub vertical: LineRemovalConfig,
    pub erase_thickness: u32,
    /// Presence threshold on the surviving foreground count.
    pub threshold: u32,
}

impl Default for StructuralConfig {
    fn default() -> Self {
        Self {
            block_size: 21,
            c: 10,
            min_component_area: 40,
            horizontal: LineRemovalConfig::horizontal(),
            vertical: LineRemovalConfig::vertical(),
            erase_thickness: 2,
            threshold: 0,
        }
    }
}

impl StructuralConfig {
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_min_component_area(mut self, area: u32) -> Self {
        self.min_component_area = area;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size < 3 || self.block_size % 2 == 0 {
            return Err(FormError::InvalidConfig(format!(
                "adaptive block size must be odd and at least 3, got {}",
                self.block_size
            )));
        }
        self.horizontal.validate()?;
        self.vertical.validate()?;
        Ok(())
    }
}

pub struct StructuralExtractor {
    config: StructuralConfig,
    pipeline: Pipeline,
}

impl Default for StructuralExtractor {
    fn default() -> Self {
        let config = StructuralConfig::default();
        let pipeline = cleanup_pipeline(&config);
        Self { config, pipeline }
    }
}

/// The per-region cleanup steps, in order.
fn cleanup_pipeline(config: &StructuralConfig) -> Pipeline {
    Pipeline::new()
        .add_step(AdaptiveThresholdStep {
            block_size: config.block_size,
            c: config.c,
        })
        .add_step(SpeckleRemovalStep {
            min_area: config.min_component_area,
        })
        .add_step(GridlineRemovalStep {
            config: config.horizontal.clone(),
            thickness: config.erase_thickness,
        })
        .add_step(GridlineRemovalStep {
            config: config.vertical.clone(),
            thickness: config.erase_thickness,
        })
        .add_step(SpeckleRemovalStep {
            min_area: config.min_component_area,
        })
}

impl StructuralExtractor {
    pub fn new(config: StructuralConfig) -> Result<Self> {
        config.validate()?;
        let pipeline = cleanup_pipeline(&config);
        Ok(Self { config, pipeline })
    }

    /// Save every region's patch after every cleanup step under `dir`.
    pub fn with_debug(mut self, dir: impl AsRef<Path>) -> Result<Self> {
        self.pipeline = self.pipeline.with_debug(dir.as_ref())?;
        Ok(self)
    }

    pub fn config(&self) -> &StructuralConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

impl RegionExtractor for StructuralExtractor {
    #[instrument(skip_all, fields(extractor = "structural", regions = catalog.len()))]
    fn decide(&self, aligned: &RgbImage, catalog: &RegionCatalog) -> Result<Vec<RegionDecision>> {
        let gray = preprocessing::to_grayscale(aligned);
        let windows = region_windows(catalog, gray.width(), gray.height());

        windows
            .par_iter()
            .map(|window| {
                let ink = if window.bbox.is_empty() {
                    0
                } else {
                    let data = self.pipeline.run(window.patch_data(&gray))?;
                    debug!(
                        region = %data.label,
                        thresholded = data.count("thresholded_pixels"),
                        specks = data.count("specks_removed"),
                        horizontal_lines = data.count("horizontal_lines_erased"),
                        vertical_lines = data.count("vertical_lines_erased"),
                        "Region cleaned"
                    );
                    preprocessing::count_foreground(&data.patch)
                };
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
        "structural"
    }
}
