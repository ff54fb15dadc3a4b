//! Per-region mark detection on aligned images.

pub mod contours;
pub mod edge_density;
pub mod lines;
pub mod morphology;
pub mod preprocessing;
pub mod steps;
pub mod structural;

use std::path::Path;

use image::{GrayImage, RgbImage};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::catalog::{Region, RegionCatalog};
use crate::config::FormConfig;
use crate::error::Result;
use crate::models::{BoundingBox, RegionDecision};
use crate::pipeline::PatchData;

pub use edge_density::{EdgeDensityConfig, EdgeDensityExtractor};
pub use structural::{StructuralConfig, StructuralExtractor};

/// Decides which catalog regions of an aligned image carry a mark.
pub trait RegionExtractor: Send + Sync {
    /// One decision per catalog region, in catalog order.
    fn decide(&self, aligned: &RgbImage, catalog: &RegionCatalog) -> Result<Vec<RegionDecision>>;

    /// Labels of the regions judged present, in catalog order.
    fn extract(&self, aligned: &RgbImage, catalog: &RegionCatalog) -> Result<Vec<String>> {
        Ok(self
            .decide(aligned, catalog)?
            .into_iter()
            .filter(|d| d.present)
            .map(|d| d.label)
            .collect())
    }

    /// A region is present when its ink count is strictly greater than this.
    fn threshold(&self) -> u32;

    fn name(&self) -> &str;
}

/// A catalog region intersected with the aligned image.
#[derive(Debug, Clone)]
pub struct RegionWindow<'a> {
    pub index: usize,
    pub region: &'a Region,
    pub bbox: BoundingBox,
    pub clipped: bool,
}

impl RegionWindow<'_> {
    /// Copy this window out of `image` as the input of a cleanup pipeline.
    pub fn patch_data(&self, image: &GrayImage) -> PatchData {
        let b = self.bbox;
        let patch = image::imageops::crop_imm(image, b.x, b.y, b.width, b.height).to_image();
        PatchData::new(self.index, self.region.label.clone(), b, patch)
    }
}

/// Clip every region of `catalog` to a `width` x `height` image.
///
/// Regions that spill over the edge are cut down to the visible part and
/// reported with a warning, since that means the catalog does not fit the
/// template.
pub fn region_windows(catalog: &RegionCatalog, width: u32, height: u32) -> Vec<RegionWindow<'_>> {
    let windows: Vec<RegionWindow<'_>> = catalog
        .iter()
        .enumerate()
        .map(|(index, region)| {
            let (bbox, clipped) = region.shape.clip_to(width, height);
            if clipped {
                warn!(
                    region = %region.label,
                    x = region.shape.x,
                    y = region.shape.y,
                    width = region.shape.width,
                    height = region.shape.height,
                    image_width = width,
                    image_height = height,
                    "Region exceeds image bounds, clipping"
                );
            }
            RegionWindow {
                index,
                region,
                bbox,
                clipped,
            }
        })
        .collect();

    let clipped = windows.iter().filter(|w| w.clipped).count();
    if clipped > 0 {
        debug!(clipped, total = windows.len(), "Regions clipped to image");
    }
    windows
}

impl RegionDecision {
    /// Strict greater-than presence test.
    pub fn from_count(label: impl Into<String>, ink_pixels: u32, threshold: u32, clipped: bool) -> Self {
        Self {
            label: label.into(),
            ink_pixels,
            present: ink_pixels > threshold,
            clipped,
        }
    }
}

/// Extractor variants selectable from configuration or the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractorKind {
    #[default]
    Structural,
    EdgeDensity,
}

/// Build the requested extractor.
///
/// `threshold` overrides the configured presence threshold; `debug_out`
/// receives the intermediate patch of every region at every step.
pub fn build_extractor(
    kind: ExtractorKind,
    config: &FormConfig,
    threshold: Option<u32>,
    debug_out: Option<&Path>,
) -> Result<Box<dyn RegionExtractor>> {
    Ok(match kind {
        ExtractorKind::Structural => {
            let mut cfg = config.structural.clone();
            if let Some(t) = threshold {
                cfg.threshold = t;
            }
            let mut extractor = StructuralExtractor::new(cfg)?;
            if let Some(dir) = debug_out {
                extractor = extractor.with_debug(dir)?;
            }
            Box::new(extractor)
        }
        ExtractorKind::EdgeDensity => {
            let mut cfg = config.edge_density.clone();
            if let Some(t) = threshold {
                cfg.threshold = t;
            }
            let mut extractor = EdgeDensityExtractor::new(cfg)?;
            if let Some(dir) = debug_out {
                extractor = extractor.with_debug(dir)?;
            }
            Box::new(extractor)
        }
    })
}
