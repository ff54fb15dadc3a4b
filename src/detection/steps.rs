use crate::detection::lines::{LineOrientation, LineRemovalConfig, remove_lines};
use crate::detection::{contours, preprocessing};
use crate::error::Result;
use crate::pipeline::{PatchData, PipelineContext, PipelineStep};
use tracing::trace;

/// Inverted adaptive binarization: ink becomes foreground
pub struct AdaptiveThresholdStep {
    pub block_size: u32,
    pub c: i32,
}

impl PipelineStep for AdaptiveThresholdStep {
    fn process(&self, data: PatchData, _context: &PipelineContext) -> Result<PatchData> {
        let binary = preprocessing::adaptive_threshold_inverted(&data.patch, self.block_size, self.c);
        let foreground = preprocessing::count_foreground(&binary);
        Ok(data
            .with_patch(binary)
            .with_count("thresholded_pixels", foreground as i64))
    }

    fn name(&self) -> &str {
        "Adaptive Threshold"
    }
}

/// Erase connected components below a minimum area
pub struct SpeckleRemovalStep {
    pub min_area: u32,
}

impl PipelineStep for SpeckleRemovalStep {
    fn process(&self, data: PatchData, _context: &PipelineContext) -> Result<PatchData> {
        let (cleaned, removed) = contours::remove_small_components(&data.patch, self.min_area);
        if !removed.is_empty() {
            trace!(region = %data.label, specks = removed.len(), "Specks erased");
        }
        Ok(data
            .with_patch(cleaned)
            .add_count("specks_removed", removed.len() as i64))
    }

    fn name(&self) -> &str {
        "Speckle Removal"
    }
}

/// Find printed gridlines of one orientation and paint them out
pub struct GridlineRemovalStep {
    pub config: LineRemovalConfig,
    pub thickness: u32,
}

impl PipelineStep for GridlineRemovalStep {
    fn process(&self, data: PatchData, _context: &PipelineContext) -> Result<PatchData> {
        let (cleaned, erased) = remove_lines(&data.patch, &self.config, self.thickness);
        if !erased.is_empty() {
            trace!(
                region = %data.label,
                orientation = self.config.orientation.as_str(),
                segments = erased.len(),
                "Gridlines erased"
            );
        }
        let key = format!("{}_lines_erased", self.config.orientation.as_str());
        Ok(data
            .with_patch(cleaned)
            .add_count(&key, erased.len() as i64))
    }

    fn name(&self) -> &str {
        match self.config.orientation {
            LineOrientation::Horizontal => "Horizontal Gridline Removal",
            LineOrientation::Vertical => "Vertical Gridline Removal",
        }
    }
}
