use image::GrayImage;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::trace;

use crate::error::{FormError, Result};
use crate::models::BoundingBox;

/// Data that flows through the pipeline
/// Each PatchData is one catalog region's patch, owned by a single extraction
#[derive(Debug, Clone)]
pub struct PatchData {
    /// Position of the region in its catalog
    pub index: usize,

    pub label: String,

    /// Clipped rectangle in the aligned image
    pub bbox: BoundingBox,

    /// Current state of the patch (grayscale, then binary once thresholded)
    pub patch: GrayImage,

    /// Counters recorded by the steps (e.g. "specks_removed")
    pub counts: HashMap<String, i64>,
}

impl PatchData {
    pub fn new(index: usize, label: impl Into<String>, bbox: BoundingBox, patch: GrayImage) -> Self {
        Self {
            index,
            label: label.into(),
            bbox,
            patch,
            counts: HashMap::new(),
        }
    }

    /// Replace the patch, keeping identity and counters
    pub fn with_patch(mut self, patch: GrayImage) -> Self {
        self.patch = patch;
        self
    }

    /// Overwrite a counter
    pub fn with_count(mut self, key: impl Into<String>, value: i64) -> Self {
        self.counts.insert(key.into(), value);
        self
    }

    /// Add `amount` to a counter, starting from zero
    pub fn add_count(mut self, key: &str, amount: i64) -> Self {
        *self.counts.entry(key.to_string()).or_insert(0) += amount;
        self
    }

    /// Counter value, zero if no step recorded it
    pub fn count(&self, key: &str) -> i64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// File name used for this patch in debug output, e.g. "03_checkbox_a.png"
    pub fn debug_filename(&self) -> String {
        let label: String = self
            .label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        format!("{:02}_{}.png", self.index, label)
    }
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

/// Context available to all pipeline steps
#[derive(Clone, Debug, Default)]
pub struct PipelineContext {
    pub debug: Option<DebugConfig>,
}

/// Trait that all pipeline steps must implement
///
/// A step consumes the patch and returns the transformed one; nothing is
/// shared between regions, so the same pipeline can run on many patches at once.
pub trait PipelineStep: Send + Sync {
    fn process(&self, data: PatchData, context: &PipelineContext) -> Result<PatchData>;

    /// Human-readable name for this step (used in logs and debug directory names)
    fn name(&self) -> &str;
}

/// Composable pipeline builder
#[derive(Clone, Default)]
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
}

impl Pipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        if output_dir.exists() {
            let mut entries = std::fs::read_dir(&output_dir)?;
            if entries.next().is_some() {
                return Err(FormError::InvalidConfig(format!(
                    "debug directory is not empty: {}",
                    output_dir.display()
                )));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.context.debug = Some(DebugConfig { output_dir });
        Ok(self)
    }

    /// Add a processing step to the pipeline
    pub fn add_step(mut self, step: impl PipelineStep + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order on one patch
    pub fn run(&self, data: PatchData) -> Result<PatchData> {
        self.save_debug(&data, "00_input")?;

        let mut data = data;
        for (step_idx, step) in self.steps.iter().enumerate() {
            data = step.process(data, &self.context)?;
            trace!(region = %data.label, step = step.name(), "Step complete");

            let step_dir = format!(
                "{:02}_{}",
                step_idx + 1,
                step.name().to_lowercase().replace(' ', "_")
            );
            self.save_debug(&data, &step_dir)?;
        }

        Ok(data)
    }

    fn save_debug(&self, data: &PatchData, step_dir: &str) -> Result<()> {
        let Some(debug_config) = &self.context.debug else {
            return Ok(());
        };
        if data.patch.width() == 0 || data.patch.height() == 0 {
            return Ok(());
        }

        let dir = debug_config.output_dir.join(step_dir);
        std::fs::create_dir_all(&dir)?;
        data.patch.save(dir.join(data.debug_filename()))?;
        Ok(())
    }
}
