//! Tunables for every stage, loadable from a JSON file.
//!
//! Any subset may be given; missing sections and fields keep their defaults.
//!
//! ```json
//! {"ransac": {"seed": 7}, "structural": {"threshold": 25}}
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::alignment::descriptors::{BinaryConfig, GradientConfig};
use crate::alignment::homography::RansacConfig;
use crate::detection::{EdgeDensityConfig, StructuralConfig};
use crate::error::{FormError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    pub gradient: GradientConfig,
    pub binary: BinaryConfig,
    pub ransac: RansacConfig,
    pub edge_density: EdgeDensityConfig,
    pub structural: StructuralConfig,
}

impl FormConfig {
    #[instrument(fields(path = %path.as_ref().display()), skip(path))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            FormError::InvalidConfig(format!("cannot open {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            FormError::InvalidConfig(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        debug!("Configuration loaded");
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| FormError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.gradient.validate()?;
        self.binary.validate()?;
        self.ransac.validate()?;
        self.edge_density.validate()?;
        self.structural.validate()?;
        Ok(())
    }
}
