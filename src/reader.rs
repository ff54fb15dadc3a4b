//! Reading a filled form: align the photo, then decide every region.

use std::path::Path;

use image::{DynamicImage, RgbImage};
use tracing::{info, instrument};

use crate::alignment::{Aligner, GradientAligner};
use crate::catalog::RegionCatalog;
use crate::detection::{RegionExtractor, StructuralExtractor};
use crate::error::Result;
use crate::models::RegionDecision;

/// Everything learned from one query image.
#[derive(Debug, Clone)]
pub struct Reading {
    /// The query warped into the template frame.
    pub aligned: RgbImage,
    /// One decision per catalog region, in catalog order.
    pub decisions: Vec<RegionDecision>,
}

impl Reading {
    pub fn labels(&self) -> Vec<String> {
        self.decisions
            .iter()
            .filter(|d| d.present)
            .map(|d| d.label.clone())
            .collect()
    }
}

/// One aligner and one extractor over a fixed catalog.
///
/// Reusable across any number of query images; nothing is mutated after
/// construction.
pub struct FormReader {
    aligner: Box<dyn Aligner>,
    extractor: Box<dyn RegionExtractor>,
    catalog: RegionCatalog,
}

impl FormReader {
    pub fn new(aligner: Box<dyn Aligner>, extractor: Box<dyn RegionExtractor>, catalog: RegionCatalog) -> Self {
        Self {
            aligner,
            extractor,
            catalog,
        }
    }

    /// Gradient aligner with the structural extractor, both at their defaults.
    pub fn from_paths(template_path: impl AsRef<Path>, catalog_path: impl AsRef<Path>) -> Result<Self> {
        let catalog = RegionCatalog::load(catalog_path)?;
        let aligner = GradientAligner::open(template_path)?;
        Ok(Self::new(
            Box::new(aligner),
            Box::new(StructuralExtractor::default()),
            catalog,
        ))
    }

    pub fn aligner(&self) -> &dyn Aligner {
        self.aligner.as_ref()
    }

    pub fn extractor(&self) -> &dyn RegionExtractor {
        self.extractor.as_ref()
    }

    pub fn catalog(&self) -> &RegionCatalog {
        &self.catalog
    }

    /// Align `query` and decide every region, keeping the aligned image.
    #[instrument(skip_all, fields(aligner = self.aligner.name(), extractor = self.extractor.name()))]
    pub fn inspect(&self, query: &DynamicImage) -> Result<Reading> {
        let aligned = self.aligner.align(query)?;
        let decisions = self.extractor.decide(&aligned, &self.catalog)?;
        info!(
            regions = decisions.len(),
            present = decisions.iter().filter(|d| d.present).count(),
            "Form read"
        );
        Ok(Reading { aligned, decisions })
    }

    /// Labels of the marked regions of `query`, in catalog order.
    pub fn read(&self, query: &DynamicImage) -> Result<Vec<String>> {
        Ok(self.inspect(query)?.labels())
    }

    pub fn read_path(&self, query_path: impl AsRef<Path>) -> Result<Vec<String>> {
        let query = image::open(query_path)?;
        self.read(&query)
    }
}

/// Read one query image against a template and its catalog.
#[instrument(skip_all, fields(query = %query_path.as_ref().display()))]
pub fn run(
    query_path: impl AsRef<Path>,
    template_path: impl AsRef<Path>,
    catalog_path: impl AsRef<Path>,
) -> Result<Vec<String>> {
    FormReader::from_paths(template_path, catalog_path)?.read_path(query_path)
}
