pub mod alignment;
pub mod catalog;
pub mod config;
pub mod detection;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod reader;

pub use alignment::{Aligner, AlignerKind, BinaryAligner, FeatureAligner, GradientAligner, build_aligner};
pub use catalog::{Region, RegionCatalog, RegionShape};
pub use config::FormConfig;
pub use detection::{
    EdgeDensityExtractor, ExtractorKind, RegionExtractor, StructuralExtractor, build_extractor,
};
pub use error::{FormError, Result};
pub use models::{BoundingBox, RegionDecision};
pub use pipeline::{DebugConfig, PatchData, Pipeline, PipelineContext, PipelineStep};
pub use reader::{FormReader, Reading, run};
