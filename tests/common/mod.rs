#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from formmark for tests
pub use formmark::{
    BoundingBox, FormError, Region, RegionCatalog, RegionDecision, RegionExtractor, RegionShape,
};
