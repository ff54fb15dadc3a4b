//! Error types for form reading.

use thiserror::Error;

/// Minimum number of point correspondences a projective transform needs.
pub const MIN_CORRESPONDENCES: usize = 4;

/// Errors raised while loading a catalog, aligning a form, or reading regions.
#[derive(Debug, Error)]
pub enum FormError {
    /// The region catalog could not be parsed or lacks shape/label fields.
    #[error("malformed region catalog: {0}")]
    MalformedCatalog(String),

    /// Too few descriptor matches survived filtering to estimate a homography.
    #[error("insufficient correspondences: found {found}, need at least {required}")]
    InsufficientCorrespondences { found: usize, required: usize },

    /// The robust estimator found no consensus transform.
    #[error("alignment failed: {0}")]
    AlignmentFailed(String),

    /// A configuration value is outside its valid domain.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FormError>;
