//! Region catalog: the labelled rectangles of a form template.
//!
//! Catalogs are read from the annotation export used when the template was
//! marked up:
//!
//! ```json
//! {"data": {"regions": [
//!   {"shape_attributes": {"name": "rect", "x": 10, "y": 10, "width": 50, "height": 20},
//!    "region_attributes": {"type": "checkbox_A"}}
//! ]}}
//! ```
//!
//! The `type` region attribute is the label emitted when the region holds a
//! mark. Coordinates are in template pixels and only make sense on an image
//! that has been aligned to the template.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::{FormError, Result};
use crate::models::BoundingBox;

/// Rectangle in template pixel space. The origin may be negative or the
/// extent may run past the template edge; [`RegionShape::clip_to`] handles both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RegionShape {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl RegionShape {
    pub fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Intersect with a `width` x `height` image.
    ///
    /// Returns the visible part (possibly empty) and whether anything was cut off.
    pub fn clip_to(&self, width: u32, height: u32) -> (BoundingBox, bool) {
        let x0 = self.x.clamp(0, width as i64);
        let y0 = self.y.clamp(0, height as i64);
        let x1 = (self.x + self.width as i64).clamp(0, width as i64);
        let y1 = (self.y + self.height as i64).clamp(0, height as i64);

        let bbox = BoundingBox {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0).max(0) as u32,
            height: (y1 - y0).max(0) as u32,
        };
        let clipped = bbox.width != self.width || bbox.height != self.height;
        (bbox, clipped)
    }
}

/// One labelled region of the template.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub shape: RegionShape,
    pub label: String,
    /// Every region attribute from the annotation, `type` included.
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Region {
    pub fn new(label: impl Into<String>, shape: RegionShape) -> Self {
        let label = label.into();
        let mut attributes = BTreeMap::new();
        attributes.insert("type".to_string(), serde_json::Value::String(label.clone()));
        Self {
            shape,
            label,
            attributes,
        }
    }
}

/// Ordered, immutable list of regions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionCatalog {
    regions: Vec<Region>,
}

#[derive(Deserialize)]
struct AnnotationFile {
    data: AnnotationData,
}

#[derive(Deserialize)]
struct AnnotationData {
    regions: Vec<AnnotatedRegion>,
}

#[derive(Deserialize)]
struct AnnotatedRegion {
    shape_attributes: ShapeAttributes,
    region_attributes: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct ShapeAttributes {
    #[serde(default)]
    name: Option<String>,
    #[serde(flatten)]
    rect: RegionShape,
}

impl RegionCatalog {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }

    /// Load a catalog from an annotation file on disk.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let file: AnnotationFile = serde_json::from_reader(reader)
            .map_err(|e| FormError::MalformedCatalog(e.to_string()))?;
        Self::from_annotations(file)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: AnnotationFile = serde_json::from_str(json)
            .map_err(|e| FormError::MalformedCatalog(e.to_string()))?;
        Self::from_annotations(file)
    }

    fn from_annotations(file: AnnotationFile) -> Result<Self> {
        let mut regions = Vec::with_capacity(file.data.regions.len());

        for (index, entry) in file.data.regions.into_iter().enumerate() {
            if let Some(name) = entry.shape_attributes.name.as_deref() {
                if name != "rect" {
                    return Err(FormError::MalformedCatalog(format!(
                        "region {index}: unsupported shape '{name}', only 'rect' is supported"
                    )));
                }
            }

            let label = match entry.region_attributes.get("type") {
                Some(serde_json::Value::String(label)) => label.clone(),
                Some(other) => {
                    return Err(FormError::MalformedCatalog(format!(
                        "region {index}: 'type' must be a string, got {other}"
                    )));
                }
                None => {
                    return Err(FormError::MalformedCatalog(format!(
                        "region {index}: missing 'type' region attribute"
                    )));
                }
            };

            regions.push(Region {
                shape: entry.shape_attributes.rect,
                label,
                attributes: entry.region_attributes,
            });
        }

        debug!(regions = regions.len(), "Region catalog loaded");
        Ok(Self { regions })
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Region> {
        self.regions.iter()
    }
}

impl<'a> IntoIterator for &'a RegionCatalog {
    type Item = &'a Region;
    type IntoIter = std::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}
