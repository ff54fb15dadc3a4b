use serde::Serialize;

/// Axis-aligned pixel rectangle inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A connected group of foreground pixels in a binary patch.
#[derive(Debug, Clone)]
pub struct Component {
    pub label: u32,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub pixel_count: u32,
}

impl Component {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    /// Area in px², measured as the number of pixels in the component.
    pub fn area(&self) -> u32 {
        self.pixel_count
    }
}

/// Outcome of the presence test for one catalog region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionDecision {
    pub label: String,
    /// Foreground pixels left in the region after the extractor's processing.
    pub ink_pixels: u32,
    /// `ink_pixels` strictly exceeded the extractor's threshold.
    pub present: bool,
    /// The region rectangle had to be clipped to the image bounds.
    pub clipped: bool,
}
