use image::{GrayImage, ImageBuffer, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::{HashMap, HashSet};
use crate::models::Component;

/// Label image produced by connected-component labelling (0 = background).
pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Find connected foreground components in a binary patch
pub fn find_components(binary: &GrayImage) -> (LabelImage, Vec<Component>) {
    // Label connected components (non-zero pixels = foreground)
    let labeled = connected_components(binary, Connectivity::Eight, Luma([0]));

    let mut regions: HashMap<u32, (u32, u32, u32, u32, u32)> = HashMap::new();

    for (x, y, label) in labeled.enumerate_pixels() {
        let label_val = label[0];
        if label_val == 0 {
            continue; // Skip background
        }

        regions.entry(label_val)
            .and_modify(|(min_x, min_y, max_x, max_y, count)| {
                *min_x = (*min_x).min(x);
                *min_y = (*min_y).min(y);
                *max_x = (*max_x).max(x);
                *max_y = (*max_y).max(y);
                *count += 1;
            })
            .or_insert((x, y, x, y, 1));
    }

    let mut components: Vec<Component> = regions.into_iter()
        .map(|(label, (min_x, min_y, max_x, max_y, count))| {
            Component {
                label,
                min_x,
                min_y,
                max_x,
                max_y,
                pixel_count: count,
            }
        })
        .collect();
    components.sort_by_key(|c| c.label);

    (labeled, components)
}

/// Erase every component smaller than `min_area` px².
///
/// Returns the cleaned patch and the components that were erased.
pub fn remove_small_components(binary: &GrayImage, min_area: u32) -> (GrayImage, Vec<Component>) {
    let (labeled, components) = find_components(binary);

    let (small, _): (Vec<Component>, Vec<Component>) = components
        .into_iter()
        .partition(|c| c.area() < min_area);
    if small.is_empty() {
        return (binary.clone(), small);
    }

    let small_labels: HashSet<u32> = small.iter().map(|c| c.label).collect();
    let mut cleaned = binary.clone();
    for (x, y, label) in labeled.enumerate_pixels() {
        if small_labels.contains(&label[0]) {
            cleaned.put_pixel(x, y, Luma([0]));
        }
    }

    (cleaned, small)
}
