//! Integration tests for the region extractors.
//!
//! Tests cover:
//! - End-to-end structural extraction on a filled checkbox and a blank page
//! - Printed checkbox borders (including ones shorter than 40 px) removed as
//!   gridlines, specks removed as noise
//! - Strict greater-than threshold semantics for both extractors
//! - Regions overhanging the image are clipped, never an error
//! - Output only ever contains catalog labels, once each, in catalog order
//! - Debug output of intermediate patches

mod common;

use common::*;
use formmark::detection::{
    EdgeDensityExtractor, ExtractorKind, StructuralConfig, StructuralExtractor, build_extractor,
};
use formmark::detection::edge_density::EdgeDensityConfig;
use formmark::{FormConfig, PatchData};

fn checkbox_catalog() -> RegionCatalog {
    catalog(&[("checkbox_A", 10, 10, 50, 20)])
}

fn filled_checkbox_page() -> image::RgbImage {
    let mut page = white_page(100, 50);
    fill_box(&mut page, 25, 14, 10, 10);
    page
}

#[test]
fn test_structural_filled_box_is_present() -> anyhow::Result<()> {
    let extractor = StructuralExtractor::default();
    let labels = extractor.extract(&filled_checkbox_page(), &checkbox_catalog())?;
    assert_eq!(labels, ["checkbox_A"]);
    Ok(())
}

#[test]
fn test_structural_blank_page_is_empty() -> anyhow::Result<()> {
    let extractor = StructuralExtractor::default();
    let labels = extractor.extract(&white_page(100, 50), &checkbox_catalog())?;
    assert!(labels.is_empty());
    Ok(())
}

#[test]
fn test_structural_threshold_is_strict() -> anyhow::Result<()> {
    let page = filled_checkbox_page();
    let catalog = checkbox_catalog();

    let ink = StructuralExtractor::default().decide(&page, &catalog)?[0].ink_pixels;
    assert!(ink > 0);

    let at = StructuralExtractor::new(StructuralConfig::default().with_threshold(ink))?;
    let below = StructuralExtractor::new(StructuralConfig::default().with_threshold(ink - 1))?;
    assert!(at.extract(&page, &catalog)?.is_empty());
    assert_eq!(below.extract(&page, &catalog)?, ["checkbox_A"]);
    Ok(())
}

#[test]
fn test_printed_border_alone_is_not_a_mark() -> anyhow::Result<()> {
    let mut page = white_page(120, 60);
    outline_box(&mut page, 10, 10, 90, 30);
    let catalog = catalog(&[("box", 5, 5, 100, 40)]);

    let decisions = StructuralExtractor::default().decide(&page, &catalog)?;
    assert_eq!(decisions[0].ink_pixels, 0);
    assert!(!decisions[0].present);
    Ok(())
}

#[test]
fn test_mark_inside_printed_border_is_present() -> anyhow::Result<()> {
    let mut page = white_page(120, 60);
    outline_box(&mut page, 10, 10, 90, 30);
    fill_box(&mut page, 45, 19, 10, 10);
    let catalog = catalog(&[("box", 5, 5, 100, 40)]);

    let labels = StructuralExtractor::default().extract(&page, &catalog)?;
    assert_eq!(labels, ["box"]);
    Ok(())
}

#[test]
fn test_small_printed_boxes_are_not_marks() -> anyhow::Result<()> {
    // Box sides shorter than 40 px, with 2 px printed rules.
    for height in [20, 30] {
        let mut page = white_page(80, 50);
        printed_box(&mut page, 13, 7, 44, height, 2);
        let catalog = catalog(&[("box", 10, 5, 50, 34)]);

        let decisions = StructuralExtractor::default().decide(&page, &catalog)?;
        assert_eq!(decisions[0].ink_pixels, 0, "box of height {height} left ink");
        assert!(!decisions[0].present);
    }
    Ok(())
}

#[test]
fn test_mark_inside_small_printed_box_is_present() -> anyhow::Result<()> {
    let mut page = white_page(80, 50);
    printed_box(&mut page, 13, 7, 44, 30, 2);
    fill_box(&mut page, 30, 17, 10, 10);
    let catalog = catalog(&[("box", 10, 5, 50, 34)]);

    let decisions = StructuralExtractor::default().decide(&page, &catalog)?;
    assert_eq!(decisions[0].ink_pixels, 100);
    assert!(decisions[0].present);
    Ok(())
}

#[test]
fn test_cleanup_stage_order() {
    let extractor = StructuralExtractor::default();
    assert_eq!(
        extractor.pipeline().step_names(),
        [
            "Adaptive Threshold",
            "Speckle Removal",
            "Horizontal Gridline Removal",
            "Vertical Gridline Removal",
            "Speckle Removal",
        ]
    );
}

#[test]
fn test_cleanup_records_erased_gridlines() -> anyhow::Result<()> {
    let mut page = white_page(50, 34);
    printed_box(&mut page, 3, 2, 44, 30, 2);
    let gray = image::DynamicImage::ImageRgb8(page).to_luma8();
    let bbox = BoundingBox { x: 0, y: 0, width: 50, height: 34 };

    let data = StructuralExtractor::default()
        .pipeline()
        .run(PatchData::new(0, "box", bbox, gray))?;

    assert!(data.count("thresholded_pixels") > 0);
    assert!(data.count("horizontal_lines_erased") > 0);
    assert!(data.count("vertical_lines_erased") > 0);
    assert_eq!(data.count("unknown_counter"), 0);
    assert_eq!(foreground(&data.patch), 0);
    Ok(())
}

#[test]
fn test_specks_are_not_marks() -> anyhow::Result<()> {
    let mut page = white_page(100, 50);
    fill_box(&mut page, 15, 15, 3, 3);
    fill_box(&mut page, 40, 20, 3, 3);
    fill_box(&mut page, 52, 24, 2, 2);

    let decisions = StructuralExtractor::default().decide(&page, &checkbox_catalog())?;
    assert_eq!(decisions[0].ink_pixels, 0);
    Ok(())
}

#[test]
fn test_speckle_area_is_configurable() -> anyhow::Result<()> {
    let mut page = white_page(100, 50);
    fill_box(&mut page, 40, 20, 3, 3);
    let config = StructuralConfig::default().with_min_component_area(5);

    let labels = StructuralExtractor::new(config)?.extract(&page, &checkbox_catalog())?;
    assert_eq!(labels, ["checkbox_A"]);
    Ok(())
}

#[test]
fn test_overhanging_region_is_clipped() -> anyhow::Result<()> {
    let mut page = white_page(100, 50);
    fill_box(&mut page, 84, 34, 10, 10);
    let catalog = catalog(&[
        ("edge", 80, 30, 50, 40),
        ("gone", 200, 200, 10, 10),
        ("inside", 10, 5, 30, 20),
    ]);

    for extractor in [
        build_extractor(ExtractorKind::Structural, &FormConfig::default(), None, None)?,
        build_extractor(ExtractorKind::EdgeDensity, &FormConfig::default(), Some(0), None)?,
    ] {
        let decisions = extractor.decide(&page, &catalog)?;
        assert_eq!(decisions.len(), 3);
        assert!(decisions[0].clipped);
        assert!(decisions[0].present, "{}: clipped mark missed", extractor.name());
        assert!(decisions[1].clipped);
        assert_eq!(decisions[1].ink_pixels, 0);
        assert!(!decisions[2].clipped);
        assert!(!decisions[2].present);
    }
    Ok(())
}

#[test]
fn test_labels_follow_catalog_order() -> anyhow::Result<()> {
    let mut page = white_page(200, 60);
    fill_box(&mut page, 15, 15, 10, 10);
    fill_box(&mut page, 135, 15, 10, 10);
    let catalog = catalog(&[
        ("third", 130, 10, 40, 30),
        ("second", 70, 10, 40, 30),
        ("first", 10, 10, 40, 30),
    ]);

    let labels = StructuralExtractor::default().extract(&page, &catalog)?;
    assert_eq!(labels, ["third", "first"]);

    let decisions = StructuralExtractor::default().decide(&page, &catalog)?;
    let order: Vec<&str> = decisions.iter().map(|d| d.label.as_str()).collect();
    assert_eq!(order, ["third", "second", "first"]);
    Ok(())
}

#[test]
fn test_empty_catalog_gives_no_labels() -> anyhow::Result<()> {
    let labels = StructuralExtractor::default().extract(&filled_checkbox_page(), &RegionCatalog::default())?;
    assert!(labels.is_empty());
    Ok(())
}

fn edge_page() -> image::RgbImage {
    let mut page = white_page(200, 150);
    fill_box(&mut page, 40, 35, 60, 30);
    page
}

fn edge_catalog() -> RegionCatalog {
    catalog(&[("block", 20, 20, 100, 60), ("empty", 130, 20, 50, 60)])
}

#[test]
fn test_edge_density_detects_box() -> anyhow::Result<()> {
    let decisions = EdgeDensityExtractor::default().decide(&edge_page(), &edge_catalog())?;

    assert!(decisions[0].ink_pixels > 90, "only {} edge pixels", decisions[0].ink_pixels);
    assert!(decisions[0].present);
    assert_eq!(decisions[1].ink_pixels, 0);
    assert!(!decisions[1].present);
    Ok(())
}

#[test]
fn test_edge_density_blank_page_is_empty() -> anyhow::Result<()> {
    let labels = EdgeDensityExtractor::default().extract(&white_page(200, 150), &edge_catalog())?;
    assert!(labels.is_empty());
    Ok(())
}

#[test]
fn test_edge_density_threshold_is_strict() -> anyhow::Result<()> {
    let page = edge_page();
    let catalog = edge_catalog();
    let ink = EdgeDensityExtractor::default().decide(&page, &catalog)?[0].ink_pixels;

    let at = EdgeDensityExtractor::new(EdgeDensityConfig::default().with_threshold(ink))?;
    let below = EdgeDensityExtractor::new(EdgeDensityConfig::default().with_threshold(ink - 1))?;
    assert!(at.extract(&page, &catalog)?.is_empty());
    assert_eq!(below.extract(&page, &catalog)?, ["block"]);
    Ok(())
}

#[test]
fn test_invalid_extractor_config() {
    let config = StructuralConfig {
        block_size: 20,
        ..StructuralConfig::default()
    };
    assert!(matches!(StructuralExtractor::new(config), Err(FormError::InvalidConfig(_))));

    let config = EdgeDensityConfig {
        blur_sigma: 0.0,
        ..EdgeDensityConfig::default()
    };
    assert!(matches!(EdgeDensityExtractor::new(config), Err(FormError::InvalidConfig(_))));
}

#[test]
fn test_debug_output_per_step() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let debug_dir = dir.path().join("debug");
    let extractor = StructuralExtractor::default().with_debug(&debug_dir)?;

    extractor.extract(&filled_checkbox_page(), &checkbox_catalog())?;

    for step in [
        "00_input",
        "01_adaptive_threshold",
        "02_speckle_removal",
        "03_horizontal_gridline_removal",
        "04_vertical_gridline_removal",
        "05_speckle_removal",
    ] {
        let path = debug_dir.join(step).join("00_checkbox_a.png");
        assert!(path.exists(), "missing {}", path.display());
    }
    Ok(())
}

#[test]
fn test_debug_directory_must_be_empty() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    std::fs::write(dir.path().join("leftover.txt"), "x")?;

    let result = StructuralExtractor::default().with_debug(dir.path());
    assert!(matches!(result, Err(FormError::InvalidConfig(_))));
    Ok(())
}
