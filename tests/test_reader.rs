//! Integration tests for the form reader (align + extract).
//!
//! Tests cover:
//! - `run` over files on disk with the default aligner/extractor pairing
//! - Reading a shifted photo of the form
//! - Alternative aligner/extractor pairings built from configuration
//! - Alignment failures surfacing as errors, with no partial output

mod common;

use common::*;
use formmark::{
    AlignerKind, ExtractorKind, FormConfig, FormReader, build_aligner, build_extractor, run,
};
use image::DynamicImage;

const REGIONS: &[(&str, i64, i64, u32, u32)] = &[
    ("checkbox_A", 40, 220, 60, 30),
    ("checkbox_B", 200, 220, 60, 30),
];

fn marked_form() -> image::RgbImage {
    let mut form = textured_template(7);
    fill_box(&mut form, 60, 228, 10, 10);
    form
}

#[test]
fn test_run_reads_marked_region() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let template = write_png(dir.path(), "template.png", &textured_template(7));
    let query = write_png(dir.path(), "query.png", &marked_form());
    let roi = write_catalog(dir.path(), REGIONS);

    let labels = run(&query, &template, &roi)?;
    assert_eq!(labels, ["checkbox_A"]);
    Ok(())
}

#[test]
fn test_run_on_unmarked_form() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let template = write_png(dir.path(), "template.png", &textured_template(7));
    let roi = write_catalog(dir.path(), REGIONS);

    let labels = run(&template, &template, &roi)?;
    assert!(labels.is_empty());
    Ok(())
}

#[test]
fn test_reader_handles_shifted_photo() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let template = write_png(dir.path(), "template.png", &textured_template(7));
    let roi = write_catalog(dir.path(), REGIONS);
    let reader = FormReader::from_paths(&template, &roi)?;

    let photo = DynamicImage::ImageRgb8(translated(&marked_form(), 6, 4));
    let reading = reader.inspect(&photo)?;

    assert_eq!(reading.aligned.dimensions(), (TEMPLATE_WIDTH, TEMPLATE_HEIGHT));
    assert_eq!(reading.labels(), ["checkbox_A"]);
    assert_eq!(reading.decisions.len(), 2);
    Ok(())
}

#[test]
fn test_binary_aligner_with_edge_density() -> anyhow::Result<()> {
    let template = DynamicImage::ImageRgb8(textured_template(7));
    let config = FormConfig::default();
    let reader = FormReader::new(
        build_aligner(AlignerKind::Binary, &template, &config)?,
        build_extractor(ExtractorKind::EdgeDensity, &config, Some(20), None)?,
        catalog(REGIONS),
    );

    let labels = reader.read(&DynamicImage::ImageRgb8(marked_form()))?;
    assert_eq!(labels, ["checkbox_A"]);
    assert_eq!(reader.aligner().name(), "binary");
    assert_eq!(reader.extractor().name(), "edge-density");
    Ok(())
}

#[test]
fn test_blank_photo_is_an_error() -> anyhow::Result<()> {
    let template = DynamicImage::ImageRgb8(textured_template(7));
    let config = FormConfig::default();
    let reader = FormReader::new(
        build_aligner(AlignerKind::Gradient, &template, &config)?,
        build_extractor(ExtractorKind::Structural, &config, None, None)?,
        catalog(REGIONS),
    );

    let blank = DynamicImage::ImageRgb8(white_page(TEMPLATE_WIDTH, TEMPLATE_HEIGHT));
    let err = reader.read(&blank).unwrap_err();
    assert!(matches!(err, FormError::InsufficientCorrespondences { .. }));
    Ok(())
}

#[test]
fn test_missing_catalog_file() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let template = write_png(dir.path(), "template.png", &textured_template(7));

    let err = run(&template, &template, dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, FormError::Io(_)));
    Ok(())
}

#[test]
fn test_config_file_overrides() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"ransac": {"seed": 7}, "structural": {"threshold": 25, "c": 12}, "binary": {"keep_fraction": 0.5}}"#,
    )?;

    let config = FormConfig::from_file(&path)?;
    assert_eq!(config.ransac.seed, 7);
    assert_eq!(config.ransac.max_iters, 2000);
    assert_eq!(config.structural.threshold, 25);
    assert_eq!(config.structural.c, 12);
    assert_eq!(config.structural.block_size, 21);
    assert_eq!(config.binary.keep_fraction, 0.5);
    assert_eq!(config.edge_density.threshold, 90);
    Ok(())
}

#[test]
fn test_invalid_config_values() {
    for json in [
        r#"{"binary": {"keep_fraction": 0.0}}"#,
        r#"{"gradient": {"ratio": 1.5}}"#,
        r#"{"structural": {"block_size": 4}}"#,
        r#"{"ransac": {"not_a_number": }"#,
    ] {
        let err = FormConfig::from_json(json).unwrap_err();
        assert!(matches!(err, FormError::InvalidConfig(_)), "{json} gave {err:?}");
    }
}
