use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use formmark::{
    AlignerKind, ExtractorKind, FormConfig, FormReader, RegionCatalog, build_aligner, build_extractor,
};

#[derive(Parser)]
#[command(name = "formmark")]
#[command(about = "Align a photographed form to its template and report which regions are marked")]
struct Cli {
    /// Photo or scan of the filled form
    #[arg(long, value_name = "IMAGE")]
    query: PathBuf,

    /// Blank template image the regions were drawn on
    #[arg(long, value_name = "IMAGE")]
    template: PathBuf,

    /// Region annotation file (JSON)
    #[arg(long, value_name = "JSON")]
    roi: PathBuf,

    #[arg(long, value_enum, default_value_t = AlignerKind::Gradient)]
    aligner: AlignerKind,

    #[arg(long, value_enum, default_value_t = ExtractorKind::Structural)]
    extractor: ExtractorKind,

    /// Override the extractor's presence threshold (ink pixels)
    #[arg(long, value_name = "N")]
    threshold: Option<u32>,

    /// Tuning parameters (JSON); missing fields keep their defaults
    #[arg(long, value_name = "JSON")]
    config: Option<PathBuf>,

    /// Write the aligned image here
    #[arg(long, value_name = "PATH")]
    save_aligned: Option<PathBuf>,

    /// Save per-region intermediate patches to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Print per-region ink counts to stderr
    #[arg(long)]
    scores: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => FormConfig::from_file(path)?,
        None => FormConfig::default(),
    };

    let catalog = RegionCatalog::load(&args.roi)
        .with_context(|| format!("loading regions from {}", args.roi.display()))?;
    let template = image::open(&args.template)
        .with_context(|| format!("loading template {}", args.template.display()))?;
    let query = image::open(&args.query)
        .with_context(|| format!("loading query {}", args.query.display()))?;

    let aligner = build_aligner(args.aligner, &template, &config)?;
    let extractor = build_extractor(
        args.extractor,
        &config,
        args.threshold,
        args.debug_out.as_deref(),
    )?;
    let reader = FormReader::new(aligner, extractor, catalog);

    let reading = reader.inspect(&query)?;

    if let Some(path) = &args.save_aligned {
        reading
            .aligned
            .save(path)
            .with_context(|| format!("saving aligned image to {}", path.display()))?;
    }

    if args.scores {
        eprintln!("threshold: {}", reader.extractor().threshold());
        for decision in &reading.decisions {
            eprintln!(
                "  {:<24} ink={:<6} present={}{}",
                decision.label,
                decision.ink_pixels,
                decision.present,
                if decision.clipped { " (clipped)" } else { "" }
            );
        }
    }

    println!("{}", serde_json::to_string(&reading.labels())?);
    Ok(())
}
