use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::info;
use serde_json::json;
use std::path::{Path, PathBuf};
use swipescan_core::hash::{self, PerceptualHash};
use swipescan_core::{Device, ReplayDevice};
use swipescan_cv::{MatchParams, RowDetector, TemplateLoader, find_icon};

mod adb;
mod config;
mod export;
mod session;

use adb::AdbDevice;
use config::AppConfig;
use export::ManifestExporter;
use session::Session;

#[derive(Debug, Parser)]
#[command(name = "swipescan", version, about = "Profile screenshot scanner for dating apps")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan profiles on a device, or over previously captured frames
    Scan(ScanArgs),
    /// Locate the biometrics row on one screenshot
    DetectRow(DetectRowArgs),
    /// Perceptual-hash distance between two screenshots
    Compare(CompareArgs),
    /// Look up an arbitrary icon on a screenshot
    FindIcon(FindIconArgs),
    /// Write the default configuration
    InitConfig(InitConfigArgs),
}

#[derive(Debug, Parser)]
struct ScanArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    profiles: Option<usize>,
    /// Replay the images in this directory instead of driving a device
    #[arg(long)]
    replay: Option<PathBuf>,
    #[arg(long)]
    debug: bool,
}

#[derive(Debug, Parser)]
struct DetectRowArgs {
    screenshot: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    threshold: Option<f64>,
    #[arg(long)]
    debug: bool,
}

#[derive(Debug, Parser)]
struct CompareArgs {
    first: PathBuf,
    second: PathBuf,
    /// Compare only a band centred on this row
    #[arg(long, requires = "band_px")]
    row_y: Option<i64>,
    #[arg(long)]
    band_px: Option<u32>,
    /// Grid edge; the hash carries `hash_size^2` bits
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u32).range(1..=64))]
    hash_size: u32,
    #[arg(long, default_value_t = 5)]
    threshold: u32,
}

#[derive(Debug, Parser)]
struct FindIconArgs {
    screenshot: PathBuf,
    template: PathBuf,
    #[arg(long, default_value_t = 0.80)]
    threshold: f64,
    #[arg(long, default_value_t = 0.0)]
    roi_top: f64,
    #[arg(long, default_value_t = 1.0)]
    roi_bottom: f64,
    /// Match Canny edges instead of grayscale
    #[arg(long)]
    edges: bool,
    #[arg(long)]
    debug_dir: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct InitConfigArgs {
    path: PathBuf,
    #[arg(long)]
    force: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        eprintln!("swipescan error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Scan(args) => run_scan(args),
        Command::DetectRow(args) => run_detect_row(args),
        Command::Compare(args) => run_compare(args),
        Command::FindIcon(args) => run_find_icon(args),
        Command::InitConfig(args) => run_init_config(args),
    }
}

fn load_config(path: Option<&Path>, debug: bool) -> Result<AppConfig> {
    let mut config = AppConfig::load_or_default(path)?;
    if debug {
        config.row.debug.save_debug = true;
    }
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_scan(args: ScanArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref(), args.debug)?;
    if let Some(profiles) = args.profiles {
        config.session.max_profiles = profiles;
    }

    let mut device: Box<dyn Device> = match &args.replay {
        Some(dir) => {
            info!("Replaying frames from {:?}", dir);
            config.scan.scroll.vertical_settle_ms = 0;
            config.scan.scroll.horizontal_settle_ms = 0;
            Box::new(ReplayDevice::from_dir(dir)?)
        }
        None => Box::new(AdbDevice::connect(&config.device)?),
    };

    let detector = RowDetector::new(config.row.clone());
    let mut exporter = ManifestExporter::new(&config.session.export_dir);
    let summary = Session::new(&config, &detector).run(device.as_mut(), &mut exporter)?;
    info!("{} manifest(s) staged under {:?}", exporter.submitted(), config.session.export_dir);
    print_json(&summary)
}

fn run_detect_row(args: DetectRowArgs) -> Result<()> {
    let config = load_config(args.config.as_deref(), args.debug)?;
    let threshold = args.threshold.unwrap_or(config.row.match_params.threshold);

    let detector = RowDetector::new(config.row);
    let consensus = detector.detect_row(&args.screenshot, threshold)?;
    match consensus.y() {
        Some(y) => info!("Row at y={} ({:?})", y, consensus.method()),
        None => info!("Row not found ({:?})", consensus.failure()),
    }
    print_json(&consensus)
}

/// Band hash around `row_y`, or the whole frame when the band degenerates.
fn frame_hash(path: &Path, band: Option<(i64, u32)>, size: u32) -> Result<PerceptualHash> {
    let image = hash::load_frame(path).with_context(|| format!("Unreadable image: {:?}", path))?;
    let cropped = band.and_then(|(y, px)| hash::crop_band(&image, y, px, size));
    Ok(match cropped {
        Some(gray) => hash::ahash_gray(&gray, size),
        None => hash::ahash(&image, size),
    })
}

fn run_compare(args: CompareArgs) -> Result<()> {
    let band = args.row_y.zip(args.band_px);
    let first = frame_hash(&args.first, band, args.hash_size)?;
    let second = frame_hash(&args.second, band, args.hash_size)?;

    let distance = hash::hamming(&first, &second);
    print_json(&json!({
        "first": first.to_hex(),
        "second": second.to_hex(),
        "distance": distance,
        "bits": first.bit_len(),
        "similar": hash::similar(&first, &second, args.threshold),
    }))
}

fn run_find_icon(args: FindIconArgs) -> Result<()> {
    let name = args
        .template
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "icon".to_string());
    let template = TemplateLoader::load_path(&name, &args.template)?;

    let mut params = MatchParams::button_search()
        .with_roi(args.roi_top, args.roi_bottom)
        .with_threshold(args.threshold);
    params.use_edges = args.edges;

    let mut debug = swipescan_cv::DebugConfig::default();
    if let Some(dir) = args.debug_dir {
        debug.save_debug = true;
        debug.debug_dir = dir;
    }

    let report = find_icon(&args.screenshot, &template, params, &debug)?;
    match (&report.best, report.found) {
        (Some(best), true) => {
            let center = best.center();
            info!("{} at ({}, {}) conf={:.3}", name, center.x, center.y, best.confidence);
        }
        _ => info!("{} not found", name),
    }
    print_json(&report)
}

fn run_init_config(args: InitConfigArgs) -> Result<()> {
    if args.path.exists() && !args.force {
        bail!("{:?} already exists (use --force to overwrite)", args.path);
    }
    AppConfig::default().save(&args.path)?;
    info!("Wrote default configuration to {:?}", args.path);
    Ok(())
}
