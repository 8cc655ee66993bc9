//! WSI Patch Extractor - cut Whole Slide Images into patch datasets.
//!
//! This binary loads the configuration, sets up logging and runs the batch.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_patch_extractor::{
    config::{Cli, Command, ExtractArgs, ExtractionSettings, InspectArgs, MaskSource},
    extract::{discover_slides, output_conflicts, run_batch},
    io::DatasetReader,
    ExtractionMethod,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Extract(args) => run_extract(args).await,
        Command::Check(args) => run_check(args),
        Command::Inspect(args) => run_inspect(args),
    }
}

// =============================================================================
// Extract Command
// =============================================================================

async fn run_extract(args: ExtractArgs) -> ExitCode {
    let config = match args.load() {
        Ok(config) => config,
        Err(e) => {
            init_logging("info", args.verbose, None);
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.log_level, args.verbose, config.log_file());

    let settings = match config.validate() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    log_settings(&settings);

    let summary = run_batch(settings).await;
    if summary.slides() == 0 {
        warn!("No slides found; nothing to extract");
    } else if summary.failed > 0 {
        warn!(
            "{} of {} slide(s) failed; see the log for details",
            summary.failed,
            summary.slides()
        );
    }

    ExitCode::SUCCESS
}

/// Log the effective settings at startup.
fn log_settings(settings: &ExtractionSettings) {
    let tiling = &settings.tiling;
    let patch = tiling.patch_size();
    let stride = tiling.stride();

    info!("Configuration:");
    info!("  Input dir: {}", settings.input_dir.display());
    info!("  Output dir: {}", settings.output_dir.display());
    info!("  Method: {}", settings.method.name());
    info!(
        "  Patch size: {}x{} (stride {}x{})",
        patch.height, patch.width, stride.height, stride.width
    );
    info!(
        "  Resolution: {} {}",
        tiling.resolution.value, tiling.resolution.units
    );
    info!(
        "  Padding: {} ({}), within_bound={}",
        tiling.padding.mode, tiling.padding.value, tiling.within_bound
    );
    match (&settings.method, &settings.mask) {
        (ExtractionMethod::SlidingWindow { min_mask_ratio }, MaskSource::File(path)) => {
            info!("  Mask: {} (min ratio {})", path.display(), min_mask_ratio)
        }
        (ExtractionMethod::SlidingWindow { min_mask_ratio }, MaskSource::Directory(dir)) => {
            info!("  Masks: {}/<slide> (min ratio {})", dir.display(), min_mask_ratio)
        }
        (ExtractionMethod::Point { locations }, _) => {
            info!("  Locations: {}", locations.len())
        }
        _ => info!("  Mask: none"),
    }
    info!("  Jobs: {}", settings.jobs);
}

/// Initialize tracing with a stderr layer and an optional log file layer.
fn init_logging(level: &str, verbose: bool, log_file: Option<&Path>) {
    let level = if verbose { "debug" } else { level };
    let env_filter = format!("wsi_patch_extractor={}", level);

    let file_layer = log_file.and_then(|path| match open_log_file(path) {
        Ok(file) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        ),
        Err(e) => {
            eprintln!("Warning: cannot open log file {}: {}", path.display(), e);
            None
        }
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

// =============================================================================
// Check Command
// =============================================================================

fn run_check(args: ExtractArgs) -> ExitCode {
    if args.verbose {
        init_logging("debug", true, None);
    }

    println!("WSI Patch Extractor Configuration Check");
    println!("════════════════════════════════════════");
    println!();

    let config = match args.load() {
        Ok(config) => {
            match args.config {
                Some(ref path) => println!("✓ Config file: {}", path.display()),
                None => println!("✓ Config file: none (defaults)"),
            }
            config
        }
        Err(e) => {
            println!("✗ Config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let settings = match config.validate() {
        Ok(settings) => {
            println!("✓ Options valid");
            settings
        }
        Err(e) => {
            println!("✗ Options: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match settings.mask {
        MaskSource::File(ref path) if !path.is_file() => {
            println!("✗ Mask: {} does not exist", path.display());
            return ExitCode::FAILURE;
        }
        MaskSource::Directory(ref dir) if !dir.is_dir() => {
            println!("✗ Mask dir: {} does not exist", dir.display());
            return ExitCode::FAILURE;
        }
        _ => {}
    }

    println!();
    println!("Slides in {}:", settings.input_dir.display());
    println!("─────────────────");

    let slides = discover_slides(&settings.input_dir, &settings.slide_extensions);
    if slides.is_empty() {
        println!("  (no slides found)");
    } else {
        for slide in &slides {
            println!(
                "  {} -> {}",
                slide.display(),
                settings.output_path(slide).display()
            );
        }
        println!();
        println!("Total: {} slide(s)", slides.len());
    }

    let conflicts = output_conflicts(&settings, &slides);
    if !conflicts.is_empty() {
        println!();
        for (output, group) in &conflicts {
            println!("✗ {} slides share {}:", group.len(), output.display());
            for slide in group {
                println!("    {}", slide.display());
            }
        }
        return ExitCode::FAILURE;
    }

    println!();
    println!("════════════════════════════════════════");
    println!("✓ All checks passed!");

    ExitCode::SUCCESS
}

// =============================================================================
// Inspect Command
// =============================================================================

fn run_inspect(args: InspectArgs) -> ExitCode {
    let reader = match DatasetReader::open(&args.path) {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        let json = serde_json::json!({
            "path": args.path.display().to_string(),
            "shape": reader.shape(),
            "dtype": reader.sample_type().to_string(),
            "patches": reader.len(),
        });
        match serde_json::to_string_pretty(&json) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("Path:    {}", args.path.display());
        println!("Shape:   {:?}", reader.shape());
        println!("Dtype:   {}", reader.sample_type());
        println!("Patches: {}", reader.len());
    }

    ExitCode::SUCCESS
}
