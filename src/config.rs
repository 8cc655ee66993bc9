//! Configuration management for the patch extractor.
//!
//! Configuration comes from two places:
//! - A YAML, JSON or TOML file (chosen by extension) deserialized into
//!   [`ExtractionConfig`], where every option has a default
//! - Command-line arguments via clap, with `WSIP_` environment fallbacks,
//!   which override the file
//!
//! [`ExtractionConfig::validate`] turns the loose file representation into the
//! typed [`ExtractionSettings`] the engine runs on. All checks happen there,
//! before any slide is touched.
//!
//! # Example
//!
//! ```toml
//! patch_size = [256, 256]
//! method = "slidingwindow"
//! stride = [128, 128]
//! input_mask = "data/masks/tissue.png"
//! min_mask_ratio = 0.5
//! resolution = 0
//! units = "level"
//! pad_mode = "constant"
//! pad_constant_values = 255
//! within_bound = false
//! input_dir = "data/slides"
//! output_dir = "data/patches"
//! ```
//!
//! # Environment Variables
//!
//! - `WSIP_CONFIG` - Path to the configuration file
//! - `WSIP_INPUT_DIR` - Directory of slides to process
//! - `WSIP_OUTPUT_DIR` - Root directory for extracted patches
//! - `WSIP_JOBS` - Number of slides processed concurrently
//! - `WSIP_LOG_FILE` - Log file path (empty disables file logging)

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::io::DEFAULT_CHUNK_LEN;
use crate::patch::{
    ExtractionMethod, PointAnchor, Size2, TileCoord, TilingConfig, DEFAULT_MIN_MASK_RATIO,
};
use crate::slide::{PadMode, Padding, Resolution, SlideMetadata, Units};

// =============================================================================
// Default Values
// =============================================================================

/// Default patch size `[height, width]`.
pub const DEFAULT_PATCH_SIZE: [u32; 2] = [256, 256];

/// Default directory scanned for slides.
pub const DEFAULT_INPUT_DIR: &str = "data/slides";

/// Default root directory for extracted patches.
pub const DEFAULT_OUTPUT_DIR: &str = "data/patches";

/// Default log level when `RUST_LOG` is unset.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log file.
pub const DEFAULT_LOG_FILE: &str = "logs/patch_extraction.log";

/// File name of the dataset written for each slide.
pub const PATCHES_FILE_NAME: &str = "patches.npy";

// =============================================================================
// CLI Arguments
// =============================================================================

/// WSI Patch Extractor - cut Whole Slide Images into fixed-size patches.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-patch-extractor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Extract patches from every slide in the input directory.
    Extract(ExtractArgs),

    /// Validate the configuration and list the slides that would be processed.
    Check(ExtractArgs),

    /// Print the shape and dtype of a patch dataset.
    Inspect(InspectArgs),
}

/// Arguments shared by `extract` and `check`.
#[derive(Args, Debug, Clone, Default)]
pub struct ExtractArgs {
    /// Configuration file (.yml, .yaml, .json or .toml). Defaults apply when omitted.
    #[arg(short, long, env = "WSIP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory of slides to process (overrides the file).
    #[arg(long, env = "WSIP_INPUT_DIR")]
    pub input_dir: Option<PathBuf>,

    /// Root directory for extracted patches (overrides the file).
    #[arg(long, env = "WSIP_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Number of slides processed concurrently (overrides the file).
    #[arg(short, long, env = "WSIP_JOBS")]
    pub jobs: Option<usize>,

    /// Replace existing datasets (overrides the file).
    #[arg(long, default_value_t = false, conflicts_with = "no_overwrite")]
    pub overwrite: bool,

    /// Keep existing datasets: slides whose output already exists fail.
    #[arg(long, default_value_t = false)]
    pub no_overwrite: bool,

    /// Log file path (overrides the file; empty disables file logging).
    #[arg(long, env = "WSIP_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ExtractArgs {
    /// Load the configuration file (if any) and apply command-line overrides.
    pub fn load(&self) -> Result<ExtractionConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ExtractionConfig::from_file(path)?,
            None => ExtractionConfig::default(),
        };

        if let Some(ref dir) = self.input_dir {
            config.input_dir = dir.clone();
        }
        if let Some(ref dir) = self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if self.overwrite {
            config.overwrite = true;
        } else if self.no_overwrite {
            config.overwrite = false;
        }
        if let Some(ref log_file) = self.log_file {
            config.log_file = Some(log_file.clone());
        }
        if self.verbose {
            config.log_level = "debug".to_string();
        }
        Ok(config)
    }
}

/// Arguments for `inspect`.
#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Path to a `patches.npy` dataset.
    pub path: PathBuf,

    /// Print the summary as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

// =============================================================================
// File Configuration
// =============================================================================

/// Extraction method as named in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodName {
    #[default]
    #[serde(alias = "sliding_window")]
    SlidingWindow,
    Point,
}

fn default_patch_size() -> [u32; 2] {
    DEFAULT_PATCH_SIZE
}

fn default_min_mask_ratio() -> f64 {
    DEFAULT_MIN_MASK_RATIO
}

fn default_input_dir() -> PathBuf {
    PathBuf::from(DEFAULT_INPUT_DIR)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_LOG_FILE))
}

fn default_chunk_len() -> usize {
    DEFAULT_CHUNK_LEN
}

fn default_jobs() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// Extraction options as written in a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionConfig {
    /// Patch `[height, width]` in pixels at the configured resolution.
    #[serde(default = "default_patch_size")]
    pub patch_size: [u32; 2],

    #[serde(default)]
    pub method: MethodName,

    /// Step `[height, width]` between tiles; defaults to `patch_size`.
    #[serde(default)]
    pub stride: Option<[u32; 2]>,

    /// Tissue mask applied to every slide (sliding window only).
    #[serde(default)]
    pub input_mask: Option<PathBuf>,

    /// Directory of per-slide masks, matched by file stem.
    #[serde(default)]
    pub mask_dir: Option<PathBuf>,

    #[serde(default = "default_min_mask_ratio")]
    pub min_mask_ratio: f64,

    #[serde(default)]
    pub resolution: f64,

    #[serde(default = "default_units")]
    pub units: Units,

    #[serde(default = "default_pad_mode")]
    pub pad_mode: PadMode,

    #[serde(default)]
    pub pad_constant_values: f64,

    #[serde(default)]
    pub within_bound: bool,

    /// Inline point locations `[[x, y], ...]`.
    #[serde(default)]
    pub locations: Option<Vec<[f64; 2]>>,

    /// CSV (`x,y`) or JSON file of point locations.
    #[serde(default)]
    pub locations_file: Option<PathBuf>,

    #[serde(default)]
    pub point_anchor: PointAnchor,

    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Only process files with these extensions; empty means every file.
    #[serde(default)]
    pub slide_extensions: Vec<String>,

    /// Baseline microns per pixel, required for `mpp` units.
    #[serde(default)]
    pub slide_mpp: Option<f64>,

    /// Baseline objective power, required for `power` units.
    #[serde(default)]
    pub objective_power: Option<f64>,

    /// Dataset elements reserved per growth step.
    #[serde(default = "default_chunk_len")]
    pub chunk_len: usize,

    /// Replace an existing dataset instead of failing the slide.
    #[serde(default = "default_true")]
    pub overwrite: bool,

    /// Slides processed concurrently.
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_file")]
    pub log_file: Option<PathBuf>,
}

fn default_units() -> Units {
    Units::Level
}

fn default_pad_mode() -> PadMode {
    PadMode::Constant
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            patch_size: DEFAULT_PATCH_SIZE,
            method: MethodName::default(),
            stride: None,
            input_mask: None,
            mask_dir: None,
            min_mask_ratio: DEFAULT_MIN_MASK_RATIO,
            resolution: 0.0,
            units: default_units(),
            pad_mode: default_pad_mode(),
            pad_constant_values: 0.0,
            within_bound: false,
            locations: None,
            locations_file: None,
            point_anchor: PointAnchor::default(),
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            slide_extensions: Vec::new(),
            slide_mpp: None,
            objective_power: None,
            chunk_len: DEFAULT_CHUNK_LEN,
            overwrite: true,
            jobs: default_jobs(),
            log_level: default_log_level(),
            log_file: default_log_file(),
        }
    }
}

impl ExtractionConfig {
    /// Read a configuration file, picking the parser from its extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        match extension_of(path).as_deref() {
            Some("json") => serde_json::from_str(&text).map_err(|e| parse_error(e.to_string())),
            Some("toml") => toml::from_str(&text).map_err(|e| parse_error(e.to_string())),
            Some("yml") | Some("yaml") => {
                serde_yaml::from_str(&text).map_err(|e| parse_error(e.to_string()))
            }
            other => Err(ConfigError::Invalid {
                field: "config",
                message: format!(
                    "unsupported configuration format {:?} (expected .yml, .yaml, .json or .toml)",
                    other.unwrap_or("")
                ),
            }),
        }
    }

    /// Effective log file, `None` when disabled.
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// File of point locations for the point method.
    ///
    /// Without `locations` or `locations_file`, `input_mask` names the
    /// locations list.
    fn point_locations_file(&self) -> Option<&Path> {
        if self.method != MethodName::Point {
            return None;
        }
        match (&self.locations_file, &self.locations) {
            (Some(file), _) => Some(file.as_path()),
            (None, None) => self.input_mask.as_deref(),
            (None, Some(_)) => None,
        }
    }

    /// Validate every option and build the typed settings.
    pub fn validate(&self) -> Result<ExtractionSettings, ConfigError> {
        let [patch_h, patch_w] = self.patch_size;
        let patch_size = Size2::new(patch_h, patch_w);
        let [stride_h, stride_w] = self.stride.unwrap_or(self.patch_size);

        if !self.resolution.is_finite() || self.resolution < 0.0 {
            return Err(ConfigError::Invalid {
                field: "resolution",
                message: format!("must be a non-negative number, got {}", self.resolution),
            });
        }
        if !self.pad_constant_values.is_finite() {
            return Err(ConfigError::Invalid {
                field: "pad_constant_values",
                message: "must be a finite number".to_string(),
            });
        }

        let metadata = SlideMetadata {
            mpp: positive_option("slide_mpp", self.slide_mpp)?,
            objective_power: positive_option("objective_power", self.objective_power)?,
        };
        match self.units {
            Units::Mpp if metadata.mpp.is_none() => {
                return Err(ConfigError::Missing("slide_mpp"));
            }
            Units::Power if metadata.objective_power.is_none() => {
                return Err(ConfigError::Missing("objective_power"));
            }
            _ => {}
        }

        let tiling = TilingConfig::new(patch_size)?
            .with_stride(Size2::new(stride_h, stride_w))?
            .with_resolution(Resolution::new(self.resolution, self.units))
            .with_padding(Padding {
                mode: self.pad_mode,
                value: self.pad_constant_values,
            })
            .with_within_bound(self.within_bound);

        let method = match self.method {
            MethodName::SlidingWindow => ExtractionMethod::sliding_window(self.min_mask_ratio)?,
            MethodName::Point => {
                let mut locations: Vec<TileCoord> = self
                    .locations
                    .iter()
                    .flatten()
                    .map(|&[x, y]| TileCoord::new(x.round() as i64, y.round() as i64))
                    .collect();
                if let Some(file) = self.point_locations_file() {
                    locations.extend(load_locations(file)?);
                }
                ExtractionMethod::point(locations, self.point_anchor, patch_size)?
            }
        };

        let mask = match (&self.input_mask, &self.mask_dir) {
            (Some(path), _) if self.point_locations_file() == Some(path.as_path()) => {
                MaskSource::None
            }
            (Some(_), Some(_)) => {
                return Err(ConfigError::Invalid {
                    field: "mask_dir",
                    message: "cannot be combined with input_mask".to_string(),
                })
            }
            (Some(path), None) => MaskSource::File(path.clone()),
            (None, Some(dir)) => MaskSource::Directory(dir.clone()),
            (None, None) => MaskSource::None,
        };

        if self.chunk_len == 0 {
            return Err(ConfigError::Invalid {
                field: "chunk_len",
                message: "must be greater than 0".to_string(),
            });
        }
        if self.jobs == 0 {
            return Err(ConfigError::Invalid {
                field: "jobs",
                message: "must be greater than 0".to_string(),
            });
        }

        Ok(ExtractionSettings {
            tiling,
            method,
            mask,
            metadata,
            input_dir: self.input_dir.clone(),
            output_dir: self.output_dir.clone(),
            slide_extensions: self
                .slide_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            chunk_len: self.chunk_len,
            overwrite: self.overwrite,
            jobs: self.jobs,
        })
    }
}

fn positive_option(field: &'static str, value: Option<f64>) -> Result<Option<f64>, ConfigError> {
    match value {
        Some(v) if !(v.is_finite() && v > 0.0) => Err(ConfigError::Invalid {
            field,
            message: format!("must be a positive number, got {}", v),
        }),
        other => Ok(other),
    }
}

/// Lower-cased file extension, if any.
pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

// =============================================================================
// Point Locations
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum LocationRecord {
    Pair([f64; 2]),
    Named { x: f64, y: f64 },
}

/// Load point locations from a JSON or CSV file.
///
/// JSON: `[[x, y], ...]` or `[{"x": .., "y": ..}, ...]`.
/// CSV: one `x,y` pair per line; a non-numeric first line is treated as a
/// header and extra columns are ignored.
pub fn load_locations(path: &Path) -> Result<Vec<TileCoord>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let parse_error = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };
    let coord = |x: f64, y: f64| TileCoord::new(x.round() as i64, y.round() as i64);

    if extension_of(path).as_deref() == Some("json") {
        let records: Vec<LocationRecord> =
            serde_json::from_str(&text).map_err(|e| parse_error(e.to_string()))?;
        return Ok(records
            .into_iter()
            .map(|record| match record {
                LocationRecord::Pair([x, y]) => coord(x, y),
                LocationRecord::Named { x, y } => coord(x, y),
            })
            .collect());
    }

    let mut locations = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split(',').map(str::trim);
        let x = fields.next().and_then(|f| f.parse::<f64>().ok());
        let y = fields.next().and_then(|f| f.parse::<f64>().ok());
        match (x, y) {
            (Some(x), Some(y)) => locations.push(coord(x, y)),
            _ if index == 0 => continue,
            _ => {
                return Err(parse_error(format!(
                    "line {}: expected 'x,y', got '{}'",
                    index + 1,
                    line
                )))
            }
        }
    }
    Ok(locations)
}

// =============================================================================
// Validated Settings
// =============================================================================

/// Where tissue masks come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskSource {
    /// No mask; every planned tile is kept
    None,
    /// One mask shared by every slide
    File(PathBuf),
    /// Per-slide masks named after the slide's file stem
    Directory(PathBuf),
}

/// Fully validated configuration for a batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSettings {
    pub tiling: TilingConfig,
    pub method: ExtractionMethod,
    pub mask: MaskSource,
    pub metadata: SlideMetadata,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Lower-case extensions without the dot
    pub slide_extensions: Vec<String>,
    pub chunk_len: usize,
    pub overwrite: bool,
    pub jobs: usize,
}

impl ExtractionSettings {
    /// Dataset path for a slide: `<output_dir>/patches/<stem>/patches.npy`.
    pub fn output_path(&self, slide_path: &Path) -> PathBuf {
        let stem = slide_path
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| slide_path.as_os_str().to_os_string());
        self.output_dir
            .join("patches")
            .join(stem)
            .join(PATCHES_FILE_NAME)
    }
}

// =============================================================================
// Tests
// =============================================================================
