use std::path::PathBuf;

use thiserror::Error;

use crate::patch::SampleType;

/// Errors raised while loading or validating the extraction configuration
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A required option is absent
    #[error("Missing required option `{0}`")]
    Missing(&'static str),

    /// An option is present but its value is not acceptable
    #[error("Invalid value for `{field}`: {message}")]
    Invalid { field: &'static str, message: String },

    /// The configuration file could not be parsed
    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The configuration file (or a file it references) could not be read
    #[error("Failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },
}

/// Errors reported by slide and mask accessors
#[derive(Debug, Clone, Error)]
pub enum ReadError {
    /// The underlying image could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Low-level I/O failure
    #[error("I/O error: {0}")]
    Io(String),

    /// The accessor cannot address the requested resolution
    #[error("Unsupported resolution {resolution} in {units} units: {reason}")]
    UnsupportedResolution {
        resolution: f64,
        units: &'static str,
        reason: String,
    },

    /// Region has zero area or overflows the addressable range
    #[error("Invalid region {width}x{height} at ({x}, {y})")]
    InvalidRegion {
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    },
}

/// Errors from the growable patch dataset
#[derive(Debug, Clone, Error)]
pub enum DatasetError {
    /// The output file already exists
    #[error("Dataset already exists: {0}")]
    AlreadyExists(PathBuf),

    /// A patch does not match the element shape fixed by the first patch
    #[error(
        "Patch shape mismatch: dataset holds {expected_shape:?} {expected_dtype}, got {actual_shape:?} {actual_dtype}"
    )]
    ShapeMismatch {
        expected_shape: [usize; 3],
        expected_dtype: SampleType,
        actual_shape: [usize; 3],
        actual_dtype: SampleType,
    },

    /// Write attempted after the dataset was closed
    #[error("Dataset is closed")]
    Closed,

    /// File is not a dataset this crate can read
    #[error("Invalid dataset format: {0}")]
    InvalidFormat(String),

    /// I/O error on the dataset file
    #[error("I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },
}

impl DatasetError {
    pub(crate) fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        DatasetError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Top-level error for a single slide extraction
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    /// Configuration rejected before any work started
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Slide or mask file does not exist
    #[error("{kind} file does not exist: {path}")]
    NotFound { kind: &'static str, path: PathBuf },

    /// Several slides in one batch map to the same dataset file
    #[error("{count} slides would write the same dataset {output}")]
    OutputConflict { output: PathBuf, count: usize },

    /// Slide or mask could not be opened
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: ReadError,
    },

    /// Slide extent query failed
    #[error("Failed to query slide extent: {0}")]
    Extent(#[source] ReadError),

    /// Region read failed at a tile coordinate
    #[error("Failed to read region at ({x}, {y}): {source}")]
    Read {
        x: i64,
        y: i64,
        #[source]
        source: ReadError,
    },

    /// Writing the dataset failed
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
}

impl ExtractionError {
    /// Whether this error is raised before any extraction work begins.
    pub fn is_fail_fast(&self) -> bool {
        matches!(
            self,
            ExtractionError::Config(_)
                | ExtractionError::NotFound { .. }
                | ExtractionError::OutputConflict { .. }
        )
    }
}
