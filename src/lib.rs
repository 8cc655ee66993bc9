//! # WSI Patch Extractor
//!
//! Cuts Whole Slide Images (WSI) into fixed-size patches for machine-learning
//! pipelines and streams them into growable on-disk arrays.
//!
//! Patches are produced lazily, one at a time, so memory use stays bounded by
//! a single patch no matter how large the slide is.
//!
//! ## Features
//!
//! - **Sliding-window and point extraction**: row-major grid scan with
//!   configurable stride, or explicit patch locations
//! - **Tissue masks**: keep only tiles whose mask occupancy reaches a threshold
//! - **Padding modes**: constant, reflect, symmetric, edge and wrap for tiles
//!   that cross the slide border
//! - **Resolution units**: pyramid level, baseline scale, microns per pixel or
//!   objective power
//! - **Streaming sink**: one `.npy` file per slide, staged in chunks and
//!   finalized on close
//!
//! ## Architecture
//!
//! - [`patch`] - Tiling configuration, coordinate planning and the patch stream
//! - [`slide`] - Slide and mask accessors, padding and the raster backend
//! - [`io`] - The growable `.npy` patch dataset
//! - [`extract`] - Per-slide engine and batch orchestration
//! - [`config`] - CLI and configuration file types
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_patch_extractor::{
//!     ExtractionMethod, PatchExtractor, RasterSlide, Size2, SlideMetadata, TilingConfig,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let slide = RasterSlide::open("slide.png", SlideMetadata::default())?;
//!     let tiling = TilingConfig::new(Size2::new(256, 256))?.with_within_bound(true);
//!     let extractor = PatchExtractor::new(tiling, ExtractionMethod::default());
//!
//!     let report = extractor.extract(&slide, None, "patches.npy")?;
//!     println!("{} patches", report.patches());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod io;
pub mod patch;
pub mod slide;

// Re-export commonly used types
pub use config::{Cli, Command, ExtractArgs, ExtractionConfig, ExtractionSettings, MaskSource};
pub use error::{ConfigError, DatasetError, ExtractionError, ReadError};
pub use extract::{run_batch, BatchSummary, ExtractionReport, PatchExtractor};
pub use io::{DatasetReader, ElementSpec, PatchDataset};
pub use patch::{
    CoordinatePlan, ExtractionMethod, Patch, PatchStream, PixelLayout, SampleType, Size2,
    TileCoord, TilingConfig,
};
pub use slide::{
    MaskAccessor, PadMode, Padding, RasterMask, RasterSlide, RegionRequest, Resolution,
    SlideAccessor, SlideMetadata, Units,
};
