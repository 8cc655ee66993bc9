//! Patch planning and materialization.
//!
//! # Pipeline
//!
//! ```text
//! ┌────────────────┐   TileCoord   ┌────────────────┐  ExtractedPatch  ┌──────────────┐
//! │ CoordinatePlan │ ────────────▶ │  PatchStream   │ ───────────────▶ │ PatchDataset │
//! │ (grid/points)  │               │ (read + mask)  │                  │   (append)   │
//! └────────────────┘               └────────────────┘                  └──────────────┘
//! ```
//!
//! Each stage is a pull-based iterator: the dataset writer asks for the next
//! patch, the stream asks for the next coordinate. A stage is consumed once;
//! scanning a slide again means building a fresh plan and stream.
//!
//! # Components
//!
//! - [`TilingConfig`]: patch size, stride, resolution, padding, boundary policy
//! - [`ExtractionMethod`]: sliding window with mask ratio, or explicit points
//! - [`CoordinatePlan`] / [`SlidingWindowPlan`]: ordered tile corners
//! - [`PatchStream`]: reads regions and applies the [`MaskFilter`]
//! - [`Patch`]: one `height × width × channels` block of samples

mod materializer;
mod planner;
mod tiling;
mod types;

pub use materializer::{
    occupancy_ratio, passes_threshold, ExtractedPatch, MaskFilter, PatchStream, StreamStats,
};
pub use planner::{CoordinatePlan, SlidingWindowPlan};
pub use tiling::{
    ExtractionMethod, PointAnchor, Size2, TilingConfig, DEFAULT_MIN_MASK_RATIO,
};
pub use types::{Patch, PixelLayout, SampleType, TileCoord};
