//! Slide access layer.
//!
//! The extraction engine reads pixels through two small traits so it never
//! depends on a concrete file format:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           Extraction Engine             │
//! └───────────┬─────────────────┬───────────┘
//!             │                 │
//!             ▼                 ▼
//! ┌─────────────────────┐ ┌─────────────────┐
//! │   SlideAccessor     │ │  MaskAccessor   │
//! │ extent, read_region │ │   read_region   │
//! └──────────┬──────────┘ └────────┬────────┘
//!            │                     │
//!            ▼                     ▼
//! ┌─────────────────────┐ ┌─────────────────┐
//! │    RasterSlide      │ │   RasterMask    │
//! │ (decoded raster +   │ │ (aligned luma,  │
//! │  LRU of levels)     │ │  nearest)       │
//! └─────────────────────┘ └─────────────────┘
//! ```
//!
//! Out-of-extent samples are produced by [`crop_padded`], shared by every
//! accessor so the padding modes behave identically everywhere.

mod accessor;
mod padding;
mod raster;

pub use accessor::{
    MaskAccessor, PadMode, Padding, RegionRequest, Resolution, SlideAccessor, Units,
};
pub use padding::{crop_padded, map_index, SampleGrid};
pub use raster::{RasterMask, RasterSlide, SlideMetadata, DEFAULT_LEVEL_CACHE_CAPACITY};
