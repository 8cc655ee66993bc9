//! Slide-level extraction and batch orchestration.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         run_batch()                          │
//! │   discover_slides() ──▶ Semaphore(jobs) ──▶ spawn_blocking   │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ one task per slide
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       process_slide()                        │
//! │   resolve_mask() ─▶ RasterSlide / RasterMask ─▶ output path  │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  PatchExtractor::extract()                   │
//! │   CoordinatePlan ─▶ PatchStream ─▶ PatchDataset (.npy)       │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod batch;
mod engine;

pub use batch::{
    discover_slides, output_conflicts, process_slide, resolve_mask, run_batch, BatchSummary,
};
pub use engine::{ExtractionReport, PatchExtractor};
