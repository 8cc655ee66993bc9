//! Coordinate planning.
//!
//! A plan is a lazy, finite iterator of tile top-left corners. It knows its
//! exact length up front, which the engine logs before scanning, but it
//! cannot be rewound: re-scanning a slide means building a new plan.

use super::tiling::{ExtractionMethod, Size2, TilingConfig};
use super::types::TileCoord;

// =============================================================================
// Sliding Window
// =============================================================================

/// Row-major grid of tile corners over a slide extent.
///
/// For `y` in `0, sh, 2sh, ..` while `y < H` and `x` in `0, sw, ..` while
/// `x < W`. With `within_bound` only tiles that fit entirely inside the
/// extent are kept.
#[derive(Debug, Clone)]
pub struct SlidingWindowPlan {
    stride: Size2,
    columns: u64,
    rows: u64,
    next: u64,
}

/// Number of grid positions along one axis.
fn axis_steps(extent: u32, patch: u32, stride: u32, within_bound: bool) -> u64 {
    let (extent, patch, stride) = (extent as u64, patch as u64, stride as u64);
    if within_bound {
        if extent < patch {
            0
        } else {
            (extent - patch) / stride + 1
        }
    } else {
        extent.div_ceil(stride)
    }
}

impl SlidingWindowPlan {
    /// Plan tiles over a slide of `extent = (width, height)`.
    pub fn new(extent: (u32, u32), tiling: &TilingConfig) -> Self {
        let (width, height) = extent;
        let patch = tiling.patch_size();
        let stride = tiling.stride();
        Self {
            stride,
            columns: axis_steps(width, patch.width, stride.width, tiling.within_bound),
            rows: axis_steps(height, patch.height, stride.height, tiling.within_bound),
            next: 0,
        }
    }

    /// `(columns, rows)` of the grid.
    pub fn grid(&self) -> (u64, u64) {
        (self.columns, self.rows)
    }

    fn total(&self) -> u64 {
        self.columns * self.rows
    }
}

impl Iterator for SlidingWindowPlan {
    type Item = TileCoord;

    fn next(&mut self) -> Option<TileCoord> {
        if self.next >= self.total() {
            return None;
        }
        let column = self.next % self.columns;
        let row = self.next / self.columns;
        self.next += 1;
        Some(TileCoord::new(
            (column * self.stride.width as u64) as i64,
            (row * self.stride.height as u64) as i64,
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.total() - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SlidingWindowPlan {}

// =============================================================================
// Coordinate Plan
// =============================================================================

/// Coordinates visited for one slide.
#[derive(Debug, Clone)]
pub enum CoordinatePlan {
    SlidingWindow(SlidingWindowPlan),
    /// Explicit locations, used verbatim and never bounds-checked
    Points(std::vec::IntoIter<TileCoord>),
}

impl CoordinatePlan {
    /// Build the plan for `method` over a slide of `extent`.
    pub fn new(extent: (u32, u32), tiling: &TilingConfig, method: &ExtractionMethod) -> Self {
        match method {
            ExtractionMethod::SlidingWindow { .. } => {
                CoordinatePlan::SlidingWindow(SlidingWindowPlan::new(extent, tiling))
            }
            ExtractionMethod::Point { locations } => {
                CoordinatePlan::Points(locations.clone().into_iter())
            }
        }
    }
}

impl Iterator for CoordinatePlan {
    type Item = TileCoord;

    fn next(&mut self) -> Option<TileCoord> {
        match self {
            CoordinatePlan::SlidingWindow(plan) => plan.next(),
            CoordinatePlan::Points(points) => points.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            CoordinatePlan::SlidingWindow(plan) => plan.size_hint(),
            CoordinatePlan::Points(points) => points.size_hint(),
        }
    }
}

impl ExactSizeIterator for CoordinatePlan {}
