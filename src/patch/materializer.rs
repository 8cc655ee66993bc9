//! Tile materialization and mask filtering.
//!
//! [`PatchStream`] pulls one coordinate at a time from a plan, reads the
//! region from the slide and, when a mask filter is attached, reads the same
//! region from the mask and drops tiles whose tissue fraction is below the
//! threshold. Nothing is buffered beyond the patch being yielded.
//!
//! A failed read is yielded once as an error and ends the stream.

use tracing::trace;

use crate::error::{ExtractionError, ReadError};
use crate::slide::{MaskAccessor, RegionRequest, SlideAccessor};

use super::tiling::TilingConfig;
use super::types::{Patch, TileCoord};

/// Fraction of pixels in `mask` flagged as tissue.
///
/// An empty mask region has ratio 0.
pub fn occupancy_ratio(mask: &Patch) -> f64 {
    let total = mask.pixel_count();
    if total == 0 {
        return 0.0;
    }
    mask.count_nonzero_pixels() as f64 / total as f64
}

/// Acceptance is inclusive: a ratio equal to the threshold passes.
#[inline]
pub fn passes_threshold(ratio: f64, min_mask_ratio: f64) -> bool {
    ratio >= min_mask_ratio
}

/// Mask-ratio filter applied to sliding-window tiles.
#[derive(Clone, Copy)]
pub struct MaskFilter<'a> {
    pub mask: &'a dyn MaskAccessor,
    pub min_mask_ratio: f64,
}

/// An accepted patch together with the coordinate it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPatch {
    pub coord: TileCoord,
    pub patch: Patch,
}

/// Counters describing what a stream has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Coordinates taken from the plan
    pub visited: usize,
    /// Tiles yielded to the consumer
    pub accepted: usize,
    /// Tiles dropped by the mask filter
    pub rejected: usize,
}

/// Lazy sequence of accepted patches for one slide.
pub struct PatchStream<'a, P> {
    plan: P,
    slide: &'a dyn SlideAccessor,
    filter: Option<MaskFilter<'a>>,
    tiling: &'a TilingConfig,
    stats: StreamStats,
    finished: bool,
}

impl<'a, P> PatchStream<'a, P>
where
    P: Iterator<Item = TileCoord>,
{
    pub fn new(
        plan: P,
        slide: &'a dyn SlideAccessor,
        filter: Option<MaskFilter<'a>>,
        tiling: &'a TilingConfig,
    ) -> Self {
        Self {
            plan,
            slide,
            filter,
            tiling,
            stats: StreamStats::default(),
            finished: false,
        }
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    fn request(&self, coord: TileCoord) -> RegionRequest {
        let patch = self.tiling.patch_size();
        RegionRequest {
            x: coord.x,
            y: coord.y,
            width: patch.width,
            height: patch.height,
            resolution: self.tiling.resolution,
            padding: self.tiling.padding,
        }
    }

    fn fail(&mut self, coord: TileCoord, source: ReadError) -> ExtractionError {
        self.finished = true;
        ExtractionError::Read {
            x: coord.x,
            y: coord.y,
            source,
        }
    }
}

impl<P> Iterator for PatchStream<'_, P>
where
    P: Iterator<Item = TileCoord>,
{
    type Item = Result<ExtractedPatch, ExtractionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        while let Some(coord) = self.plan.next() {
            self.stats.visited += 1;
            let request = self.request(coord);

            // Read the mask first so rejected tiles never touch the slide.
            if let Some(filter) = self.filter {
                let mask = match filter.mask.read_region(&request) {
                    Ok(mask) => mask,
                    Err(e) => return Some(Err(self.fail(coord, e))),
                };
                let ratio = occupancy_ratio(&mask);
                if !passes_threshold(ratio, filter.min_mask_ratio) {
                    trace!(x = coord.x, y = coord.y, ratio, "Tile rejected by mask");
                    self.stats.rejected += 1;
                    continue;
                }
            }

            return match self.slide.read_region(&request) {
                Ok(patch) => {
                    self.stats.accepted += 1;
                    Some(Ok(ExtractedPatch { coord, patch }))
                }
                Err(e) => Some(Err(self.fail(coord, e))),
            };
        }

        self.finished = true;
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            return (0, Some(0));
        }
        // Mask rejections and read failures can only shorten the stream.
        let (_, upper) = self.plan.size_hint();
        (0, upper)
    }
}

impl<P> std::iter::FusedIterator for PatchStream<'_, P> where P: Iterator<Item = TileCoord> {}
