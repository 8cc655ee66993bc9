//! Single-slide extraction engine.
//!
//! [`PatchExtractor`] runs the three pipeline stages for one slide:
//!
//! 1. Query the slide extent at the configured resolution
//! 2. Plan tile coordinates and stream accepted patches
//! 3. Append every patch to a fresh [`PatchDataset`] and close it
//!
//! The extractor holds no per-slide state, so one instance can serve any
//! number of slides, including from several threads at once.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::ExtractionSettings;
use crate::error::ExtractionError;
use crate::io::{ElementSpec, PatchDataset, DEFAULT_CHUNK_LEN};
use crate::patch::{
    CoordinatePlan, ExtractionMethod, MaskFilter, PatchStream, StreamStats, TilingConfig,
};
use crate::slide::{MaskAccessor, SlideAccessor};

// =============================================================================
// Extraction Report
// =============================================================================

/// Outcome of extracting one slide.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionReport {
    /// Dataset written for the slide
    pub output: PathBuf,

    /// Slide `(width, height)` at the extraction resolution
    pub extent: (u32, u32),

    /// Coordinates produced by the planner
    pub planned: usize,

    /// Coordinates visited, accepted and rejected by the mask
    pub stats: StreamStats,
}

impl ExtractionReport {
    /// Number of patches written.
    pub fn patches(&self) -> usize {
        self.stats.accepted
    }

    /// Whether the slide produced no patches at all.
    pub fn is_empty(&self) -> bool {
        self.stats.accepted == 0
    }
}

// =============================================================================
// Patch Extractor
// =============================================================================

/// Extracts patches from a slide into a dataset.
#[derive(Debug, Clone)]
pub struct PatchExtractor {
    tiling: TilingConfig,
    method: ExtractionMethod,
    chunk_len: usize,
}

impl PatchExtractor {
    pub fn new(tiling: TilingConfig, method: ExtractionMethod) -> Self {
        Self {
            tiling,
            method,
            chunk_len: DEFAULT_CHUNK_LEN,
        }
    }

    pub fn from_settings(settings: &ExtractionSettings) -> Self {
        Self::new(settings.tiling.clone(), settings.method.clone())
            .with_chunk_len(settings.chunk_len)
    }

    /// Dataset growth step, in patches.
    pub fn with_chunk_len(mut self, chunk_len: usize) -> Self {
        self.chunk_len = chunk_len.max(1);
        self
    }

    pub fn tiling(&self) -> &TilingConfig {
        &self.tiling
    }

    pub fn method(&self) -> &ExtractionMethod {
        &self.method
    }

    /// Plan the tile coordinates for `slide`.
    pub fn plan(&self, slide: &dyn SlideAccessor) -> Result<CoordinatePlan, ExtractionError> {
        let extent = slide
            .extent(self.tiling.resolution)
            .map_err(ExtractionError::Extent)?;
        Ok(CoordinatePlan::new(extent, &self.tiling, &self.method))
    }

    /// Lazily stream the accepted patches of `slide`.
    ///
    /// The mask only applies to sliding-window extraction; point extraction
    /// keeps every requested location.
    pub fn stream<'a>(
        &'a self,
        slide: &'a dyn SlideAccessor,
        mask: Option<&'a dyn MaskAccessor>,
    ) -> Result<PatchStream<'a, CoordinatePlan>, ExtractionError> {
        let plan = self.plan(slide)?;
        Ok(PatchStream::new(plan, slide, self.filter(mask), &self.tiling))
    }

    fn filter<'a>(&self, mask: Option<&'a dyn MaskAccessor>) -> Option<MaskFilter<'a>> {
        match (&self.method, mask) {
            (ExtractionMethod::SlidingWindow { min_mask_ratio }, Some(mask)) => Some(MaskFilter {
                mask,
                min_mask_ratio: *min_mask_ratio,
            }),
            (ExtractionMethod::Point { .. }, Some(_)) => {
                debug!("Mask ignored for point extraction");
                None
            }
            (_, None) => None,
        }
    }

    /// Extract every accepted patch of `slide` into a new dataset at `output`.
    ///
    /// The output must not exist yet. A slide with no accepted patches still
    /// produces a valid, empty dataset. When a region read fails the dataset
    /// is closed with the patches written so far and the error is returned.
    pub fn extract(
        &self,
        slide: &dyn SlideAccessor,
        mask: Option<&dyn MaskAccessor>,
        output: impl AsRef<Path>,
    ) -> Result<ExtractionReport, ExtractionError> {
        let output = output.as_ref();
        let extent = slide
            .extent(self.tiling.resolution)
            .map_err(ExtractionError::Extent)?;
        let plan = CoordinatePlan::new(extent, &self.tiling, &self.method);
        let planned = plan.len();
        debug!(
            method = self.method.name(),
            width = extent.0,
            height = extent.1,
            planned,
            "Planned tiles"
        );

        let mut dataset = PatchDataset::create(output)?.with_chunk_len(self.chunk_len);
        let patch_size = self.tiling.patch_size();
        let layout = slide.layout();
        dataset.set_empty_hint(ElementSpec {
            shape: [
                patch_size.height as usize,
                patch_size.width as usize,
                layout.channels,
            ],
            sample_type: layout.sample_type,
        });

        let mut stream = PatchStream::new(plan, slide, self.filter(mask), &self.tiling);
        let written = stream
            .by_ref()
            .try_for_each(|item| -> Result<(), ExtractionError> {
                let extracted = item?;
                dataset.append(&extracted.patch)?;
                Ok(())
            });
        let stats = stream.stats();

        if let Err(e) = written {
            if let Err(close_err) = dataset.close() {
                warn!(path = %output.display(), "Failed to close partial dataset: {}", close_err);
            }
            return Err(e);
        }
        dataset.close()?;

        if stats.accepted == 0 {
            warn!(
                path = %output.display(),
                planned,
                rejected = stats.rejected,
                "No patches extracted; wrote an empty dataset"
            );
        } else {
            info!(
                path = %output.display(),
                patches = stats.accepted,
                rejected = stats.rejected,
                "Extracted patches"
            );
        }

        Ok(ExtractionReport {
            output: output.to_path_buf(),
            extent,
            planned,
            stats,
        })
    }
}
