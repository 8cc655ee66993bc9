//! Batch orchestration over a directory of slides.
//!
//! Every slide in the input directory gets its own accessors, pipeline and
//! output file. Slides run on the blocking thread pool with at most
//! `jobs` in flight; a failing slide is logged and the batch moves on.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task;
use tracing::{debug, error, info, info_span};

use crate::config::{extension_of, ExtractionSettings, MaskSource};
use crate::error::{DatasetError, ExtractionError};
use crate::patch::ExtractionMethod;
use crate::slide::{MaskAccessor, RasterMask, RasterSlide};

use super::engine::{ExtractionReport, PatchExtractor};

// =============================================================================
// Batch Summary
// =============================================================================

/// Totals for a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Slides that produced at least one patch
    pub succeeded: usize,
    /// Slides that completed with no accepted patch
    pub empty: usize,
    /// Slides that failed
    pub failed: usize,
    /// Patches written across all slides
    pub patches: usize,
}

impl BatchSummary {
    /// Number of slides processed.
    pub fn slides(&self) -> usize {
        self.succeeded + self.empty + self.failed
    }

    fn record(&mut self, report: &ExtractionReport) {
        if report.is_empty() {
            self.empty += 1;
        } else {
            self.succeeded += 1;
        }
        self.patches += report.patches();
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// List the slide files in `input_dir`, sorted by name.
///
/// With a non-empty `extensions` list only files with one of those
/// (lower-case, dot-less) extensions are returned. An unreadable directory
/// is logged and yields no slides.
pub fn discover_slides(input_dir: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(input_dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!(input_dir = %input_dir.display(), "Failed to list slides: {}", e);
            return Vec::new();
        }
    };

    let mut slides: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            extensions.is_empty()
                || extension_of(path).is_some_and(|ext| extensions.contains(&ext))
        })
        .collect();
    slides.sort();
    slides
}

/// Slides that would write the same dataset file, keyed by that file.
///
/// Outputs are named after the slide stem, so `case.png` and `case.tif`
/// collide. Only paths claimed by two or more slides are returned.
pub fn output_conflicts(
    settings: &ExtractionSettings,
    slides: &[PathBuf],
) -> BTreeMap<PathBuf, Vec<PathBuf>> {
    let mut by_output: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    for slide in slides {
        by_output
            .entry(settings.output_path(slide))
            .or_default()
            .push(slide.clone());
    }
    by_output.retain(|_, group| group.len() > 1);
    by_output
}

/// Locate the mask for `slide_path`, if the settings call for one.
///
/// # Errors
///
/// [`ExtractionError::NotFound`] when the configured mask file is missing or
/// the mask directory has no file with the slide's stem.
pub fn resolve_mask(
    settings: &ExtractionSettings,
    slide_path: &Path,
) -> Result<Option<PathBuf>, ExtractionError> {
    match &settings.mask {
        MaskSource::None => Ok(None),
        MaskSource::File(path) => {
            if path.is_file() {
                Ok(Some(path.clone()))
            } else {
                Err(ExtractionError::NotFound {
                    kind: "Mask",
                    path: path.clone(),
                })
            }
        }
        MaskSource::Directory(dir) => {
            let stem = slide_path.file_stem().unwrap_or_default();
            let not_found = || ExtractionError::NotFound {
                kind: "Mask",
                path: dir.join(stem),
            };
            let entries = std::fs::read_dir(dir).map_err(|_| not_found())?;
            let mut candidates: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|path| path.is_file() && path.file_stem() == Some(stem))
                .collect();
            candidates.sort();
            candidates.into_iter().next().map(Some).ok_or_else(not_found)
        }
    }
}

// =============================================================================
// Per-Slide Processing
// =============================================================================

/// Extract one slide according to `settings`.
///
/// Missing inputs are reported before the output directory is touched, and
/// an existing dataset is only replaced once the slide and mask have opened.
pub fn process_slide(
    extractor: &PatchExtractor,
    settings: &ExtractionSettings,
    slide_path: &Path,
) -> Result<ExtractionReport, ExtractionError> {
    if !slide_path.is_file() {
        return Err(ExtractionError::NotFound {
            kind: "Slide",
            path: slide_path.to_path_buf(),
        });
    }
    let mask_path = match extractor.method() {
        ExtractionMethod::SlidingWindow { .. } => resolve_mask(settings, slide_path)?,
        ExtractionMethod::Point { .. } => None,
    };

    let output = settings.output_path(slide_path);
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DatasetError::io(parent, e))?;
    }
    let slide = RasterSlide::open(slide_path, settings.metadata).map_err(|source| {
        ExtractionError::Open {
            path: slide_path.to_path_buf(),
            source,
        }
    })?;
    let mask = match mask_path {
        Some(path) => Some(
            RasterMask::open(&path, slide.dimensions(), settings.metadata)
                .map_err(|source| ExtractionError::Open { path, source })?,
        ),
        None => None,
    };

    if settings.overwrite && output.exists() {
        debug!(path = %output.display(), "Replacing existing dataset");
        std::fs::remove_file(&output).map_err(|e| DatasetError::io(&output, e))?;
    }

    extractor.extract(
        &slide,
        mask.as_ref().map(|mask| mask as &dyn MaskAccessor),
        &output,
    )
}

// =============================================================================
// Batch Runner
// =============================================================================

/// Extract every slide in `settings.input_dir`.
///
/// Failures are logged per slide and counted; they never stop the batch.
/// Slides that share a dataset path fail without being read.
pub async fn run_batch(settings: ExtractionSettings) -> BatchSummary {
    let discovered = discover_slides(&settings.input_dir, &settings.slide_extensions);
    info!(
        input_dir = %settings.input_dir.display(),
        count = discovered.len(),
        jobs = settings.jobs,
        "Discovered slides"
    );

    let mut summary = BatchSummary::default();
    let conflicts = output_conflicts(&settings, &discovered);
    let mut slides = Vec::with_capacity(discovered.len());
    for slide_path in discovered {
        let output = settings.output_path(&slide_path);
        match conflicts.get(&output) {
            Some(group) => {
                let e = ExtractionError::OutputConflict {
                    output,
                    count: group.len(),
                };
                error!(slide = %slide_path.display(), "Failed to extract patches: {}", e);
                summary.failed += 1;
            }
            None => slides.push(slide_path),
        }
    }

    let extractor = Arc::new(PatchExtractor::from_settings(&settings));
    let limit = Arc::new(Semaphore::new(settings.jobs));
    let settings = Arc::new(settings);

    let mut handles = Vec::with_capacity(slides.len());
    for slide_path in slides {
        let Ok(permit) = Arc::clone(&limit).acquire_owned().await else {
            break;
        };
        let extractor = Arc::clone(&extractor);
        let settings = Arc::clone(&settings);
        let path = slide_path.clone();

        let handle = task::spawn_blocking(move || {
            let _permit = permit;
            let name = slide_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let _span = info_span!("slide", name = %name).entered();
            info!("Processing slide");
            process_slide(&extractor, &settings, &slide_path)
        });
        handles.push((path, handle));
    }

    for (path, handle) in handles {
        match handle.await {
            Ok(Ok(report)) => summary.record(&report),
            Ok(Err(e)) => {
                error!(slide = %path.display(), "Failed to extract patches: {}", e);
                summary.failed += 1;
            }
            Err(e) => {
                error!(slide = %path.display(), "Extraction task aborted: {}", e);
                summary.failed += 1;
            }
        }
    }

    info!(
        succeeded = summary.succeeded,
        empty = summary.empty,
        failed = summary.failed,
        patches = summary.patches,
        "Batch complete"
    );
    summary
}
