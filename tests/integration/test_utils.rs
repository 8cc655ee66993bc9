//! Test utilities for integration tests.
//!
//! This module provides in-memory slide and mask accessors that track reads
//! and fail on demand, plus helpers for writing raster slides to disk.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::{GrayImage, Luma, Rgb, RgbImage};

use wsi_patch_extractor::error::ReadError;
use wsi_patch_extractor::patch::{Patch, PixelLayout, SampleType};
use wsi_patch_extractor::slide::{
    crop_padded, MaskAccessor, RegionRequest, Resolution, SampleGrid, SlideAccessor,
};

// =============================================================================
// Mock Slide with Read Tracking
// =============================================================================

/// An in-memory single-channel `u8` slide.
///
/// Pixel `(x, y)` holds `pixel_value(x, y)`. Every `read_region` call is
/// recorded, and a read at `fail_at` returns an I/O error.
pub struct MockSlide {
    width: u32,
    height: u32,
    data: Vec<u8>,
    fail_at: Option<(i64, i64)>,
    reads: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<(i64, i64)>>>,
}

/// Deterministic content of [`MockSlide`] pixels.
pub fn pixel_value(x: u32, y: u32) -> u8 {
    ((x / 16 + 7 * (y / 16)) % 251) as u8
}

impl MockSlide {
    pub fn new(width: u32, height: u32) -> Self {
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| pixel_value(x, y)))
            .collect();
        Self {
            width,
            height,
            data,
            fail_at: None,
            reads: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fail the read whose top-left corner is `(x, y)`.
    pub fn failing_at(mut self, x: i64, y: i64) -> Self {
        self.fail_at = Some((x, y));
        self
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(i64, i64)> {
        self.requests.lock().unwrap().clone()
    }

    fn grid(&self) -> SampleGrid<'_> {
        SampleGrid {
            width: self.width,
            height: self.height,
            channels: 1,
            sample_type: SampleType::U8,
            data: &self.data,
        }
    }
}

impl SlideAccessor for MockSlide {
    fn extent(&self, _resolution: Resolution) -> Result<(u32, u32), ReadError> {
        Ok((self.width, self.height))
    }

    fn read_region(&self, request: &RegionRequest) -> Result<Patch, ReadError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push((request.x, request.y));

        if self.fail_at == Some((request.x, request.y)) {
            return Err(ReadError::Io("injected read failure".to_string()));
        }
        crop_padded(
            &self.grid(),
            request.x,
            request.y,
            request.width,
            request.height,
            request.padding,
        )
    }

    fn layout(&self) -> PixelLayout {
        PixelLayout {
            channels: 1,
            sample_type: SampleType::U8,
        }
    }
}

/// A slide whose reads return a patch of the wrong size after `good_reads`.
pub struct ShrinkingSlide {
    pub good_reads: usize,
    reads: AtomicUsize,
}

impl ShrinkingSlide {
    pub fn new(good_reads: usize) -> Self {
        Self {
            good_reads,
            reads: AtomicUsize::new(0),
        }
    }
}

impl SlideAccessor for ShrinkingSlide {
    fn extent(&self, _resolution: Resolution) -> Result<(u32, u32), ReadError> {
        Ok((256, 256))
    }

    fn read_region(&self, request: &RegionRequest) -> Result<Patch, ReadError> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        let height = if n < self.good_reads {
            request.height
        } else {
            request.height / 2
        };
        Ok(Patch::filled(
            height as usize,
            request.width as usize,
            1,
            SampleType::U8,
            n as f64,
        ))
    }

    fn layout(&self) -> PixelLayout {
        PixelLayout {
            channels: 1,
            sample_type: SampleType::U8,
        }
    }
}

// =============================================================================
// Mock Mask
// =============================================================================

/// A mask whose tissue fraction for a tile is `ratio_at(x, y)`.
///
/// The first `round(ratio * pixels)` pixels of the tile are tissue.
pub struct RatioMask<F> {
    ratio_at: F,
}

impl<F> RatioMask<F>
where
    F: Fn(i64, i64) -> f64 + Send + Sync,
{
    pub fn new(ratio_at: F) -> Self {
        Self { ratio_at }
    }
}

impl<F> MaskAccessor for RatioMask<F>
where
    F: Fn(i64, i64) -> f64 + Send + Sync,
{
    fn read_region(&self, request: &RegionRequest) -> Result<Patch, ReadError> {
        let pixels = request.width as usize * request.height as usize;
        let tissue = ((self.ratio_at)(request.x, request.y) * pixels as f64).round() as usize;
        let data: Vec<u8> = (0..pixels).map(|i| u8::from(i < tissue)).collect();
        Patch::new(
            request.height as usize,
            request.width as usize,
            1,
            SampleType::U8,
            data,
        )
    }
}

// =============================================================================
// Raster Files
// =============================================================================

/// Write an RGB PNG slide of the given size with a smooth gradient.
pub fn write_rgb_slide(path: &Path, width: u32, height: u32) {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    image.save(path).unwrap();
}

/// Write a binary PNG mask where pixels with `x < tissue_width` are tissue.
pub fn write_left_mask(path: &Path, width: u32, height: u32, tissue_width: u32) {
    let image = GrayImage::from_fn(width, height, |x, _| {
        if x < tissue_width {
            Luma([255])
        } else {
            Luma([0])
        }
    });
    image.save(path).unwrap();
}
