//! Slide and mask accessors for ordinary raster files.
//!
//! Files are decoded once with the `image` crate. Lower resolutions are built
//! on demand by resampling the baseline image and kept in a small LRU cache,
//! so a sliding-window scan at one resolution only resamples once.
//!
//! # Resolution mapping
//!
//! | Units      | Downsample factor            |
//! |------------|------------------------------|
//! | `level`    | `2^resolution`               |
//! | `baseline` | `1 / resolution` (0 → 1)     |
//! | `mpp`      | `resolution / slide_mpp`     |
//! | `power`    | `objective_power / resolution` |

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageReader};
use lru::LruCache;
use tracing::debug;

use crate::error::ReadError;
use crate::patch::{Patch, PixelLayout, SampleType};

use super::accessor::{
    MaskAccessor, Padding, RegionRequest, Resolution, SlideAccessor, Units,
};
use super::padding::{crop_padded, SampleGrid};

/// Number of resampled levels kept per slide.
pub const DEFAULT_LEVEL_CACHE_CAPACITY: usize = 4;

// =============================================================================
// Slide Metadata
// =============================================================================

/// Physical metadata needed to interpret `mpp` and `power` units.
///
/// Plain raster files carry neither, so both come from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SlideMetadata {
    /// Microns per pixel at baseline
    pub mpp: Option<f64>,
    /// Objective magnification at baseline
    pub objective_power: Option<f64>,
}

impl SlideMetadata {
    /// Downsample factor relative to baseline for `resolution`.
    pub fn downsample_for(&self, resolution: Resolution) -> Result<f64, ReadError> {
        let value = resolution.value;
        let unsupported = |reason: &str| ReadError::UnsupportedResolution {
            resolution: value,
            units: resolution.units.as_str(),
            reason: reason.to_string(),
        };

        if !value.is_finite() || value < 0.0 {
            return Err(unsupported("resolution must be a non-negative number"));
        }

        let downsample = match resolution.units {
            Units::Level => 2f64.powf(value),
            Units::Baseline => {
                if value == 0.0 {
                    1.0
                } else {
                    1.0 / value
                }
            }
            Units::Mpp => {
                let mpp = self
                    .mpp
                    .ok_or_else(|| unsupported("slide has no microns-per-pixel metadata"))?;
                if value == 0.0 {
                    return Err(unsupported("mpp must be greater than 0"));
                }
                value / mpp
            }
            Units::Power => {
                let power = self
                    .objective_power
                    .ok_or_else(|| unsupported("slide has no objective power metadata"))?;
                if value == 0.0 {
                    return Err(unsupported("power must be greater than 0"));
                }
                power / value
            }
        };

        if !downsample.is_finite() || downsample <= 0.0 {
            return Err(unsupported("resolves to an invalid downsample factor"));
        }
        Ok(downsample)
    }
}

// =============================================================================
// Raster Level
// =============================================================================

/// Decoded samples of one resolution level.
#[derive(Debug)]
struct RasterLevel {
    width: u32,
    height: u32,
    layout: PixelLayout,
    data: Bytes,
}

impl RasterLevel {
    fn grid(&self) -> SampleGrid<'_> {
        SampleGrid {
            width: self.width,
            height: self.height,
            channels: self.layout.channels,
            sample_type: self.layout.sample_type,
            data: &self.data,
        }
    }
}

/// Flatten a decoded image into interleaved little-endian samples.
fn image_samples(image: DynamicImage) -> (PixelLayout, Bytes) {
    fn u16_bytes(samples: &[u16]) -> Bytes {
        Bytes::from(
            samples
                .iter()
                .flat_map(|s| s.to_le_bytes())
                .collect::<Vec<u8>>(),
        )
    }
    fn f32_bytes(samples: &[f32]) -> Bytes {
        Bytes::from(
            samples
                .iter()
                .flat_map(|s| s.to_le_bytes())
                .collect::<Vec<u8>>(),
        )
    }
    let layout = |channels, sample_type| PixelLayout {
        channels,
        sample_type,
    };

    match image {
        DynamicImage::ImageLuma8(img) => (layout(1, SampleType::U8), Bytes::from(img.into_raw())),
        DynamicImage::ImageLumaA8(img) => (layout(2, SampleType::U8), Bytes::from(img.into_raw())),
        DynamicImage::ImageRgb8(img) => (layout(3, SampleType::U8), Bytes::from(img.into_raw())),
        DynamicImage::ImageRgba8(img) => (layout(4, SampleType::U8), Bytes::from(img.into_raw())),
        DynamicImage::ImageLuma16(img) => (layout(1, SampleType::U16), u16_bytes(img.as_raw())),
        DynamicImage::ImageLumaA16(img) => (layout(2, SampleType::U16), u16_bytes(img.as_raw())),
        DynamicImage::ImageRgb16(img) => (layout(3, SampleType::U16), u16_bytes(img.as_raw())),
        DynamicImage::ImageRgba16(img) => (layout(4, SampleType::U16), u16_bytes(img.as_raw())),
        DynamicImage::ImageRgb32F(img) => (layout(3, SampleType::F32), f32_bytes(img.as_raw())),
        DynamicImage::ImageRgba32F(img) => (layout(4, SampleType::F32), f32_bytes(img.as_raw())),
        other => (
            layout(3, SampleType::U8),
            Bytes::from(other.to_rgb8().into_raw()),
        ),
    }
}

/// Layout [`image_samples`] produces for an image of `color`.
fn layout_of(color: ColorType) -> PixelLayout {
    let (channels, sample_type) = match color {
        ColorType::L8 => (1, SampleType::U8),
        ColorType::La8 => (2, SampleType::U8),
        ColorType::Rgb8 => (3, SampleType::U8),
        ColorType::Rgba8 => (4, SampleType::U8),
        ColorType::L16 => (1, SampleType::U16),
        ColorType::La16 => (2, SampleType::U16),
        ColorType::Rgb16 => (3, SampleType::U16),
        ColorType::Rgba16 => (4, SampleType::U16),
        ColorType::Rgb32F => (3, SampleType::F32),
        ColorType::Rgba32F => (4, SampleType::F32),
        _ => (3, SampleType::U8),
    };
    PixelLayout {
        channels,
        sample_type,
    }
}

fn decode_file(path: &Path) -> Result<DynamicImage, ReadError> {
    let mut reader = ImageReader::open(path)
        .map_err(|e| ReadError::Io(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| ReadError::Io(e.to_string()))?;
    // Whole-slide rasters routinely exceed the default decoder limits.
    reader.no_limits();
    reader.decode().map_err(|e| ReadError::Decode(e.to_string()))
}

// =============================================================================
// Raster Slide
// =============================================================================

/// A slide backed by a single decoded raster image.
pub struct RasterSlide {
    base: DynamicImage,
    layout: PixelLayout,
    metadata: SlideMetadata,
    filter: FilterType,
    levels: Mutex<LruCache<u64, Arc<RasterLevel>>>,
}

impl RasterSlide {
    /// Decode a raster file from disk.
    pub fn open(path: impl AsRef<Path>, metadata: SlideMetadata) -> Result<Self, ReadError> {
        let path = path.as_ref();
        let image = decode_file(path)?;
        debug!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "Decoded raster slide"
        );
        Ok(Self::from_image(image, metadata))
    }

    /// Wrap an already decoded image.
    pub fn from_image(image: DynamicImage, metadata: SlideMetadata) -> Self {
        Self::with_filter(image, metadata, FilterType::Triangle)
    }

    fn with_filter(image: DynamicImage, metadata: SlideMetadata, filter: FilterType) -> Self {
        let layout = layout_of(image.color());
        let capacity = NonZeroUsize::new(DEFAULT_LEVEL_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            base: image,
            layout,
            metadata,
            filter,
            levels: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Baseline `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.base.width(), self.base.height())
    }

    pub fn metadata(&self) -> SlideMetadata {
        self.metadata
    }

    fn level_dimensions(&self, downsample: f64) -> (u32, u32) {
        let scale = |len: u32| ((len as f64 / downsample).round() as u32).max(1);
        (scale(self.base.width()), scale(self.base.height()))
    }

    fn level(&self, resolution: Resolution) -> Result<Arc<RasterLevel>, ReadError> {
        let downsample = self.metadata.downsample_for(resolution)?;
        let key = downsample.to_bits();

        if let Ok(mut levels) = self.levels.lock() {
            if let Some(level) = levels.get(&key) {
                return Ok(Arc::clone(level));
            }
        }

        let (width, height) = self.level_dimensions(downsample);
        let image = if (width, height) == self.dimensions() {
            self.base.clone()
        } else {
            debug!(downsample, width, height, "Resampling raster level");
            self.base.resize_exact(width, height, self.filter)
        };
        let (layout, data) = image_samples(image);
        let level = Arc::new(RasterLevel {
            width,
            height,
            layout,
            data,
        });

        if let Ok(mut levels) = self.levels.lock() {
            levels.put(key, Arc::clone(&level));
        }
        Ok(level)
    }
}

impl SlideAccessor for RasterSlide {
    fn extent(&self, resolution: Resolution) -> Result<(u32, u32), ReadError> {
        let downsample = self.metadata.downsample_for(resolution)?;
        Ok(self.level_dimensions(downsample))
    }

    fn read_region(&self, request: &RegionRequest) -> Result<Patch, ReadError> {
        let level = self.level(request.resolution)?;
        crop_padded(
            &level.grid(),
            request.x,
            request.y,
            request.width,
            request.height,
            request.padding,
        )
    }

    fn layout(&self) -> PixelLayout {
        self.layout
    }
}

// =============================================================================
// Raster Mask
// =============================================================================

/// A tissue mask backed by a raster image.
///
/// The mask is converted to 8-bit luminance and resampled with nearest
/// neighbour to the slide's baseline size, so it shares the slide's
/// coordinate space at every resolution. Samples outside the mask are never
/// tissue, whatever the slide's pad mode.
pub struct RasterMask {
    inner: RasterSlide,
}

impl RasterMask {
    /// Decode a mask file and align it to a slide of `slide_dimensions`.
    pub fn open(
        path: impl AsRef<Path>,
        slide_dimensions: (u32, u32),
        metadata: SlideMetadata,
    ) -> Result<Self, ReadError> {
        let image = decode_file(path.as_ref())?;
        Ok(Self::from_image(image, slide_dimensions, metadata))
    }

    pub fn from_image(
        image: DynamicImage,
        slide_dimensions: (u32, u32),
        metadata: SlideMetadata,
    ) -> Self {
        let (width, height) = slide_dimensions;
        let mut luma = DynamicImage::ImageLuma8(image.to_luma8());
        if (luma.width(), luma.height()) != (width, height) {
            debug!(
                from_width = luma.width(),
                from_height = luma.height(),
                width,
                height,
                "Aligning mask to slide dimensions"
            );
            luma = luma.resize_exact(width.max(1), height.max(1), FilterType::Nearest);
        }
        Self {
            inner: RasterSlide::with_filter(luma, metadata, FilterType::Nearest),
        }
    }
}

impl MaskAccessor for RasterMask {
    fn read_region(&self, request: &RegionRequest) -> Result<Patch, ReadError> {
        let request = RegionRequest {
            padding: Padding::constant(0.0),
            ..*request
        };
        self.inner.read_region(&request)
    }
}
