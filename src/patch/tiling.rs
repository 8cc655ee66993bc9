//! Validated tiling parameters.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::slide::{Padding, Resolution};

use super::types::TileCoord;

/// Default minimum tissue fraction for a sliding-window tile.
pub const DEFAULT_MIN_MASK_RATIO: f64 = 0.5;

/// Height and width of a patch or stride, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size2 {
    pub height: u32,
    pub width: u32,
}

impl Size2 {
    pub const fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    fn require_positive(self, field: &'static str) -> Result<Self, ConfigError> {
        if self.height == 0 || self.width == 0 {
            return Err(ConfigError::Invalid {
                field,
                message: format!(
                    "both components must be positive, got [{}, {}]",
                    self.height, self.width
                ),
            });
        }
        Ok(self)
    }
}

// =============================================================================
// Tiling Config
// =============================================================================

/// How a slide is cut into patches.
///
/// Patch size and stride are guaranteed positive; the stride defaults to the
/// patch size, giving non-overlapping tiles.
#[derive(Debug, Clone, PartialEq)]
pub struct TilingConfig {
    patch_size: Size2,
    stride: Size2,
    /// Resolution the coordinates and patch size are expressed in
    pub resolution: Resolution,
    /// Fill policy for the part of a tile outside the slide
    pub padding: Padding,
    /// Drop tiles that would need padding instead of padding them
    pub within_bound: bool,
}

impl TilingConfig {
    /// Non-overlapping tiling at baseline with zero constant padding.
    pub fn new(patch_size: Size2) -> Result<Self, ConfigError> {
        let patch_size = patch_size.require_positive("patch_size")?;
        Ok(Self {
            patch_size,
            stride: patch_size,
            resolution: Resolution::baseline(),
            padding: Padding::default(),
            within_bound: false,
        })
    }

    pub fn with_stride(mut self, stride: Size2) -> Result<Self, ConfigError> {
        self.stride = stride.require_positive("stride")?;
        Ok(self)
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_within_bound(mut self, within_bound: bool) -> Self {
        self.within_bound = within_bound;
        self
    }

    pub fn patch_size(&self) -> Size2 {
        self.patch_size
    }

    pub fn stride(&self) -> Size2 {
        self.stride
    }
}

// =============================================================================
// Extraction Method
// =============================================================================

/// Where a point location sits relative to its patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointAnchor {
    /// The location is the patch's top-left corner
    #[default]
    TopLeft,
    /// The location is the patch's centre
    Center,
}

/// Strategy for choosing tiles.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionMethod {
    /// Systematic row-major scan; tiles may be filtered by a mask
    SlidingWindow { min_mask_ratio: f64 },
    /// One patch per explicit top-left location, never filtered
    Point { locations: Vec<TileCoord> },
}

impl ExtractionMethod {
    pub fn sliding_window(min_mask_ratio: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&min_mask_ratio) {
            return Err(ConfigError::Invalid {
                field: "min_mask_ratio",
                message: format!("must be within [0, 1], got {}", min_mask_ratio),
            });
        }
        Ok(ExtractionMethod::SlidingWindow { min_mask_ratio })
    }

    /// Point extraction from locations interpreted with `anchor`.
    pub fn point(
        locations: impl IntoIterator<Item = TileCoord>,
        anchor: PointAnchor,
        patch_size: Size2,
    ) -> Result<Self, ConfigError> {
        let locations: Vec<TileCoord> = locations
            .into_iter()
            .map(|loc| match anchor {
                PointAnchor::TopLeft => loc,
                PointAnchor::Center => TileCoord::new(
                    loc.x - (patch_size.width / 2) as i64,
                    loc.y - (patch_size.height / 2) as i64,
                ),
            })
            .collect();
        if locations.is_empty() {
            return Err(ConfigError::Missing("locations"));
        }
        Ok(ExtractionMethod::Point { locations })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExtractionMethod::SlidingWindow { .. } => "slidingwindow",
            ExtractionMethod::Point { .. } => "point",
        }
    }
}

impl Default for ExtractionMethod {
    fn default() -> Self {
        ExtractionMethod::SlidingWindow {
            min_mask_ratio: DEFAULT_MIN_MASK_RATIO,
        }
    }
}
