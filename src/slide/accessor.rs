//! Accessor traits consumed by the extraction engine.
//!
//! The engine never decodes slide files itself. It is handed something that
//! can report the slide's extent at a resolution and read a rectangular region
//! at that resolution, padding whatever falls outside the slide. Masks expose
//! the same region read in the same coordinate space.
//!
//! # Implementations
//!
//! - [`crate::slide::RasterSlide`] / [`crate::slide::RasterMask`] for ordinary
//!   raster files decoded by the `image` crate
//! - in-memory mocks in the integration tests

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReadError;
use crate::patch::{Patch, PixelLayout};

// =============================================================================
// Units
// =============================================================================

/// Addressing scheme for the `resolution` value.
///
/// The accessor decides what each unit means for its pyramid; for raster
/// slides see [`crate::slide::RasterSlide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Pyramid level, 0 is full resolution
    Level,
    /// Objective magnification (e.g. 20 for 20x)
    Power,
    /// Microns per pixel
    Mpp,
    /// Scale relative to the baseline image (1.0 is full resolution)
    Baseline,
}

impl Units {
    pub const fn as_str(self) -> &'static str {
        match self {
            Units::Level => "level",
            Units::Power => "power",
            Units::Mpp => "mpp",
            Units::Baseline => "baseline",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "level" => Ok(Units::Level),
            "power" => Ok(Units::Power),
            "mpp" => Ok(Units::Mpp),
            "baseline" => Ok(Units::Baseline),
            other => Err(format!(
                "unknown units '{}' (expected level, power, mpp or baseline)",
                other
            )),
        }
    }
}

/// A resolution value paired with its units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub value: f64,
    pub units: Units,
}

impl Resolution {
    pub const fn new(value: f64, units: Units) -> Self {
        Self { value, units }
    }

    /// Full resolution of the slide.
    pub const fn baseline() -> Self {
        Self {
            value: 0.0,
            units: Units::Level,
        }
    }
}

// =============================================================================
// Padding
// =============================================================================

/// How to fill the part of a region that lies outside the slide.
///
/// Names follow NumPy's `np.pad` modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PadMode {
    /// Fill with the configured constant
    Constant,
    /// Mirror without repeating the edge sample: `d c b | a b c d | c b a`
    Reflect,
    /// Mirror repeating the edge sample: `c b a | a b c d | d c b`
    Symmetric,
    /// Replicate the edge sample
    Edge,
    /// Tile the slide periodically
    Wrap,
}

impl fmt::Display for PadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PadMode::Constant => "constant",
            PadMode::Reflect => "reflect",
            PadMode::Symmetric => "symmetric",
            PadMode::Edge => "edge",
            PadMode::Wrap => "wrap",
        };
        f.write_str(name)
    }
}

/// Padding policy for out-of-extent samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Padding {
    pub mode: PadMode,
    /// Only used by [`PadMode::Constant`]
    pub value: f64,
}

impl Padding {
    pub const fn constant(value: f64) -> Self {
        Self {
            mode: PadMode::Constant,
            value,
        }
    }
}

impl Default for Padding {
    fn default() -> Self {
        Self::constant(0.0)
    }
}

/// A rectangular request in resolution-space coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionRequest {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
    pub resolution: Resolution,
    pub padding: Padding,
}

// =============================================================================
// Accessor Traits
// =============================================================================

/// Read-only access to a slide's pixels.
///
/// Implementations must be `Send + Sync` so the orchestrator can move each
/// slide onto its own worker; the engine itself only borrows `&self`.
pub trait SlideAccessor: Send + Sync {
    /// Size `(width, height)` of the slide at `resolution`.
    fn extent(&self, resolution: Resolution) -> Result<(u32, u32), ReadError>;

    /// Read a region of exactly `request.width × request.height` pixels.
    ///
    /// Any part of the region outside the slide extent is filled according to
    /// `request.padding`.
    fn read_region(&self, request: &RegionRequest) -> Result<Patch, ReadError>;

    /// Channels and sample type of the patches this slide produces.
    fn layout(&self) -> PixelLayout;
}

/// Read-only access to a tissue mask aligned with a slide.
///
/// A pixel counts as tissue when any of its channels is non-zero.
pub trait MaskAccessor: Send + Sync {
    /// Read the mask region matching a slide region request.
    fn read_region(&self, request: &RegionRequest) -> Result<Patch, ReadError>;
}

impl<T: SlideAccessor + ?Sized> SlideAccessor for &T {
    fn extent(&self, resolution: Resolution) -> Result<(u32, u32), ReadError> {
        (**self).extent(resolution)
    }

    fn read_region(&self, request: &RegionRequest) -> Result<Patch, ReadError> {
        (**self).read_region(request)
    }

    fn layout(&self) -> PixelLayout {
        (**self).layout()
    }
}

impl<T: MaskAccessor + ?Sized> MaskAccessor for &T {
    fn read_region(&self, request: &RegionRequest) -> Result<Patch, ReadError> {
        (**self).read_region(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_from_str() {
        assert_eq!("level".parse::<Units>().unwrap(), Units::Level);
        assert_eq!("MPP".parse::<Units>().unwrap(), Units::Mpp);
        assert_eq!("Power".parse::<Units>().unwrap(), Units::Power);
        assert_eq!("baseline".parse::<Units>().unwrap(), Units::Baseline);
        assert!("micron".parse::<Units>().is_err());
    }

    #[test]
    fn test_units_serde_lowercase() {
        let units: Units = serde_json::from_str("\"mpp\"").unwrap();
        assert_eq!(units, Units::Mpp);
        assert_eq!(serde_json::to_string(&Units::Baseline).unwrap(), "\"baseline\"");
    }

    #[test]
    fn test_pad_mode_serde() {
        let mode: PadMode = serde_json::from_str("\"reflect\"").unwrap();
        assert_eq!(mode, PadMode::Reflect);
        assert!(serde_json::from_str::<PadMode>("\"mirror\"").is_err());
    }

    #[test]
    fn test_default_padding_is_zero_constant() {
        let padding = Padding::default();
        assert_eq!(padding.mode, PadMode::Constant);
        assert_eq!(padding.value, 0.0);
    }
}
