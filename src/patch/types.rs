//! Core value types shared by the planner, materializer and dataset writer.

use std::fmt;

use bytes::Bytes;

use crate::error::ReadError;

// =============================================================================
// Sample Type
// =============================================================================

/// Storage type of a single pixel sample.
///
/// Samples are always stored little-endian, matching the `.npy` descriptors
/// written by [`crate::io::PatchDataset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    U8,
    U16,
    F32,
}

impl SampleType {
    /// Size of one sample in bytes.
    pub const fn size(self) -> usize {
        match self {
            SampleType::U8 => 1,
            SampleType::U16 => 2,
            SampleType::F32 => 4,
        }
    }

    /// NumPy dtype descriptor for this sample type.
    pub const fn npy_descr(self) -> &'static str {
        match self {
            SampleType::U8 => "|u1",
            SampleType::U16 => "<u2",
            SampleType::F32 => "<f4",
        }
    }

    /// Parse a NumPy dtype descriptor.
    pub fn from_npy_descr(descr: &str) -> Option<Self> {
        match descr {
            "|u1" | "<u1" | "u1" => Some(SampleType::U8),
            "<u2" => Some(SampleType::U16),
            "<f4" => Some(SampleType::F32),
            _ => None,
        }
    }

    /// Encode `value` as one sample, saturating to the type's range.
    pub fn encode(self, value: f64) -> Vec<u8> {
        match self {
            SampleType::U8 => vec![value.round().clamp(0.0, u8::MAX as f64) as u8],
            SampleType::U16 => (value.round().clamp(0.0, u16::MAX as f64) as u16)
                .to_le_bytes()
                .to_vec(),
            SampleType::F32 => (value as f32).to_le_bytes().to_vec(),
        }
    }

    /// Decode one sample from the start of `bytes`.
    pub fn decode(self, bytes: &[u8]) -> f64 {
        match self {
            SampleType::U8 => bytes[0] as f64,
            SampleType::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            SampleType::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleType::U8 => "uint8",
            SampleType::U16 => "uint16",
            SampleType::F32 => "float32",
        };
        f.write_str(name)
    }
}

/// Channel count and sample type of a slide's pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    pub channels: usize,
    pub sample_type: SampleType,
}

// =============================================================================
// Tile Coordinate
// =============================================================================

/// Top-left corner of a tile in the coordinate space of the configured
/// resolution.
///
/// Signed because centred point locations may start left of or above the
/// slide origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub x: i64,
    pub y: i64,
}

impl TileCoord {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl From<(i64, i64)> for TileCoord {
    fn from((x, y): (i64, i64)) -> Self {
        Self { x, y }
    }
}

// =============================================================================
// Patch
// =============================================================================

/// A `height × width × channels` block of samples in row-major, interleaved
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    height: usize,
    width: usize,
    channels: usize,
    sample_type: SampleType,
    data: Bytes,
}

impl Patch {
    /// Wrap raw sample bytes, checking that the length matches the shape.
    pub fn new(
        height: usize,
        width: usize,
        channels: usize,
        sample_type: SampleType,
        data: impl Into<Bytes>,
    ) -> Result<Self, ReadError> {
        let data = data.into();
        let expected = height * width * channels * sample_type.size();
        if data.len() != expected {
            return Err(ReadError::Decode(format!(
                "patch buffer holds {} bytes, shape {}x{}x{} {} needs {}",
                data.len(),
                height,
                width,
                channels,
                sample_type,
                expected
            )));
        }
        Ok(Self {
            height,
            width,
            channels,
            sample_type,
            data,
        })
    }

    /// A patch where every sample equals `value`.
    pub fn filled(
        height: usize,
        width: usize,
        channels: usize,
        sample_type: SampleType,
        value: f64,
    ) -> Self {
        let sample = sample_type.encode(value);
        let data = sample.repeat(height * width * channels);
        Self {
            height,
            width,
            channels,
            sample_type,
            data: Bytes::from(data),
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    /// Shape as `[height, width, channels]`.
    pub fn shape(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }

    /// Raw little-endian sample bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    /// Number of pixels (not samples).
    pub fn pixel_count(&self) -> usize {
        self.height * self.width
    }

    /// Value of one sample as `f64`.
    ///
    /// # Panics
    /// Panics if the index is out of range.
    pub fn sample(&self, row: usize, col: usize, channel: usize) -> f64 {
        let size = self.sample_type.size();
        let offset = ((row * self.width + col) * self.channels + channel) * size;
        self.sample_type.decode(&self.data[offset..offset + size])
    }

    /// Count pixels where at least one channel is non-zero.
    pub fn count_nonzero_pixels(&self) -> usize {
        let pixel_bytes = self.channels * self.sample_type.size();
        if pixel_bytes == 0 {
            return 0;
        }
        self.data
            .chunks_exact(pixel_bytes)
            .filter(|pixel| pixel.iter().any(|&b| b != 0))
            .count()
    }
}
