//! Region cropping with out-of-bounds padding.
//!
//! Works on raw interleaved sample buffers so every accessor (raster files,
//! in-memory test slides) shares the same padding semantics.

use crate::error::ReadError;
use crate::patch::{Patch, SampleType};

use super::accessor::{PadMode, Padding};

/// A borrowed, row-major, interleaved sample buffer.
#[derive(Debug, Clone, Copy)]
pub struct SampleGrid<'a> {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub sample_type: SampleType,
    pub data: &'a [u8],
}

impl SampleGrid<'_> {
    fn pixel_bytes(&self) -> usize {
        self.channels * self.sample_type.size()
    }
}

/// Map a possibly out-of-range index onto `0..len` for the given pad mode.
///
/// Returns `None` for [`PadMode::Constant`] when the index is outside, meaning
/// the constant value should be used.
pub fn map_index(index: i64, len: u32, mode: PadMode) -> Option<u32> {
    let n = len as i64;
    if n == 0 {
        return None;
    }
    if (0..n).contains(&index) {
        return Some(index as u32);
    }

    let mapped = match mode {
        PadMode::Constant => return None,
        PadMode::Edge => index.clamp(0, n - 1),
        PadMode::Wrap => index.rem_euclid(n),
        PadMode::Reflect => {
            if n == 1 {
                0
            } else {
                let period = 2 * (n - 1);
                let m = index.rem_euclid(period);
                if m < n {
                    m
                } else {
                    period - m
                }
            }
        }
        PadMode::Symmetric => {
            let period = 2 * n;
            let m = index.rem_euclid(period);
            if m < n {
                m
            } else {
                period - 1 - m
            }
        }
    };
    Some(mapped as u32)
}

/// Crop `width × height` pixels at `(x, y)` from `grid`, padding outside
/// samples.
pub fn crop_padded(
    grid: &SampleGrid<'_>,
    x: i64,
    y: i64,
    width: u32,
    height: u32,
    padding: Padding,
) -> Result<Patch, ReadError> {
    if width == 0 || height == 0 {
        return Err(ReadError::InvalidRegion {
            x,
            y,
            width,
            height,
        });
    }

    let pixel_bytes = grid.pixel_bytes();
    let row_bytes = width as usize * pixel_bytes;
    let fill = grid.sample_type.encode(padding.value).repeat(grid.channels);
    let src_row_bytes = grid.width as usize * pixel_bytes;

    // Column lookup is identical for every row.
    let columns: Vec<Option<u32>> = (0..width as i64)
        .map(|dx| map_index(x + dx, grid.width, padding.mode))
        .collect();
    let inside_x = x >= 0 && x + width as i64 <= grid.width as i64;

    let mut out = Vec::with_capacity(row_bytes * height as usize);
    for dy in 0..height as i64 {
        let Some(src_y) = map_index(y + dy, grid.height, padding.mode) else {
            for _ in 0..width {
                out.extend_from_slice(&fill);
            }
            continue;
        };

        let row_start = src_y as usize * src_row_bytes;
        if inside_x {
            let start = row_start + x as usize * pixel_bytes;
            out.extend_from_slice(&grid.data[start..start + row_bytes]);
            continue;
        }

        for column in &columns {
            match column {
                Some(src_x) => {
                    let start = row_start + *src_x as usize * pixel_bytes;
                    out.extend_from_slice(&grid.data[start..start + pixel_bytes]);
                }
                None => out.extend_from_slice(&fill),
            }
        }
    }

    Patch::new(
        height as usize,
        width as usize,
        grid.channels,
        grid.sample_type,
        out,
    )
}
