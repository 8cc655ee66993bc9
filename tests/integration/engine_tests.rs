//! Single-slide extraction integration tests.
//!
//! Tests verify:
//! - Sliding-window ordering and boundary policy
//! - Inclusive mask threshold and mask-first reads
//! - Point extraction ignores the mask
//! - Read and shape failures keep already written patches
//! - Output is a plain C-order `.npy` array

use tempfile::tempdir;

use wsi_patch_extractor::error::{DatasetError, ExtractionError};
use wsi_patch_extractor::io::DatasetReader;
use wsi_patch_extractor::patch::{
    ExtractionMethod, PointAnchor, SampleType, Size2, TileCoord, TilingConfig,
};
use wsi_patch_extractor::slide::{PadMode, Padding};
use wsi_patch_extractor::PatchExtractor;

use super::test_utils::{pixel_value, MockSlide, RatioMask, ShrinkingSlide};

fn tiling(patch: u32) -> TilingConfig {
    TilingConfig::new(Size2::new(patch, patch)).unwrap()
}

// =============================================================================
// Sliding Window
// =============================================================================

#[test]
fn test_full_grid_in_row_major_order() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("patches.npy");
    let slide = MockSlide::new(512, 512);
    let extractor = PatchExtractor::new(
        tiling(256).with_within_bound(true),
        ExtractionMethod::default(),
    );

    let report = extractor.extract(&slide, None, &output).unwrap();
    assert_eq!(report.patches(), 4);
    assert_eq!(
        slide.requests(),
        vec![(0, 0), (256, 0), (0, 256), (256, 256)]
    );

    let reader = DatasetReader::open(&output).unwrap();
    assert_eq!(reader.shape(), &[4, 256, 256, 1]);
    assert_eq!(reader.sample_type(), SampleType::U8);

    let expected = [(0, 0), (256, 0), (0, 256), (256, 256)];
    for (index, (x, y)) in expected.into_iter().enumerate() {
        let patch = reader.read_patch(index).unwrap();
        assert_eq!(patch.sample(0, 0, 0), pixel_value(x, y) as f64);
        assert_eq!(patch.sample(255, 255, 0), pixel_value(x + 255, y + 255) as f64);
    }
}

#[test]
fn test_dataset_is_a_standard_npy_array() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("patches.npy");
    let slide = MockSlide::new(64, 32);
    let extractor = PatchExtractor::new(tiling(32), ExtractionMethod::default());
    extractor.extract(&slide, None, &output).unwrap();
    assert!(!dir.path().join("patches.npy.part").exists());

    let bytes = std::fs::read(&output).unwrap();
    let npy = npyz::NpyFile::new(&bytes[..]).unwrap();
    assert_eq!(npy.shape(), &[2, 32, 32, 1]);
    assert!(matches!(npy.order(), npyz::Order::C));
    let samples: Vec<u8> = npy.into_vec().unwrap();
    assert_eq!(samples.len(), 2 * 32 * 32);
    assert_eq!(samples[32 * 32], pixel_value(32, 0));
}

#[test]
fn test_small_slide_within_bound_gives_empty_dataset() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("patches.npy");
    let slide = MockSlide::new(10, 10);
    let extractor = PatchExtractor::new(
        tiling(256).with_within_bound(true),
        ExtractionMethod::default(),
    );

    let report = extractor.extract(&slide, None, &output).unwrap();
    assert!(report.is_empty());
    assert_eq!(slide.read_count(), 0);

    let reader = DatasetReader::open(&output).unwrap();
    assert!(reader.is_empty());
    assert_eq!(reader.shape(), &[0, 256, 256, 1]);
}

#[test]
fn test_edge_tiles_are_padded() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("patches.npy");
    let slide = MockSlide::new(300, 100);
    let extractor = PatchExtractor::new(
        tiling(256).with_padding(Padding::constant(9.0)),
        ExtractionMethod::default(),
    );

    let report = extractor.extract(&slide, None, &output).unwrap();
    assert_eq!(report.planned, 2);

    let reader = DatasetReader::open(&output).unwrap();
    assert_eq!(reader.shape(), &[2, 256, 256, 1]);
    let edge = reader.read_patch(1).unwrap();
    assert_eq!(edge.sample(0, 0, 0), pixel_value(256, 0) as f64);
    assert_eq!(edge.sample(0, 100, 0), 9.0);
    assert_eq!(edge.sample(200, 0, 0), 9.0);
}

#[test]
fn test_edge_pad_mode_repeats_border() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("patches.npy");
    let slide = MockSlide::new(40, 40);
    let extractor = PatchExtractor::new(
        tiling(32).with_padding(Padding {
            mode: PadMode::Edge,
            value: 0.0,
        }),
        ExtractionMethod::default(),
    );

    extractor.extract(&slide, None, &output).unwrap();
    let reader = DatasetReader::open(&output).unwrap();
    let corner = reader.read_patch(3).unwrap();
    assert_eq!(corner.sample(31, 31, 0), pixel_value(39, 39) as f64);
}

#[test]
fn test_extraction_is_idempotent() {
    let dir = tempdir().unwrap();
    let slide = MockSlide::new(200, 120);
    let extractor = PatchExtractor::new(
        tiling(64).with_stride(Size2::new(48, 48)).unwrap(),
        ExtractionMethod::default(),
    );

    let first = dir.path().join("first.npy");
    let second = dir.path().join("second.npy");
    extractor.extract(&slide, None, &first).unwrap();
    extractor.extract(&slide, None, &second).unwrap();

    assert_eq!(std::fs::read(first).unwrap(), std::fs::read(second).unwrap());
}

// =============================================================================
// Mask Filtering
// =============================================================================

#[test]
fn test_ratio_equal_to_threshold_is_accepted() {
    let dir = tempdir().unwrap();
    let slide = MockSlide::new(40, 10);
    // Tiles at x = 0, 10, 20, 30 have ratios 0.25, 0.5, 0.75, 1.0.
    let mask = RatioMask::new(|x, _| (x as f64 + 10.0) / 40.0);
    let extractor = PatchExtractor::new(
        tiling(10),
        ExtractionMethod::sliding_window(0.5).unwrap(),
    );

    let report = extractor
        .extract(&slide, Some(&mask), dir.path().join("patches.npy"))
        .unwrap();
    assert_eq!(report.patches(), 3);
    assert_eq!(report.stats.rejected, 1);
    assert_eq!(slide.requests(), vec![(10, 0), (20, 0), (30, 0)]);
}

#[test]
fn test_fully_masked_slide_writes_empty_dataset() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("patches.npy");
    let slide = MockSlide::new(64, 64);
    let mask = RatioMask::new(|_, _| 0.0);
    let extractor = PatchExtractor::new(tiling(32), ExtractionMethod::default());

    let report = extractor.extract(&slide, Some(&mask), &output).unwrap();
    assert!(report.is_empty());
    assert_eq!(report.stats.rejected, 4);
    assert_eq!(slide.read_count(), 0);
    assert_eq!(DatasetReader::open(&output).unwrap().len(), 0);
}

// =============================================================================
// Point Extraction
// =============================================================================

#[test]
fn test_points_ignore_mask() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("patches.npy");
    let slide = MockSlide::new(200, 200);
    let mask = RatioMask::new(|_, _| 0.0);
    let method = ExtractionMethod::point(
        vec![TileCoord::new(0, 0), TileCoord::new(100, 100)],
        PointAnchor::TopLeft,
        Size2::new(50, 50),
    )
    .unwrap();
    let extractor = PatchExtractor::new(tiling(50), method);

    let report = extractor.extract(&slide, Some(&mask), &output).unwrap();
    assert_eq!(report.patches(), 2);
    assert_eq!(slide.requests(), vec![(0, 0), (100, 100)]);
    assert_eq!(DatasetReader::open(&output).unwrap().shape(), &[2, 50, 50, 1]);
}

#[test]
fn test_points_are_not_bounds_checked() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("patches.npy");
    let slide = MockSlide::new(64, 64);
    let method = ExtractionMethod::Point {
        locations: vec![TileCoord::new(-16, -16), TileCoord::new(1000, 1000)],
    };
    let extractor = PatchExtractor::new(tiling(32).with_within_bound(true), method);

    let report = extractor.extract(&slide, None, &output).unwrap();
    assert_eq!(report.patches(), 2);

    let reader = DatasetReader::open(&output).unwrap();
    let outside = reader.read_patch(1).unwrap();
    assert_eq!(outside.count_nonzero_pixels(), 0);
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_read_failure_keeps_written_patches() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("patches.npy");
    let slide = MockSlide::new(128, 32).failing_at(64, 0);
    let extractor = PatchExtractor::new(tiling(32), ExtractionMethod::default());

    let result = extractor.extract(&slide, None, &output);
    assert!(matches!(
        result,
        Err(ExtractionError::Read { x: 64, y: 0, .. })
    ));
    // The stream stops at the failing tile.
    assert_eq!(slide.read_count(), 3);
    assert_eq!(DatasetReader::open(&output).unwrap().len(), 2);
}

#[test]
fn test_shape_mismatch_keeps_written_patches() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("patches.npy");
    let slide = ShrinkingSlide::new(2);
    let extractor = PatchExtractor::new(tiling(64), ExtractionMethod::default());

    let result = extractor.extract(&slide, None, &output);
    assert!(matches!(
        result,
        Err(ExtractionError::Dataset(DatasetError::ShapeMismatch { .. }))
    ));

    let reader = DatasetReader::open(&output).unwrap();
    assert_eq!(reader.shape(), &[2, 64, 64, 1]);
    assert_eq!(reader.read_patch(1).unwrap().sample(0, 0, 0), 1.0);
}
