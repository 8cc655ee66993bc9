//! Batch orchestration integration tests.
//!
//! Tests verify:
//! - Every slide in the input directory gets its own dataset
//! - Per-slide masks are matched by file stem
//! - A failing slide is counted and does not stop the batch
//! - Slides sharing a file stem fail instead of sharing one dataset
//! - Existing datasets are replaced or kept according to `overwrite`

use std::path::PathBuf;

use tempfile::tempdir;

use wsi_patch_extractor::config::{ExtractionConfig, MethodName};
use wsi_patch_extractor::error::{DatasetError, ExtractionError};
use wsi_patch_extractor::extract::{process_slide, run_batch};
use wsi_patch_extractor::io::DatasetReader;
use wsi_patch_extractor::patch::SampleType;
use wsi_patch_extractor::PatchExtractor;

use super::test_utils::{write_left_mask, write_rgb_slide};

fn config_for(input_dir: PathBuf, output_dir: PathBuf) -> ExtractionConfig {
    ExtractionConfig {
        patch_size: [32, 32],
        input_dir,
        output_dir,
        log_file: None,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_batch_writes_one_dataset_per_slide() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("slides");
    let output = dir.path().join("out");
    std::fs::create_dir(&input).unwrap();
    write_rgb_slide(&input.join("a.png"), 64, 64);
    write_rgb_slide(&input.join("b.png"), 96, 32);

    let settings = ExtractionConfig {
        jobs: 2,
        ..config_for(input, output.clone())
    }
    .validate()
    .unwrap();

    let summary = run_batch(settings).await;
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.patches, 4 + 3);

    let a = DatasetReader::open(output.join("patches/a/patches.npy")).unwrap();
    assert_eq!(a.shape(), &[4, 32, 32, 3]);
    assert_eq!(a.sample_type(), SampleType::U8);

    let b = DatasetReader::open(output.join("patches/b/patches.npy")).unwrap();
    assert_eq!(b.len(), 3);
    let second = b.read_patch(1).unwrap();
    // Red channel is the column index.
    assert_eq!(second.sample(0, 0, 0), 32.0);
}

#[tokio::test]
async fn test_batch_continues_after_failed_slide() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("slides");
    let output = dir.path().join("out");
    std::fs::create_dir(&input).unwrap();
    std::fs::write(input.join("broken.png"), b"not an image").unwrap();
    write_rgb_slide(&input.join("good.png"), 32, 32);

    let settings = config_for(input, output.clone()).validate().unwrap();
    let summary = run_batch(settings).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.slides(), 2);
    assert!(output.join("patches/good/patches.npy").exists());
}

#[tokio::test]
async fn test_batch_fails_slides_sharing_a_stem() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("slides");
    let output = dir.path().join("out");
    std::fs::create_dir(&input).unwrap();
    write_rgb_slide(&input.join("case.png"), 64, 64);
    write_rgb_slide(&input.join("case.tif"), 96, 32);
    write_rgb_slide(&input.join("other.png"), 32, 32);

    let settings = ExtractionConfig {
        jobs: 2,
        ..config_for(input, output.clone())
    }
    .validate()
    .unwrap();
    let summary = run_batch(settings).await;

    assert_eq!(summary.failed, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.patches, 1);
    assert!(!output.join("patches/case/patches.npy").exists());
    assert!(output.join("patches/other/patches.npy").exists());
}

#[tokio::test]
async fn test_batch_counts_empty_slides() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("slides");
    std::fs::create_dir(&input).unwrap();
    write_rgb_slide(&input.join("tiny.png"), 10, 10);

    let settings = ExtractionConfig {
        within_bound: true,
        ..config_for(input, dir.path().join("out"))
    }
    .validate()
    .unwrap();
    let summary = run_batch(settings).await;

    assert_eq!(summary.empty, 1);
    assert_eq!(summary.patches, 0);
}

#[tokio::test]
async fn test_batch_with_missing_input_dir() {
    let dir = tempdir().unwrap();
    let settings = config_for(dir.path().join("missing"), dir.path().join("out"))
        .validate()
        .unwrap();
    let summary = run_batch(settings).await;
    assert_eq!(summary.slides(), 0);
}

#[tokio::test]
async fn test_mask_dir_matches_slide_stem() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("slides");
    let masks = dir.path().join("masks");
    let output = dir.path().join("out");
    std::fs::create_dir(&input).unwrap();
    std::fs::create_dir(&masks).unwrap();
    write_rgb_slide(&input.join("case.png"), 128, 32);
    // Half-resolution mask: resampled to the slide before use.
    write_left_mask(&masks.join("case.png"), 64, 16, 32);

    let settings = ExtractionConfig {
        mask_dir: Some(masks),
        min_mask_ratio: 0.9,
        ..config_for(input, output.clone())
    }
    .validate()
    .unwrap();
    let summary = run_batch(settings).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.patches, 2);
    let reader = DatasetReader::open(output.join("patches/case/patches.npy")).unwrap();
    assert_eq!(reader.len(), 2);
}

#[test]
fn test_missing_mask_fails_before_output() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("slides");
    let output = dir.path().join("out");
    std::fs::create_dir(&input).unwrap();
    let slide = input.join("case.png");
    write_rgb_slide(&slide, 32, 32);

    let settings = ExtractionConfig {
        input_mask: Some(dir.path().join("missing_mask.png")),
        ..config_for(input, output.clone())
    }
    .validate()
    .unwrap();
    let extractor = PatchExtractor::from_settings(&settings);

    let result = process_slide(&extractor, &settings, &slide);
    assert!(matches!(
        result,
        Err(ExtractionError::NotFound { kind: "Mask", .. })
    ));
    assert!(!output.exists());
}

#[test]
fn test_point_method_skips_mask_lookup() {
    let dir = tempdir().unwrap();
    let slide = dir.path().join("case.png");
    write_rgb_slide(&slide, 64, 64);

    let settings = ExtractionConfig {
        method: MethodName::Point,
        locations: Some(vec![[0.0, 0.0], [40.0, 40.0]]),
        input_mask: Some(dir.path().join("missing_mask.png")),
        ..config_for(dir.path().to_path_buf(), dir.path().join("out"))
    }
    .validate()
    .unwrap();
    let extractor = PatchExtractor::from_settings(&settings);

    let report = process_slide(&extractor, &settings, &slide).unwrap();
    assert_eq!(report.patches(), 2);
}

#[test]
fn test_overwrite_policy() {
    let dir = tempdir().unwrap();
    let slide = dir.path().join("case.png");
    write_rgb_slide(&slide, 32, 32);
    let output_dir = dir.path().join("out");

    let settings = config_for(dir.path().to_path_buf(), output_dir.clone())
        .validate()
        .unwrap();
    let extractor = PatchExtractor::from_settings(&settings);
    process_slide(&extractor, &settings, &slide).unwrap();
    let report = process_slide(&extractor, &settings, &slide).unwrap();
    assert_eq!(report.patches(), 1);

    let keep = ExtractionConfig {
        overwrite: false,
        ..config_for(dir.path().to_path_buf(), output_dir)
    }
    .validate()
    .unwrap();
    assert!(matches!(
        process_slide(&extractor, &keep, &slide),
        Err(ExtractionError::Dataset(DatasetError::AlreadyExists(_)))
    ));
}

#[test]
fn test_unreadable_slide_keeps_existing_dataset() {
    let dir = tempdir().unwrap();
    let slide = dir.path().join("case.png");
    write_rgb_slide(&slide, 64, 32);
    let settings = config_for(dir.path().to_path_buf(), dir.path().join("out"))
        .validate()
        .unwrap();
    let extractor = PatchExtractor::from_settings(&settings);
    process_slide(&extractor, &settings, &slide).unwrap();

    std::fs::write(&slide, b"no longer an image").unwrap();
    assert!(matches!(
        process_slide(&extractor, &settings, &slide),
        Err(ExtractionError::Open { .. })
    ));

    let reader = DatasetReader::open(settings.output_path(&slide)).unwrap();
    assert_eq!(reader.shape(), &[2, 32, 32, 3]);
}
