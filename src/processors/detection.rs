//! The frame-pair detection pipeline and batch driver.
//!
//! One frame pair flows load -> downsample -> change filter -> denoise ->
//! cluster -> boxes -> annotation JSON. The batch driver walks a frame
//! folder in sequence order and keeps going when a single pair fails.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::core::loaders::{load_pcd, LoaderError, PointCloud};
use crate::core::writers::{write_annotations, BoundingBox, WriteError};
use crate::processors::boxes::{build_boxes, ColorMap};
use crate::processors::change::change_filter;
use crate::processors::clustering::cluster_cloud;
use crate::processors::denoise::statistical_outlier_removal;
use crate::processors::downsample::voxel_downsample;
use crate::processors::sequence::{reference_index, scan_frames};

/// Errors that can occur while processing one frame pair.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("failed to load frame: {0}")]
    Load(#[from] LoaderError),

    #[error("failed to write annotations: {0}")]
    Write(#[from] WriteError),
}

/// Outcome of one frame pair: the surviving boxes and the per-point labels
/// of the denoised change cloud (for optional CSV export).
pub struct PairResult {
    pub boxes: Vec<BoundingBox>,
    pub changed: PointCloud,
    pub labels: Vec<i32>,
}

/// Run the detection pipeline on a pair of already-loaded clouds.
pub fn detect_movers(
    current: &PointCloud,
    reference: &PointCloud,
    config: &PipelineConfig,
    colors: &mut ColorMap,
) -> PairResult {
    let current_ds = voxel_downsample(current, config.downsample.voxel_size);
    let reference_ds = voxel_downsample(reference, config.downsample.voxel_size);
    log::debug!(
        "downsampled current {} -> {}, reference {} -> {}",
        current.len(),
        current_ds.len(),
        reference.len(),
        reference_ds.len()
    );

    let changed = change_filter(&current_ds, &reference_ds, config.change.threshold);
    let denoised =
        statistical_outlier_removal(&changed, config.denoise.neighbors, config.denoise.std_ratio);
    log::debug!(
        "change filter kept {}, denoiser kept {}",
        changed.len(),
        denoised.len()
    );

    let labels = cluster_cloud(&denoised, config.clustering.eps, config.clustering.min_samples);
    let boxes = build_boxes(&denoised, &labels, config.boxes.min_height, colors);

    PairResult {
        boxes,
        changed: denoised,
        labels,
    }
}

/// Process one frame pair from disk and write the annotation file.
///
/// Returns the number of boxes written. The output file is written even
/// when no clusters survive, so "processed, nothing found" is
/// distinguishable from "never processed".
pub fn process_frame_pair(
    current_path: &Path,
    reference_path: &Path,
    output_path: &Path,
    config: &PipelineConfig,
    colors: &mut ColorMap,
) -> std::result::Result<usize, DetectionError> {
    let current = load_pcd(current_path)?;
    let reference = load_pcd(reference_path)?;

    let result = detect_movers(&current, &reference, config, colors);
    write_annotations(output_path, &result.boxes)?;

    Ok(result.boxes.len())
}

/// Summary of a folder run.
#[derive(Debug, Default, Clone)]
pub struct FolderSummary {
    /// Frame pairs that produced an annotation file.
    pub processed: usize,
    /// Frame pairs skipped by the wrap policy.
    pub skipped: usize,
    /// Frame pairs that failed (logged and left behind).
    pub failed: usize,
    /// Total boxes written across all annotation files.
    pub boxes: usize,
}

/// Process every frame pair of a folder, writing one annotation JSON per
/// frame into `output_dir`.
///
/// Frames are sorted by extracted filename index; pair `i` uses the frame
/// `stride` positions ahead as its reference (wrap handling per the
/// configured policy). Pairs are processed strictly in order; a failing
/// pair is logged with its path and index and the run continues, leaving
/// already-written annotation files intact.
///
/// `progress` is invoked as `(done, total)` after each attempted pair,
/// successful or not.
pub fn process_folder(
    input_dir: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
    limit: Option<usize>,
    mut progress: impl FnMut(usize, usize),
) -> Result<FolderSummary> {
    let frames = scan_frames(input_dir, "pcd")?;
    let n = frames.len();

    let mut summary = FolderSummary::default();

    if n < 2 {
        log::warn!(
            "{}: found {} frame(s), nothing to pair",
            input_dir.display(),
            n
        );
        return Ok(summary);
    }

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let pair_count = limit.unwrap_or(n - 1).min(n - 1);

    for i in 0..pair_count {
        let Some(j) = reference_index(i, config.sequence.stride, n, config.sequence.wrap) else {
            log::debug!("pair {}: reference beyond sequence end, skipped", i);
            summary.skipped += 1;
            progress(i + 1, pair_count);
            continue;
        };

        let current = &frames[i];
        let reference = &frames[j];
        let output_path = annotation_path(output_dir, &current.path);

        let mut colors = ColorMap::for_frame(config.boxes.color_seed, i);
        match process_frame_pair(
            &current.path,
            &reference.path,
            &output_path,
            config,
            &mut colors,
        ) {
            Ok(boxes) => {
                log::info!(
                    "pair {}/{}: {} -> {} boxes",
                    i + 1,
                    pair_count,
                    current.path.display(),
                    boxes
                );
                summary.processed += 1;
                summary.boxes += boxes;
            }
            Err(e) => {
                log::error!(
                    "pair {} (frame {}, reference {}): {}",
                    i,
                    current.path.display(),
                    reference.path.display(),
                    e
                );
                summary.failed += 1;
            }
        }
        progress(i + 1, pair_count);
    }

    Ok(summary)
}

/// Annotation file path for a frame: same stem, `.json` extension, in the
/// output directory.
pub fn annotation_path(output_dir: &Path, frame_path: &Path) -> PathBuf {
    let stem = frame_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("frame");
    output_dir.join(format!("{}.json", stem))
}

/// Run every configured `(input_dir, output_dir)` job in order.
///
/// A failing job is logged and the remaining jobs still run. Returns the
/// per-job summaries for the jobs that completed.
pub fn run_jobs(config: &PipelineConfig) -> Vec<(PathBuf, FolderSummary)> {
    let mut results = Vec::with_capacity(config.jobs.len());

    for (idx, job) in config.jobs.iter().enumerate() {
        log::info!(
            "job {}/{}: {} -> {}",
            idx + 1,
            config.jobs.len(),
            job.input_dir.display(),
            job.output_dir.display()
        );

        match process_folder(&job.input_dir, &job.output_dir, config, None, |_, _| {}) {
            Ok(summary) => results.push((job.input_dir.clone(), summary)),
            Err(e) => log::error!("job {} failed: {:#}", job.input_dir.display(), e),
        }
    }

    results
}

/// Counts of annotation files under a directory tree.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AnnotationStats {
    /// Annotation JSON files found.
    pub total: usize,
    /// Files containing at least one bounding box.
    pub non_empty: usize,
}

impl AnnotationStats {
    /// Share of frames with at least one detection, in percent.
    pub fn detection_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.non_empty as f64 / self.total as f64 * 100.0
        }
    }
}

/// Walk a directory tree and count annotation files with detections.
///
/// Unreadable or malformed files count as empty, mirroring the consumer
/// policy for annotation data.
pub fn annotation_stats(root: &Path) -> Result<AnnotationStats> {
    let mut stats = AnnotationStats::default();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = fs_read_dir(&dir)?;
        for path in entries {
            if path.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("json"))
                .unwrap_or(false)
            {
                stats.total += 1;
                if !crate::core::writers::load_boxes_or_empty(&path).is_empty() {
                    stats.non_empty += 1;
                }
            }
        }
    }

    Ok(stats)
}

fn fs_read_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;
    Ok(entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::writers::{read_annotations, write_pcd};
    use tempfile::TempDir;

    /// Two dense 10-point clusters, one near the origin and one near
    /// (10, 10, 0), both tall enough to pass the height filter.
    fn two_cluster_frame(offset: [f32; 3]) -> PointCloud {
        let mut cloud = PointCloud::new();
        for center in [[0.0f32, 0.0, 0.0], [10.0, 10.0, 0.0]] {
            for i in 0..10 {
                cloud.push(
                    center[0] + offset[0] + (i % 3) as f32 * 0.1,
                    center[1] + offset[1] + ((i / 3) % 3) as f32 * 0.1,
                    center[2] + offset[2] + (i % 5) as f32 * 0.1,
                );
            }
        }
        cloud
    }

    fn test_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        // Small voxels keep the synthetic clusters dense after downsampling.
        config.downsample.voxel_size = 0.05;
        config
    }

    #[test]
    fn test_detect_movers_two_clusters() {
        let config = test_config();
        let current = two_cluster_frame([0.0, 0.0, 0.0]);
        let reference = two_cluster_frame([50.0, 50.0, 0.0]);
        let mut colors = ColorMap::new(1);

        let result = detect_movers(&current, &reference, &config, &mut colors);

        assert_eq!(result.boxes.len(), 2);
        let mins: Vec<[f32; 3]> = result.boxes.iter().map(|b| b.min_corner()).collect();
        let maxs: Vec<[f32; 3]> = result.boxes.iter().map(|b| b.max_corner()).collect();

        // One box at the origin cluster, one at the far cluster.
        assert!((mins[0][0] - 0.0).abs() < 1e-5);
        assert!((maxs[0][0] - 0.2).abs() < 1e-5);
        assert!((mins[1][0] - 10.0).abs() < 1e-5);
        assert!((maxs[1][1] - 10.2).abs() < 1e-5);
        assert!((result.boxes[0].height - 0.4).abs() < 1e-5);
    }

    #[test]
    fn test_detect_movers_static_scene_is_empty() {
        let config = test_config();
        let frame = two_cluster_frame([0.0, 0.0, 0.0]);
        let mut colors = ColorMap::new(1);

        let result = detect_movers(&frame, &frame, &config, &mut colors);
        assert!(result.boxes.is_empty());
    }

    #[test]
    fn test_process_frame_pair_writes_annotations() {
        let dir = TempDir::new().unwrap();
        let current_path = dir.path().join("pcd_000001.pcd");
        let reference_path = dir.path().join("pcd_000002.pcd");
        let output_path = dir.path().join("json").join("pcd_000001.json");

        write_pcd(&current_path, &two_cluster_frame([0.0, 0.0, 0.0])).unwrap();
        write_pcd(&reference_path, &two_cluster_frame([50.0, 50.0, 0.0])).unwrap();

        let config = test_config();
        let mut colors = ColorMap::new(1);
        let count =
            process_frame_pair(&current_path, &reference_path, &output_path, &config, &mut colors)
                .unwrap();

        assert_eq!(count, 2);
        let boxes = read_annotations(&output_path).unwrap();
        assert_eq!(boxes.len(), 2);
    }

    #[test]
    fn test_process_frame_pair_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = test_config();
        let mut colors = ColorMap::new(1);

        let result = process_frame_pair(
            &dir.path().join("missing.pcd"),
            &dir.path().join("also_missing.pcd"),
            &dir.path().join("out.json"),
            &config,
            &mut colors,
        );
        assert!(matches!(result, Err(DetectionError::Load(_))));
    }

    #[test]
    fn test_process_folder_writes_every_pair() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("pcd");
        let output = dir.path().join("json");
        std::fs::create_dir_all(&input).unwrap();

        for i in 0..4 {
            let frame = two_cluster_frame([i as f32 * 0.5, 0.0, 0.0]);
            write_pcd(&input.join(format!("pcd_{:06}.pcd", i)), &frame).unwrap();
        }

        let mut config = test_config();
        config.sequence.stride = 2;

        let mut ticks = 0;
        let summary = process_folder(&input, &output, &config, None, |_, _| ticks += 1).unwrap();

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(ticks, 3);
        for i in 0..3 {
            assert!(output.join(format!("pcd_{:06}.json", i)).exists());
        }
    }

    #[test]
    fn test_process_folder_continues_after_bad_frame() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("pcd");
        let output = dir.path().join("json");
        std::fs::create_dir_all(&input).unwrap();

        write_pcd(&input.join("pcd_000000.pcd"), &two_cluster_frame([0.0, 0.0, 0.0])).unwrap();
        std::fs::write(input.join("pcd_000001.pcd"), "not a pcd file").unwrap();
        write_pcd(&input.join("pcd_000002.pcd"), &two_cluster_frame([1.0, 0.0, 0.0])).unwrap();

        let mut config = test_config();
        config.sequence.stride = 1;

        let summary = process_folder(&input, &output, &config, None, |_, _| {}).unwrap();

        // Pair 0 (frame 0 vs broken frame 1) and pair 1 (broken frame 1 vs
        // frame 2) both fail to load; only the sequence keeps going.
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.processed, 0);
    }

    #[test]
    fn test_process_folder_too_few_frames() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("pcd");
        std::fs::create_dir_all(&input).unwrap();
        write_pcd(&input.join("pcd_000000.pcd"), &two_cluster_frame([0.0, 0.0, 0.0])).unwrap();

        let summary =
            process_folder(&input, &dir.path().join("json"), &test_config(), None, |_, _| {}).unwrap();
        assert_eq!(summary.processed, 0);
    }

    #[test]
    fn test_process_folder_skip_policy() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("pcd");
        let output = dir.path().join("json");
        std::fs::create_dir_all(&input).unwrap();

        for i in 0..3 {
            write_pcd(
                &input.join(format!("pcd_{:06}.pcd", i)),
                &two_cluster_frame([i as f32, 0.0, 0.0]),
            )
            .unwrap();
        }

        let mut config = test_config();
        config.sequence.stride = 2;
        config.sequence.wrap = crate::config::WrapPolicy::Skip;

        let summary = process_folder(&input, &output, &config, None, |_, _| {}).unwrap();

        // Only pair 0 has a valid reference (frame 2); pair 1 is skipped.
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_annotation_stats() {
        use crate::core::writers::write_annotations;

        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("01_walk").join("json");
        std::fs::create_dir_all(&nested).unwrap();

        write_annotations(&nested.join("pcd_000001.json"), &[]).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{oops").unwrap();

        let boxes = {
            let config = test_config();
            let mut colors = ColorMap::new(1);
            detect_movers(
                &two_cluster_frame([0.0, 0.0, 0.0]),
                &two_cluster_frame([50.0, 50.0, 0.0]),
                &config,
                &mut colors,
            )
            .boxes
        };
        write_annotations(&nested.join("pcd_000002.json"), &boxes).unwrap();

        let stats = annotation_stats(dir.path()).unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.non_empty, 1);
        assert!((stats.detection_rate() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_annotation_path() {
        let out = annotation_path(Path::new("/tmp/json"), Path::new("/data/pcd_000888.pcd"));
        assert_eq!(out, Path::new("/tmp/json/pcd_000888.json"));
    }
}
