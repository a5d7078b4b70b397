//! Detection pipeline stages.

pub mod boxes;
pub mod change;
pub mod clustering;
pub mod denoise;
pub mod detection;
pub mod downsample;
pub mod sequence;
pub mod spatial;

// Re-export key operations for convenience
pub use boxes::{build_boxes, ColorMap};
pub use change::change_filter;
pub use clustering::{cluster_cloud, dbscan, NOISE};
pub use denoise::statistical_outlier_removal;
pub use detection::{
    annotation_stats, detect_movers, process_folder, process_frame_pair, run_jobs,
    AnnotationStats, DetectionError, FolderSummary,
};
pub use downsample::voxel_downsample;
pub use sequence::{frame_index, match_annotation_pairs, scan_frames, Frame};
pub use spatial::KdTree;
