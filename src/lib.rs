//! LiDAR point cloud change detection pipeline.
//!
//! This crate provides tools for:
//! - Loading PCD point cloud frames (ASCII and binary)
//! - Detecting moving foreground clusters by differencing a frame against a
//!   reference frame further along the sequence
//! - Voxel downsampling, statistical outlier removal and DBSCAN clustering
//! - Writing per-frame bounding box annotations as JSON
//!
//! # Example
//!
//! ```no_run
//! use lidar_pipeline::config::PipelineConfig;
//! use lidar_pipeline::core::loaders::load_pcd;
//! use lidar_pipeline::processors::boxes::ColorMap;
//! use lidar_pipeline::processors::detection::detect_movers;
//!
//! let current = load_pcd("frame_000000.pcd").unwrap();
//! let reference = load_pcd("frame_000100.pcd").unwrap();
//! let config = PipelineConfig::default();
//! let mut colors = ColorMap::new(config.boxes.color_seed);
//! let result = detect_movers(&current, &reference, &config, &mut colors);
//! println!("{} candidate movers", result.boxes.len());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{
    BoxConfig, ChangeConfig, ClusteringConfig, DenoiseConfig, DownsampleConfig, JobConfig,
    PipelineConfig, SequenceConfig, WrapPolicy,
};
pub use crate::core::loaders::PointCloud;
pub use crate::core::writers::BoundingBox;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
