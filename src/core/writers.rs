//! Writers and readers for pipeline output formats.
//!
//! This module owns the persisted artifacts of the detection pipeline:
//! - Annotation JSON files (one array of bounding boxes per frame)
//! - ASCII PCD output for derived clouds
//! - CSV export of per-point cluster labels for inspection

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::loaders::PointCloud;

/// The 12 edges of an axis-aligned box, as index pairs into the 8 corners:
/// 4 bottom edges, 4 top edges, 4 vertical edges.
pub const BOX_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 0),
    (4, 5),
    (5, 6),
    (6, 7),
    (7, 4),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// An axis-aligned bounding box produced for one detected cluster.
///
/// `points` holds the 8 corners: indices 0-3 walk the bottom face
/// counter-clockwise starting at the minimum corner, indices 4-7 repeat the
/// same order on the top face. Consumers should still re-derive per-axis
/// min/max from the corners rather than rely on this ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Cluster label this box was built from.
    pub label: i32,
    /// Vertical extent (max_z - min_z).
    pub height: f32,
    /// The 8 corner points.
    pub points: [[f32; 3]; 8],
    /// RGB color in [0, 1], shared by all boxes of this label in the frame.
    pub color: [f32; 3],
}

impl BoundingBox {
    /// Per-axis minimum over the 8 corners.
    pub fn min_corner(&self) -> [f32; 3] {
        let mut min = self.points[0];
        for p in &self.points[1..] {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
            }
        }
        min
    }

    /// Per-axis maximum over the 8 corners.
    pub fn max_corner(&self) -> [f32; 3] {
        let mut max = self.points[0];
        for p in &self.points[1..] {
            for axis in 0..3 {
                max[axis] = max[axis].max(p[axis]);
            }
        }
        max
    }
}

/// Errors that can occur during read/write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to read a file.
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization or deserialization error.
    #[error("JSON error for '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Mismatched array lengths.
    #[error("length mismatch: cloud has {points} points, labels has {labels} entries")]
    LengthMismatch { points: usize, labels: usize },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Write the annotation file for one frame.
///
/// An empty slice produces a well-formed empty JSON array, which consumers
/// treat the same as a missing file ("no detections"). The file is
/// overwritten if it already exists, so reruns are idempotent.
pub fn write_annotations(path: &Path, boxes: &[BoundingBox]) -> Result<()> {
    ensure_parent_dirs(path)?;
    let path_str = path.display().to_string();

    let json = serde_json::to_string_pretty(boxes).map_err(|e| WriteError::Json {
        path: path_str.clone(),
        source: e,
    })?;

    fs::write(path, json).map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })
}

/// Read an annotation file back into bounding boxes.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid annotation
/// JSON. Use [`load_boxes_or_empty`] for the lenient consumer-side policy.
pub fn read_annotations(path: &Path) -> Result<Vec<BoundingBox>> {
    let path_str = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|e| WriteError::ReadFile {
        path: path_str.clone(),
        source: e,
    })?;

    serde_json::from_str(&raw).map_err(|e| WriteError::Json {
        path: path_str,
        source: e,
    })
}

/// Consumer-side annotation loading: a missing or malformed file means
/// "no detections for this frame", never a hard failure.
pub fn load_boxes_or_empty(path: &Path) -> Vec<BoundingBox> {
    if !path.exists() {
        return Vec::new();
    }
    match read_annotations(path) {
        Ok(boxes) => boxes,
        Err(e) => {
            log::warn!("treating unreadable annotation file as empty: {}", e);
            Vec::new()
        }
    }
}

/// Write a point cloud to an ASCII PCD file.
///
/// # Arguments
///
/// * `path` - Output file path (parent directories will be created if needed)
/// * `cloud` - Point cloud data
pub fn write_pcd(path: &Path, cloud: &PointCloud) -> Result<()> {
    ensure_parent_dirs(path)?;
    let path_str = path.display().to_string();

    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path_str.clone(),
        source: e,
    })?;
    let mut writer = BufWriter::new(file);

    let write = |writer: &mut BufWriter<File>, content: String| -> Result<()> {
        writer
            .write_all(content.as_bytes())
            .map_err(|e| WriteError::WriteFile {
                path: path_str.clone(),
                source: e,
            })
    };

    let mut header = String::new();
    header.push_str("# .PCD v0.7 - Point Cloud Data file format\n");
    header.push_str("VERSION 0.7\n");
    header.push_str("FIELDS x y z\n");
    header.push_str("SIZE 4 4 4\n");
    header.push_str("TYPE F F F\n");
    header.push_str("COUNT 1 1 1\n");
    header.push_str(&format!("WIDTH {}\n", cloud.len()));
    header.push_str("HEIGHT 1\n");
    header.push_str("VIEWPOINT 0 0 0 1 0 0 0\n");
    header.push_str(&format!("POINTS {}\n", cloud.len()));
    header.push_str("DATA ascii\n");
    write(&mut writer, header)?;

    for i in 0..cloud.len() {
        write(
            &mut writer,
            format!("{} {} {}\n", cloud.x[i], cloud.y[i], cloud.z[i]),
        )?;
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })
}

/// Write per-point cluster labels to CSV.
///
/// Creates a CSV file with headers "x,y,z,label" for inspecting clustering
/// results alongside the annotation output.
///
/// # Errors
///
/// Returns an error if the cloud and label slices differ in length or the
/// file cannot be written.
pub fn write_labels_csv(path: &Path, cloud: &PointCloud, labels: &[i32]) -> Result<()> {
    if cloud.len() != labels.len() {
        return Err(WriteError::LengthMismatch {
            points: cloud.len(),
            labels: labels.len(),
        });
    }

    ensure_parent_dirs(path)?;
    let path_str = path.display().to_string();

    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path_str.clone(),
        source: e,
    })?;
    let mut csv_writer = csv::Writer::from_writer(BufWriter::new(file));

    csv_writer
        .write_record(["x", "y", "z", "label"])
        .map_err(|e| WriteError::Csv {
            path: path_str.clone(),
            source: e,
        })?;

    for i in 0..cloud.len() {
        csv_writer
            .write_record(&[
                format!("{:.6}", cloud.x[i]),
                format!("{:.6}", cloud.y[i]),
                format!("{:.6}", cloud.z[i]),
                labels[i].to_string(),
            ])
            .map_err(|e| WriteError::Csv {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::load_pcd;
    use tempfile::tempdir;

    fn sample_box(label: i32) -> BoundingBox {
        BoundingBox {
            label,
            height: 1.5,
            points: [
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 2.0, 0.0],
                [0.0, 2.0, 0.0],
                [0.0, 0.0, 1.5],
                [1.0, 0.0, 1.5],
                [1.0, 2.0, 1.5],
                [0.0, 2.0, 1.5],
            ],
            color: [0.25, 0.5, 0.75],
        }
    }

    #[test]
    fn test_annotation_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frame_000001.json");
        let boxes = vec![sample_box(0), sample_box(3)];

        write_annotations(&path, &boxes).unwrap();
        let loaded = read_annotations(&path).unwrap();

        assert_eq!(loaded, boxes);
    }

    #[test]
    fn test_empty_annotations_serialize_as_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.json");

        write_annotations(&path, &[]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), "[]");
        assert!(read_annotations(&path).unwrap().is_empty());
    }

    #[test]
    fn test_load_boxes_or_empty_missing_file() {
        let dir = tempdir().unwrap();
        let boxes = load_boxes_or_empty(&dir.path().join("nope.json"));
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_load_boxes_or_empty_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();

        let boxes = load_boxes_or_empty(&path);
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_bounding_box_corners() {
        let b = sample_box(0);
        assert_eq!(b.min_corner(), [0.0, 0.0, 0.0]);
        assert_eq!(b.max_corner(), [1.0, 2.0, 1.5]);
    }

    #[test]
    fn test_write_annotations_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("out").join("frame.json");

        write_annotations(&path, &[sample_box(1)]).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_pcd_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cloud.pcd");
        let cloud = PointCloud::from_xyz(
            vec![1.0, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
            vec![7.0, 8.0, 9.0],
        );

        write_pcd(&path, &cloud).unwrap();
        let loaded = load_pcd(&path).unwrap();

        assert_eq!(loaded.x, cloud.x);
        assert_eq!(loaded.y, cloud.y);
        assert_eq!(loaded.z, cloud.z);
    }

    #[test]
    fn test_write_labels_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        let cloud = PointCloud::from_xyz(vec![1.0, 4.0], vec![2.0, 5.0], vec![3.0, 6.0]);
        let labels = vec![0i32, -1];

        write_labels_csv(&path, &cloud, &labels).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "x,y,z,label");
        assert!(lines[1].ends_with(",0"));
        assert!(lines[2].ends_with(",-1"));
    }

    #[test]
    fn test_write_labels_csv_length_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        let cloud = PointCloud::from_xyz(vec![1.0], vec![2.0], vec![3.0]);

        let result = write_labels_csv(&path, &cloud, &[0, 1]);
        assert!(matches!(result, Err(WriteError::LengthMismatch { .. })));
    }

    #[test]
    fn test_box_edges_reference_all_corners() {
        let mut seen = [false; 8];
        for (a, b) in BOX_EDGES {
            seen[a] = true;
            seen[b] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }
}
