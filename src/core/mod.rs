//! Core data types and I/O operations.

pub mod loaders;
pub mod writers;

pub use loaders::{load_pcd, LoaderError, PointCloud};
pub use writers::{
    load_boxes_or_empty, read_annotations, write_annotations, write_labels_csv, write_pcd,
    BoundingBox, WriteError, BOX_EDGES,
};
