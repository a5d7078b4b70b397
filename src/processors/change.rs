//! Frame differencing: isolate points that changed between two frames.

use rayon::prelude::*;

use crate::core::loaders::PointCloud;
use crate::processors::spatial::KdTree;

/// Remove from `current` every point that has a near neighbor in
/// `reference`.
///
/// A current point is dropped when its nearest reference point lies within
/// `threshold` (closed comparison: a distance exactly equal to the threshold
/// removes the point). What survives is the one-sided set difference - the
/// points that appear new or moved relative to the reference frame. Points
/// present in the reference but absent from `current` are not reported.
///
/// An empty reference keeps every current point (the nearest distance is
/// treated as infinite); an empty current yields an empty result.
pub fn change_filter(current: &PointCloud, reference: &PointCloud, threshold: f32) -> PointCloud {
    if current.is_empty() {
        return PointCloud::new();
    }
    if reference.is_empty() {
        return current.clone();
    }

    let tree = KdTree::build(reference);

    let keep: Vec<usize> = (0..current.len())
        .into_par_iter()
        .filter(|&i| {
            let q = [current.x[i], current.y[i], current.z[i]];
            match tree.nearest_distance(&q) {
                Some(dist) => dist > threshold,
                None => true,
            }
        })
        .collect();

    current.select(&keep)
}
