//! Spatial index for nearest-neighbor and radius queries.

use std::num::NonZero;

use kiddo::float::distance::SquaredEuclidean;
use kiddo::immutable::float::kdtree::ImmutableKdTree;

use crate::core::loaders::PointCloud;

/// A KD-tree over the points of a cloud.
///
/// Built once from a `PointCloud` and queried read-only afterwards. All
/// distances returned are Euclidean (not squared). Stored indices map back
/// to the positions in the source cloud.
#[derive(Debug, Clone)]
pub struct KdTree {
    tree: ImmutableKdTree<f32, u32, 3, 32>,
    num_points: usize,
}

impl KdTree {
    /// Build a KD-tree from all points of the cloud.
    pub fn build(cloud: &PointCloud) -> Self {
        let n = cloud.len();
        if n == 0 {
            return Self {
                tree: ImmutableKdTree::new_from_slice(&[]),
                num_points: 0,
            };
        }

        let points: Vec<[f32; 3]> = cloud.to_coords();
        Self {
            tree: ImmutableKdTree::new_from_slice(&points),
            num_points: n,
        }
    }

    /// Returns the number of indexed points.
    pub fn len(&self) -> usize {
        self.num_points
    }

    /// Returns true if no points are indexed.
    pub fn is_empty(&self) -> bool {
        self.num_points == 0
    }

    /// Distance from `query` to the nearest indexed point.
    ///
    /// Returns `None` for an empty tree or a non-finite query, which callers
    /// treat as "infinitely far away".
    pub fn nearest_distance(&self, query: &[f32; 3]) -> Option<f32> {
        if self.is_empty() || !query.iter().all(|v| v.is_finite()) {
            return None;
        }

        let one = NonZero::new(1).unwrap();
        self.tree
            .nearest_n::<SquaredEuclidean>(query, one)
            .first()
            .map(|nn| nn.distance.sqrt())
    }

    /// Find the `k` nearest neighbors to `query`.
    ///
    /// Returns `(indices, distances)` sorted ascending by distance. If the
    /// query point itself is indexed it appears first at distance zero.
    /// Returns fewer than `k` results when the tree is smaller than `k`,
    /// and nothing for `k == 0`, an empty tree, or a non-finite query.
    pub fn knn(&self, query: &[f32; 3], k: usize) -> (Vec<usize>, Vec<f32>) {
        if k == 0 || self.is_empty() || !query.iter().all(|v| v.is_finite()) {
            return (Vec::new(), Vec::new());
        }

        let nz_k = NonZero::new(k).unwrap();
        let results = self.tree.nearest_n::<SquaredEuclidean>(query, nz_k);

        let mut indices = Vec::with_capacity(results.len());
        let mut distances = Vec::with_capacity(results.len());
        for nn in results {
            indices.push(nn.item as usize);
            distances.push(nn.distance.sqrt());
        }

        (indices, distances)
    }

    /// Find all points within `radius` (inclusive) of `query`.
    ///
    /// Returns indices sorted ascending for deterministic consumers.
    pub fn radius_search(&self, query: &[f32; 3], radius: f32) -> Vec<usize> {
        if self.is_empty()
            || radius <= 0.0
            || !radius.is_finite()
            || !query.iter().all(|v| v.is_finite())
        {
            return Vec::new();
        }

        let radius_sq = radius * radius;

        // kiddo's within_unsorted uses a strict comparison. Query with a tiny
        // padding so points exactly on the boundary are returned, then
        // post-filter with <=.
        let query_radius_sq = radius_sq + f32::EPSILON * radius_sq.max(1.0);

        let mut indices: Vec<usize> = self
            .tree
            .within_unsorted::<SquaredEuclidean>(query, query_radius_sq)
            .into_iter()
            .filter(|nn| nn.distance <= radius_sq)
            .map(|nn| nn.item as usize)
            .collect();

        indices.sort_unstable();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::KdTree;
    use crate::core::loaders::PointCloud;

    #[test]
    fn test_nearest_distance() {
        let cloud = PointCloud::from_xyz(vec![0.0, 10.0], vec![0.0; 2], vec![0.0; 2]);
        let tree = KdTree::build(&cloud);

        let d = tree.nearest_distance(&[1.0, 0.0, 0.0]).unwrap();
        assert!((d - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_nearest_distance_empty_tree() {
        let tree = KdTree::build(&PointCloud::new());
        assert!(tree.nearest_distance(&[0.0, 0.0, 0.0]).is_none());
    }

    #[test]
    fn test_knn_returns_sorted_distances() {
        let cloud = PointCloud::from_xyz(vec![0.0, 3.0, 1.0, 7.0], vec![0.0; 4], vec![0.0; 4]);
        let tree = KdTree::build(&cloud);

        let (idx, dist) = tree.knn(&[0.5, 0.0, 0.0], 4);
        assert_eq!(idx.len(), 4);
        for w in dist.windows(2) {
            assert!(w[0] <= w[1]);
        }
    }

    #[test]
    fn test_knn_k_larger_than_cloud() {
        let cloud = PointCloud::from_xyz(vec![0.0, 1.0], vec![0.0; 2], vec![0.0; 2]);
        let tree = KdTree::build(&cloud);

        let (idx, _) = tree.knn(&[0.0, 0.0, 0.0], 10);
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn test_radius_search_includes_boundary() {
        let cloud = PointCloud::from_xyz(vec![1.0, 5.0], vec![0.0; 2], vec![0.0; 2]);
        let tree = KdTree::build(&cloud);

        let idx = tree.radius_search(&[0.0, 0.0, 0.0], 1.0);
        assert!(idx.contains(&0), "boundary point missing: {:?}", idx);
        assert!(!idx.contains(&1));
    }

    #[test]
    fn test_radius_search_sorted_indices() {
        let cloud = PointCloud::from_xyz(
            vec![0.3, 0.1, 0.2, 0.0],
            vec![0.0; 4],
            vec![0.0; 4],
        );
        let tree = KdTree::build(&cloud);

        let idx = tree.radius_search(&[0.0, 0.0, 0.0], 1.0);
        assert_eq!(idx, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_radius_search_invalid_inputs() {
        let cloud = PointCloud::from_xyz(vec![0.0], vec![0.0], vec![0.0]);
        let tree = KdTree::build(&cloud);

        assert!(tree.radius_search(&[0.0, 0.0, 0.0], -1.0).is_empty());
        assert!(tree.radius_search(&[f32::NAN, 0.0, 0.0], 1.0).is_empty());
    }
}
