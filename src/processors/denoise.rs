//! Statistical outlier removal.

use rayon::prelude::*;

use crate::core::loaders::PointCloud;
use crate::processors::spatial::KdTree;

/// Remove statistically isolated points.
///
/// For every point the mean distance to its `k` nearest neighbors is
/// computed (the self-match is skipped), then points whose mean distance
/// exceeds `mean + std_ratio * stddev` of those values are discarded. With
/// zero variance nothing is removed.
///
/// Clouds with `k` or fewer points are returned unchanged - there are not
/// enough neighbors for a meaningful statistic.
pub fn statistical_outlier_removal(cloud: &PointCloud, k: usize, std_ratio: f32) -> PointCloud {
    if cloud.len() <= k || k == 0 {
        return cloud.clone();
    }

    let tree = KdTree::build(cloud);

    // The query point itself comes back as the first neighbor at distance
    // zero, so ask for k + 1 and skip it.
    let mean_dists: Vec<f32> = (0..cloud.len())
        .into_par_iter()
        .map(|i| {
            let q = [cloud.x[i], cloud.y[i], cloud.z[i]];
            if !q.iter().all(|v| v.is_finite()) {
                return f32::INFINITY;
            }
            let (_, dists) = tree.knn(&q, k + 1);
            let neighbors = if dists.len() > 1 {
                &dists[1..]
            } else {
                &dists[..]
            };
            if neighbors.is_empty() {
                return f32::INFINITY;
            }
            neighbors.iter().sum::<f32>() / neighbors.len() as f32
        })
        .collect();

    let finite: Vec<f32> = mean_dists
        .iter()
        .copied()
        .filter(|d| d.is_finite())
        .collect();

    if finite.is_empty() {
        return PointCloud::new();
    }

    let n = finite.len() as f32;
    let mean = finite.iter().sum::<f32>() / n;
    let variance = finite.iter().map(|d| (d - mean).powi(2)).sum::<f32>() / n;
    let cutoff = mean + std_ratio * variance.sqrt();

    let keep: Vec<usize> = (0..cloud.len())
        .filter(|&i| mean_dists[i] <= cutoff)
        .collect();

    cloud.select(&keep)
}

#[cfg(test)]
mod tests {
    use super::statistical_outlier_removal;
    use crate::core::loaders::PointCloud;

    #[test]
    fn test_removes_isolated_outlier() {
        // Dense cluster near the origin plus one far-away point.
        let cloud = PointCloud::from_xyz(
            vec![0.0, 0.1, -0.1, 0.05, -0.05, 100.0],
            vec![0.0, 0.1, -0.1, 0.05, -0.05, 100.0],
            vec![0.0, 0.1, -0.1, 0.05, -0.05, 100.0],
        );

        let out = statistical_outlier_removal(&cloud, 4, 1.0);
        assert_eq!(out.len(), 5);
        for i in 0..out.len() {
            assert!(out.x[i].abs() <= 0.2);
        }
    }

    #[test]
    fn test_zero_variance_removes_nothing() {
        // Evenly spaced line: every interior spacing pattern is symmetric
        // enough that nothing exceeds mean + stddev when stddev is large,
        // and an exact grid gives identical per-point statistics.
        let cloud = PointCloud::from_xyz(
            vec![0.0, 1.0, 0.0, 1.0],
            vec![0.0, 0.0, 1.0, 1.0],
            vec![0.0, 0.0, 0.0, 0.0],
        );

        // Each point sees the same neighbor distances (1, 1, sqrt(2));
        // variance is zero so the cutoff equals the mean and all survive.
        let out = statistical_outlier_removal(&cloud, 3, 1.0);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_small_cloud_returned_unchanged() {
        let cloud = PointCloud::from_xyz(vec![0.0, 50.0], vec![0.0, 0.0], vec![0.0, 0.0]);

        let out = statistical_outlier_removal(&cloud, 5, 1.0);
        assert_eq!(out, cloud);
    }

    #[test]
    fn test_empty_cloud() {
        let out = statistical_outlier_removal(&PointCloud::new(), 5, 1.0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_never_increases_count() {
        let cloud = PointCloud::from_xyz(
            vec![0.0, 0.2, 0.4, 0.6, 0.8, 1.0, 9.0],
            vec![0.0; 7],
            vec![0.0; 7],
        );

        let out = statistical_outlier_removal(&cloud, 3, 1.0);
        assert!(out.len() <= cloud.len());
    }
}
