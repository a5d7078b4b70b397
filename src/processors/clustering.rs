//! Density-based clustering of change points.
//!
//! A parallelized DBSCAN built on:
//! - a KD-tree for neighbor queries
//! - `rayon` for parallel neighbor finding and core point identification
//! - atomic union-find for lock-free cluster merging

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::core::loaders::PointCloud;
use crate::processors::spatial::KdTree;

/// Label assigned to points that belong to no cluster.
pub const NOISE: i32 = -1;

/// Atomic Union-Find data structure for lock-free parallel cluster merging.
///
/// Uses path compression with atomic compare-and-swap operations to safely
/// merge clusters from multiple threads without locks.
pub struct AtomicUnionFind {
    parent: Vec<AtomicUsize>,
}

impl AtomicUnionFind {
    /// Create a new union-find structure where each element is its own parent.
    #[inline]
    pub fn new(size: usize) -> Self {
        let parent = (0..size).map(AtomicUsize::new).collect();
        Self { parent }
    }

    /// Find the root of the set containing `x` with path compression.
    ///
    /// Relaxed loads plus compare-and-swap are sufficient here: union-find
    /// only needs eventual consistency and always converges to the root.
    #[inline]
    pub fn find(&self, mut x: usize) -> usize {
        loop {
            let p = self.parent[x].load(Ordering::Relaxed);
            if p == x {
                return x;
            }
            let gp = self.parent[p].load(Ordering::Relaxed);
            if gp != p {
                // Point x at its grandparent; losing the race is harmless.
                let _ =
                    self.parent[x].compare_exchange_weak(p, gp, Ordering::Relaxed, Ordering::Relaxed);
            }
            x = p;
        }
    }

    /// Union the sets containing `x` and `y`.
    ///
    /// Returns true if a merge actually occurred, false if they were already
    /// in the same set.
    #[inline]
    pub fn union(&self, x: usize, y: usize) -> bool {
        loop {
            let root_x = self.find(x);
            let root_y = self.find(y);

            if root_x == root_y {
                return false;
            }

            // The smaller root always points to the larger one, which keeps
            // the merge deterministic regardless of thread interleaving.
            let (small, large) = if root_x < root_y {
                (root_x, root_y)
            } else {
                (root_y, root_x)
            };

            match self.parent[small].compare_exchange_weak(
                small,
                large,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }
}

/// DBSCAN clustering over 3D points.
///
/// A point's neighborhood is every point within `eps` (inclusive) of it,
/// counting the point itself; a point is a core point when its neighborhood
/// has at least `min_samples` members. Connected core points form clusters,
/// border points join the lowest-index core neighbor's cluster, and
/// everything else is labeled [`NOISE`].
///
/// Labels are dense integers starting at 0, assigned in ascending scan
/// order, so the same geometry and parameters always produce the same
/// partition (label values themselves carry no meaning). An empty result
/// with every point labeled noise is a valid outcome.
///
/// # Arguments
///
/// * `coords` - Slice of 3D coordinates [x, y, z] per point
/// * `eps` - Neighborhood radius (inclusive)
/// * `min_samples` - Minimum neighborhood size for a core point, counting
///   the point itself
///
/// # Returns
///
/// Vector of cluster labels (-1 for noise points).
pub fn dbscan(coords: &[[f32; 3]], eps: f32, min_samples: usize) -> Vec<i32> {
    let n = coords.len();
    if n == 0 {
        return Vec::new();
    }

    let cloud = PointCloud::from_xyz(
        coords.iter().map(|c| c[0]).collect(),
        coords.iter().map(|c| c[1]).collect(),
        coords.iter().map(|c| c[2]).collect(),
    );
    let tree = KdTree::build(&cloud);

    // Phase 1: parallel neighbor finding. The query point is in the tree,
    // so each neighbor list includes the point itself.
    let neighbors: Vec<Vec<usize>> = coords
        .par_iter()
        .map(|coord| tree.radius_search(coord, eps))
        .collect();

    // Phase 2: core point identification.
    let is_core: Vec<bool> = neighbors
        .par_iter()
        .map(|neigh| neigh.len() >= min_samples)
        .collect();

    // Phase 3: lock-free cluster formation. Only core points union with
    // their core neighbors.
    let uf = AtomicUnionFind::new(n);
    (0..n).into_par_iter().for_each(|i| {
        if is_core[i] {
            for &j in &neighbors[i] {
                if is_core[j] {
                    uf.union(i, j);
                }
            }
        }
    });

    // Phase 4: label assignment. Roots are mapped to sequential cluster ids
    // in ascending point order; border points adopt the cluster of their
    // lowest-index core neighbor.
    let mut root_to_cluster: HashMap<usize, i32> = HashMap::new();
    let mut next_cluster_id: i32 = 0;

    for i in 0..n {
        if is_core[i] {
            let root = uf.find(i);
            root_to_cluster.entry(root).or_insert_with(|| {
                let id = next_cluster_id;
                next_cluster_id += 1;
                id
            });
        }
    }

    let mut labels = vec![NOISE; n];
    for i in 0..n {
        if is_core[i] {
            labels[i] = root_to_cluster[&uf.find(i)];
        } else {
            // Neighbor lists are sorted by index, so the first core
            // neighbor is the lowest-index one.
            for &j in &neighbors[i] {
                if is_core[j] {
                    labels[i] = root_to_cluster[&uf.find(j)];
                    break;
                }
            }
        }
    }

    labels
}

/// Cluster the points of a cloud, returning one label per point.
pub fn cluster_cloud(cloud: &PointCloud, eps: f32, min_samples: usize) -> Vec<i32> {
    dbscan(&cloud.to_coords(), eps, min_samples)
}
