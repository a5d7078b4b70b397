//! Bounding box construction from clustered points.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::loaders::PointCloud;
use crate::core::writers::BoundingBox;
use crate::processors::clustering::NOISE;

/// Per-frame color assignment for cluster labels.
///
/// Every label gets one random RGB triple, shared by everything drawn for
/// that label within the frame. The generator is seeded explicitly so runs
/// and tests are reproducible; colors are not meant to be stable across
/// frames since labels are not tracked across frames.
pub struct ColorMap {
    rng: StdRng,
    assigned: HashMap<i32, [f32; 3]>,
}

impl ColorMap {
    /// Create a color map from an explicit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            assigned: HashMap::new(),
        }
    }

    /// Create the color map for one frame of a sequence.
    ///
    /// Mixes the frame index into the base seed so each frame draws its own
    /// color stream while the whole run stays reproducible.
    pub fn for_frame(base_seed: u64, frame_index: usize) -> Self {
        let seed = base_seed ^ (frame_index as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self::new(seed)
    }

    /// Color for a label, assigning a fresh random one on first use.
    pub fn color(&mut self, label: i32) -> [f32; 3] {
        let rng = &mut self.rng;
        *self.assigned.entry(label).or_insert_with(|| {
            [
                rng.gen_range(0.0..1.0),
                rng.gen_range(0.0..1.0),
                rng.gen_range(0.0..1.0),
            ]
        })
    }
}

/// The 8 corners of an axis-aligned box: bottom face counter-clockwise from
/// the minimum corner, then the top face in the same order.
fn corners(min: [f32; 3], max: [f32; 3]) -> [[f32; 3]; 8] {
    [
        [min[0], min[1], min[2]],
        [max[0], min[1], min[2]],
        [max[0], max[1], min[2]],
        [min[0], max[1], min[2]],
        [min[0], min[1], max[2]],
        [max[0], min[1], max[2]],
        [max[0], max[1], max[2]],
        [min[0], max[1], max[2]],
    ]
}

/// Build bounding boxes for every non-noise cluster of a frame.
///
/// Each cluster's axis-aligned extents become a box; boxes shorter than
/// `min_height` are discarded, with a height exactly at the limit kept.
/// Colors come from the per-frame [`ColorMap`]. Returns the surviving boxes
/// ordered by label.
pub fn build_boxes(
    cloud: &PointCloud,
    labels: &[i32],
    min_height: f32,
    colors: &mut ColorMap,
) -> Vec<BoundingBox> {
    debug_assert_eq!(cloud.len(), labels.len());

    // Gather per-label extents in one pass.
    let mut extents: HashMap<i32, ([f32; 3], [f32; 3])> = HashMap::new();
    for i in 0..cloud.len() {
        let label = labels[i];
        if label == NOISE {
            continue;
        }
        let p = cloud.point(i);
        let entry = extents.entry(label).or_insert((p, p));
        for axis in 0..3 {
            entry.0[axis] = entry.0[axis].min(p[axis]);
            entry.1[axis] = entry.1[axis].max(p[axis]);
        }
    }

    let mut labels_sorted: Vec<i32> = extents.keys().copied().collect();
    labels_sorted.sort_unstable();

    let mut boxes = Vec::with_capacity(labels_sorted.len());
    for label in labels_sorted {
        let (min, max) = extents[&label];
        let height = max[2] - min[2];
        if height < min_height {
            log::debug!("dropping cluster {}: height {:.4} below minimum", label, height);
            continue;
        }

        boxes.push(BoundingBox {
            label,
            height,
            points: corners(min, max),
            color: colors.color(label),
        });
    }

    boxes
}
