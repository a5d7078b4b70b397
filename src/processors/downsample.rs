//! Voxel-grid downsampling.

use std::collections::HashMap;

use crate::core::loaders::PointCloud;

/// Running centroid accumulator for one occupied voxel cell.
#[derive(Default, Clone, Copy)]
struct VoxelAccum {
    sx: f32,
    sy: f32,
    sz: f32,
    n: usize,
}

/// Downsample a cloud so that each occupied voxel cell is represented by the
/// centroid of its points.
///
/// Cell indices are `floor(coordinate / voxel_size)` per axis. The output is
/// ordered by sorted cell index, so identical input always produces the
/// identical cloud. Non-finite points are skipped. An empty input yields an
/// empty output.
///
/// # Panics
///
/// Panics if `voxel_size` is not a positive finite number.
pub fn voxel_downsample(cloud: &PointCloud, voxel_size: f32) -> PointCloud {
    assert!(
        voxel_size.is_finite() && voxel_size > 0.0,
        "voxel_size must be > 0 and finite"
    );

    if cloud.is_empty() {
        return PointCloud::new();
    }

    let mut bins: HashMap<(i32, i32, i32), VoxelAccum> = HashMap::new();

    for i in 0..cloud.len() {
        let px = cloud.x[i];
        let py = cloud.y[i];
        let pz = cloud.z[i];
        if !px.is_finite() || !py.is_finite() || !pz.is_finite() {
            continue;
        }

        let key = (
            (px / voxel_size).floor() as i32,
            (py / voxel_size).floor() as i32,
            (pz / voxel_size).floor() as i32,
        );

        let entry = bins.entry(key).or_default();
        entry.sx += px;
        entry.sy += py;
        entry.sz += pz;
        entry.n += 1;
    }

    let mut keys: Vec<(i32, i32, i32)> = bins.keys().copied().collect();
    keys.sort_unstable();

    let mut out = PointCloud::with_capacity(keys.len());
    for key in keys {
        let a = bins[&key];
        let denom = a.n as f32;
        out.push(a.sx / denom, a.sy / denom, a.sz / denom);
    }

    out
}
