//! Visualization tools for frames and their annotations.
//!
//! This module renders a top-down (x, y) scatter plot of one frame with its
//! annotation boxes overlaid, using the plotters library. Points are shaded
//! on a gray gradient by height so the ground plane stays light and tall
//! structures darken.

use std::path::Path;

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::core::loaders::PointCloud;
use crate::core::writers::BoundingBox;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Empty point cloud")]
    EmptyPointCloud,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Default plot width in pixels.
const DEFAULT_WIDTH: u32 = 1920;

/// Default plot height in pixels.
const DEFAULT_HEIGHT: u32 = 1080;

/// Plot a frame as a top-down scatter with annotation boxes and save as PNG.
///
/// Box rectangles are re-derived from per-axis min/max over each box's 8
/// corners, so any corner ordering renders correctly.
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image
/// * `cloud` - The frame's point cloud
/// * `boxes` - Annotation boxes to overlay (may be empty)
/// * `max_points` - Maximum number of points to plot (subsamples if exceeded)
/// * `alpha` - Alpha/transparency value for points (0.0 to 1.0)
pub fn plot_frame(
    output_path: &Path,
    cloud: &PointCloud,
    boxes: &[BoundingBox],
    max_points: usize,
    alpha: f32,
) -> Result<()> {
    if cloud.is_empty() {
        return Err(VisualizationError::EmptyPointCloud);
    }

    let n = cloud.len();
    let step = if n > max_points { n / max_points } else { 1 };
    let alpha_f64 = alpha.clamp(0.0, 1.0) as f64;

    // Height range for the gray gradient.
    let (min_z, max_z) = cloud
        .z
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let z_span = (max_z - min_z).max(f32::EPSILON);

    let mut points: Vec<(f32, f32, RGBAColor)> = Vec::with_capacity(n.min(max_points));
    for i in (0..n).step_by(step) {
        let depth = ((cloud.z[i] - min_z) / z_span).clamp(0.0, 1.0);
        // Light gray at the bottom of the range, black at the top.
        let shade = (128.0 * (1.0 - depth)) as u8;
        points.push((cloud.x[i], cloud.y[i], RGBAColor(shade, shade, shade, alpha_f64)));
    }

    let (mut x_min, mut x_max, mut y_min, mut y_max) = compute_bounds(&points);

    // Boxes may extend past the plotted points after subsampling.
    for b in boxes {
        let min = b.min_corner();
        let max = b.max_corner();
        x_min = x_min.min(min[0]);
        x_max = x_max.max(max[0]);
        y_min = y_min.min(min[1]);
        y_max = y_max.max(max[1]);
    }

    let x_padding = (x_max - x_min) * 0.05;
    let y_padding = (y_max - y_min) * 0.05;

    let root =
        BitMapBackend::new(output_path, (DEFAULT_WIDTH, DEFAULT_HEIGHT)).into_drawing_area();

    root.fill(&WHITE)
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(
            (x_min - x_padding)..(x_max + x_padding),
            (y_min - y_padding)..(y_max + y_padding),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .draw()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .draw_series(
            points
                .iter()
                .map(|(x, y, color)| Circle::new((*x, *y), 2, color.filled())),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    // Overlay each box as its top-down rectangle outline.
    for b in boxes {
        let min = b.min_corner();
        let max = b.max_corner();
        let color = RGBColor(
            (b.color[0].clamp(0.0, 1.0) * 255.0) as u8,
            (b.color[1].clamp(0.0, 1.0) * 255.0) as u8,
            (b.color[2].clamp(0.0, 1.0) * 255.0) as u8,
        );

        let outline = vec![
            (min[0], min[1]),
            (max[0], min[1]),
            (max[0], max[1]),
            (min[0], max[1]),
            (min[0], min[1]),
        ];

        chart
            .draw_series(std::iter::once(PathElement::new(
                outline,
                color.stroke_width(2),
            )))
            .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;
    }

    root.present()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    Ok(())
}

/// Compute the bounds (min/max) for x and y coordinates.
fn compute_bounds(points: &[(f32, f32, RGBAColor)]) -> (f32, f32, f32, f32) {
    let mut x_min = f32::MAX;
    let mut x_max = f32::MIN;
    let mut y_min = f32::MAX;
    let mut y_max = f32::MIN;

    for (x, y, _) in points {
        if *x < x_min {
            x_min = *x;
        }
        if *x > x_max {
            x_max = *x;
        }
        if *y < y_min {
            y_min = *y;
        }
        if *y > y_max {
            y_max = *y;
        }
    }

    if (x_max - x_min).abs() < f32::EPSILON {
        x_min -= 1.0;
        x_max += 1.0;
    }
    if (y_max - y_min).abs() < f32::EPSILON {
        y_min -= 1.0;
        y_max += 1.0;
    }

    (x_min, x_max, y_min, y_max)
}
