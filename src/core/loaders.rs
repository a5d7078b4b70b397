//! Data loaders for LiDAR point cloud frames.
//!
//! This module provides the in-memory point cloud representation and a
//! parser for PCD files (ASCII and binary, the two DATA encodings produced
//! by common LiDAR toolchains).

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid PCD file {path}: {reason}")]
    InvalidPcd { path: PathBuf, reason: String },

    #[error("Unsupported PCD DATA encoding '{encoding}' in {path}")]
    UnsupportedEncoding { path: PathBuf, encoding: String },

    #[error("PCD file {path} is missing required fields (x, y, z)")]
    MissingFields { path: PathBuf },

    #[error("Failed to parse value '{value}' in {path}")]
    ParseError { path: PathBuf, value: String },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Container for 3D point cloud data.
///
/// Coordinates are stored as parallel vectors; colors, when present, are
/// index-aligned with the coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    /// X coordinates of all points.
    pub x: Vec<f32>,
    /// Y coordinates of all points.
    pub y: Vec<f32>,
    /// Z coordinates of all points.
    pub z: Vec<f32>,
    /// Optional RGB colors for each point.
    pub colors: Option<Vec<[u8; 3]>>,
}

impl PointCloud {
    /// Creates a new empty point cloud.
    pub fn new() -> Self {
        Self {
            x: Vec::new(),
            y: Vec::new(),
            z: Vec::new(),
            colors: None,
        }
    }

    /// Creates a new point cloud from coordinate vectors.
    pub fn from_xyz(x: Vec<f32>, y: Vec<f32>, z: Vec<f32>) -> Self {
        debug_assert_eq!(x.len(), y.len());
        debug_assert_eq!(x.len(), z.len());
        Self {
            x,
            y,
            z,
            colors: None,
        }
    }

    /// Creates a new point cloud from coordinate vectors with colors.
    pub fn from_xyz_colors(x: Vec<f32>, y: Vec<f32>, z: Vec<f32>, colors: Vec<[u8; 3]>) -> Self {
        debug_assert_eq!(x.len(), colors.len());
        Self {
            x,
            y,
            z,
            colors: Some(colors),
        }
    }

    /// Creates a new point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            colors: None,
        }
    }

    /// Returns the number of points in the cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Returns the point at index `i` as an `[x, y, z]` array.
    #[inline]
    pub fn point(&self, i: usize) -> [f32; 3] {
        [self.x[i], self.y[i], self.z[i]]
    }

    /// Converts the point cloud to a vector of [x, y, z] coordinate arrays.
    pub fn to_coords(&self) -> Vec<[f32; 3]> {
        let n = self.len();
        let mut coords = Vec::with_capacity(n);
        for i in 0..n {
            coords.push([self.x[i], self.y[i], self.z[i]]);
        }
        coords
    }

    /// Adds a point to the cloud.
    #[inline]
    pub fn push(&mut self, x: f32, y: f32, z: f32) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
    }

    /// Adds a point with color to the cloud.
    pub fn push_with_color(&mut self, x: f32, y: f32, z: f32, color: [u8; 3]) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);

        if self.colors.is_none() {
            self.colors = Some(Vec::with_capacity(self.x.capacity()));
        }
        if let Some(ref mut colors) = self.colors {
            colors.push(color);
        }
    }

    /// Returns a new cloud containing only the points at the given indices.
    ///
    /// Colors, when present, are carried along. Indices must be in bounds.
    pub fn select(&self, indices: &[usize]) -> Self {
        let mut out = Self::with_capacity(indices.len());
        for &idx in indices {
            out.push(self.x[idx], self.y[idx], self.z[idx]);
        }
        out.colors = self
            .colors
            .as_ref()
            .map(|c| indices.iter().map(|&idx| c[idx]).collect());
        out
    }
}

impl Default for PointCloud {
    fn default() -> Self {
        Self::new()
    }
}

/// Parsed PCD header: field layout, point count and data encoding.
struct PcdHeader {
    fields: Vec<String>,
    points: usize,
    encoding: String,
    /// Byte offset where the data section begins.
    data_offset: usize,
}

fn invalid(path: &Path, reason: impl Into<String>) -> LoaderError {
    LoaderError::InvalidPcd {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Parse the ASCII header of a PCD file.
///
/// The header ends at the newline terminating the `DATA` line; for binary
/// files everything after that offset is the payload.
fn parse_header(path: &Path, raw: &[u8]) -> Result<PcdHeader> {
    let mut fields = Vec::new();
    let mut points: Option<usize> = None;
    let mut width: Option<usize> = None;
    let mut encoding: Option<String> = None;

    let mut offset = 0usize;
    while offset < raw.len() {
        let end = raw[offset..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| offset + p)
            .unwrap_or(raw.len());
        let line = std::str::from_utf8(&raw[offset..end])
            .map_err(|_| invalid(path, "header is not valid UTF-8"))?
            .trim();
        offset = end + 1;

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("FIELDS") => fields = parts.map(|s| s.to_string()).collect(),
            Some("POINTS") => {
                points = parts.next().and_then(|s| s.parse().ok());
            }
            Some("WIDTH") => {
                width = parts.next().and_then(|s| s.parse().ok());
            }
            Some("DATA") => {
                encoding = parts.next().map(|s| s.to_string());
                break;
            }
            _ => {}
        }
    }

    let encoding = encoding.ok_or_else(|| invalid(path, "missing DATA line"))?;
    let points = points
        .or(width)
        .ok_or_else(|| invalid(path, "missing POINTS/WIDTH header"))?;

    if fields.is_empty() {
        // Old PCD writers occasionally omit FIELDS; assume plain x y z.
        fields = vec!["x".to_string(), "y".to_string(), "z".to_string()];
    }

    Ok(PcdHeader {
        fields,
        points,
        encoding,
        data_offset: offset,
    })
}

/// Unpack an `rgb` value stored as a float whose bits carry 0x00RRGGBB.
fn unpack_rgb(bits: u32) -> [u8; 3] {
    [
        ((bits >> 16) & 0xff) as u8,
        ((bits >> 8) & 0xff) as u8,
        (bits & 0xff) as u8,
    ]
}

/// Load a point cloud from a PCD file (ASCII or binary DATA encoding).
///
/// Requires `x`, `y`, `z` fields; an optional packed `rgb` field is decoded
/// into per-point colors. A malformed file is reported as an error rather
/// than being read as empty geometry.
///
/// # Arguments
///
/// * `path` - Path to the PCD file
///
/// # Returns
///
/// A `PointCloud` with coordinates and optional colors.
///
/// # Errors
///
/// Returns an error if the file cannot be read, the header is malformed,
/// coordinate fields are missing, or the data section is truncated.
pub fn load_pcd<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let raw = fs::read(path)?;
    let header = parse_header(path, &raw)?;

    let field_idx = |name: &str| header.fields.iter().position(|f| f == name);
    let (x_idx, y_idx, z_idx) = match (field_idx("x"), field_idx("y"), field_idx("z")) {
        (Some(x), Some(y), Some(z)) => (x, y, z),
        _ => {
            return Err(LoaderError::MissingFields {
                path: path.to_path_buf(),
            })
        }
    };
    let rgb_idx = field_idx("rgb");

    match header.encoding.as_str() {
        "ascii" => read_ascii(path, &raw, &header, x_idx, y_idx, z_idx, rgb_idx),
        "binary" => read_binary(path, &raw, &header, x_idx, y_idx, z_idx, rgb_idx),
        other => Err(LoaderError::UnsupportedEncoding {
            path: path.to_path_buf(),
            encoding: other.to_string(),
        }),
    }
}

fn read_ascii(
    path: &Path,
    raw: &[u8],
    header: &PcdHeader,
    x_idx: usize,
    y_idx: usize,
    z_idx: usize,
    rgb_idx: Option<usize>,
) -> Result<PointCloud> {
    let body = std::str::from_utf8(&raw[header.data_offset..])
        .map_err(|_| invalid(path, "ASCII data section is not valid UTF-8"))?;

    let mut cloud = PointCloud::with_capacity(header.points);
    let mut colors = Vec::new();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let values: Vec<&str> = line.split_whitespace().collect();
        if values.len() < header.fields.len() {
            return Err(invalid(
                path,
                format!(
                    "data row has {} values, expected {}",
                    values.len(),
                    header.fields.len()
                ),
            ));
        }

        let parse = |idx: usize| -> Result<f32> {
            values[idx]
                .parse::<f32>()
                .map_err(|_| LoaderError::ParseError {
                    path: path.to_path_buf(),
                    value: values[idx].to_string(),
                })
        };

        cloud.push(parse(x_idx)?, parse(y_idx)?, parse(z_idx)?);

        if let Some(idx) = rgb_idx {
            // The packed rgb field may be written as a float (bit pattern)
            // or a plain unsigned integer.
            let bits = match values[idx].parse::<f32>() {
                Ok(f) => f.to_bits(),
                Err(_) => values[idx]
                    .parse::<u32>()
                    .map_err(|_| LoaderError::ParseError {
                        path: path.to_path_buf(),
                        value: values[idx].to_string(),
                    })?,
            };
            colors.push(unpack_rgb(bits));
        }
    }

    if cloud.len() < header.points {
        return Err(invalid(
            path,
            format!("expected {} points, found {}", header.points, cloud.len()),
        ));
    }

    if rgb_idx.is_some() {
        cloud.colors = Some(colors);
    }

    Ok(cloud)
}

fn read_binary(
    path: &Path,
    raw: &[u8],
    header: &PcdHeader,
    x_idx: usize,
    y_idx: usize,
    z_idx: usize,
    rgb_idx: Option<usize>,
) -> Result<PointCloud> {
    // All supported fields are 4-byte little-endian values.
    let point_size = header.fields.len() * 4;
    let data = &raw[header.data_offset..];
    let expected = header.points * point_size;

    if data.len() < expected {
        return Err(invalid(
            path,
            format!(
                "binary data too short: have {} bytes, expected {}",
                data.len(),
                expected
            ),
        ));
    }

    let mut cloud = PointCloud::with_capacity(header.points);
    let mut colors = Vec::new();

    for p in 0..header.points {
        let base = p * point_size;
        let field_bytes = |idx: usize| -> [u8; 4] {
            let off = base + idx * 4;
            [data[off], data[off + 1], data[off + 2], data[off + 3]]
        };

        cloud.push(
            f32::from_le_bytes(field_bytes(x_idx)),
            f32::from_le_bytes(field_bytes(y_idx)),
            f32::from_le_bytes(field_bytes(z_idx)),
        );

        if let Some(idx) = rgb_idx {
            colors.push(unpack_rgb(f32::from_le_bytes(field_bytes(idx)).to_bits()));
        }
    }

    if rgb_idx.is_some() {
        cloud.colors = Some(colors);
    }

    Ok(cloud)
}
