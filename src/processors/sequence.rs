//! Frame sequence discovery and pairing.
//!
//! Frames are ordered by the first run of digits in their filename; the
//! detection driver pairs each frame with a reference frame a fixed stride
//! ahead in the sequence.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::WrapPolicy;

/// One discovered frame: its file path and the numeric index extracted from
/// the filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub path: PathBuf,
    /// Extracted filename index; `None` when the name carries no digits.
    pub index: Option<u64>,
}

/// Extract the first run of digits from a file name.
///
/// Returns `None` when the name contains no digits; such files sort after
/// all indexed ones.
pub fn frame_index(name: &str) -> Option<u64> {
    let digits = Regex::new(r"\d+").unwrap();
    digits
        .find(name)
        .and_then(|m| m.as_str().parse::<u64>().ok())
}

/// Scan a directory for frame files with the given extension, sorted by
/// extracted filename index (files without digits last, then by name).
pub fn scan_frames(dir: &Path, extension: &str) -> Result<Vec<Frame>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read frame directory: {}", dir.display()))?;

    let mut frames: Vec<Frame> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case(extension))
                    .unwrap_or(false)
        })
        .map(|path| {
            let index = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(frame_index);
            Frame { path, index }
        })
        .collect();

    frames.sort_by(|a, b| match (a.index, b.index) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.path.cmp(&b.path)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.path.cmp(&b.path),
    });

    Ok(frames)
}

/// Pick the reference frame index for pair `i` in a sequence of `n` frames.
///
/// The reference sits `stride` frames ahead. When that runs past the end of
/// the sequence the wrap policy decides: `Clamp` falls back to the last
/// frame, `Skip` drops the pair entirely.
pub fn reference_index(i: usize, stride: usize, n: usize, policy: WrapPolicy) -> Option<usize> {
    let j = i + stride;
    if j < n {
        return Some(j);
    }
    match policy {
        WrapPolicy::Clamp => Some(n - 1),
        WrapPolicy::Skip => None,
    }
}

/// Pair point cloud files with annotation files by equal extracted index.
///
/// Files on either side whose index has no counterpart are skipped; files
/// without any digits in their name never pair. Pairs come back sorted by
/// index.
pub fn match_annotation_pairs(pcd_dir: &Path, json_dir: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    let pcd_frames = scan_frames(pcd_dir, "pcd")?;
    let json_frames = scan_frames(json_dir, "json")?;

    let json_by_index: HashMap<u64, &Frame> = json_frames
        .iter()
        .filter_map(|f| f.index.map(|idx| (idx, f)))
        .collect();

    let mut pairs = Vec::new();
    for frame in &pcd_frames {
        let Some(idx) = frame.index else { continue };
        match json_by_index.get(&idx) {
            Some(json) => pairs.push((frame.path.clone(), json.path.clone())),
            None => log::debug!(
                "no annotation file for frame index {} ({})",
                idx,
                frame.path.display()
            ),
        }
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).unwrap();
    }

    #[test]
    fn test_frame_index_extraction() {
        assert_eq!(frame_index("pcd_000123.pcd"), Some(123));
        assert_eq!(frame_index("000042.pcd"), Some(42));
        assert_eq!(frame_index("scan12_take3.pcd"), Some(12));
        assert_eq!(frame_index("nodigits.pcd"), None);
    }

    #[test]
    fn test_scan_frames_sorted_by_index() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "pcd_000010.pcd");
        touch(dir.path(), "pcd_000002.pcd");
        touch(dir.path(), "pcd_000100.pcd");
        touch(dir.path(), "notes.txt");

        let frames = scan_frames(dir.path(), "pcd").unwrap();
        let indices: Vec<Option<u64>> = frames.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![Some(2), Some(10), Some(100)]);
    }

    #[test]
    fn test_scan_frames_digitless_sort_last() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "extra.pcd");
        touch(dir.path(), "pcd_000005.pcd");

        let frames = scan_frames(dir.path(), "pcd").unwrap();
        assert_eq!(frames[0].index, Some(5));
        assert_eq!(frames[1].index, None);
    }

    #[test]
    fn test_scan_frames_missing_dir_errors() {
        let dir = TempDir::new().unwrap();
        let result = scan_frames(&dir.path().join("nope"), "pcd");
        assert!(result.is_err());
    }

    #[test]
    fn test_reference_index_within_bounds() {
        assert_eq!(reference_index(0, 100, 300, WrapPolicy::Clamp), Some(100));
        assert_eq!(reference_index(150, 100, 300, WrapPolicy::Clamp), Some(250));
    }

    #[test]
    fn test_reference_index_clamps_to_last_frame() {
        assert_eq!(reference_index(250, 100, 300, WrapPolicy::Clamp), Some(299));
        assert_eq!(reference_index(298, 100, 300, WrapPolicy::Clamp), Some(299));
    }

    #[test]
    fn test_reference_index_skip_policy() {
        assert_eq!(reference_index(250, 100, 300, WrapPolicy::Skip), None);
        assert_eq!(reference_index(100, 100, 300, WrapPolicy::Skip), Some(200));
    }

    #[test]
    fn test_match_annotation_pairs_skips_unmatched() {
        let dir = TempDir::new().unwrap();
        let pcd_dir = dir.path().join("pcd");
        let json_dir = dir.path().join("json");
        std::fs::create_dir_all(&pcd_dir).unwrap();
        std::fs::create_dir_all(&json_dir).unwrap();

        touch(&pcd_dir, "pcd_000001.pcd");
        touch(&pcd_dir, "pcd_000002.pcd");
        touch(&pcd_dir, "pcd_000003.pcd");
        touch(&json_dir, "pcd_000001.json");
        touch(&json_dir, "pcd_000003.json");
        touch(&json_dir, "pcd_000099.json");

        let pairs = match_annotation_pairs(&pcd_dir, &json_dir).unwrap();
        assert_eq!(pairs.len(), 2);
        assert!(pairs[0].0.ends_with("pcd_000001.pcd"));
        assert!(pairs[0].1.ends_with("pcd_000001.json"));
        assert!(pairs[1].0.ends_with("pcd_000003.pcd"));
    }
}
