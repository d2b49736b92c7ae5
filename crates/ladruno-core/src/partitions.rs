//! Partition discovery from result file names.
//!
//! A decomposed model writes one result file per partition, named
//! `<stem>.part-<N>.<ext>`. The set of distinct `N` found on disk decides
//! how many MPI tasks the next run needs.

use camino::Utf8Path;
use regex::Regex;
use std::collections::BTreeSet;
use thiserror::Error;
use walkdir::WalkDir;

/// Partition files written as `*.part-N.mpco`.
pub const MPCO_PATTERN: &str = r"\.part-(\d+)\.mpco$";

/// Partition files written as `*.part-N.mpco.cdata`.
pub const MPCO_CDATA_PATTERN: &str = r"\.part-(\d+)\.mpco\.cdata$";

#[derive(Error, Debug)]
pub enum PartitionError {
    #[error("Invalid partition pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("Partition pattern {0:?} must capture the index in group 1")]
    MissingCaptureGroup(String),
}

/// Distinct partition indices observed on disk at scan time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionIndex {
    indices: BTreeSet<u32>,
}

impl PartitionIndex {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn max(&self) -> Option<u32> {
        self.indices.last().copied()
    }

    /// Number of tasks to request for this set of partitions.
    ///
    /// No partitions means a serial run (1). Otherwise the larger of
    /// `max + 1` and the distinct count, so a numbering hole (a part not
    /// written yet) never under-allocates.
    pub fn required_tasks(&self) -> u32 {
        match self.max() {
            None => 1,
            Some(max) => {
                let unique = u32::try_from(self.len()).unwrap_or(u32::MAX);
                max.saturating_add(1).max(unique)
            }
        }
    }
}

impl FromIterator<u32> for PartitionIndex {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self {
            indices: iter.into_iter().collect(),
        }
    }
}

/// Finds partition indices under a model directory.
#[derive(Debug, Clone)]
pub struct PartitionScanner {
    pattern: Regex,
}

impl PartitionScanner {
    /// Build a scanner from a regex whose first capture group is the index.
    pub fn new(pattern: &str) -> Result<Self, PartitionError> {
        let regex = Regex::new(pattern)?;
        // captures_len counts the implicit whole-match group
        if regex.captures_len() < 2 {
            return Err(PartitionError::MissingCaptureGroup(pattern.to_string()));
        }
        Ok(Self { pattern: regex })
    }

    /// Partition index encoded in a file name, if any.
    pub fn index_of(&self, file_name: &str) -> Option<u32> {
        self.pattern
            .captures(file_name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Recursively collect the partition indices under `dir`.
    ///
    /// Files sharing an index (a data file and its companion) count once.
    pub fn scan(&self, dir: &Utf8Path) -> PartitionIndex {
        let mut indices = BTreeSet::new();

        for entry in WalkDir::new(dir) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under {}: {}", dir, e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(index) = entry.file_name().to_str().and_then(|n| self.index_of(n)) {
                indices.insert(index);
            }
        }

        let index = PartitionIndex { indices };
        if let Some(max) = index.max() {
            tracing::info!(
                "Found {} unique partitions in {}, max index is {}",
                index.len(),
                dir,
                max
            );
        }
        index
    }

    /// Scan `dir` and return the task count it needs.
    pub fn required_tasks(&self, dir: &Utf8Path) -> u32 {
        self.scan(dir).required_tasks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Utf8Path, name: &str) {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_required_tasks_empty_is_serial() {
        assert_eq!(PartitionIndex::default().required_tasks(), 1);
    }

    #[test]
    fn test_required_tasks_dense_and_holes() {
        let dense: PartitionIndex = [0, 1, 2, 3].into_iter().collect();
        assert_eq!(dense.required_tasks(), 4);

        let holes: PartitionIndex = [0, 1, 3].into_iter().collect();
        assert_eq!(holes.required_tasks(), 4);

        let late_start: PartitionIndex = [5].into_iter().collect();
        assert_eq!(late_start.required_tasks(), 6);
    }

    #[test]
    fn test_required_tasks_matches_formula() {
        for set in [vec![0u32], vec![2, 7], vec![0, 1, 2, 9], vec![3, 4, 5]] {
            let index: PartitionIndex = set.iter().copied().collect();
            let expected = (set.iter().max().unwrap() + 1).max(index.len() as u32);
            assert_eq!(index.required_tasks(), expected);
        }
    }

    fn mpco() -> PartitionScanner {
        PartitionScanner::new(MPCO_PATTERN).unwrap()
    }

    #[test]
    fn test_index_of_mpco_pattern() {
        let scanner = mpco();
        assert_eq!(scanner.index_of("results.part-12.mpco"), Some(12));
        assert_eq!(scanner.index_of("results.part-12.mpco.cdata"), None);
        assert_eq!(scanner.index_of("results.mpco"), None);
    }

    #[test]
    fn test_index_of_cdata_pattern() {
        let scanner = PartitionScanner::new(MPCO_CDATA_PATTERN).unwrap();
        assert_eq!(scanner.index_of("results.part-3.mpco.cdata"), Some(3));
        assert_eq!(scanner.index_of("results.part-3.mpco"), None);
    }

    #[test]
    fn test_pattern_requires_capture_group() {
        assert!(matches!(
            PartitionScanner::new(r"\.part-\d+\.mpco$"),
            Err(PartitionError::MissingCaptureGroup(_))
        ));
        assert!(matches!(
            PartitionScanner::new(r"\.part-(\d+"),
            Err(PartitionError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_scan_with_hole() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        touch(dir, "a.part-0.mpco");
        touch(dir, "a.part-1.mpco");
        touch(dir, "a.part-3.mpco");
        touch(dir, "main.tcl");

        let scanner = mpco();
        let index = scanner.scan(dir);
        assert_eq!(index.len(), 3);
        assert_eq!(index.max(), Some(3));
        assert_eq!(scanner.required_tasks(dir), 4);
    }

    #[test]
    fn test_scan_dedups_and_recurses() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        touch(dir, "out/results.part-0.mpco.cdata");
        touch(dir, "out/results.part-0.mpco");
        touch(dir, "out/deep/results.part-1.mpco");

        let index = mpco().scan(dir);
        assert_eq!(index, [0, 1].into_iter().collect::<PartitionIndex>());
    }

    #[test]
    fn test_scan_no_partitions() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        touch(dir, "main.tcl");
        assert_eq!(mpco().required_tasks(dir), 1);
    }
}
