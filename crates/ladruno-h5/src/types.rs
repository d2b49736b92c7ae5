//! Repair status types.

use camino::Utf8PathBuf;
use std::fmt;

/// Classification of one result file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairStatus {
    /// Opens cleanly
    Ok,
    /// Superblock still marked open for write
    Flagged,
    /// Any other failure (unreadable, not HDF5, truncated)
    Error(String),
}

impl RepairStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Flagged => "FLAGGED",
            Self::Error(_) => "ERROR",
        }
    }
}

impl fmt::Display for RepairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(msg) => write!(f, "ERROR: {}", msg),
            other => f.write_str(other.label()),
        }
    }
}

/// Snapshot of a tool's status map with per-class counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub entries: Vec<(Utf8PathBuf, RepairStatus)>,
    pub ok: usize,
    pub flagged: usize,
    pub error: usize,
}

impl RepairReport {
    pub fn from_entries(entries: Vec<(Utf8PathBuf, RepairStatus)>) -> Self {
        let mut report = Self {
            entries,
            ..Self::default()
        };
        for (_, status) in &report.entries {
            match status {
                RepairStatus::Ok => report.ok += 1,
                RepairStatus::Flagged => report.flagged += 1,
                RepairStatus::Error(_) => report.error += 1,
            }
        }
        report
    }

    pub fn is_clean(&self) -> bool {
        self.flagged == 0
    }
}

impl fmt::Display for RepairReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File Status Report:")?;
        for (path, status) in &self.entries {
            let name = path.file_name().unwrap_or(path.as_str());
            writeln!(f, "{:<30} -> {}", name, status)?;
        }
        writeln!(f)?;
        writeln!(f, "Summary:")?;
        writeln!(f, "{:<8}: {}", "OK", self.ok)?;
        writeln!(f, "{:<8}: {}", "FLAGGED", self.flagged)?;
        write!(f, "{:<8}: {}", "ERROR", self.error)
    }
}
