use crate::types::ArchiveRecord;
use camino::{Utf8Path, Utf8PathBuf};
use ladruno_slurm::JobId;
use std::fs::{self, OpenOptions};
use std::io::Write;
use thiserror::Error;

/// Manifest file name under the destination root.
pub const DEFAULT_MANIFEST_NAME: &str = "archive_moves.log";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Append-only log of completed moves.
pub struct Manifest {
    path: Utf8PathBuf,
}

impl Manifest {
    /// The manifest lives at `<destination_root>/archive_moves.log`.
    pub fn new(destination_root: &Utf8Path) -> Self {
        Self {
            path: destination_root.join(DEFAULT_MANIFEST_NAME),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Append one record, creating the file and its parents if needed.
    pub fn append(&self, record: &ArchiveRecord) -> Result<(), ManifestError> {
        let io_err = |source| ManifestError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        writeln!(file, "{}", record.to_line()).map_err(io_err)?;
        Ok(())
    }

    /// Read back every well-formed record.
    ///
    /// Returns an empty list if the file doesn't exist.
    pub fn records(&self) -> Result<Vec<ArchiveRecord>, ManifestError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|source| ManifestError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let record = ArchiveRecord::parse_line(line);
                if record.is_none() {
                    tracing::warn!("Skipping malformed manifest line: {}", line);
                }
                record
            })
            .collect())
    }

    /// Records of one job, in file order.
    pub fn records_for(&self, job_id: JobId) -> Result<Vec<ArchiveRecord>, ManifestError> {
        let mut records = self.records()?;
        records.retain(|record| record.job_id == job_id);
        Ok(records)
    }
}
