use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, FixedOffset, Local};
use ladruno_parsers::{format_manifest_timestamp, parse_manifest_timestamp};
use ladruno_slurm::JobId;
use thiserror::Error;

/// A model path that cannot be mirrored under the destination root.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{path} is not inside source root {root}")]
pub struct OutsideSourceRoot {
    pub path: Utf8PathBuf,
    pub root: Utf8PathBuf,
}

/// Source and destination roots of an archive tree.
///
/// A model at `<source>/a/b` is archived to `<destination>/a/b`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRoots {
    source: Utf8PathBuf,
    destination: Utf8PathBuf,
}

impl ArchiveRoots {
    /// The source root is resolved if it exists so that it compares equal
    /// to canonical model paths.
    pub fn new(source: impl Into<Utf8PathBuf>, destination: impl Into<Utf8PathBuf>) -> Self {
        let source = source.into();
        let source = source.canonicalize_utf8().unwrap_or(source);
        Self {
            source,
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &Utf8Path {
        &self.destination
    }

    /// Mirror `path` under the destination root.
    ///
    /// Fails when `path` is not strictly below the source root.
    pub fn destination_for(&self, path: &Utf8Path) -> Result<Utf8PathBuf, OutsideSourceRoot> {
        let outside = || OutsideSourceRoot {
            path: path.to_owned(),
            root: self.source.clone(),
        };
        let relative = path.strip_prefix(&self.source).map_err(|_| outside())?;
        if relative.as_str().is_empty() {
            return Err(outside());
        }
        Ok(self.destination.join(relative))
    }
}

/// One line of the archive manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    pub timestamp: DateTime<FixedOffset>,
    pub job_id: JobId,
    pub source: Utf8PathBuf,
    pub destination: Utf8PathBuf,
}

impl ArchiveRecord {
    /// Record a move that happened just now.
    pub fn now(job_id: JobId, source: Utf8PathBuf, destination: Utf8PathBuf) -> Self {
        Self {
            timestamp: Local::now().fixed_offset(),
            job_id,
            source,
            destination,
        }
    }

    /// `<timestamp>  job=<id>  <source> -> <destination>`
    pub fn to_line(&self) -> String {
        format!(
            "{}  job={}  {} -> {}",
            format_manifest_timestamp(&self.timestamp),
            self.job_id,
            self.source,
            self.destination
        )
    }

    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.trim_end().splitn(3, "  ");
        let timestamp = parse_manifest_timestamp(fields.next()?)?;
        let job_id = fields.next()?.strip_prefix("job=")?.parse().ok()?;
        let (source, destination) = fields.next()?.split_once(" -> ")?;
        Some(Self {
            timestamp,
            job_id,
            source: source.into(),
            destination: destination.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_destination_mirrors_relative_path() {
        let roots = ArchiveRoots::new("/nonexistent/runs", "/archive");
        let dest = roots
            .destination_for(Utf8Path::new("/nonexistent/runs/bridge/case1"))
            .unwrap();
        assert_eq!(dest, Utf8PathBuf::from("/archive/bridge/case1"));
    }

    #[test]
    fn test_destination_rejects_outside_path() {
        let roots = ArchiveRoots::new("/nonexistent/runs", "/archive");
        let err = roots
            .destination_for(Utf8Path::new("/elsewhere/case1"))
            .unwrap_err();
        assert_eq!(err.path, Utf8PathBuf::from("/elsewhere/case1"));
        assert!(err.to_string().contains("not inside"));
    }

    #[test]
    fn test_destination_rejects_sibling_with_common_prefix() {
        let roots = ArchiveRoots::new("/nonexistent/runs", "/archive");
        assert!(
            roots
                .destination_for(Utf8Path::new("/nonexistent/runs2/case1"))
                .is_err()
        );
    }

    #[test]
    fn test_destination_rejects_source_root_itself() {
        let roots = ArchiveRoots::new("/nonexistent/runs", "/archive");
        assert!(
            roots
                .destination_for(Utf8Path::new("/nonexistent/runs"))
                .is_err()
        );
    }

    #[test]
    fn test_record_line_round_trip() {
        let timestamp = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 2, 8, 15, 0)
            .unwrap();
        let record = ArchiveRecord {
            timestamp,
            job_id: JobId::new(4242),
            source: "/scratch/runs/case1".into(),
            destination: "/archive/runs/case1".into(),
        };
        let line = record.to_line();
        assert_eq!(
            line,
            "2024-05-02T08:15:00+01:00  job=4242  /scratch/runs/case1 -> /archive/runs/case1"
        );
        assert_eq!(ArchiveRecord::parse_line(&line), Some(record));
    }

    #[test]
    fn test_parse_line_rejects_malformed() {
        assert!(ArchiveRecord::parse_line("").is_none());
        assert!(ArchiveRecord::parse_line("2024-05-02T08:15:00+01:00  4242  a -> b").is_none());
        assert!(ArchiveRecord::parse_line("yesterday  job=1  a -> b").is_none());
    }
}
