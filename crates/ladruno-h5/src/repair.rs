//! Scan result files and clear stale write flags.

use crate::probe::{IntegrityProbe, SuperblockProbe};
use crate::types::{RepairReport, RepairStatus};
use camino::{Utf8Path, Utf8PathBuf};
use globset::{Glob, GlobMatcher};
use ladruno_parsers::{CommandError, run_command};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::process::Command;
use walkdir::WalkDir;

/// Result files checked by default: every MPCO file in the model directory.
pub const DEFAULT_REPAIR_PATTERN: &str = "*.mpco";

#[derive(Error, Debug)]
pub enum RepairError {
    #[error("Invalid file pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("Repair directory not found: {0}")]
    NotFound(Utf8PathBuf),
}

/// External command that clears the superblock flags of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagClearer {
    pub program: String,
    pub args: Vec<String>,
}

impl FlagClearer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub async fn clear(&self, path: &Utf8Path) -> Result<(), CommandError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(path.as_str());
        run_command(&mut cmd, &self.program).await?;
        Ok(())
    }
}

impl Default for FlagClearer {
    /// `h5clear -s -i <file>`: clear status flags and fix the EOA.
    fn default() -> Self {
        Self::new("h5clear", vec!["-s".to_string(), "-i".to_string()])
    }
}

/// A flagged file whose flag could not be cleared.
#[derive(Debug)]
pub struct ClearFailure {
    pub path: Utf8PathBuf,
    pub error: CommandError,
}

/// Tracks the integrity status of the result files in one directory.
///
/// The file list is fixed when the tool is built; each [`scan`](Self::scan)
/// recomputes every status from scratch.
pub struct RepairTool<P = SuperblockProbe> {
    directory: Utf8PathBuf,
    files: Vec<Utf8PathBuf>,
    status: BTreeMap<Utf8PathBuf, RepairStatus>,
    probe: P,
    clearer: FlagClearer,
}

impl RepairTool<SuperblockProbe> {
    pub fn new(directory: &Utf8Path, pattern: &str) -> Result<Self, RepairError> {
        Self::with_probe(directory, pattern, SuperblockProbe)
    }
}

impl<P: IntegrityProbe> RepairTool<P> {
    pub fn with_probe(directory: &Utf8Path, pattern: &str, probe: P) -> Result<Self, RepairError> {
        if !directory.is_dir() {
            return Err(RepairError::NotFound(directory.to_owned()));
        }
        let matcher = compile_pattern(pattern)?;
        let files = collect_files(directory, pattern, &matcher);

        Ok(Self {
            directory: directory.to_owned(),
            files,
            status: BTreeMap::new(),
            probe,
            clearer: FlagClearer::default(),
        })
    }

    pub fn with_clearer(mut self, clearer: FlagClearer) -> Self {
        self.clearer = clearer;
        self
    }

    pub fn files(&self) -> &[Utf8PathBuf] {
        &self.files
    }

    pub fn status(&self) -> &BTreeMap<Utf8PathBuf, RepairStatus> {
        &self.status
    }

    /// Reclassify every file.
    pub fn scan(&mut self) -> &BTreeMap<Utf8PathBuf, RepairStatus> {
        self.status.clear();
        for file in &self.files {
            let status = self.probe.probe(file);
            tracing::debug!("{} -> {}", file, status);
            self.status.insert(file.clone(), status);
        }
        &self.status
    }

    pub fn report(&self) -> RepairReport {
        RepairReport::from_entries(
            self.status
                .iter()
                .map(|(path, status)| (path.clone(), status.clone()))
                .collect(),
        )
    }

    /// Run the clearer on every file currently marked flagged.
    ///
    /// A cleared file is marked OK without reopening it. A failure leaves
    /// the file flagged and does not stop the remaining files.
    pub async fn fix_flagged(&mut self) -> Vec<ClearFailure> {
        let flagged: Vec<Utf8PathBuf> = self
            .status
            .iter()
            .filter(|(_, status)| **status == RepairStatus::Flagged)
            .map(|(path, _)| path.clone())
            .collect();

        let mut failures = Vec::new();
        for path in flagged {
            tracing::info!("Fixing: {}", path);
            match self.clearer.clear(&path).await {
                Ok(()) => {
                    tracing::info!("Cleared flag on {}", path);
                    self.status.insert(path, RepairStatus::Ok);
                }
                Err(error) => {
                    tracing::warn!("Failed to clear {}: {}", path, error);
                    failures.push(ClearFailure { path, error });
                }
            }
        }
        failures
    }

    /// Scan, report and fix; the standard repair entry point.
    ///
    /// Returns the report as it stands after fixing.
    pub async fn run_full_check_and_fix(&mut self) -> RepairReport {
        self.scan();
        let before = self.report();
        tracing::info!(
            "Checked {} file(s) in {}: {} ok, {} flagged, {} error",
            before.entries.len(),
            self.directory,
            before.ok,
            before.flagged,
            before.error
        );
        for (path, status) in &before.entries {
            if let RepairStatus::Error(msg) = status {
                tracing::info!("{} -> ERROR: {}", path, msg);
            }
        }

        self.fix_flagged().await;
        self.report()
    }
}

fn compile_pattern(pattern: &str) -> Result<GlobMatcher, RepairError> {
    Glob::new(pattern.trim_start_matches("./"))
        .map(|glob| glob.compile_matcher())
        .map_err(|source| RepairError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// Files under `directory` matching `pattern`, sorted.
///
/// A pattern without `/` matches file names directly inside the
/// directory; one with `/` matches relative paths at any depth.
fn collect_files(directory: &Utf8Path, pattern: &str, matcher: &GlobMatcher) -> Vec<Utf8PathBuf> {
    let recursive = pattern.contains('/');
    let mut walker = WalkDir::new(directory).min_depth(1).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {}", directory, e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(path) = Utf8PathBuf::try_from(entry.into_path()) else {
            continue;
        };
        let Ok(rel) = path.strip_prefix(directory) else {
            continue;
        };
        if matcher.is_match(rel.as_str()) {
            files.push(path);
        }
    }
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::tests::superblock;
    use ladruno_parsers::testing::fake_command;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Utf8Path, name: &str, bytes: &[u8]) -> Utf8PathBuf {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, bytes).unwrap();
        path
    }

    fn fake_clearer(dir: &Utf8Path, body: &str) -> FlagClearer {
        let path = fake_command(dir, "fake_h5clear", body);
        FlagClearer::new(path.as_str(), vec!["-s".to_string(), "-i".to_string()])
    }

    #[test]
    fn test_collects_matching_files_only() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        write(dir, "r.part-1.mpco", &superblock(3, 0));
        write(dir, "r.part-0.mpco", &superblock(3, 0));
        write(dir, "r.part-0.mpco.cdata", b"");
        write(dir, "sub/r.part-2.mpco", &superblock(3, 0));

        let tool = RepairTool::new(dir, DEFAULT_REPAIR_PATTERN).unwrap();
        let names: Vec<&str> = tool.files().iter().filter_map(|p| p.file_name()).collect();
        assert_eq!(names, vec!["r.part-0.mpco", "r.part-1.mpco"]);

        let recursive = RepairTool::new(dir, "**/*.mpco").unwrap();
        assert_eq!(recursive.files().len(), 3);
    }

    #[test]
    fn test_invalid_pattern_and_missing_dir() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        assert!(matches!(
            RepairTool::new(dir, "[*.mpco"),
            Err(RepairError::InvalidPattern { .. })
        ));
        assert!(matches!(
            RepairTool::new(&dir.join("missing"), DEFAULT_REPAIR_PATTERN),
            Err(RepairError::NotFound(_))
        ));
    }

    #[test]
    fn test_scan_classifies() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        let ok = write(dir, "a.part-0.mpco", &superblock(3, 0));
        let flagged = write(dir, "a.part-1.mpco", &superblock(3, 1));
        let broken = write(dir, "a.part-2.mpco", b"garbage");

        let mut tool = RepairTool::new(dir, DEFAULT_REPAIR_PATTERN).unwrap();
        let status = tool.scan();
        assert_eq!(status[&ok], RepairStatus::Ok);
        assert_eq!(status[&flagged], RepairStatus::Flagged);
        assert!(matches!(status[&broken], RepairStatus::Error(_)));
    }

    #[test]
    fn test_scan_recomputes_from_scratch() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        let file = write(dir, "a.part-0.mpco", &superblock(3, 1));

        let mut tool = RepairTool::new(dir, DEFAULT_REPAIR_PATTERN).unwrap();
        assert_eq!(tool.scan()[&file], RepairStatus::Flagged);

        fs::write(&file, superblock(3, 0)).unwrap();
        assert_eq!(tool.scan()[&file], RepairStatus::Ok);
    }

    #[tokio::test]
    async fn test_fix_flagged_only_touches_flagged() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        let work = dir.join("results");
        fs::create_dir(&work).unwrap();
        write(&work, "a.part-0.mpco", &superblock(3, 0));
        let flagged = write(&work, "a.part-1.mpco", &superblock(3, 1));
        let calls = dir.join("calls.txt");
        let clearer = fake_clearer(dir, &format!("echo \"$3\" >> '{calls}'"));

        let mut tool = RepairTool::new(&work, DEFAULT_REPAIR_PATTERN)
            .unwrap()
            .with_clearer(clearer);
        tool.scan();
        let failures = tool.fix_flagged().await;

        assert!(failures.is_empty());
        assert_eq!(tool.status()[&flagged], RepairStatus::Ok);
        let called = fs::read_to_string(&calls).unwrap();
        assert_eq!(called.lines().collect::<Vec<_>>(), vec![flagged.as_str()]);
    }

    #[tokio::test]
    async fn test_fix_failure_keeps_flag_and_continues() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        let work = dir.join("results");
        fs::create_dir(&work).unwrap();
        let first = write(&work, "a.part-0.mpco", &superblock(3, 1));
        let second = write(&work, "a.part-1.mpco", &superblock(3, 1));
        // Fails only for part-0
        let clearer = fake_clearer(
            dir,
            "case \"$3\" in *part-0*) echo 'h5clear error: unable to open file' >&2; exit 1;; esac",
        );

        let mut tool = RepairTool::new(&work, DEFAULT_REPAIR_PATTERN)
            .unwrap()
            .with_clearer(clearer);
        let report = tool.run_full_check_and_fix().await;

        assert_eq!(tool.status()[&first], RepairStatus::Flagged);
        assert_eq!(tool.status()[&second], RepairStatus::Ok);
        assert_eq!((report.ok, report.flagged), (1, 1));
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_fix_failure_reports_stderr() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        let work = dir.join("results");
        fs::create_dir(&work).unwrap();
        write(&work, "a.part-0.mpco", &superblock(3, 1));
        let clearer = fake_clearer(dir, "echo 'cannot clear' >&2; exit 1");

        let mut tool = RepairTool::new(&work, DEFAULT_REPAIR_PATTERN)
            .unwrap()
            .with_clearer(clearer);
        tool.scan();
        let failures = tool.fix_flagged().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error.stderr(), Some("cannot clear"));
    }

    #[tokio::test]
    async fn test_full_check_is_idempotent_on_healthy_files() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        let work = dir.join("results");
        fs::create_dir(&work).unwrap();
        write(&work, "a.part-0.mpco", &superblock(3, 0));
        write(&work, "a.part-1.mpco", &superblock(2, 0));
        let calls = dir.join("calls.txt");
        let clearer = fake_clearer(dir, &format!("echo \"$3\" >> '{calls}'"));

        let mut tool = RepairTool::new(&work, DEFAULT_REPAIR_PATTERN)
            .unwrap()
            .with_clearer(clearer);
        let first = tool.run_full_check_and_fix().await;
        let first_status = tool.status().clone();
        let second = tool.run_full_check_and_fix().await;

        assert_eq!(first, second);
        assert_eq!(&first_status, tool.status());
        assert_eq!(first.ok, 2);
        assert!(!calls.exists());
    }
}
