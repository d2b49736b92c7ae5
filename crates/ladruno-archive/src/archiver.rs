//! Wait for a job, then move its model directory into the archive tree.

use crate::manifest::{Manifest, ManifestError};
use crate::types::{ArchiveRecord, ArchiveRoots, OutsideSourceRoot};
use camino::{Utf8Path, Utf8PathBuf};
use ladruno_h5::{DEFAULT_REPAIR_PATTERN, FlagClearer, RepairError, RepairTool};
use ladruno_parsers::{CommandError, run_command};
use ladruno_slurm::{CompletionWaiter, JobId, SqueueError};
use std::fs;
use std::io;
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Model directory not found: {path}: {source}")]
    SourceNotFound {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    OutsideSourceRoot(#[from] OutsideSourceRoot),
    #[error("Archive destination already exists: {0}")]
    DestinationExists(Utf8PathBuf),
    #[error(transparent)]
    Wait(#[from] SqueueError),
    #[error(transparent)]
    Repair(#[from] RepairError),
    #[error("{flagged} result file(s) in {path} are still open-for-write")]
    StillFlagged { path: Utf8PathBuf, flagged: usize },
    #[error("Failed to move {from} to {to}: {error}")]
    Move {
        from: Utf8PathBuf,
        to: Utf8PathBuf,
        #[source]
        error: io::Error,
    },
    #[error("Failed to move {from} to {to} across filesystems: {error}")]
    CrossDeviceMove {
        from: Utf8PathBuf,
        to: Utf8PathBuf,
        #[source]
        error: CommandError,
    },
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Moves finished model directories from the source tree into the archive.
pub struct Archiver {
    roots: ArchiveRoots,
    waiter: CompletionWaiter,
    repair_pattern: String,
    clearer: FlagClearer,
    keep_manifest: bool,
}

impl Archiver {
    pub fn new(roots: ArchiveRoots, waiter: CompletionWaiter) -> Self {
        Self {
            roots,
            waiter,
            repair_pattern: DEFAULT_REPAIR_PATTERN.to_string(),
            clearer: FlagClearer::default(),
            keep_manifest: true,
        }
    }

    pub fn with_repair_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.repair_pattern = pattern.into();
        self
    }

    pub fn with_clearer(mut self, clearer: FlagClearer) -> Self {
        self.clearer = clearer;
        self
    }

    pub fn with_manifest(mut self, keep: bool) -> Self {
        self.keep_manifest = keep;
        self
    }

    pub fn roots(&self) -> &ArchiveRoots {
        &self.roots
    }

    /// Block until `job_id` leaves the queue, then move `model_dir` to its
    /// mirrored place under the destination root.
    ///
    /// The destination is resolved before waiting so a misconfigured root
    /// fails immediately. With `fix_flags`, stale write flags are cleared
    /// after the job ends; any file still flagged aborts the move.
    pub async fn archive_after_finish(
        &self,
        model_dir: &Utf8Path,
        job_id: JobId,
        fix_flags: bool,
    ) -> Result<Utf8PathBuf, ArchiveError> {
        let source = model_dir
            .canonicalize_utf8()
            .map_err(|source| ArchiveError::SourceNotFound {
                path: model_dir.to_owned(),
                source,
            })?;
        let destination = self.roots.destination_for(&source)?;

        tracing::info!("Waiting for job {} before archiving {}", job_id, source);
        let waited = self.waiter.wait(job_id).await?;
        tracing::debug!("Job {} left the queue after {:?}", job_id, waited);

        if fix_flags {
            self.repair(&source).await?;
        }

        move_directory(&source, &destination).await?;
        tracing::info!("Archived {} -> {}", source, destination);

        if self.keep_manifest {
            let record = ArchiveRecord::now(job_id, source, destination.clone());
            Manifest::new(self.roots.destination()).append(&record)?;
        }
        Ok(destination)
    }

    async fn repair(&self, dir: &Utf8Path) -> Result<(), ArchiveError> {
        let mut tool =
            RepairTool::new(dir, &self.repair_pattern)?.with_clearer(self.clearer.clone());
        let report = tool.run_full_check_and_fix().await;
        tracing::info!(
            "Repair of {}: {} ok, {} flagged, {} error",
            dir,
            report.ok,
            report.flagged,
            report.error
        );
        if !report.is_clean() {
            return Err(ArchiveError::StillFlagged {
                path: dir.to_owned(),
                flagged: report.flagged,
            });
        }
        Ok(())
    }
}

/// Rename `from` to `to`, falling back to `mv` across filesystems.
///
/// Never overwrites: `to` is claimed with an exclusive `create_dir` before
/// anything moves, so a destination that exists (or appears concurrently)
/// is an error and `from` is left alone.
pub async fn move_directory(from: &Utf8Path, to: &Utf8Path) -> Result<(), ArchiveError> {
    let move_err = |error| ArchiveError::Move {
        from: from.to_owned(),
        to: to.to_owned(),
        error,
    };
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(move_err)?;
    }
    match fs::create_dir(to) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(ArchiveError::DestinationExists(to.to_owned()));
        }
        Err(e) => return Err(move_err(e)),
    }

    // rename(2) replaces only the empty directory claimed above
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!("{} and {} are on different filesystems, using mv", from, to);
            fs::remove_dir(to).map_err(move_err)?;
            run_command(&mut mv_command(from, to), "mv")
                .await
                .map_err(|error| ArchiveError::CrossDeviceMove {
                    from: from.to_owned(),
                    to: to.to_owned(),
                    error,
                })?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_dir(to);
            Err(move_err(e))
        }
    }
}

/// `mv -T` fails on an existing destination instead of moving into it.
fn mv_command(from: &Utf8Path, to: &Utf8Path) -> Command {
    let mut cmd = Command::new("mv");
    cmd.arg("-T").arg("--").arg(from.as_str()).arg(to.as_str());
    cmd
}
