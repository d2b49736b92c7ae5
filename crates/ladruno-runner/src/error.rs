use camino::Utf8PathBuf;
use ladruno_archive::{ArchiveError, OutsideSourceRoot};
use ladruno_core::{AllocationError, ModelError, PartitionError, ScriptError};
use ladruno_slurm::{JobId, SbatchError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Submit(#[from] SbatchError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("Job {job_id} was submitted but archiving failed: {source}")]
    ArchiveAfterSubmit {
        job_id: JobId,
        #[source]
        source: ArchiveError,
    },
    #[error(transparent)]
    OutsideSourceRoot(#[from] OutsideSourceRoot),
    #[error("Archiving requested but no archive roots are configured")]
    ArchiveNotConfigured,
    #[error("Batch script not found (rebuild disabled): {0}")]
    MissingScript(Utf8PathBuf),
}
