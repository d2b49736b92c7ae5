use camino::{Utf8Path, Utf8PathBuf};
use ladruno_archive::{ArchiveRoots, Archiver};
use ladruno_core::{
    DEFAULT_ENTRY_POINT, DEFAULT_LAUNCHER, DEFAULT_MONITOR_INTERVAL, DEFAULT_MONITOR_LOG,
    DEFAULT_OUTPUT_LOG, DEFAULT_SCRIPT_NAME, DEFAULT_STATUS_FILE, MPCO_PATTERN, NodeCapacity,
};
use ladruno_h5::{DEFAULT_REPAIR_PATTERN, FlagClearer};
use ladruno_slurm::{CompletionWaiter, DEFAULT_POLL_INTERVAL, SlurmCommands};
use std::time::Duration;

/// Per-directory sizing and launch settings.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub capacity: NodeCapacity,

    /// Simulation executable (required, never defaulted)
    pub executable: Utf8PathBuf,

    /// Input file that marks a model directory
    pub entry_point: String,

    /// Regex with one capture group for the partition index
    pub partition_pattern: String,

    /// Scheduler log file (`#SBATCH --output`)
    pub output_log: String,

    pub script_name: String,
    pub launcher: String,

    /// Extra `LD_LIBRARY_PATH` entries
    pub library_dirs: Vec<Utf8PathBuf>,

    pub slurm: SlurmCommands,

    /// Needed for [`ArchiveMode::External`] and [`ArchiveMode::InScript`]
    pub archive: Option<ArchiveSettings>,
}

impl RunConfig {
    pub fn new(executable: impl Into<Utf8PathBuf>) -> Self {
        Self {
            capacity: NodeCapacity::default(),
            executable: executable.into(),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            partition_pattern: MPCO_PATTERN.to_string(),
            output_log: DEFAULT_OUTPUT_LOG.to_string(),
            script_name: DEFAULT_SCRIPT_NAME.to_string(),
            launcher: DEFAULT_LAUNCHER.to_string(),
            library_dirs: Vec::new(),
            slurm: SlurmCommands::default(),
            archive: None,
        }
    }

    /// Name the memory monitor looks for in the process table.
    pub fn process_match(&self) -> &str {
        self.executable
            .file_name()
            .unwrap_or(self.executable.as_str())
    }
}

/// Where a finished run's directory goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveMode {
    /// Leave the directory in place
    #[default]
    None,
    /// Wait for the job here, repair flags, then move the directory
    External,
    /// Let the batch script copy the results itself on success
    InScript,
}

/// Archive tree and the tools used to reach it.
#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    pub roots: ArchiveRoots,
    pub poll_interval: Duration,
    pub keep_manifest: bool,
    pub repair_pattern: String,
    pub clearer: FlagClearer,

    /// Status file left behind by the in-script epilogue
    pub status_file: String,

    /// Log text that marks a run as successful despite a non-zero exit
    pub success_marker: Option<String>,
}

impl ArchiveSettings {
    pub fn new(source_root: &Utf8Path, destination_root: &Utf8Path) -> Self {
        Self {
            roots: ArchiveRoots::new(source_root, destination_root),
            poll_interval: DEFAULT_POLL_INTERVAL,
            keep_manifest: true,
            repair_pattern: DEFAULT_REPAIR_PATTERN.to_string(),
            clearer: FlagClearer::default(),
            status_file: DEFAULT_STATUS_FILE.to_string(),
            success_marker: None,
        }
    }

    /// Archiver that polls with `queue_program`.
    pub fn archiver(&self, queue_program: impl Into<String>) -> Archiver {
        let waiter = CompletionWaiter::new(queue_program, self.poll_interval);
        Archiver::new(self.roots.clone(), waiter)
            .with_repair_pattern(self.repair_pattern.clone())
            .with_clearer(self.clearer.clone())
            .with_manifest(self.keep_manifest)
    }
}

/// Memory monitor timing and log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub log_file: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_MONITOR_INTERVAL,
            log_file: DEFAULT_MONITOR_LOG.to_string(),
        }
    }
}

/// Switches for one submission.
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub archive: ArchiveMode,

    /// Clear stale HDF5 write flags before an external archive
    pub fix_flags: bool,

    /// Rewrite the batch script; otherwise the existing one is submitted
    pub rebuild: bool,

    pub job_name: Option<String>,

    /// Fixed node count; used only together with `tasks`
    pub nodes: Option<u32>,

    /// Fixed task count; used only together with `nodes`
    pub tasks: Option<u32>,

    /// Selects the explicit `--ntasks-per-node` header
    pub tasks_per_node: Option<u32>,

    pub exclude: Vec<String>,
    pub monitor: Option<MonitorSettings>,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            archive: ArchiveMode::None,
            fix_flags: true,
            rebuild: true,
            job_name: None,
            nodes: None,
            tasks: None,
            tasks_per_node: None,
            exclude: Vec::new(),
            monitor: None,
        }
    }
}
