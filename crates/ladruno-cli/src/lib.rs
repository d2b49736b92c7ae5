//! CLI argument parsing for ladruno.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};
use ladruno_core::{
    DEFAULT_ENTRY_POINT, DEFAULT_LAUNCHER, DEFAULT_MONITOR_LOG, DEFAULT_OUTPUT_LOG,
    DEFAULT_SCRIPT_NAME, DEFAULT_STATUS_FILE, MPCO_CDATA_PATTERN, MPCO_PATTERN, NodeCapacity,
};
use ladruno_h5::{DEFAULT_REPAIR_PATTERN, FlagClearer};
use ladruno_parsers::non_empty_string;
use ladruno_runner::{
    ArchiveMode, ArchiveSettings, MonitorSettings, RunConfig, SubmitOptions,
};
use ladruno_slurm::SlurmCommands;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "ladruno")]
#[command(about = "Size, submit and archive OpenSees models on SLURM")]
#[command(version, propagate_version = true)]
pub struct Args {
    /// Log progress and print repair reports
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Batch submission command
    #[arg(long, global = true, default_value = "sbatch")]
    pub sbatch: String,

    /// Queue status command
    #[arg(long, global = true, default_value = "squeue")]
    pub squeue: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show required tasks and the node allocation for each model
    Plan {
        /// Model directory, or a tree of model directories
        #[arg(default_value = ".")]
        dir: Utf8PathBuf,

        #[command(flatten)]
        sizing: SizingArgs,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Write the batch script without submitting it
    Script {
        #[arg(default_value = ".")]
        dir: Utf8PathBuf,

        #[command(flatten)]
        sizing: SizingArgs,

        #[command(flatten)]
        script: ScriptArgs,

        #[command(flatten)]
        archive: ArchiveArgs,
    },
    /// Write and submit the batch script of every model
    Submit {
        #[arg(default_value = ".")]
        dir: Utf8PathBuf,

        #[command(flatten)]
        sizing: SizingArgs,

        #[command(flatten)]
        script: ScriptArgs,

        #[command(flatten)]
        archive: ArchiveArgs,

        /// Submit the existing script instead of writing a new one
        #[arg(long)]
        no_rebuild: bool,

        /// Skip clearing HDF5 write flags before an external archive
        #[arg(long)]
        no_fix: bool,
    },
    /// Block until a job leaves the queue
    Wait {
        job_id: u64,

        /// Seconds between queue queries
        #[arg(long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..))]
        poll_interval: u64,
    },
    /// Find and clear stale HDF5 open-for-write flags
    Repair {
        #[arg(default_value = ".")]
        dir: Utf8PathBuf,

        /// Glob of files to check, relative to the directory
        #[arg(long, default_value = DEFAULT_REPAIR_PATTERN)]
        pattern: String,

        #[command(flatten)]
        clearer: ClearerArgs,
    },
    /// Wait for a job, repair its files and move its directory
    Archive {
        dir: Utf8PathBuf,

        job_id: u64,

        #[command(flatten)]
        archive: ArchiveArgs,

        /// Skip clearing HDF5 write flags
        #[arg(long)]
        no_fix: bool,
    },
    /// List the moves recorded in an archive tree's manifest
    History {
        /// Archive destination root holding archive_moves.log
        dest_root: Utf8PathBuf,

        /// Only the move made after this job ended
        #[arg(long)]
        job: Option<u64>,
    },
}

/// Naming convention of partition result files.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionFormat {
    /// `*.part-N.mpco`
    Mpco,
    /// `*.part-N.mpco.cdata`
    Cdata,
}

impl PartitionFormat {
    pub fn pattern(self) -> &'static str {
        match self {
            Self::Mpco => MPCO_PATTERN,
            Self::Cdata => MPCO_CDATA_PATTERN,
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct SizingArgs {
    /// Requested nodes (a lower bound)
    #[arg(long, default_value = "1")]
    pub nodes: u32,

    #[arg(long, default_value = "18")]
    pub max_nodes: u32,

    #[arg(long, default_value = "32")]
    pub max_tasks_per_node: u32,

    /// Input file that marks a model directory
    #[arg(long, default_value = DEFAULT_ENTRY_POINT)]
    pub entry_point: String,

    #[arg(long, value_enum, default_value = "mpco")]
    pub partitions: PartitionFormat,

    /// Custom partition regex with one capture group for the index
    #[arg(long)]
    pub partition_regex: Option<String>,
}

impl SizingArgs {
    pub fn capacity(&self) -> NodeCapacity {
        NodeCapacity::new(self.nodes, self.max_nodes, self.max_tasks_per_node)
    }

    pub fn partition_pattern(&self) -> &str {
        self.partition_regex
            .as_deref()
            .unwrap_or(self.partitions.pattern())
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct ScriptArgs {
    /// OpenSees executable to launch
    #[arg(long)]
    pub exe: Utf8PathBuf,

    /// Job name (default: model directory name)
    #[arg(long)]
    pub job_name: Option<String>,

    /// Fixed node count; needs --ntasks, bypasses partition sizing
    #[arg(long, requires = "ntasks")]
    pub fixed_nodes: Option<u32>,

    /// Fixed task count; needs --fixed-nodes
    #[arg(long, requires = "fixed_nodes")]
    pub ntasks: Option<u32>,

    /// Write an explicit --ntasks-per-node directive
    #[arg(long)]
    pub ntasks_per_node: Option<u32>,

    /// Nodes to exclude (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Append directories to LD_LIBRARY_PATH
    #[arg(long = "library-dir")]
    pub library_dirs: Vec<Utf8PathBuf>,

    #[arg(long, default_value = DEFAULT_LAUNCHER)]
    pub launcher: String,

    /// Scheduler log file
    #[arg(long, default_value = DEFAULT_OUTPUT_LOG)]
    pub output_log: String,

    #[arg(long, default_value = DEFAULT_SCRIPT_NAME)]
    pub script_name: String,

    /// Track node and process memory in the background
    #[arg(long)]
    pub monitor: bool,

    /// Seconds between memory samples
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..))]
    pub monitor_interval: u64,

    #[arg(long, default_value = DEFAULT_MONITOR_LOG)]
    pub monitor_log: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveModeArg {
    #[default]
    None,
    /// Wait here, repair flags, then move the directory
    External,
    /// Copy results from inside the batch script
    InScript,
}

impl From<ArchiveModeArg> for ArchiveMode {
    fn from(mode: ArchiveModeArg) -> Self {
        match mode {
            ArchiveModeArg::None => Self::None,
            ArchiveModeArg::External => Self::External,
            ArchiveModeArg::InScript => Self::InScript,
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct ClearerArgs {
    /// Flag clearing command, called as `<cmd> -s -i <file>`
    #[arg(long, default_value = "h5clear")]
    pub h5clear: String,
}

impl ClearerArgs {
    pub fn clearer(&self) -> FlagClearer {
        FlagClearer::new(
            self.h5clear.clone(),
            vec!["-s".to_string(), "-i".to_string()],
        )
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct ArchiveArgs {
    #[arg(long, value_enum, default_value = "none")]
    pub archive: ArchiveModeArg,

    /// Root the model paths are taken relative to
    #[arg(long, requires = "dest_root")]
    pub source_root: Option<Utf8PathBuf>,

    /// Root the archived directories are recreated under
    #[arg(long, requires = "source_root")]
    pub dest_root: Option<Utf8PathBuf>,

    /// Seconds between queue queries while waiting
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: u64,

    /// Do not append to archive_moves.log
    #[arg(long)]
    pub no_manifest: bool,

    /// Glob of result files to repair before moving
    #[arg(long, default_value = DEFAULT_REPAIR_PATTERN)]
    pub repair_pattern: String,

    #[command(flatten)]
    pub clearer: ClearerArgs,

    /// Treat the run as successful when the log contains this text
    #[arg(long)]
    pub success_marker: Option<String>,

    #[arg(long, default_value = DEFAULT_STATUS_FILE)]
    pub status_file: String,
}

impl ArchiveArgs {
    /// Settings when both roots are given.
    pub fn settings(&self) -> Option<ArchiveSettings> {
        let (source, dest) = (self.source_root.as_ref()?, self.dest_root.as_ref()?);
        let mut settings = ArchiveSettings::new(source, dest);
        settings.poll_interval = Duration::from_secs(self.poll_interval);
        settings.keep_manifest = !self.no_manifest;
        settings.repair_pattern = self.repair_pattern.clone();
        settings.clearer = self.clearer.clearer();
        settings.status_file = self.status_file.clone();
        settings.success_marker = self.success_marker.as_deref().and_then(non_empty_string);
        Some(settings)
    }
}

impl Args {
    pub fn slurm(&self) -> SlurmCommands {
        SlurmCommands {
            submit: self.sbatch.clone(),
            queue: self.squeue.clone(),
        }
    }

    /// Run configuration shared by every model of a script/submit command.
    pub fn run_config(
        &self,
        sizing: &SizingArgs,
        script: &ScriptArgs,
        archive: &ArchiveArgs,
    ) -> RunConfig {
        let mut config = RunConfig::new(script.exe.clone());
        config.capacity = sizing.capacity();
        config.entry_point = sizing.entry_point.clone();
        config.partition_pattern = sizing.partition_pattern().to_string();
        config.output_log = script.output_log.clone();
        config.script_name = script.script_name.clone();
        config.launcher = script.launcher.clone();
        config.library_dirs = script.library_dirs.clone();
        config.slurm = self.slurm();
        config.archive = archive.settings();
        config
    }
}

/// Submission switches from the script and archive flags.
pub fn submit_options(
    script: &ScriptArgs,
    archive: &ArchiveArgs,
    rebuild: bool,
    fix_flags: bool,
) -> SubmitOptions {
    SubmitOptions {
        archive: archive.archive.into(),
        fix_flags,
        rebuild,
        job_name: script.job_name.as_deref().and_then(non_empty_string),
        nodes: script.fixed_nodes,
        tasks: script.ntasks,
        tasks_per_node: script.ntasks_per_node,
        exclude: script.exclude.clone(),
        monitor: script.monitor.then(|| MonitorSettings {
            interval: Duration::from_secs(script.monitor_interval),
            log_file: script.monitor_log.clone(),
        }),
    }
}
