//! Batch script generation.
//!
//! A script is a resource header of `#SBATCH` directives followed by a
//! POSIX shell body. Optional blocks (memory monitor, archive epilogue)
//! are rendered from their own inputs and spliced in as opaque text.

mod epilogue;
mod monitor;

pub use epilogue::{ArchiveEpilogue, DEFAULT_STATUS_FILE};
pub use monitor::{DEFAULT_MONITOR_INTERVAL, DEFAULT_MONITOR_LOG, MemoryMonitor};

use crate::allocation::{AllocationError, AllocationPlan, NodeCapacity};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt::Write as _;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use thiserror::Error;

/// File name of the generated script inside the model directory.
pub const DEFAULT_SCRIPT_NAME: &str = "run.sh";

/// Scheduler log written next to the model.
pub const DEFAULT_OUTPUT_LOG: &str = "log.log";

/// Parallel launcher placed in front of the executable.
pub const DEFAULT_LAUNCHER: &str = "mpirun";

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("IO error writing {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid value for --{directive}: {value:?}")]
    InvalidDirective { directive: String, value: String },
}

/// Resource request written to the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceRequest {
    /// `--nodes` and `--ntasks`, leaving placement to the scheduler
    NodesAndTasks { nodes: u32, tasks: u32 },
    /// `--nodes`, `--ntasks` and `--ntasks-per-node`
    Explicit {
        nodes: u32,
        tasks: u32,
        tasks_per_node: u32,
    },
}

impl ResourceRequest {
    /// Request matching `plan`, pinned per node when `tasks_per_node` is given.
    pub fn from_plan(plan: &AllocationPlan, tasks_per_node: Option<u32>) -> Self {
        match tasks_per_node {
            Some(tpn) => Self::Explicit {
                nodes: plan.nodes,
                tasks: plan.tasks,
                tasks_per_node: tpn.max(1),
            },
            None => Self::NodesAndTasks {
                nodes: plan.nodes,
                tasks: plan.tasks,
            },
        }
    }

    /// Fail unless the nodes hold every task and a pinned per-node count
    /// fits on one node of `capacity`.
    pub fn check(&self, capacity: &NodeCapacity) -> Result<(), AllocationError> {
        let max_tpn = capacity.max_tasks_per_node.max(1);
        let (nodes, tasks, tasks_per_node) = match *self {
            Self::NodesAndTasks { nodes, tasks } => (nodes, tasks, max_tpn),
            Self::Explicit {
                nodes,
                tasks,
                tasks_per_node,
            } => {
                if tasks_per_node > max_tpn {
                    return Err(AllocationError::TooManyTasksPerNode {
                        tasks_per_node,
                        max_tasks_per_node: max_tpn,
                    });
                }
                (nodes, tasks, tasks_per_node)
            }
        };
        if u64::from(nodes) * u64::from(tasks_per_node) < u64::from(tasks) {
            return Err(AllocationError::Unsatisfiable {
                tasks,
                nodes,
                tasks_per_node,
            });
        }
        Ok(())
    }

    pub fn nodes(&self) -> u32 {
        match *self {
            Self::NodesAndTasks { nodes, .. } | Self::Explicit { nodes, .. } => nodes,
        }
    }

    pub fn tasks(&self) -> u32 {
        match *self {
            Self::NodesAndTasks { tasks, .. } | Self::Explicit { tasks, .. } => tasks,
        }
    }
}

/// Quote `s` for a POSIX shell, leaving plain words untouched.
pub fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=+,@%".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// A fully specified batch script, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchScript {
    job_name: String,
    resources: ResourceRequest,
    output_log: String,
    exclude: Vec<String>,
    library_dirs: Vec<Utf8PathBuf>,
    launcher: String,
    executable: Utf8PathBuf,
    entry_point: String,
    monitor: Option<MemoryMonitor>,
    epilogue: Option<ArchiveEpilogue>,
}

impl BatchScript {
    pub fn has_monitor(&self) -> bool {
        self.monitor.is_some()
    }

    pub fn has_epilogue(&self) -> bool {
        self.epilogue.is_some()
    }

    /// Render the script text. Identical inputs give identical bytes.
    pub fn render(&self) -> String {
        let mut script = String::with_capacity(2048);

        script.push_str("#!/bin/bash\n");
        directive(&mut script, "job-name", &self.job_name);
        directive(&mut script, "output", &self.output_log);
        match self.resources {
            ResourceRequest::NodesAndTasks { nodes, tasks } => {
                directive(&mut script, "nodes", nodes);
                directive(&mut script, "ntasks", tasks);
            }
            ResourceRequest::Explicit {
                nodes,
                tasks,
                tasks_per_node,
            } => {
                directive(&mut script, "nodes", nodes);
                directive(&mut script, "ntasks", tasks);
                directive(&mut script, "ntasks-per-node", tasks_per_node);
            }
        }
        if !self.exclude.is_empty() {
            directive(&mut script, "exclude", self.exclude.join(","));
        }

        script.push('\n');
        script.push_str("pwd; hostname; date\n");
        script.push_str("export OMP_NUM_THREADS=1\n");
        if !self.library_dirs.is_empty() {
            let dirs: Vec<&str> = self.library_dirs.iter().map(|d| d.as_str()).collect();
            let _ = writeln!(
                script,
                "export LD_LIBRARY_PATH=${{LD_LIBRARY_PATH:+$LD_LIBRARY_PATH:}}{}",
                shell_quote(&dirs.join(":"))
            );
        }
        script.push('\n');

        if let Some(monitor) = &self.monitor {
            script.push_str(&monitor.render());
            script.push('\n');
        }

        script.push_str("SECONDS=0\n");
        let _ = writeln!(
            script,
            "{} {} {}",
            self.launcher,
            shell_quote(self.executable.as_str()),
            shell_quote(&self.entry_point)
        );
        script.push_str("LAUNCH_EXIT=$?\n");
        script.push('\n');
        script.push_str("# stop monitor (if running)\n");
        script.push_str("[ -n \"$MONITOR_PID\" ] && kill \"$MONITOR_PID\" 2>/dev/null\n");
        script.push('\n');
        script.push_str("echo \"Elapsed: $SECONDS seconds.\"\n");
        script.push_str("echo \"Code finished with exit code $LAUNCH_EXIT.\"\n");
        script.push_str("EXIT_CODE=$LAUNCH_EXIT\n");

        if let Some(epilogue) = &self.epilogue {
            script.push('\n');
            script.push_str(&epilogue.render(&self.output_log));
        }

        script.push('\n');
        script.push_str("exit \"$EXIT_CODE\"\n");
        script
    }

    /// Write the script as `dir/name` with mode 0755, replacing any old copy.
    pub fn write(&self, dir: &Utf8Path, name: &str) -> Result<Utf8PathBuf, ScriptError> {
        let path = dir.join(name);
        let io_err = |source| ScriptError::Io {
            path: path.clone(),
            source,
        };

        fs::write(&path, self.render()).map_err(io_err)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).map_err(io_err)?;

        tracing::info!(
            "Wrote {} (nodes={}, ntasks={}, memory monitor={}, archive={})",
            path,
            self.resources.nodes(),
            self.resources.tasks(),
            if self.has_monitor() { "on" } else { "off" },
            if self.has_epilogue() { "on" } else { "off" },
        );
        Ok(path)
    }
}

fn directive(script: &mut String, name: &str, value: impl std::fmt::Display) {
    let _ = writeln!(script, "#SBATCH --{name}={value}");
}

/// Builder for [`BatchScript`].
#[derive(Debug, Clone)]
pub struct ScriptBuilder {
    script: BatchScript,
}

impl ScriptBuilder {
    pub fn new(
        job_name: impl Into<String>,
        resources: ResourceRequest,
        executable: impl Into<Utf8PathBuf>,
        entry_point: impl Into<String>,
    ) -> Self {
        Self {
            script: BatchScript {
                job_name: job_name.into(),
                resources,
                output_log: DEFAULT_OUTPUT_LOG.to_string(),
                exclude: Vec::new(),
                library_dirs: Vec::new(),
                launcher: DEFAULT_LAUNCHER.to_string(),
                executable: executable.into(),
                entry_point: entry_point.into(),
                monitor: None,
                epilogue: None,
            },
        }
    }

    pub fn output_log(mut self, output_log: impl Into<String>) -> Self {
        self.script.output_log = output_log.into();
        self
    }

    /// Nodes the scheduler must not place the job on.
    pub fn exclude<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script.exclude = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Append directories to `LD_LIBRARY_PATH`.
    pub fn library_dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.script.library_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    pub fn launcher(mut self, launcher: impl Into<String>) -> Self {
        self.script.launcher = launcher.into();
        self
    }

    pub fn monitor(mut self, monitor: Option<MemoryMonitor>) -> Self {
        self.script.monitor = monitor;
        self
    }

    pub fn epilogue(mut self, epilogue: Option<ArchiveEpilogue>) -> Self {
        self.script.epilogue = epilogue;
        self
    }

    /// Validate directive values and return the script.
    pub fn build(self) -> Result<BatchScript, ScriptError> {
        let script = self.script;

        check_directive("job-name", &script.job_name)?;
        check_directive("output", &script.output_log)?;
        for node in &script.exclude {
            check_directive("exclude", node)?;
        }
        if script.launcher.trim().is_empty() {
            return Err(ScriptError::InvalidDirective {
                directive: "launcher".to_string(),
                value: script.launcher,
            });
        }

        Ok(script)
    }
}

/// Directive values are single words; whitespace would end the value early
/// and a newline would inject another line into the script.
fn check_directive(directive: &str, value: &str) -> Result<(), ScriptError> {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ScriptError::InvalidDirective {
            directive: directive.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ladruno_parsers::testing::fake_command;
    use tempfile::TempDir;

    fn basic() -> ScriptBuilder {
        ScriptBuilder::new(
            "frame",
            ResourceRequest::NodesAndTasks { nodes: 1, tasks: 4 },
            "/opt/opensees/bin/openseesmp",
            "main.tcl",
        )
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("main.tcl"), "main.tcl");
        assert_eq!(shell_quote("/mnt/nfshare/lib"), "/mnt/nfshare/lib");
        assert_eq!(shell_quote("my model"), "'my model'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$HOME"), "'$HOME'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_render_minimal_script() {
        let script = basic().build().unwrap();
        let expected = "\
#!/bin/bash
#SBATCH --job-name=frame
#SBATCH --output=log.log
#SBATCH --nodes=1
#SBATCH --ntasks=4

pwd; hostname; date
export OMP_NUM_THREADS=1

SECONDS=0
mpirun /opt/opensees/bin/openseesmp main.tcl
LAUNCH_EXIT=$?

# stop monitor (if running)
[ -n \"$MONITOR_PID\" ] && kill \"$MONITOR_PID\" 2>/dev/null

echo \"Elapsed: $SECONDS seconds.\"
echo \"Code finished with exit code $LAUNCH_EXIT.\"
EXIT_CODE=$LAUNCH_EXIT

exit \"$EXIT_CODE\"
";
        assert_eq!(script.render(), expected);
        assert!(!script.render().contains("LD_LIBRARY_PATH"));
    }

    #[test]
    fn test_render_explicit_resources_and_exclude() {
        let script = ScriptBuilder::new(
            "frame",
            ResourceRequest::Explicit {
                nodes: 2,
                tasks: 40,
                tasks_per_node: 20,
            },
            "/opt/openseesmp",
            "main.tcl",
        )
        .exclude(["node07", "node11"])
        .library_dirs(["/mnt/nfshare/lib", "/opt/hdf5/lib"])
        .build()
        .unwrap()
        .render();

        assert!(script.contains("#SBATCH --nodes=2\n#SBATCH --ntasks=40\n#SBATCH --ntasks-per-node=20\n"));
        assert!(script.contains("#SBATCH --exclude=node07,node11\n"));
        assert!(script.contains(
            "export LD_LIBRARY_PATH=${LD_LIBRARY_PATH:+$LD_LIBRARY_PATH:}/mnt/nfshare/lib:/opt/hdf5/lib\n"
        ));
    }

    #[test]
    fn test_render_block_order() {
        let script = basic()
            .monitor(Some(MemoryMonitor::new("openseesmp")))
            .epilogue(Some(ArchiveEpilogue::new("/archive/project/frame")))
            .build()
            .unwrap()
            .render();

        let monitor = script.find("MONITOR_PID=$!").unwrap();
        let launch = script.find("mpirun ").unwrap();
        let stop = script.find("kill \"$MONITOR_PID\"").unwrap();
        let epilogue = script.find("STATUS_FILE=").unwrap();
        let exit = script.rfind("exit \"$EXIT_CODE\"").unwrap();
        assert!(monitor < launch && launch < stop && stop < epilogue && epilogue < exit);
    }

    #[test]
    fn test_render_is_deterministic() {
        let build = || {
            basic()
                .monitor(Some(MemoryMonitor::new("openseesmp")))
                .epilogue(Some(ArchiveEpilogue::new("/archive/frame")))
                .build()
                .unwrap()
        };
        assert_eq!(build().render(), build().render());
    }

    #[test]
    fn test_from_plan() {
        let plan = AllocationPlan {
            nodes: 2,
            tasks: 40,
            tasks_per_node: 20,
            capped: false,
        };
        assert_eq!(
            ResourceRequest::from_plan(&plan, None),
            ResourceRequest::NodesAndTasks { nodes: 2, tasks: 40 }
        );
        assert_eq!(
            ResourceRequest::from_plan(&plan, Some(24)),
            ResourceRequest::Explicit {
                nodes: 2,
                tasks: 40,
                tasks_per_node: 24
            }
        );
    }

    #[test]
    fn test_check_rejects_requests_that_cannot_hold_every_task() {
        let capacity = NodeCapacity::default();
        let plan = AllocationPlan {
            nodes: 2,
            tasks: 40,
            tasks_per_node: 20,
            capped: false,
        };
        assert!(ResourceRequest::from_plan(&plan, None).check(&capacity).is_ok());
        assert_eq!(
            ResourceRequest::from_plan(&plan, Some(8)).check(&capacity),
            Err(AllocationError::Unsatisfiable {
                tasks: 40,
                nodes: 2,
                tasks_per_node: 8
            })
        );

        let pinned = ResourceRequest::Explicit {
            nodes: 1,
            tasks: 100,
            tasks_per_node: 4,
        };
        assert!(matches!(
            pinned.check(&capacity),
            Err(AllocationError::Unsatisfiable { .. })
        ));

        let crowded = ResourceRequest::Explicit {
            nodes: 1,
            tasks: 64,
            tasks_per_node: 64,
        };
        assert_eq!(
            crowded.check(&capacity),
            Err(AllocationError::TooManyTasksPerNode {
                tasks_per_node: 64,
                max_tasks_per_node: 32
            })
        );

        let loose = ResourceRequest::NodesAndTasks { nodes: 1, tasks: 100 };
        assert!(loose.check(&capacity).is_err());
        let fits = ResourceRequest::NodesAndTasks { nodes: 4, tasks: 100 };
        assert!(fits.check(&capacity).is_ok());
    }

    #[test]
    fn test_build_rejects_bad_directives() {
        let err = ScriptBuilder::new(
            "two words",
            ResourceRequest::NodesAndTasks { nodes: 1, tasks: 1 },
            "/opt/openseesmp",
            "main.tcl",
        )
        .build()
        .unwrap_err();
        assert!(matches!(err, ScriptError::InvalidDirective { .. }));

        let err = basic().exclude(["node01\n#SBATCH --x"]).build().unwrap_err();
        assert!(matches!(err, ScriptError::InvalidDirective { .. }));
    }

    #[test]
    fn test_write_sets_executable_mode() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        let script = basic().build().unwrap();

        let path = script.write(dir, DEFAULT_SCRIPT_NAME).unwrap();
        assert_eq!(path, dir.join("run.sh"));
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(fs::read_to_string(&path).unwrap(), script.render());

        // A second write replaces the first
        let other = basic().output_log("other.log").build().unwrap();
        other.write(dir, DEFAULT_SCRIPT_NAME).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("--output=other.log"));
    }

    #[test]
    fn test_rendered_script_archives_on_success_only() {
        let temp = TempDir::new().unwrap();
        let root = Utf8Path::from_path(temp.path()).unwrap();
        let bin = root.join("bin");
        fs::create_dir_all(&bin).unwrap();
        let launcher = fake_command(
            &bin,
            "fake_mpirun",
            "echo \"$@\" > launched.txt\nexit ${FAKE_EXIT:-0}",
        );
        // Called as `rsync -a --exclude=<status> ./ <dest>/`
        fake_command(
            &bin,
            "rsync",
            "excl=${2#--exclude=}\n\
             for f in \"$3\"*; do\n\
             \x20   [ \"$(basename \"$f\")\" = \"$excl\" ] || cp -R \"$f\" \"$4\"\n\
             done",
        );
        let path = format!("{bin}:{}", std::env::var("PATH").unwrap_or_default());

        let run = |name: &str, exit_code: &str| {
            let model = root.join("runs").join(name);
            fs::create_dir_all(&model).unwrap();
            fs::write(model.join("main.tcl"), "wipe\n").unwrap();
            let dest = root.join("archive").join(name);
            basic()
                .launcher(launcher.as_str())
                .epilogue(Some(ArchiveEpilogue::new(dest.clone())))
                .build()
                .unwrap()
                .write(&model, DEFAULT_SCRIPT_NAME)
                .unwrap();
            let status = std::process::Command::new("bash")
                .arg(DEFAULT_SCRIPT_NAME)
                .current_dir(&model)
                .env("PATH", &path)
                .env("FAKE_EXIT", exit_code)
                .output()
                .unwrap()
                .status;
            (model, dest, status)
        };
        let entries = |dir: &Utf8Path| {
            let mut names: Vec<String> = fs::read_dir(dir)
                .unwrap()
                .map(|e| e.unwrap().file_name().into_string().unwrap())
                .collect();
            names.sort();
            names
        };

        let (model, dest, status) = run("ok", "0");
        assert!(status.success());
        assert_eq!(entries(&model), vec!["status.txt"]);
        assert_eq!(entries(&dest), vec!["launched.txt", "main.tcl", "run.sh"]);
        assert_eq!(
            fs::read_to_string(dest.join("launched.txt")).unwrap(),
            "/opt/opensees/bin/openseesmp main.tcl\n"
        );
        let report = fs::read_to_string(model.join("status.txt")).unwrap();
        assert!(report.contains("Exit Code: 0"));
        assert!(report.contains(&format!("Destination Path: {dest}")));

        let (model, dest, status) = run("failed", "1");
        assert_eq!(status.code(), Some(1));
        assert!(!dest.exists());
        assert_eq!(
            entries(&model),
            vec!["launched.txt", "main.tcl", "run.sh", "status.txt"]
        );
        let report = fs::read_to_string(model.join("status.txt")).unwrap();
        assert!(report.contains("Exit Code: 1"));
    }
}
