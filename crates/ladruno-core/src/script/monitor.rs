//! Background memory monitor block.

use super::shell_quote;
use std::time::Duration;

/// Default sampling interval.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// Default monitor log, relative to the job's working directory.
pub const DEFAULT_MONITOR_LOG: &str = "memtrack_node.txt";

/// Samples node memory and per-process RSS/VSZ while the job runs.
///
/// The loop runs in a background subshell whose pid is kept in
/// `MONITOR_PID` so the body can stop it after the launcher returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMonitor {
    /// Time between samples
    pub interval: Duration,

    /// Log file the samples are appended to
    pub log_file: String,

    /// Command-line fragment identifying the processes to sample
    pub process_match: String,
}

impl MemoryMonitor {
    pub fn new(process_match: impl Into<String>) -> Self {
        Self {
            interval: DEFAULT_MONITOR_INTERVAL,
            log_file: DEFAULT_MONITOR_LOG.to_string(),
            process_match: process_match.into(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_log_file(mut self, log_file: impl Into<String>) -> Self {
        self.log_file = log_file.into();
        self
    }

    pub fn render(&self) -> String {
        let interval = self.interval.as_secs().max(1);
        let log = shell_quote(&self.log_file);
        let term = shell_quote(&self.process_match);

        format!(
            r#"# --- memory monitor (every {interval}s) ---
(
    while true; do
        printf '%s\n' "$(date '+%F %T')" >> {log}
        free -h >> {log}
        echo "-----------" >> {log}
        pgrep -af {term} | while read -r PID CMD; do
            echo "PID: $PID" >> {log}
            ps -p "$PID" -o pid,%mem,rss,vsz,cmd --no-headers >> {log}
        done
        echo "======================" >> {log}
        sleep {interval}
    done
) &
MONITOR_PID=$!
"#
        )
    }
}
