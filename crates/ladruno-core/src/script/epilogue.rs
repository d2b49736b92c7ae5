//! In-script archive epilogue.
//!
//! Runs on the compute node after the launcher returns, so archival does
//! not depend on the submitting process still being alive.

use super::shell_quote;
use camino::Utf8PathBuf;

/// Status file left behind in the emptied model directory.
pub const DEFAULT_STATUS_FILE: &str = "status.txt";

/// Records a status file and, on success, mirrors the directory to
/// `destination` and empties the original (keeping the status file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEpilogue {
    /// Absolute destination directory for this model
    pub destination: Utf8PathBuf,

    /// Status file name
    pub status_file: String,

    /// When set, finding this string in the job log forces exit code 0
    pub success_marker: Option<String>,
}

impl ArchiveEpilogue {
    pub fn new(destination: impl Into<Utf8PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            status_file: DEFAULT_STATUS_FILE.to_string(),
            success_marker: None,
        }
    }

    pub fn with_status_file(mut self, status_file: impl Into<String>) -> Self {
        self.status_file = status_file.into();
        self
    }

    pub fn with_success_marker(mut self, marker: Option<String>) -> Self {
        self.success_marker = marker;
        self
    }

    /// Render the epilogue; `output_log` is the scheduler log searched
    /// for the success marker.
    pub fn render(&self, output_log: &str) -> String {
        let mut block = String::with_capacity(1536);

        block.push_str("# --- archive on success ---\n");
        block.push_str("DURATION=$SECONDS\n");

        if let Some(marker) = &self.success_marker {
            block.push_str(&format!(
                "if grep -qF {} {} 2>/dev/null; then\n    EXIT_CODE=0\nfi\n",
                shell_quote(marker),
                shell_quote(output_log)
            ));
        }

        block.push_str(&format!(
            r#"
ORIG_PATH=$(pwd)
DEST_PATH={dest}
STATUS_FILE={status}
{{
    echo "Execution Date: $(date)"
    echo "Executed By: $(whoami)"
    echo "Duration: $DURATION seconds"
    echo "Exit Code: $EXIT_CODE"
    echo "Original Path: $ORIG_PATH"
    echo "Destination Path: $DEST_PATH"
}} > "$STATUS_FILE"

if [ "$EXIT_CODE" -eq 0 ]; then
    echo "Copying to destination: $DEST_PATH"
    mkdir -p "$DEST_PATH"
    if rsync -a --exclude="$STATUS_FILE" ./ "$DEST_PATH/"; then
        echo "Copy complete, cleaning original folder (except $STATUS_FILE)"
        find . -mindepth 1 -maxdepth 1 ! -name "$STATUS_FILE" -exec rm -rf {{}} +
        echo "Cleanup complete."
    else
        echo "Copy failed, nothing removed."
    fi
else
    echo "Run failed, nothing copied or removed."
fi
"#,
            dest = shell_quote(self.destination.as_str()),
            status = shell_quote(&self.status_file),
        ));

        block
    }
}
