//! Shared helpers for running cluster commands and reading their output.
//!
//! Used by ladruno-slurm, ladruno-h5 and ladruno-archive so that every
//! external tool is invoked and reported the same way.

pub mod command;
pub mod time;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use command::{CommandError, CommandOutput, run_command, run_command_status};
pub use time::{format_duration, format_manifest_timestamp, parse_manifest_timestamp};

/// Return the last whitespace-delimited token of a command's output.
///
/// `sbatch` prints `Submitted batch job 12345`; wrappers sometimes add a
/// cluster name or a trailing newline, so only the final token is trusted.
pub fn last_token(s: &str) -> Option<&str> {
    s.split_whitespace().next_back()
}

/// Trim an optional flag value, treating a blank one as absent.
pub fn non_empty_string(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_token() {
        assert_eq!(last_token("Submitted batch job 12345\n"), Some("12345"));
        assert_eq!(last_token("12345"), Some("12345"));
        assert_eq!(last_token("  \n"), None);
        assert_eq!(last_token(""), None);
    }

    #[test]
    fn test_non_empty_string() {
        assert_eq!(non_empty_string("hello"), Some("hello".to_string()));
        assert_eq!(non_empty_string("  hello  "), Some("hello".to_string()));
        assert_eq!(non_empty_string(""), None);
        assert_eq!(non_empty_string(" \n"), None);
    }
}
