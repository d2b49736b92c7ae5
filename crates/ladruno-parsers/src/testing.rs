//! Fake cluster executables for tests.
//!
//! Enabled in this crate's own tests and, through the `testing` feature,
//! in the dev-dependencies of the other ladruno crates.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::os::unix::fs::PermissionsExt;

/// Write an executable `#!/bin/sh` script named `name` into `dir`.
pub fn fake_command(dir: &Utf8Path, name: &str, body: &str) -> Utf8PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}
