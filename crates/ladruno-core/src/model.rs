//! Model directories and their discovery.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Input file every model directory must contain.
pub const DEFAULT_ENTRY_POINT: &str = "main.tcl";

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Model directory not found: {0}")]
    NotFound(Utf8PathBuf),
    #[error("{entry_point} not found in: {path}")]
    MissingEntryPoint {
        path: Utf8PathBuf,
        entry_point: String,
    },
    #[error("No {entry_point} found under: {root}")]
    NoModels {
        root: Utf8PathBuf,
        entry_point: String,
    },
}

/// A simulation directory that contains the entry-point input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDir {
    path: Utf8PathBuf,
    entry_point: String,
}

impl ModelDir {
    /// Resolve `path` and check that it contains `entry_point`.
    pub fn open(path: &Utf8Path, entry_point: &str) -> Result<Self, ModelError> {
        let path = path
            .canonicalize_utf8()
            .map_err(|_| ModelError::NotFound(path.to_owned()))?;

        if !path.join(entry_point).is_file() {
            return Err(ModelError::MissingEntryPoint {
                path,
                entry_point: entry_point.to_string(),
            });
        }

        Ok(Self {
            path,
            entry_point: entry_point.to_string(),
        })
    }

    /// Absolute, canonical directory path.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Last path component, used as the default job name.
    pub fn name(&self) -> &str {
        self.path.file_name().unwrap_or(self.path.as_str())
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}

/// Find the model directories under `root`.
///
/// If `root` itself holds the entry point it is the only model. Otherwise
/// every directory below it holding the entry point is returned, sorted
/// by path.
pub fn discover_models(root: &Utf8Path, entry_point: &str) -> Result<Vec<ModelDir>, ModelError> {
    let root = root
        .canonicalize_utf8()
        .map_err(|_| ModelError::NotFound(root.to_owned()))?;

    if root.join(entry_point).is_file() {
        return Ok(vec![ModelDir::open(&root, entry_point)?]);
    }

    let mut models = Vec::new();

    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {}", root, e);
                continue;
            }
        };

        if !entry.file_type().is_file() || entry.file_name() != entry_point {
            continue;
        }

        let Some(dir) = entry.path().parent() else {
            continue;
        };
        let dir = match Utf8Path::from_path(dir) {
            Some(d) => d,
            None => {
                tracing::warn!("Skipping non UTF-8 model path: {}", dir.display());
                continue;
            }
        };

        models.push(ModelDir::open(dir, entry_point)?);
    }

    models.sort_by(|a, b| a.path.cmp(&b.path));

    if models.is_empty() {
        return Err(ModelError::NoModels {
            root,
            entry_point: entry_point.to_string(),
        });
    }

    tracing::info!("Found {} model(s) under {}", models.len(), root);
    Ok(models)
}
