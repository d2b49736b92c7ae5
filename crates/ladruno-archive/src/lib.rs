pub mod archiver;
pub mod manifest;
pub mod types;

pub use archiver::{ArchiveError, Archiver, move_directory};
pub use manifest::{DEFAULT_MANIFEST_NAME, Manifest, ManifestError};
pub use types::{ArchiveRecord, ArchiveRoots, OutsideSourceRoot};
