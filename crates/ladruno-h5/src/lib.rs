//! HDF5 result-file integrity checks for ladruno.
//!
//! A writer killed before closing its file leaves the superblock's
//! write-access flag set, and every later open fails with "file is
//! already open for write". This crate finds such files and clears the
//! flag with `h5clear`.

pub mod probe;
pub mod repair;
pub mod types;

pub use probe::{IntegrityProbe, SuperblockProbe};
pub use repair::{ClearFailure, DEFAULT_REPAIR_PATTERN, FlagClearer, RepairError, RepairTool};
pub use types::{RepairReport, RepairStatus};
