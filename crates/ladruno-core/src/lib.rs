//! Model directories, partition discovery, node sizing and batch scripts.
//!
//! Everything here is local and synchronous; talking to the scheduler
//! lives in ladruno-slurm.

pub mod allocation;
pub mod model;
pub mod partitions;
pub mod script;

pub use allocation::{AllocationError, AllocationPlan, NodeCapacity, plan_allocation};
pub use model::{DEFAULT_ENTRY_POINT, ModelDir, ModelError, discover_models};
pub use partitions::{
    MPCO_CDATA_PATTERN, MPCO_PATTERN, PartitionError, PartitionIndex, PartitionScanner,
};
pub use script::{
    ArchiveEpilogue, BatchScript, DEFAULT_LAUNCHER, DEFAULT_MONITOR_INTERVAL, DEFAULT_MONITOR_LOG,
    DEFAULT_OUTPUT_LOG, DEFAULT_SCRIPT_NAME, DEFAULT_STATUS_FILE, MemoryMonitor, ResourceRequest,
    ScriptBuilder, ScriptError, shell_quote,
};
