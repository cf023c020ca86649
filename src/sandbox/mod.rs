//=====================================================
// File: sandbox/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Execution sandbox with call tracing
// Objective: Load untrusted units in memory, observe chosen functions and run
//            one entry point under time and memory bounds
//=====================================================

pub mod executor;
pub mod fault;
pub mod limits;
pub mod loader;
pub mod report;
pub mod session;
pub mod snapshot;
pub mod tracer;

pub use executor::{Execution, Executor};
pub use fault::{Fault, SandboxError};
pub use limits::{ResourceLimits, ResourceScope};
pub use loader::{LoadedUnit, function_names, load};
pub use report::TraceReport;
pub use session::{TraceOutcome, TraceSession, run_isolated};
pub use snapshot::Snapshot;
pub use tracer::{CallRecord, TraceTable, Tracer};

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_RECORD_LIMIT: usize = 3;
pub const DEFAULT_LOAD_MEMORY_LIMIT: u64 = 64 * 1024 * 1024;
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Settings shared by the loader, tracer, executor and session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Entry function invoked with the payload.
    pub entry: String,
    /// Call records kept per traced function.
    pub record_limit: usize,
    pub timeout_ms: u64,
    /// Allocation quota while the entry runs, in bytes.
    pub memory_ceiling: u64,
    /// Allocation quota while top-level statements run, in bytes.
    pub load_memory_limit: u64,
    pub max_call_depth: usize,
    /// Stack reserved for the isolated session thread, in bytes.
    pub stack_size: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            entry: "main".to_string(),
            record_limit: DEFAULT_RECORD_LIMIT,
            timeout_ms: limits::DEFAULT_TIMEOUT.as_millis() as u64,
            memory_ceiling: limits::DEFAULT_MEMORY_CEILING,
            load_memory_limit: DEFAULT_LOAD_MEMORY_LIMIT,
            max_call_depth: crate::interpreter::DEFAULT_MAX_CALL_DEPTH,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn limits(&self) -> ResourceLimits {
        ResourceLimits {
            timeout: self.timeout(),
            memory_ceiling: self.memory_ceiling,
        }
    }
}

//=====================================================
// End of file
//=====================================================
