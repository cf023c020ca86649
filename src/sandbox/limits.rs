//=====================================================
// File: sandbox/limits.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Scoped resource limits for one sandboxed call
// Objective: Arm the deadline and raise the unit's memory quota for the
//            duration of a guard, restoring both on every exit path
//=====================================================

use crate::interpreter::Interpreter;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tracing::trace;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_MEMORY_CEILING: u64 = 4 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub timeout: Duration,
    pub memory_ceiling: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            memory_ceiling: DEFAULT_MEMORY_CEILING,
        }
    }
}

/// Holds the interpreter while limits are armed. Dropping the scope, whether
/// by return, `?` or unwinding, puts the prior soft limit back and disarms
/// the deadline.
pub struct ResourceScope<'a> {
    interpreter: &'a mut Interpreter,
    prior_limit: Option<u64>,
}

impl<'a> ResourceScope<'a> {
    pub fn acquire(interpreter: &'a mut Interpreter, limits: &ResourceLimits) -> Self {
        let budget = interpreter.budget_mut();
        let prior_limit = budget.memory_limit();
        budget.set_memory_limit(Some(limits.memory_ceiling));
        budget.reset_allocations();
        budget.set_deadline(limits.timeout);
        trace!(
            timeout_ms = limits.timeout.as_millis() as u64,
            ceiling = limits.memory_ceiling,
            ?prior_limit,
            "resource scope acquired"
        );
        Self {
            interpreter,
            prior_limit,
        }
    }

    pub fn prior_limit(&self) -> Option<u64> {
        self.prior_limit
    }
}

impl Deref for ResourceScope<'_> {
    type Target = Interpreter;

    fn deref(&self) -> &Self::Target {
        self.interpreter
    }
}

impl DerefMut for ResourceScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.interpreter
    }
}

impl Drop for ResourceScope<'_> {
    fn drop(&mut self) {
        let budget = self.interpreter.budget_mut();
        budget.clear_deadline();
        budget.set_memory_limit(self.prior_limit);
        trace!(restored = ?self.prior_limit, "resource scope released");
    }
}


//=====================================================
// End of file
//=====================================================
