//=====================================================
// File: interpreter/budget.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Cooperative execution budget for sandboxed units
// Objective: Track the wall-clock deadline and allocation quota that the
//            evaluator checks on every tick and container allocation
//=====================================================

use std::time::{Duration, Instant};

/// How often (in ticks) the clock is actually read.
const DEADLINE_CHECK_INTERVAL: u64 = 16;

/// Fraction of the limit that must be charged since the last live
/// measurement before another one is taken.
const REMEASURE_FRACTION: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetExceeded {
    Deadline { elapsed: Duration },
    Memory { requested: u64, limit: u64 },
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionBudget {
    deadline: Option<Instant>,
    started: Option<Instant>,
    memory_limit: Option<u64>,
    /// Live bytes at the last measurement plus everything charged since.
    allocated: u64,
    charged_since_measure: u64,
    ticks: u64,
}

impl ExecutionBudget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_deadline(&mut self, duration: Duration) {
        let now = Instant::now();
        self.started = Some(now);
        self.deadline = Some(now + duration);
    }

    pub fn clear_deadline(&mut self) {
        self.deadline = None;
        self.started = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Soft allocation limit in bytes; `None` is unlimited.
    pub fn memory_limit(&self) -> Option<u64> {
        self.memory_limit
    }

    pub fn set_memory_limit(&mut self, limit: Option<u64>) {
        self.memory_limit = limit;
    }

    pub fn reset_allocations(&mut self) {
        self.allocated = 0;
        self.charged_since_measure = 0;
    }

    pub fn allocated(&self) -> u64 {
        self.allocated
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn tick(&mut self) -> Result<(), BudgetExceeded> {
        self.ticks = self.ticks.wrapping_add(1);
        if self.ticks % DEADLINE_CHECK_INTERVAL != 0 {
            return Ok(());
        }
        self.check_deadline()
    }

    pub fn check_deadline(&self) -> Result<(), BudgetExceeded> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(BudgetExceeded::Deadline {
                elapsed: self.started.map(|s| s.elapsed()).unwrap_or_default(),
            }),
            _ => Ok(()),
        }
    }

    /// True when charging `bytes` would break the limit but enough has been
    /// charged since the last measurement that dropped values may have
    /// freed room. The caller then measures live memory and calls `settle`.
    pub fn should_measure(&self, bytes: u64) -> bool {
        match self.memory_limit {
            Some(limit) => {
                self.allocated.saturating_add(bytes) > limit
                    && self.charged_since_measure >= (limit / REMEASURE_FRACTION).max(1)
            }
            None => false,
        }
    }

    /// Replace the running estimate with a measured live size.
    pub fn settle(&mut self, live: u64) {
        self.allocated = live;
        self.charged_since_measure = 0;
    }

    /// Charge an allocation before it happens so oversized requests never
    /// reach the allocator.
    pub fn charge(&mut self, bytes: u64) -> Result<(), BudgetExceeded> {
        let requested = self.allocated.saturating_add(bytes);
        if let Some(limit) = self.memory_limit {
            if requested > limit {
                return Err(BudgetExceeded::Memory { requested, limit });
            }
        }
        self.allocated = requested;
        self.charged_since_measure = self.charged_since_measure.saturating_add(bytes);
        Ok(())
    }
}


//=====================================================
// End of file
//=====================================================
