//=====================================================
// File: sandbox/executor.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Resource-bounded invocation of a unit's entry point
// Objective: Run the entry with one payload under scoped limits, redirect
//            output to the in-memory sink and normalize every failure
//=====================================================

use super::fault::SandboxError;
use super::limits::{ResourceLimits, ResourceScope};
use super::loader::LoadedUnit;
use crate::interpreter::{CallArgs, OutputMode, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Result of a completed entry call.
#[derive(Debug, Clone)]
pub struct Execution {
    pub value: Value,
    /// Captured output; `None` when output was suppressed.
    pub stdout: Option<String>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct Executor {
    limits: ResourceLimits,
    output: OutputMode,
}

impl Executor {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            output: OutputMode::Suppress,
        }
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub fn run(
        &self,
        unit: &mut LoadedUnit,
        entry: &str,
        payload: &str,
    ) -> Result<Execution, SandboxError> {
        let Some(callee) = unit.callable(entry) else {
            debug!(entry, "entry missing or not callable");
            return Err(SandboxError::missing_entry(entry));
        };

        // A zero-parameter entry reads its payload through input() only.
        let args = if callee.param_names().is_empty() {
            CallArgs::default()
        } else {
            CallArgs::positional(vec![Value::String(payload.to_string())])
        };

        let started = Instant::now();
        let mut scope = ResourceScope::acquire(unit.interpreter_mut(), &self.limits);
        scope.set_output_mode(self.output);
        scope.set_input(payload);

        let result = scope.call_value(&Value::Function(callee), args);
        let stdout = match self.output {
            OutputMode::Capture => Some(scope.take_output()),
            OutputMode::Suppress => None,
        };
        drop(scope);
        let elapsed = started.elapsed();

        match result {
            Ok(value) => {
                debug!(entry, elapsed_ms = elapsed.as_millis() as u64, "entry returned");
                Ok(Execution {
                    value,
                    stdout,
                    elapsed,
                })
            }
            Err(err) => match err.exception() {
                Some(exception) => {
                    let error = SandboxError::from_exception(exception);
                    info!(entry, fault = %error, "entry failed");
                    Err(error)
                }
                None => Err(SandboxError::Internal {
                    message: format!("entry escaped with control flow: {}", err),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{SandboxConfig, load};

    fn unit(source: &str) -> LoadedUnit {
        load(source, &SandboxConfig::default()).expect("load")
    }

    #[test]
    fn missing_entry_is_reported_before_running() {
        let mut unit = unit("let main = 3");
        let err = Executor::new(ResourceLimits::default())
            .run(&mut unit, "main", "")
            .expect_err("not callable");
        assert_eq!(err, SandboxError::missing_entry("main"));
        assert!(unit.interpreter().budget().deadline().is_none());
    }

    #[test]
    fn captures_output_when_asked() {
        let mut unit = unit("fn main(s) { println(\"got\", s)\n return len(s) }");
        let execution = Executor::new(ResourceLimits::default())
            .with_output(OutputMode::Capture)
            .run(&mut unit, "main", "abc")
            .expect("run");
        assert_eq!(execution.value, Value::Int(3));
        assert_eq!(execution.stdout.as_deref(), Some("got abc\n"));
    }

    #[test]
    fn zero_parameter_entry_reads_input() {
        let mut unit = unit("fn main() { let a = int(input())\n let b = int(input())\n return a + b }");
        let execution = Executor::new(ResourceLimits::default())
            .run(&mut unit, "main", "2\n40\n")
            .expect("run");
        assert_eq!(execution.value, Value::Int(42));
        assert!(execution.stdout.is_none());
    }

    #[test]
    fn memory_ceiling_maps_to_memory_error() {
        let mut unit = unit("fn main(s) { let xs = range(100000)\n return len(xs) }");
        let limits = ResourceLimits {
            memory_ceiling: 4096,
            ..ResourceLimits::default()
        };
        let err = Executor::new(limits)
            .run(&mut unit, "main", "")
            .expect_err("too much memory");
        assert!(matches!(err, SandboxError::Memory { .. }));
        assert_eq!(
            unit.interpreter().budget().memory_limit(),
            Some(SandboxConfig::default().load_memory_limit)
        );
    }
}

//=====================================================
// End of file
//=====================================================
