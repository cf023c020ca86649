//=====================================================
// File: sandbox/session.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: One traced execution of a candidate against one input
// Objective: Compose loader, tracer and executor on an isolated large-stack
//            thread and hand back owned traces plus the terminal fault
//=====================================================

use super::executor::Executor;
use super::fault::SandboxError;
use super::loader;
use super::tracer::{TraceTable, Tracer};
use super::SandboxConfig;
use serde::Serialize;
use std::any::Any;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceOutcome {
    pub calls: TraceTable,
    /// Timeout, memory or runtime failure of the entry call.
    pub terminal: Option<SandboxError>,
    #[serde(serialize_with = "as_millis")]
    pub elapsed: Duration,
}

fn as_millis<S: serde::Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(elapsed.as_millis() as u64)
}

#[derive(Debug, Clone)]
pub struct TraceSession {
    config: SandboxConfig,
}

impl TraceSession {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Trace every top-level function of `code` while running its entry.
    pub fn run(&self, code: &str, input: &str) -> Result<TraceOutcome, SandboxError> {
        self.execute(code, input, None)
    }

    /// Trace only `names` while running the entry.
    pub fn run_with(
        &self,
        code: &str,
        input: &str,
        names: &[String],
    ) -> Result<TraceOutcome, SandboxError> {
        self.execute(code, input, Some(names))
    }

    fn execute(
        &self,
        code: &str,
        input: &str,
        names: Option<&[String]>,
    ) -> Result<TraceOutcome, SandboxError> {
        let config = &self.config;
        run_isolated(config.stack_size, move || -> Result<TraceOutcome, SandboxError> {
            let started = Instant::now();
            let mut unit = loader::load(code, config)?;

            let tracer = Tracer::new(config.record_limit);
            let targets = match names {
                Some(names) => names.to_vec(),
                None => unit.function_names().to_vec(),
            };
            tracer.install(&mut unit, &targets);

            let executor = Executor::new(config.limits());
            let terminal = match executor.run(&mut unit, &config.entry, input) {
                Ok(_) => None,
                Err(err @ SandboxError::MissingEntry { .. }) => return Err(err),
                Err(err) => Some(err),
            };
            drop(unit);

            let calls = tracer.finish();
            let elapsed = started.elapsed();
            info!(
                traced = calls.len(),
                records = calls.total_records(),
                failed = terminal.is_some(),
                elapsed_ms = elapsed.as_millis() as u64,
                "trace session finished"
            );
            Ok(TraceOutcome {
                calls,
                terminal,
                elapsed,
            })
        })?
    }
}

/// Run `job` on a dedicated thread with `stack_size` bytes of stack. Units
/// are built and dropped on that thread; only owned results cross back.
pub fn run_isolated<T, F>(stack_size: usize, job: F) -> Result<T, SandboxError>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name("solvra-sandbox".to_string())
            .stack_size(stack_size)
            .spawn_scoped(scope, job)
            .map_err(|err| SandboxError::Internal {
                message: format!("failed to spawn sandbox thread: {}", err),
            })?;
        handle.join().map_err(|payload| {
            let message = panic_message(payload.as_ref());
            debug!(%message, "sandbox thread panicked");
            SandboxError::Internal { message }
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "sandbox thread panicked".to_string()
    }
}


//=====================================================
// End of file
//=====================================================
