//=====================================================
// File: lib.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: SolvraRepair library root
// Objective: Expose the SolvraScript substrate, the tracing sandbox, the
//            self-debug controller and the repair agent
//=====================================================

pub mod agent;
pub mod ast;
pub mod config;
pub mod controller;
pub mod interpreter;
pub mod logging;
pub mod parser;
pub mod sandbox;
pub mod tokenizer;

pub use controller::{Action, ControllerConfig, Observation, SelfDebugController};
pub use sandbox::{SandboxConfig, SandboxError, TraceOutcome, TraceReport, TraceSession};

//=====================================================
// End of file
//=====================================================
