//=====================================================
// File: sandbox/loader.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: In-memory module loader for candidate units
// Objective: Parse raw source, list its top-level functions and bind its
//            globals under a load-time budget without touching disk
//=====================================================

use super::{SandboxConfig, SandboxError};
use crate::ast::Program;
use crate::interpreter::{Callable, Interpreter, Value};
use crate::parser::parse_source;
use tracing::{debug, warn};

/// An executable unit: the parsed program plus an interpreter whose global
/// table holds the unit's functions and data.
pub struct LoadedUnit {
    function_names: Vec<String>,
    interpreter: Interpreter,
}

impl LoadedUnit {
    /// Top-level `fn` names in source order, without repeats.
    pub fn function_names(&self) -> &[String] {
        &self.function_names
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn interpreter_mut(&mut self) -> &mut Interpreter {
        &mut self.interpreter
    }

    /// The callable bound to `name`, if that global is a function.
    pub fn callable(&self, name: &str) -> Option<Callable> {
        match self.interpreter.global(name) {
            Some(Value::Function(callable)) => Some(callable),
            _ => None,
        }
    }
}

pub fn parse(source: &str) -> Result<Program, SandboxError> {
    parse_source(source).map_err(|err| {
        debug!(error = %err, "candidate failed to parse");
        SandboxError::from(err)
    })
}

/// Names of top-level functions from a static parse; nothing is executed.
pub fn function_names(source: &str) -> Result<Vec<String>, SandboxError> {
    Ok(parse(source)?.function_names())
}

pub fn load(source: &str, config: &SandboxConfig) -> Result<LoadedUnit, SandboxError> {
    let program = parse(source)?;
    instantiate(&program, config)
}

/// Bind a parsed program into a fresh unit. Each call yields independent
/// globals, so one program can back many isolated executions.
pub fn instantiate(program: &Program, config: &SandboxConfig) -> Result<LoadedUnit, SandboxError> {
    let mut interpreter = Interpreter::new();
    interpreter.set_max_call_depth(config.max_call_depth);

    let budget = interpreter.budget_mut();
    budget.set_memory_limit(Some(config.load_memory_limit));
    budget.set_deadline(config.timeout());

    let result = interpreter.execute_program(program);
    interpreter.budget_mut().clear_deadline();

    if let Err(err) = result {
        return Err(match err.exception() {
            Some(exception) => {
                warn!(fault = %exception, "top-level statements failed");
                SandboxError::from_exception(exception)
            }
            None => SandboxError::Internal {
                message: format!("unexpected control flow at top level: {}", err),
            },
        });
    }

    let function_names = program.function_names();
    debug!(functions = ?function_names, "unit loaded");
    Ok(LoadedUnit {
        function_names,
        interpreter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_functions_in_source_order() {
        let names = function_names("fn b() {}\nlet x = 1\nfn a() {}\nfn b() {}").expect("parse");
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn syntax_faults_are_distinct() {
        let err = load("fn main(s) {\n  return s +\n", &SandboxConfig::default())
            .err()
            .expect("syntax error");
        assert!(matches!(err, SandboxError::Syntax { .. }));
    }

    #[test]
    fn top_level_runtime_fault_is_reported() {
        let err = load("let table = [1, 2]\nlet x = table[7]", &SandboxConfig::default())
            .err()
            .expect("load fault");
        let fault = err.fault().expect("runtime fault");
        assert!(fault.message.starts_with("IndexError"));
        assert_eq!(fault.function, "<module>");
        assert_eq!(fault.line, 2);
    }

    #[test]
    fn top_level_loop_hits_load_timeout() {
        let config = SandboxConfig {
            timeout_ms: 50,
            ..SandboxConfig::default()
        };
        let err = load("while true {}", &config).err().expect("timeout");
        assert!(err.is_timeout());
    }

    #[test]
    fn unit_keeps_load_limit_as_soft_limit() {
        let config = SandboxConfig::default();
        let unit = load("fn main(s) { return s }", &config).expect("load");
        assert_eq!(unit.interpreter().budget().memory_limit(), Some(config.load_memory_limit));
        assert!(unit.callable("main").is_some());
        assert!(unit.callable("missing").is_none());
    }
}

//=====================================================
// End of file
//=====================================================
