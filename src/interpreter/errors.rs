//=====================================================
// File: interpreter/errors.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Runtime exception model for sandboxed SolvraScript
// Objective: Classify script failures, attach the raise-site line and function
//            once, and carry non-local control flow through RuntimeError
//=====================================================

use super::value::Value;
use std::fmt;
use thiserror::Error;

/// Exception classes a running unit can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    NameError,
    TypeError,
    ValueError,
    IndexError,
    KeyError,
    ZeroDivisionError,
    ArgumentError,
    RecursionError,
    Panic,
    TimeoutError,
    MemoryError,
}

impl ExceptionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExceptionKind::NameError => "NameError",
            ExceptionKind::TypeError => "TypeError",
            ExceptionKind::ValueError => "ValueError",
            ExceptionKind::IndexError => "IndexError",
            ExceptionKind::KeyError => "KeyError",
            ExceptionKind::ZeroDivisionError => "ZeroDivisionError",
            ExceptionKind::ArgumentError => "ArgumentError",
            ExceptionKind::RecursionError => "RecursionError",
            ExceptionKind::Panic => "Panic",
            ExceptionKind::TimeoutError => "TimeoutError",
            ExceptionKind::MemoryError => "MemoryError",
        }
    }

    /// Fatal classes abort the unit: `try/catch` cannot intercept them.
    pub fn is_fatal(self) -> bool {
        matches!(self, ExceptionKind::TimeoutError | ExceptionKind::MemoryError)
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An exception raised by script code or a builtin. The line and function are
/// those of the deepest frame at the raise site and never change afterwards.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {detail} at line {line} in function '{function}'")]
pub struct ScriptException {
    pub kind: ExceptionKind,
    pub detail: String,
    pub line: usize,
    pub function: String,
}

impl ScriptException {
    /// `<ExceptionClass>: <detail>`
    pub fn message(&self) -> String {
        format!("{}: {}", self.kind, self.detail)
    }
}

/// Everything that unwinds the evaluator: exceptions plus loop/function exits.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Exception(#[from] ScriptException),
    #[error("Return: {0}")]
    Return(Value),
    #[error("Break statement outside loop")]
    Break,
    #[error("Continue statement outside loop")]
    Continue,
}

impl RuntimeError {
    pub fn exception(&self) -> Option<&ScriptException> {
        match self {
            RuntimeError::Exception(exception) => Some(exception),
            _ => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.exception().is_some_and(|e| e.kind.is_fatal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_and_display_formats() {
        let exception = ScriptException {
            kind: ExceptionKind::IndexError,
            detail: "list index 5 out of range".to_string(),
            line: 4,
            function: "pick".to_string(),
        };
        assert_eq!(exception.message(), "IndexError: list index 5 out of range");
        assert_eq!(
            exception.to_string(),
            "IndexError: list index 5 out of range at line 4 in function 'pick'"
        );
    }

    #[test]
    fn control_flow_and_wrapped_exceptions_display() {
        let exception = ScriptException {
            kind: ExceptionKind::KeyError,
            detail: "missing key 'x'".to_string(),
            line: 2,
            function: "main".to_string(),
        };
        let err: RuntimeError = exception.clone().into();
        assert_eq!(err.to_string(), exception.to_string());
        assert_eq!(err.exception(), Some(&exception));
        assert_eq!(RuntimeError::Break.to_string(), "Break statement outside loop");
        assert_eq!(
            RuntimeError::Return(Value::Int(3)).to_string(),
            "Return: 3"
        );
    }

    #[test]
    fn only_resource_classes_are_fatal() {
        assert!(ExceptionKind::TimeoutError.is_fatal());
        assert!(ExceptionKind::MemoryError.is_fatal());
        assert!(!ExceptionKind::RecursionError.is_fatal());
        assert!(!ExceptionKind::Panic.is_fatal());
        assert!(!RuntimeError::Break.is_fatal());
    }
}

//=====================================================
// End of file
//=====================================================
