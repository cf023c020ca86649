//=====================================================
// File: sandbox/fault.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Normalized failure types for sandboxed execution
// Objective: Convert raised script exceptions into line/function/message
//            faults and classify sandbox outcomes for callers
//=====================================================

use crate::interpreter::{ExceptionKind, ScriptException};
use crate::parser::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A runtime failure normalized at its raise site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub line: usize,
    pub function: String,
    /// `<ExceptionClass>: <detail>`
    pub message: String,
}

impl Fault {
    /// Exception class prefix of the message, e.g. `IndexError`.
    pub fn class(&self) -> &str {
        self.message
            .split_once(':')
            .map(|(class, _)| class)
            .unwrap_or(&self.message)
    }
}

impl From<&ScriptException> for Fault {
    fn from(exception: &ScriptException) -> Self {
        Self {
            line: exception.line,
            function: exception.function.clone(),
            message: exception.message(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at line {} in function '{}'",
            self.message, self.line, self.function
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SandboxError {
    #[error("SyntaxError: {message} at line {line}, column {column}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },
    #[error("entry function '{name}' is missing or not callable")]
    MissingEntry { name: String },
    #[error("{fault}")]
    Timeout { fault: Fault },
    #[error("{fault}")]
    Memory { fault: Fault },
    #[error("{fault}")]
    Runtime { fault: Fault },
    #[error("sandbox failure: {message}")]
    Internal { message: String },
}

impl SandboxError {
    pub fn missing_entry(name: impl Into<String>) -> Self {
        SandboxError::MissingEntry { name: name.into() }
    }

    /// Classify a raised exception: resource classes map to their own
    /// variants, everything else is a runtime fault.
    pub fn from_exception(exception: &ScriptException) -> Self {
        let fault = Fault::from(exception);
        match exception.kind {
            ExceptionKind::TimeoutError => SandboxError::Timeout { fault },
            ExceptionKind::MemoryError => SandboxError::Memory { fault },
            _ => SandboxError::Runtime { fault },
        }
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self {
            SandboxError::Timeout { fault }
            | SandboxError::Memory { fault }
            | SandboxError::Runtime { fault } => Some(fault),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SandboxError::Timeout { .. })
    }
}

impl From<ParseError> for SandboxError {
    fn from(value: ParseError) -> Self {
        let position = value.position();
        let message = match value {
            ParseError::UnexpectedToken {
                expected, found, ..
            } => format!("expected {} but found {}", expected, found),
            ParseError::UnexpectedEndOfInput { expected, .. } => {
                format!("unexpected end of input, expected {}", expected)
            }
            ParseError::InvalidSyntax { message, .. } => message,
        };
        SandboxError::Syntax {
            message,
            line: position.line,
            column: position.column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_classification() {
        let exception = ScriptException {
            kind: ExceptionKind::TimeoutError,
            detail: "time limit exceeded after 1000 ms".to_string(),
            line: 3,
            function: "spin".to_string(),
        };
        let err = SandboxError::from_exception(&exception);
        assert!(err.is_timeout());
        let fault = err.fault().expect("fault");
        assert_eq!(fault.class(), "TimeoutError");
        assert_eq!(
            err.to_string(),
            "TimeoutError: time limit exceeded after 1000 ms at line 3 in function 'spin'"
        );
    }

    #[test]
    fn syntax_errors_keep_position() {
        let err = SandboxError::from(crate::parser::parse_source("fn main( {").expect_err("bad"));
        match err {
            SandboxError::Syntax { line, column, .. } => {
                assert_eq!(line, 1);
                assert!(column > 1);
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }
}

//=====================================================
// End of file
//=====================================================
