//=====================================================
// File: sandbox/report.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Human and machine renderings of call histories
// Objective: Turn a trace table and terminal fault into the text block used
//            in counterexample requests, or into JSON
//=====================================================

use super::fault::SandboxError;
use super::session::TraceOutcome;
use super::tracer::{CallRecord, TraceTable};
use serde::Serialize;
use std::fmt::{self, Write as _};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TraceReport<'a> {
    pub calls: &'a TraceTable,
    pub terminal: Option<&'a SandboxError>,
}

impl<'a> TraceReport<'a> {
    pub fn new(calls: &'a TraceTable, terminal: Option<&'a SandboxError>) -> Self {
        Self { calls, terminal }
    }

    pub fn from_outcome(outcome: &'a TraceOutcome) -> Self {
        Self::new(&outcome.calls, outcome.terminal.as_ref())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// `input: {a: 1}, output: 2` or `input: {a: 1}, <fault>`
pub fn render_record(record: &CallRecord) -> String {
    let mut line = String::from("input: {");
    for (i, (name, snapshot)) in record.inputs.iter().enumerate() {
        if i > 0 {
            line.push_str(", ");
        }
        let _ = write!(line, "{}: {}", name, snapshot);
    }
    line.push('}');
    match (&record.output, &record.fault) {
        (_, Some(fault)) => {
            let _ = write!(line, ", {}", fault);
        }
        (Some(output), None) => {
            let _ = write!(line, ", output: {}", output);
        }
        (None, None) => line.push_str(", output: <unfinished>"),
    }
    line
}

impl fmt::Display for TraceReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, records) in self.calls.iter() {
            if records.is_empty() {
                continue;
            }
            writeln!(f, "function {}:", name)?;
            for record in records {
                writeln!(f, "  {}", render_record(record))?;
            }
        }
        if let Some(terminal) = self.terminal {
            writeln!(f, "terminated: {}", terminal)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{SandboxConfig, TraceSession};

    #[test]
    fn text_rendering_lists_calls_then_terminal_fault() {
        let session = TraceSession::new(SandboxConfig::default());
        let code = "fn parse(s) { return int(s) }\nfn pick(xs, i) {\n  return xs[i]\n}\nfn main(s) {\n  return pick([1, 2], parse(s))\n}";
        let outcome = session.run(code, "5").expect("session");
        let text = TraceReport::from_outcome(&outcome).to_string();
        assert!(text.contains("function parse:\n  input: {s: \"5\"}, output: 5\n"), "{text}");
        assert!(
            text.contains("  input: {xs: [1, 2], i: 5}, IndexError: list index 5 out of range for length 2 at line 3 in function 'pick'"),
            "{text}"
        );
        assert!(text.ends_with("in function 'pick'\n"), "{text}");
    }

    #[test]
    fn json_rendering_is_machine_readable() {
        let session = TraceSession::new(SandboxConfig::default());
        let outcome = session
            .run("fn twice(n) { return n * 2 }\nfn main(s) { return twice(len(s)) }", "abc")
            .expect("session");
        let json = TraceReport::from_outcome(&outcome).to_json().expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse back");
        assert_eq!(value["calls"]["twice"][0]["inputs"]["n"], serde_json::json!(3));
        assert_eq!(value["calls"]["twice"][0]["output"], serde_json::json!(6));
        assert!(value["terminal"].is_null());
    }
}

//=====================================================
// End of file
//=====================================================
