//=====================================================
// File: agent/evaluator.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Score candidate programs against test cases
// Objective: Run every candidate on every test inside the sandbox, compare
//            captured output and remember the strongest candidate
//=====================================================

use super::backend::TestCase;
use crate::interpreter::{OutputMode, Value};
use crate::sandbox::{self, Executor, SandboxConfig, SandboxError, run_isolated};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Outcome of one evaluation round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassCount {
    /// Index of the best candidate; `None` when nothing was scored.
    pub best: Option<usize>,
    /// Test indices the best candidate passed.
    pub passed: Vec<usize>,
    pub failed: Vec<usize>,
    pub attempts: u64,
    pub exhausted: bool,
}

impl PassCount {
    pub fn all_passed(&self, total: usize) -> bool {
        self.best.is_some() && self.passed.len() == total
    }
}

#[derive(Debug, Clone)]
pub struct Evaluator {
    config: SandboxConfig,
}

impl Evaluator {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(
        &self,
        candidates: &[String],
        tests: &[TestCase],
        max_attempts: u64,
        max_time: Duration,
    ) -> Result<PassCount, SandboxError> {
        let config = &self.config;
        let result = run_isolated(config.stack_size, move || {
            score(config, candidates, tests, max_attempts, max_time)
        })?;
        info!(
            candidates = candidates.len(),
            tests = tests.len(),
            best = ?result.best,
            passed = result.passed.len(),
            attempts = result.attempts,
            "evaluation finished"
        );
        Ok(result)
    }
}

fn score(
    config: &SandboxConfig,
    candidates: &[String],
    tests: &[TestCase],
    max_attempts: u64,
    max_time: Duration,
) -> PassCount {
    let started = Instant::now();
    let executor = Executor::new(config.limits()).with_output(OutputMode::Capture);
    let mut result = PassCount::default();

    'candidates: for (index, source) in candidates.iter().enumerate() {
        let program = match sandbox::loader::parse(source) {
            Ok(program) => Some(program),
            Err(err) => {
                debug!(candidate = index, error = %err, "candidate rejected");
                None
            }
        };

        let mut passed = Vec::new();
        let mut failed = Vec::new();
        for (test_index, test) in tests.iter().enumerate() {
            if result.attempts >= max_attempts || started.elapsed() >= max_time {
                result.exhausted = true;
                break 'candidates;
            }
            result.attempts += 1;

            let ok = program.as_ref().is_some_and(|program| {
                let execution = sandbox::loader::instantiate(program, config)
                    .and_then(|mut unit| executor.run(&mut unit, &config.entry, &test.input));
                match execution {
                    Ok(execution) => {
                        let rendered = rendered_output(execution.stdout.as_deref(), &execution.value);
                        normalize(&rendered) == normalize(&test.output)
                    }
                    Err(err) => {
                        debug!(candidate = index, test = test_index, fault = %err, "test faulted");
                        false
                    }
                }
            });
            if ok {
                passed.push(test_index);
            } else {
                failed.push(test_index);
            }
        }

        if result.best.is_none() || passed.len() > result.passed.len() {
            result.best = Some(index);
            result.passed = passed;
            result.failed = failed;
        }
        if result.passed.len() == tests.len() {
            break;
        }
    }
    result
}

fn rendered_output(stdout: Option<&str>, value: &Value) -> String {
    match stdout {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ if matches!(value, Value::Null) => String::new(),
        _ => value.to_string(),
    }
}

fn normalize(text: &str) -> String {
    text.trim()
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tests() -> Vec<TestCase> {
        vec![
            TestCase::new("1 2", "3"),
            TestCase::new("5 5", "10"),
            TestCase::new("-1 1", "0"),
        ]
    }

    const SUM: &str = "fn main(s) {\n  let parts = split(s, \" \")\n  println(int(parts[0]) + int(parts[1]))\n}";

    #[test]
    fn picks_the_candidate_with_most_passes() {
        let candidates = vec![
            "fn main(s) { return 3 }".to_string(),
            SUM.to_string(),
            "fn main(s) {".to_string(),
        ];
        let result = Evaluator::new(SandboxConfig::default())
            .evaluate(&candidates, &tests(), 100, Duration::from_secs(30))
            .expect("evaluate");
        assert_eq!(result.best, Some(1));
        assert_eq!(result.passed, vec![0, 1, 2]);
        assert!(result.all_passed(3));
        // Stops once a candidate passes everything.
        assert_eq!(result.attempts, 6);
    }

    #[test]
    fn return_value_counts_when_nothing_is_printed() {
        let candidates = vec!["fn main(s) { return len(s) }".to_string()];
        let result = Evaluator::new(SandboxConfig::default())
            .evaluate(
                &candidates,
                &[TestCase::new("abc", "3\n"), TestCase::new("", "1")],
                100,
                Duration::from_secs(30),
            )
            .expect("evaluate");
        assert_eq!(result.passed, vec![0]);
        assert_eq!(result.failed, vec![1]);
    }

    #[test]
    fn attempt_budget_stops_early() {
        let candidates = vec!["fn main(s) { return 0 }".to_string(), SUM.to_string()];
        let result = Evaluator::new(SandboxConfig::default())
            .evaluate(&candidates, &tests(), 2, Duration::from_secs(30))
            .expect("evaluate");
        assert!(result.exhausted);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.best, None);
    }

    #[test]
    fn faults_count_as_failures() {
        let candidates = vec!["fn main(s) { while true {} }".to_string()];
        let config = SandboxConfig {
            timeout_ms: 50,
            ..SandboxConfig::default()
        };
        let result = Evaluator::new(config)
            .evaluate(&candidates, &tests()[..1], 10, Duration::from_secs(30))
            .expect("evaluate");
        assert_eq!(result.best, Some(0));
        assert!(result.passed.is_empty());
        assert_eq!(result.failed, vec![0]);
    }
}

//=====================================================
// End of file
//=====================================================
