use std::cell::RefCell;
use std::time::Duration;

use anyhow::bail;
use solvra_repair::agent::{
    AgentConfig, Counterexamples, Problem, ProgramAgent, RepairBackend, TestCase,
};
use solvra_repair::controller::ControllerConfig;
use solvra_repair::sandbox::SandboxConfig;

const BUGGY: &str = "fn main(s) {\n    let p = split(s)\n    println(int(p[0]) - int(p[1]))\n}";
const FIXED: &str = "fn main(s) {\n    let p = split(s)\n    println(int(p[0]) + int(p[1]))\n}";
const SPIN: &str = "fn main(s) {\n    let mut i = 0\n    while true {\n        i = i + 1\n    }\n}";

#[derive(Default)]
struct ScriptedBackend {
    fail_solution: bool,
    candidate: Option<&'static str>,
    calls: RefCell<Vec<&'static str>>,
    reports: RefCell<Vec<String>>,
    repairs_seen: RefCell<Vec<Counterexamples>>,
}

impl ScriptedBackend {
    fn called(&self, name: &'static str) {
        self.calls.borrow_mut().push(name);
    }

    fn count(&self, name: &str) -> usize {
        self.calls.borrow().iter().filter(|c| **c == name).count()
    }
}

impl RepairBackend for ScriptedBackend {
    async fn generate_pretests(&self, _problem: &Problem, _count: usize) -> anyhow::Result<Vec<TestCase>> {
        self.called("pretests");
        Ok(vec![TestCase::new("1 2", "3"), TestCase::new("4 5", "9")])
    }

    async fn generate_solution(&self, _problem: &Problem) -> anyhow::Result<String> {
        self.called("solution");
        if self.fail_solution {
            bail!("model unavailable");
        }
        Ok("read two numbers and print their sum".to_string())
    }

    async fn generate_ir(&self, _problem: &Problem, narrative: &str) -> anyhow::Result<String> {
        self.called("ir");
        Ok(format!("main: {}", narrative))
    }

    async fn generate_functions(&self, _ir: &str, count: usize) -> anyhow::Result<Vec<String>> {
        self.called("functions");
        assert_eq!(count, 16);
        Ok(vec![self.candidate.unwrap_or(BUGGY).to_string()])
    }

    async fn generate_counterexamples(
        &self,
        _problem: &Problem,
        report: &str,
        _count: usize,
    ) -> anyhow::Result<Vec<TestCase>> {
        self.called("counterexamples");
        self.reports.borrow_mut().push(report.to_string());
        Ok(vec![TestCase::new("2 2", "4")])
    }

    async fn debug_function(
        &self,
        _program: &str,
        counterexamples: &Counterexamples,
        _count: usize,
    ) -> anyhow::Result<Vec<String>> {
        self.called("debug_function");
        self.repairs_seen.borrow_mut().push(counterexamples.clone());
        Ok(vec![FIXED.to_string()])
    }

    async fn debug_solution(
        &self,
        narrative: &str,
        _counterexamples: &Counterexamples,
    ) -> anyhow::Result<String> {
        self.called("debug_solution");
        Ok(narrative.to_string())
    }
}

fn problem() -> Problem {
    Problem {
        name: "sum".to_string(),
        statement: "Print a + b.".to_string(),
        system_tests: vec![TestCase::new("10 20", "30"), TestCase::new("0 0", "0")],
    }
}

fn agent(backend: ScriptedBackend, controller: ControllerConfig, config: AgentConfig) -> ProgramAgent<ScriptedBackend> {
    ProgramAgent::new(backend, SandboxConfig::default(), controller, config)
}

#[tokio::test]
async fn function_repair_fixes_a_failing_candidate() {
    let agent = agent(
        ScriptedBackend::default(),
        ControllerConfig::default(),
        AgentConfig::default(),
    );
    let report = agent.solve(&problem()).await;

    assert!(report.solved(), "{report:?}");
    assert_eq!(report.best_program.as_deref(), Some(FIXED));
    assert_eq!(report.cycles, 2);
    assert_eq!(report.controller.program_debug_times, 1);
    assert!(report.errors.is_empty());

    let backend = agent.backend();
    assert_eq!(backend.count("counterexamples"), 1);
    assert_eq!(backend.count("debug_function"), 1);
    assert_eq!(backend.count("solution"), 1);

    let reports = backend.reports.borrow();
    assert!(reports[0].contains("input: \"1 2\""), "{}", reports[0]);
    assert!(reports[0].contains("function main:"), "{}", reports[0]);
    assert!(reports[0].contains("input: {s: \"1 2\"}"), "{}", reports[0]);
    assert_eq!(backend.repairs_seen.borrow()[0].cases, vec![TestCase::new("2 2", "4")]);
}

#[tokio::test]
async fn failing_pretests_can_serve_as_counterexamples() {
    let controller = ControllerConfig {
        use_pretests_debug: true,
        ..ControllerConfig::default()
    };
    let agent = agent(ScriptedBackend::default(), controller, AgentConfig::default());
    let report = agent.solve(&problem()).await;

    assert!(report.solved());
    let backend = agent.backend();
    assert_eq!(backend.count("counterexamples"), 0);
    let seen = backend.repairs_seen.borrow();
    assert_eq!(seen[0].cases.len(), 2);
    assert!(seen[0].report.contains("expected: \"3\""));
}

#[tokio::test]
async fn backend_errors_restart_until_the_cycle_cap() {
    let backend = ScriptedBackend {
        fail_solution: true,
        ..ScriptedBackend::default()
    };
    let config = AgentConfig {
        max_cycles: 3,
        ..AgentConfig::default()
    };
    let agent = agent(backend, ControllerConfig::default(), config);
    let report = agent.solve(&problem()).await;

    assert!(!report.solved());
    assert_eq!(report.cycles, 3);
    assert_eq!(report.controller.restart_times, 3);
    assert_eq!(report.errors.len(), 4);
    assert!(report.errors[0].contains("model unavailable"), "{}", report.errors[0]);
    assert!(report.best_program.is_none());
    assert!(report.system_result.is_none());
    assert_eq!(agent.backend().count("ir"), 0);
}

#[tokio::test]
async fn slow_evaluation_does_not_hold_the_runtime() {
    let backend = ScriptedBackend {
        candidate: Some(SPIN),
        ..ScriptedBackend::default()
    };
    let sandbox = SandboxConfig {
        timeout_ms: 300,
        ..SandboxConfig::default()
    };
    let config = AgentConfig {
        max_cycles: 1,
        ..AgentConfig::default()
    };
    let agent = ProgramAgent::new(backend, sandbox, ControllerConfig::default(), config);
    let problem = problem();

    tokio::select! {
        biased;
        report = agent.solve(&problem) => panic!("solve finished before the timer: {report:?}"),
        _ = tokio::time::sleep(Duration::from_millis(20)) => {}
    }
}
