//=====================================================
// File: agent/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Asynchronous generate, evaluate and repair loop
// Objective: Drive a repair backend through the self-debug controller,
//            feeding it sandbox traces of failing pretests
//=====================================================

pub mod backend;
pub mod evaluator;

pub use backend::{Counterexamples, Problem, RepairBackend, TestCase};
pub use evaluator::{Evaluator, PassCount};

use crate::controller::{Action, ControllerConfig, ControllerState, Observation, SelfDebugController};
use crate::sandbox::{SandboxConfig, TraceReport, TraceSession};
use anyhow::{Context, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Decide/execute rounds before the loop is forced to finish.
    pub max_cycles: usize,
    pub request_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_cycles: 64,
            request_timeout_secs: 600,
        }
    }
}

impl AgentConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Summary of one solved (or abandoned) problem.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub problem: String,
    pub pretests: usize,
    pub best_program: Option<String>,
    pub pretest_result: Option<PassCount>,
    pub system_result: Option<PassCount>,
    pub cycles: usize,
    pub controller: ControllerState,
    pub errors: Vec<String>,
}

impl TaskReport {
    pub fn solved(&self) -> bool {
        match (&self.system_result, &self.pretest_result) {
            (Some(system), _) => system.failed.is_empty() && system.best.is_some(),
            (None, Some(pretests)) => pretests.all_passed(self.pretests),
            (None, None) => false,
        }
    }
}

#[derive(Default)]
struct Task {
    pretests: Vec<TestCase>,
    narrative: Option<String>,
    ir: Option<String>,
    programs: Vec<String>,
    best: Option<PassCount>,
    counterexamples: Counterexamples,
    system: Option<PassCount>,
    error: Option<anyhow::Error>,
    errors: Vec<String>,
    running: bool,
}

impl Task {
    fn best_program(&self) -> Option<&str> {
        let index = self.best.as_ref()?.best?;
        self.programs.get(index).map(String::as_str)
    }
}

pub struct ProgramAgent<B> {
    backend: B,
    sandbox: SandboxConfig,
    controller: ControllerConfig,
    config: AgentConfig,
}

impl<B: RepairBackend> ProgramAgent<B> {
    pub fn new(
        backend: B,
        sandbox: SandboxConfig,
        controller: ControllerConfig,
        config: AgentConfig,
    ) -> Self {
        Self {
            backend,
            sandbox,
            controller,
            config,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn solve(&self, problem: &Problem) -> TaskReport {
        info!(problem = %problem.name, "solving");
        let mut controller = SelfDebugController::new(self.controller.clone());
        let mut task = Task {
            running: true,
            ..Task::default()
        };

        self.execute(&mut task, problem, controller.initial_actions()).await;
        let mut cycles = 0;
        while task.running {
            if cycles >= self.config.max_cycles {
                warn!(cycles, "cycle cap reached, finishing");
                self.execute(&mut task, problem, controller.finish_actions()).await;
                break;
            }
            cycles += 1;
            let obs = observe(&mut task);
            let actions = controller.decide(obs);
            self.execute(&mut task, problem, actions).await;
        }

        let report = TaskReport {
            problem: problem.name.clone(),
            pretests: task.pretests.len(),
            best_program: task.best_program().map(str::to_string),
            pretest_result: task.best.take(),
            system_result: task.system.take(),
            cycles,
            controller: controller.state(),
            errors: task.errors,
        };
        info!(
            problem = %report.problem,
            solved = report.solved(),
            cycles,
            errors = report.errors.len(),
            "task finished"
        );
        report
    }

    async fn execute(&self, task: &mut Task, problem: &Problem, actions: Vec<Action>) {
        for action in actions {
            info!(?action, "executing");
            if let Err(err) = self.perform(task, problem, &action).await {
                warn!(?action, error = %format!("{err:#}"), "action failed");
                task.errors.push(format!("{err:#}"));
                task.error = Some(err);
                break;
            }
        }
    }

    async fn perform(&self, task: &mut Task, problem: &Problem, action: &Action) -> anyhow::Result<()> {
        match action {
            Action::GeneratePretests { count } => {
                task.pretests = self
                    .request("pretest", self.backend.generate_pretests(problem, *count))
                    .await?;
            }
            Action::GenerateSolution => {
                let narrative = self
                    .request("solution", self.backend.generate_solution(problem))
                    .await?;
                task.narrative = Some(narrative);
            }
            Action::GenerateIr => {
                let narrative = task
                    .narrative
                    .as_deref()
                    .context("no solution narrative to translate")?;
                let ir = self
                    .request("ir", self.backend.generate_ir(problem, narrative))
                    .await?;
                task.ir = Some(ir);
            }
            Action::GenerateFunctions { count } => {
                let ir = task.ir.as_deref().context("no program description to implement")?;
                let programs = self
                    .request("function", self.backend.generate_functions(ir, *count))
                    .await?;
                if programs.is_empty() {
                    bail!("backend returned no candidate programs");
                }
                task.programs = programs;
                task.best = None;
            }
            Action::EvaluatePretests {
                max_attempts,
                max_time,
            } => {
                if task.programs.is_empty() {
                    bail!("no candidate programs to evaluate");
                }
                let result = self
                    .evaluate(task.programs.clone(), task.pretests.clone(), *max_attempts, *max_time)
                    .await
                    .context("pretest evaluation")?;
                task.best = Some(result);
            }
            Action::GenerateCounterexamples {
                count,
                use_pretests,
            } => {
                let (failing, report) = self.trace_failures(task, *count).await?;
                let cases = if *use_pretests {
                    failing
                } else {
                    self.request(
                        "counterexample",
                        self.backend.generate_counterexamples(problem, &report, *count),
                    )
                    .await?
                };
                task.counterexamples = Counterexamples { cases, report };
            }
            Action::DebugFunction { count } => {
                let program = task
                    .best_program()
                    .context("no candidate program to repair")?
                    .to_string();
                let repaired = self
                    .request(
                        "function repair",
                        self.backend.debug_function(&program, &task.counterexamples, *count),
                    )
                    .await?;
                if repaired.is_empty() {
                    bail!("backend returned no repaired programs");
                }
                // The current best stays in the pool so a bad repair cannot regress it.
                task.programs = std::iter::once(program).chain(repaired).collect();
                task.best = None;
            }
            Action::DebugSolution => {
                let narrative = task
                    .narrative
                    .as_deref()
                    .context("no solution narrative to repair")?;
                let repaired = self
                    .request(
                        "solution repair",
                        self.backend.debug_solution(narrative, &task.counterexamples),
                    )
                    .await?;
                task.narrative = Some(repaired);
            }
            Action::EvaluateSystemTests {
                max_attempts,
                max_time,
            } => {
                let candidate = task.best_program().map(str::to_string);
                task.system = match candidate {
                    Some(program) if !problem.system_tests.is_empty() => Some(
                        self.evaluate(
                            vec![program],
                            problem.system_tests.clone(),
                            *max_attempts,
                            *max_time,
                        )
                        .await
                        .context("system test evaluation")?,
                    ),
                    _ => None,
                };
            }
            Action::Finish => task.running = false,
        }
        Ok(())
    }

    /// Score candidates on the blocking pool so long evaluations do not
    /// stall other tasks on the runtime.
    async fn evaluate(
        &self,
        candidates: Vec<String>,
        tests: Vec<TestCase>,
        max_attempts: u64,
        max_time: Duration,
    ) -> anyhow::Result<PassCount> {
        let evaluator = Evaluator::new(self.sandbox.clone());
        let result = tokio::task::spawn_blocking(move || {
            evaluator.evaluate(&candidates, &tests, max_attempts, max_time)
        })
        .await
        .context("evaluation task failed")??;
        Ok(result)
    }

    /// Trace the best program on up to `count` failing pretests.
    async fn trace_failures(
        &self,
        task: &Task,
        count: usize,
    ) -> anyhow::Result<(Vec<TestCase>, String)> {
        let program = task
            .best_program()
            .context("no candidate program to trace")?
            .to_string();
        let best = task.best.as_ref().context("no evaluation to draw failures from")?;
        let failing: Vec<TestCase> = best
            .failed
            .iter()
            .take(count)
            .filter_map(|&index| task.pretests.get(index).cloned())
            .collect();

        let session = TraceSession::new(self.sandbox.clone());
        let cases = failing.clone();
        let report = tokio::task::spawn_blocking(move || {
            let mut report = String::new();
            for test in &cases {
                let _ = writeln!(report, "input: {:?}\nexpected: {:?}", test.input, test.output);
                match session.run(&program, &test.input) {
                    Ok(outcome) => {
                        let _ = write!(report, "{}", TraceReport::from_outcome(&outcome));
                    }
                    Err(err) => {
                        let _ = writeln!(report, "failed before running: {}", err);
                    }
                }
                report.push('\n');
            }
            report
        })
        .await
        .context("trace task failed")?;
        Ok((failing, report))
    }

    async fn request<T>(
        &self,
        what: &str,
        request: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        let limit = self.config.request_timeout();
        match tokio::time::timeout(limit, request).await {
            Ok(result) => result.with_context(|| format!("{} request failed", what)),
            Err(_) => Err(anyhow!("{} request timed out after {:?}", what, limit)),
        }
    }
}

fn observe(task: &mut Task) -> Observation {
    let all_pretests_passed = task
        .best
        .as_ref()
        .is_some_and(|best| best.all_passed(task.pretests.len()));
    Observation {
        all_pretests_passed,
        error_raised: task.error.take().is_some(),
    }
}

//=====================================================
// End of file
//=====================================================
