//=====================================================
// File: controller/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Bounded self-debug controller for the repair loop
// Objective: Choose the next ordered action sequence from pass/fail/error
//            observations while enforcing per-phase retry ceilings
//=====================================================

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// One step the agent carries out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    GeneratePretests {
        count: usize,
    },
    GenerateSolution,
    GenerateIr,
    GenerateFunctions {
        count: usize,
    },
    GenerateCounterexamples {
        count: usize,
        use_pretests: bool,
    },
    DebugFunction {
        count: usize,
    },
    DebugSolution,
    EvaluatePretests {
        max_attempts: u64,
        max_time: Duration,
    },
    EvaluateSystemTests {
        max_attempts: u64,
        max_time: Duration,
    },
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Observation {
    pub all_pretests_passed: bool,
    pub error_raised: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ControllerState {
    pub restart_times: u32,
    pub solution_debug_times: u32,
    pub program_debug_times: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub max_restart_times: u32,
    pub max_solution_debug_times: u32,
    pub max_program_debug_times: u32,
    pub num_generated_funcs: usize,
    pub num_debugged_funcs: usize,
    pub num_counterexamples: usize,
    pub num_pretests: usize,
    pub eval_max_attempts: u64,
    pub eval_max_time_secs: u64,
    pub use_pretests_debug: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_restart_times: 4,
            max_solution_debug_times: 0,
            max_program_debug_times: 2,
            num_generated_funcs: 16,
            num_debugged_funcs: 8,
            num_counterexamples: 4,
            num_pretests: 100,
            eval_max_attempts: 100_000,
            eval_max_time_secs: 240,
            use_pretests_debug: false,
        }
    }
}

impl ControllerConfig {
    pub fn eval_max_time(&self) -> Duration {
        Duration::from_secs(self.eval_max_time_secs)
    }
}

#[derive(Debug, Clone)]
pub struct SelfDebugController {
    config: ControllerConfig,
    state: ControllerState,
}

impl SelfDebugController {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            state: ControllerState::default(),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn initial_actions(&self) -> Vec<Action> {
        let mut actions = vec![Action::GeneratePretests {
            count: self.config.num_pretests,
        }];
        actions.extend(self.generation_sequence());
        actions
    }

    /// Next action sequence for `obs`. Exhausted budgets end in the finish
    /// sequence; this never fails.
    pub fn decide(&mut self, obs: Observation) -> Vec<Action> {
        let actions = self.next_actions(obs);
        debug!(?obs, state = ?self.state, steps = actions.len(), "controller decided");
        actions
    }

    fn next_actions(&mut self, obs: Observation) -> Vec<Action> {
        if obs.all_pretests_passed {
            return self.finish_actions();
        }

        if obs.error_raised {
            return self.restart();
        }

        if self.state.program_debug_times < self.config.max_program_debug_times {
            self.state.program_debug_times += 1;
            return vec![
                Action::GenerateCounterexamples {
                    count: self.config.num_counterexamples,
                    use_pretests: self.config.use_pretests_debug,
                },
                Action::DebugFunction {
                    count: self.config.num_debugged_funcs,
                },
                self.evaluate_pretests(),
            ];
        }

        if self.state.solution_debug_times < self.config.max_solution_debug_times {
            self.state.program_debug_times = 0;
            self.state.solution_debug_times += 1;
            let mut actions = vec![
                Action::GenerateCounterexamples {
                    count: self.config.num_counterexamples,
                    use_pretests: false,
                },
                Action::DebugSolution,
            ];
            // Regenerate from the IR onwards; the repaired narrative replaces
            // a fresh solution.
            actions.extend(self.generation_sequence().into_iter().skip(1));
            return actions;
        }

        if self.state.restart_times < self.config.max_restart_times {
            return self.restart();
        }

        self.finish_actions()
    }

    fn restart(&mut self) -> Vec<Action> {
        self.state = ControllerState {
            restart_times: self.state.restart_times + 1,
            solution_debug_times: 0,
            program_debug_times: 0,
        };
        self.generation_sequence()
    }

    fn generation_sequence(&self) -> Vec<Action> {
        vec![
            Action::GenerateSolution,
            Action::GenerateIr,
            Action::GenerateFunctions {
                count: self.config.num_generated_funcs,
            },
            self.evaluate_pretests(),
        ]
    }

    /// `[EvaluateSystemTests, Finish]`
    pub fn finish_actions(&self) -> Vec<Action> {
        vec![
            Action::EvaluateSystemTests {
                max_attempts: self.config.eval_max_attempts,
                max_time: self.config.eval_max_time(),
            },
            Action::Finish,
        ]
    }

    fn evaluate_pretests(&self) -> Action {
        Action::EvaluatePretests {
            max_attempts: self.config.eval_max_attempts,
            max_time: self.config.eval_max_time(),
        }
    }
}


//=====================================================
// End of file
//=====================================================
