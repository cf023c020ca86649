//=====================================================
// File: agent/backend.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Contract between the repair agent and its generator
// Objective: Describe the asynchronous generation and repair requests the
//            agent issues, independent of any concrete model or service
//=====================================================

use serde::{Deserialize, Serialize};

/// One (input, expected output) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub output: String,
}

impl TestCase {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

/// Problem handed to the agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Problem {
    pub name: String,
    pub statement: String,
    #[serde(default)]
    pub system_tests: Vec<TestCase>,
}

/// Counterexamples plus the trace text that explains them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Counterexamples {
    pub cases: Vec<TestCase>,
    pub report: String,
}

/// Generator the agent drives. Every request may fail; failures surface to
/// the controller as an error observation.
#[allow(async_fn_in_trait)]
pub trait RepairBackend {
    async fn generate_pretests(&self, problem: &Problem, count: usize) -> anyhow::Result<Vec<TestCase>>;

    async fn generate_solution(&self, problem: &Problem) -> anyhow::Result<String>;

    async fn generate_ir(&self, problem: &Problem, narrative: &str) -> anyhow::Result<String>;

    /// `count` candidate programs implementing `ir`.
    async fn generate_functions(&self, ir: &str, count: usize) -> anyhow::Result<Vec<String>>;

    async fn generate_counterexamples(
        &self,
        problem: &Problem,
        report: &str,
        count: usize,
    ) -> anyhow::Result<Vec<TestCase>>;

    /// Up to `count` repaired variants of `program`.
    async fn debug_function(
        &self,
        program: &str,
        counterexamples: &Counterexamples,
        count: usize,
    ) -> anyhow::Result<Vec<String>>;

    async fn debug_solution(
        &self,
        narrative: &str,
        counterexamples: &Counterexamples,
    ) -> anyhow::Result<String>;
}

//=====================================================
// End of file
//=====================================================
