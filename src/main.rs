//=====================================================
// File: main.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Command line front end for SolvraRepair
// Objective: Trace a SolvraScript program on one input, list its functions,
//            or score candidate programs against a test file
//=====================================================

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use solvra_repair::agent::{Evaluator, TestCase};
use solvra_repair::config::RepairConfig;
use solvra_repair::logging;
use solvra_repair::sandbox::{self, TraceReport, TraceSession};

#[derive(Debug, ClapParser)]
#[command(
    name = "solvra_repair",
    about = "Sandboxed tracing and evaluation of SolvraScript (.svs) programs.",
    version
)]
struct Args {
    /// Configuration file (defaults to the user config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the entry function on one input and print the call history.
    Trace {
        script: PathBuf,

        /// Payload passed to the entry function.
        #[arg(long, default_value = "", conflicts_with = "input_file")]
        input: String,

        /// Read the payload from a file instead.
        #[arg(long)]
        input_file: Option<PathBuf>,

        /// Comma separated functions to trace (default: all).
        #[arg(long, value_delimiter = ',')]
        functions: Vec<String>,

        /// Records kept per function.
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Entry function name.
        #[arg(long)]
        entry: Option<String>,

        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// List the top-level functions of a script without running it.
    Functions { script: PathBuf },
    /// Score candidate scripts against a JSON list of {input, output} cases.
    Eval {
        tests: PathBuf,

        #[arg(required = true)]
        candidates: Vec<PathBuf>,

        #[arg(long)]
        max_attempts: Option<u64>,

        #[arg(long)]
        max_time_secs: Option<u64>,

        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    logging::init("solvra_repair", args.verbose);
    let config = RepairConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Trace {
            script,
            input,
            input_file,
            functions,
            limit,
            timeout_ms,
            entry,
            json,
        } => {
            let mut sandbox = config.sandbox;
            if let Some(limit) = limit {
                sandbox.record_limit = limit;
            }
            if let Some(timeout_ms) = timeout_ms {
                sandbox.timeout_ms = timeout_ms;
            }
            if let Some(entry) = entry {
                sandbox.entry = entry;
            }
            let payload = match input_file {
                Some(path) => read(&path)?,
                None => input,
            };
            run_trace(&script, &payload, &functions, sandbox, json)
        }
        Command::Functions { script } => {
            let source = read(&script)?;
            let names = sandbox::function_names(&source)
                .with_context(|| format!("parsing {}", script.display()))?;
            for name in names {
                println!("{}", name);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Eval {
            tests,
            candidates,
            max_attempts,
            max_time_secs,
            json,
        } => {
            let max_attempts = max_attempts.unwrap_or(config.controller.eval_max_attempts);
            let max_time = max_time_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.controller.eval_max_time());
            run_eval(&tests, &candidates, config, max_attempts, max_time, json)
        }
    }
}

fn run_trace(
    script: &Path,
    payload: &str,
    functions: &[String],
    sandbox: sandbox::SandboxConfig,
    json: bool,
) -> Result<ExitCode> {
    let source = read(script)?;
    let session = TraceSession::new(sandbox);
    let outcome = if functions.is_empty() {
        session.run(&source, payload)
    } else {
        session.run_with(&source, payload, functions)
    }
    .with_context(|| format!("tracing {}", script.display()))?;

    let report = TraceReport::from_outcome(&outcome);
    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report);
    }
    Ok(if outcome.terminal.is_some() {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    })
}

fn run_eval(
    tests: &Path,
    candidates: &[PathBuf],
    config: RepairConfig,
    max_attempts: u64,
    max_time: Duration,
    json: bool,
) -> Result<ExitCode> {
    let cases: Vec<TestCase> = serde_json::from_str(&read(tests)?)
        .with_context(|| format!("parsing test cases in {}", tests.display()))?;
    let sources = candidates
        .iter()
        .map(|path| read(path))
        .collect::<Result<Vec<_>>>()?;

    let result = Evaluator::new(config.sandbox).evaluate(&sources, &cases, max_attempts, max_time)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        match result.best {
            Some(index) => println!(
                "best: {} ({}/{} passed)",
                candidates[index].display(),
                result.passed.len(),
                cases.len()
            ),
            None => println!("no candidate finished within the budget"),
        }
        if !result.failed.is_empty() {
            println!("failed tests: {:?}", result.failed);
        }
    }
    Ok(if result.all_passed(cases.len()) {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

//=====================================================
// End of file
//=====================================================
