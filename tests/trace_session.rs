use std::time::Duration;

use solvra_repair::sandbox::{
    Executor, ResourceLimits, SandboxConfig, SandboxError, Snapshot, TraceReport, TraceSession,
    load,
};

fn session() -> TraceSession {
    TraceSession::new(SandboxConfig::default())
}

#[test]
fn helper_call_is_recorded_with_its_input_and_output() {
    let src = r#"
fn parse(s) {
    return int(s)
}

fn main(s) {
    return parse(s) * 2
}
"#;
    let outcome = session().run(src, "3").expect("session");
    assert!(outcome.terminal.is_none());

    let records = outcome.calls.get("parse").expect("parse traced");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].input("s"), Some(&Snapshot::Str("3".to_string())));
    assert_eq!(records[0].output, Some(Snapshot::Int(3)));
    assert!(records[0].fault.is_none());

    let main = outcome.calls.get("main").expect("main traced");
    assert_eq!(main[0].output, Some(Snapshot::Int(6)));
}

#[test]
fn out_of_range_index_names_the_indexing_function() {
    let src = r#"
fn get(xs, i) {
    return xs[i]
}

fn main(s) {
    let xs = [1, 2, 3]
    return get(xs, 5)
}
"#;
    let outcome = session().run(src, "").expect("session");
    let terminal = outcome.terminal.expect("terminal fault");
    assert!(matches!(terminal, SandboxError::Runtime { .. }));
    let fault = terminal.fault().expect("fault");
    assert_eq!(fault.function, "get");
    assert_eq!(fault.line, 3);
    assert!(fault.message.starts_with("IndexError"), "{}", fault.message);

    let get = outcome.calls.get("get").expect("get traced");
    assert_eq!(get[0].fault.as_ref(), Some(fault));
}

#[test]
fn runaway_loop_times_out_and_keeps_earlier_records() {
    let src = r#"
fn step(n) {
    return n + 1
}

fn spin() {
    let mut i = 0
    while true {
        i = i + 1
    }
}

fn main(s) {
    let a = step(1)
    let b = step(a)
    spin()
    return b
}
"#;
    let config = SandboxConfig {
        timeout_ms: 100,
        ..SandboxConfig::default()
    };
    let outcome = TraceSession::new(config).run(src, "").expect("session");

    let terminal = outcome.terminal.as_ref().expect("timeout");
    assert!(terminal.is_timeout(), "{terminal}");
    let fault = terminal.fault().expect("fault");
    assert_eq!(fault.function, "spin");
    assert!(fault.message.starts_with("TimeoutError"));
    assert!(outcome.elapsed < Duration::from_secs(5));

    let steps = outcome.calls.get("step").expect("step traced");
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[1].input("n"), Some(&Snapshot::Int(2)));
    assert_eq!(steps[1].output, Some(Snapshot::Int(3)));

    let spin = outcome.calls.get("spin").expect("spin traced");
    assert_eq!(spin[0].fault.as_ref().map(|f| f.class()), Some("TimeoutError"));
}

#[test]
fn record_limit_keeps_the_earliest_calls() {
    let src = r#"
fn inc(n) {
    return n + 1
}

fn main(s) {
    let mut total = 0
    for i in range(10) {
        total = inc(total)
    }
    return total
}
"#;
    let config = SandboxConfig {
        record_limit: 2,
        ..SandboxConfig::default()
    };
    let outcome = TraceSession::new(config).run(src, "").expect("session");
    let records = outcome.calls.get("inc").expect("inc traced");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].input("n"), Some(&Snapshot::Int(0)));
    assert_eq!(records[1].input("n"), Some(&Snapshot::Int(1)));
    assert_eq!(outcome.calls.get("main").map(|r| r[0].output.clone()), Some(Some(Snapshot::Int(10))));
}

#[test]
fn mutation_after_return_does_not_reach_the_record() {
    let src = r#"
fn build(n) {
    let mut xs = []
    for i in range(n) {
        push(xs, i)
    }
    return xs
}

fn main(s) {
    let xs = build(2)
    push(xs, 99)
    let ys = build(1)
    return len(xs)
}
"#;
    let outcome = session().run(src, "").expect("session");
    let records = outcome.calls.get("build").expect("build traced");
    assert_eq!(
        records[0].output,
        Some(Snapshot::List(vec![Snapshot::Int(0), Snapshot::Int(1)]))
    );
    assert_eq!(records[1].output, Some(Snapshot::List(vec![Snapshot::Int(0)])));
}

#[test]
fn second_run_gets_the_restored_ceiling() {
    let mut unit = load(
        "fn main(s) {\n    let xs = range(int(s))\n    return len(xs)\n}",
        &SandboxConfig::default(),
    )
    .expect("load");

    let tight = ResourceLimits {
        memory_ceiling: 1024,
        ..ResourceLimits::default()
    };
    let err = Executor::new(tight)
        .run(&mut unit, "main", "50000")
        .expect_err("over quota");
    assert!(matches!(err, SandboxError::Memory { .. }));

    let execution = Executor::new(ResourceLimits::default())
        .run(&mut unit, "main", "50000")
        .expect("restored ceiling");
    assert_eq!(execution.value.to_string(), "50000");
    assert!(unit.interpreter().budget().deadline().is_none());
}

#[test]
fn syntax_errors_fail_the_session() {
    let err = session().run("fn main(s) {\n  return (1 +\n}", "").expect_err("syntax");
    assert!(matches!(err, SandboxError::Syntax { .. }), "{err}");
}

#[test]
fn report_renders_calls_in_definition_order() {
    let src = "fn b(x) { return x }\nfn a(x) { return b(x) }\nfn main(s) { return a(1) }";
    let outcome = session().run(src, "").expect("session");
    let text = TraceReport::from_outcome(&outcome).to_string();
    let b = text.find("function b:").expect("b");
    let a = text.find("function a:").expect("a");
    assert!(b < a, "{text}");
}

#[test]
fn large_builtin_allocations_observe_the_deadline() {
    let config = SandboxConfig {
        timeout_ms: 2,
        ..SandboxConfig::default()
    };
    for body in ["return len(range(5000000))", "return len([7, 8] * 2000000)"] {
        let src = format!("fn main(s) {{\n    {body}\n}}");
        let outcome = TraceSession::new(config.clone()).run(&src, "").expect("session");
        let terminal = outcome.terminal.as_ref().expect("timeout");
        assert!(terminal.is_timeout(), "{body}: {terminal}");
        assert!(outcome.elapsed < Duration::from_secs(5));
    }
}

#[test]
fn oversized_range_is_refused_before_allocating() {
    let outcome = session()
        .run("fn main(s) {\n    return len(range(250000000))\n}", "")
        .expect("session");
    let terminal = outcome.terminal.expect("memory fault");
    assert!(matches!(terminal, SandboxError::Memory { .. }), "{terminal}");
}

#[test]
fn released_temporaries_do_not_count_against_the_ceiling() {
    let config = SandboxConfig {
        memory_ceiling: 16 * 1024 * 1024,
        ..SandboxConfig::default()
    };
    let transient = r#"
fn main(s) {
    let big = "x" * 1000000
    let mut i = 0
    while i < 200 {
        let t = big + "y"
        i = i + 1
    }
    return i
}
"#;
    let outcome = TraceSession::new(config.clone()).run(transient, "").expect("session");
    assert!(outcome.terminal.is_none(), "{:?}", outcome.terminal);
    let main = outcome.calls.get("main").expect("main traced");
    assert_eq!(main[0].output, Some(Snapshot::Int(200)));

    let retained = r#"
fn main(s) {
    let big = "x" * 1000000
    let mut keep = []
    for i in range(40) {
        push(keep, big + "y")
    }
    return len(keep)
}
"#;
    let outcome = TraceSession::new(config).run(retained, "").expect("session");
    let terminal = outcome.terminal.expect("memory fault");
    assert!(matches!(terminal, SandboxError::Memory { .. }), "{terminal}");
}
