//=====================================================
// File: sandbox/tracer.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Transparent call tracing for loaded units
// Objective: Swap chosen global functions for observing wrappers that keep a
//            bounded, invocation-ordered history of inputs, outputs and faults
//=====================================================

use super::fault::Fault;
use super::loader::LoadedUnit;
use super::snapshot::Snapshot;
use crate::interpreter::{CallArgs, Callable, FunctionWrapper, Interpreter, RuntimeError, Value};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, trace};

//=============================================
//            Section 1: Records
//=============================================

/// One observed invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    /// Formal parameter name to argument snapshot, in binding order.
    #[serde(serialize_with = "ordered_map")]
    pub inputs: Vec<(String, Snapshot)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Snapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<Fault>,
}

impl CallRecord {
    fn pending(inputs: Vec<(String, Snapshot)>) -> Self {
        Self {
            inputs,
            output: None,
            fault: None,
        }
    }

    pub fn input(&self, name: &str) -> Option<&Snapshot> {
        self.inputs
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, snapshot)| snapshot)
    }
}

fn ordered_map<S: Serializer>(
    entries: &[(String, Snapshot)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(entries.len()))?;
    for (key, value) in entries {
        map.serialize_entry(key, value)?;
    }
    map.end()
}

/// Function name to its call records, functions in tracing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceTable {
    functions: Vec<(String, Vec<CallRecord>)>,
}

impl TraceTable {
    pub fn get(&self, name: &str) -> Option<&[CallRecord]> {
        self.functions
            .iter()
            .find(|(function, _)| function == name)
            .map(|(_, records)| records.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[CallRecord])> {
        self.functions
            .iter()
            .map(|(name, records)| (name.as_str(), records.as_slice()))
    }

    /// Number of traced functions, including those never called.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn total_records(&self) -> usize {
        self.functions.iter().map(|(_, records)| records.len()).sum()
    }

    fn register(&mut self, name: &str) {
        if self.get(name).is_none() {
            self.functions.push((name.to_string(), Vec::new()));
        }
    }

    fn records_mut(&mut self, name: &str) -> Option<&mut Vec<CallRecord>> {
        self.functions
            .iter_mut()
            .find(|(function, _)| function == name)
            .map(|(_, records)| records)
    }

    fn has_capacity(&self, name: &str, limit: usize) -> bool {
        self.get(name).is_some_and(|records| records.len() < limit)
    }

    /// Claim the next slot for `name`; the record is filled in on return.
    fn reserve(&mut self, name: &str, record: CallRecord) -> Option<usize> {
        let records = self.records_mut(name)?;
        records.push(record);
        Some(records.len() - 1)
    }

    fn complete(&mut self, name: &str, slot: usize, outcome: Result<Snapshot, Fault>) {
        if let Some(record) = self.records_mut(name).and_then(|r| r.get_mut(slot)) {
            match outcome {
                Ok(output) => record.output = Some(output),
                Err(fault) => record.fault = Some(fault),
            }
        }
    }
}

impl Serialize for TraceTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.functions.len()))?;
        for (name, records) in &self.functions {
            map.serialize_entry(name, records)?;
        }
        map.end()
    }
}

//=============================================
//            Section 2: Wrapper
//=============================================

struct TracedFunction {
    name: String,
    original: Callable,
    limit: usize,
    table: Rc<RefCell<TraceTable>>,
}

impl TracedFunction {
    fn capture_inputs(&self, args: &CallArgs) -> Vec<(String, Snapshot)> {
        let mut inputs: Vec<(String, Snapshot)> = self
            .original
            .param_names()
            .into_iter()
            .zip(args.positional.iter())
            .map(|(name, value)| (name, Snapshot::capture(value)))
            .collect();
        for (name, value) in &args.keywords {
            if !inputs.iter().any(|(existing, _)| existing == name) {
                inputs.push((name.clone(), Snapshot::capture(value)));
            }
        }
        inputs
    }
}

impl FunctionWrapper for TracedFunction {
    fn target(&self) -> &Callable {
        &self.original
    }

    fn invoke(
        &self,
        interpreter: &mut Interpreter,
        args: CallArgs,
    ) -> Result<Value, RuntimeError> {
        let slot = {
            let mut table = self.table.borrow_mut();
            if table.has_capacity(&self.name, self.limit) {
                let record = CallRecord::pending(self.capture_inputs(&args));
                table.reserve(&self.name, record)
            } else {
                None
            }
        };

        let result = interpreter.call_callable(&self.original, args);

        if let Some(slot) = slot {
            let outcome = match &result {
                Ok(value) => Some(Ok(Snapshot::capture(value))),
                Err(err) => err.exception().map(|exception| Err(Fault::from(exception))),
            };
            if let Some(outcome) = outcome {
                trace!(function = %self.name, slot, ok = outcome.is_ok(), "call recorded");
                self.table.borrow_mut().complete(&self.name, slot, outcome);
            }
        }
        result
    }
}

//=============================================
//            Section 3: Tracer
//=============================================

pub struct Tracer {
    limit: usize,
    table: Rc<RefCell<TraceTable>>,
}

impl Tracer {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            table: Rc::new(RefCell::new(TraceTable::default())),
        }
    }

    /// Wrap each named global that is a plain script function. Everything
    /// else is skipped. Returns the names actually wrapped.
    pub fn install(&self, unit: &mut LoadedUnit, names: &[String]) -> Vec<String> {
        let interpreter = unit.interpreter_mut();
        let mut wrapped = Vec::new();

        for name in names {
            let original = match interpreter.global(name) {
                Some(Value::Function(callable)) if callable.is_script() => callable,
                Some(Value::Function(_)) => {
                    debug!(function = %name, "skipping trace: already wrapped or native");
                    continue;
                }
                Some(other) => {
                    debug!(function = %name, kind = other.type_name(), "skipping trace: not a function");
                    continue;
                }
                None if interpreter.is_builtin(name) => {
                    debug!(function = %name, "skipping trace: builtin");
                    continue;
                }
                None => {
                    debug!(function = %name, "skipping trace: name not found");
                    continue;
                }
            };

            self.table.borrow_mut().register(name);
            let wrapper = TracedFunction {
                name: name.clone(),
                original,
                limit: self.limit,
                table: Rc::clone(&self.table),
            };
            interpreter.replace_global(name, Value::Function(Callable::Wrapped(Rc::new(wrapper))));
            wrapped.push(name.clone());
        }

        debug!(wrapped = ?wrapped, limit = self.limit, "tracer installed");
        wrapped
    }

    /// Take the collected table. Wrappers left in the unit keep recording
    /// into a fresh, detached table.
    pub fn finish(self) -> TraceTable {
        std::mem::take(&mut *self.table.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{SandboxConfig, load};

    fn traced(source: &str, limit: usize) -> (LoadedUnit, Tracer) {
        let mut unit = load(source, &SandboxConfig::default()).expect("load");
        let tracer = Tracer::new(limit);
        let names = unit.function_names().to_vec();
        tracer.install(&mut unit, &names);
        (unit, tracer)
    }

    fn call(unit: &mut LoadedUnit, name: &str, args: CallArgs) -> Result<Value, RuntimeError> {
        let callee = unit.interpreter().global(name).expect("bound");
        unit.interpreter_mut().call_value(&callee, args)
    }

    #[test]
    fn keeps_earliest_invocations_up_to_limit() {
        let (mut unit, tracer) = traced("fn id(x) { return x }", 3);
        for n in 0..5 {
            call(&mut unit, "id", CallArgs::positional(vec![Value::Int(n)])).expect("call");
        }
        let table = tracer.finish();
        let records = table.get("id").expect("traced");
        assert_eq!(records.len(), 3);
        let seen: Vec<_> = records.iter().map(|r| r.output.clone()).collect();
        assert_eq!(
            seen,
            vec![Some(Snapshot::Int(0)), Some(Snapshot::Int(1)), Some(Snapshot::Int(2))]
        );
    }

    #[test]
    fn recursion_records_in_invocation_order() {
        let (mut unit, tracer) =
            traced("fn fact(n) { if n <= 1 { return 1 }\n return n * fact(n - 1) }", 3);
        let result = call(&mut unit, "fact", CallArgs::positional(vec![Value::Int(5)])).expect("call");
        assert_eq!(result, Value::Int(120));
        let table = tracer.finish();
        let records = table.get("fact").expect("traced");
        let inputs: Vec<_> = records.iter().map(|r| r.input("n").cloned()).collect();
        assert_eq!(
            inputs,
            vec![Some(Snapshot::Int(5)), Some(Snapshot::Int(4)), Some(Snapshot::Int(3))]
        );
        assert_eq!(records[0].output, Some(Snapshot::Int(120)));
        assert_eq!(records[2].output, Some(Snapshot::Int(6)));
    }

    #[test]
    fn keyword_arguments_merge_and_defaults_stay_absent() {
        let (mut unit, tracer) = traced("fn f(a, b = 2, c = 3) { return a + b + c }", 3);
        let args = CallArgs {
            positional: vec![Value::Int(1)],
            keywords: vec![("c".to_string(), Value::Int(10))],
        };
        call(&mut unit, "f", args).expect("call");
        let table = tracer.finish();
        let record = &table.get("f").expect("traced")[0];
        let names: Vec<_> = record.inputs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(record.output, Some(Snapshot::Int(13)));
    }

    #[test]
    fn faults_are_recorded_and_reraised_unchanged() {
        let (mut unit, tracer) =
            traced("fn inner(xs) {\n  return xs[3]\n}\nfn outer(xs) {\n  return inner(xs)\n}", 3);
        let err = call(
            &mut unit,
            "outer",
            CallArgs::positional(vec![Value::list(vec![Value::Int(1)])]),
        )
        .expect_err("index fault");
        let exception = err.exception().expect("exception");
        assert_eq!(exception.function, "inner");
        assert_eq!(exception.line, 2);

        let table = tracer.finish();
        let inner = &table.get("inner").expect("traced")[0];
        let outer = &table.get("outer").expect("traced")[0];
        assert_eq!(inner.output, None);
        assert_eq!(inner.fault, outer.fault);
        let fault = inner.fault.as_ref().expect("fault");
        assert_eq!(fault.function, "inner");
        assert!(fault.message.starts_with("IndexError"));
    }

    #[test]
    fn non_functions_and_missing_names_are_skipped() {
        let mut unit = load("let data = 5\nfn f() { return 1 }", &SandboxConfig::default()).expect("load");
        let tracer = Tracer::new(3);
        let wrapped = tracer.install(
            &mut unit,
            &["data".to_string(), "len".to_string(), "ghost".to_string(), "f".to_string()],
        );
        assert_eq!(wrapped, vec!["f"]);
        let again = tracer.install(&mut unit, &["f".to_string()]);
        assert!(again.is_empty(), "already wrapped functions are not wrapped twice");
        let table = tracer.finish();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn wrapper_is_seen_through_higher_order_calls() {
        let (mut unit, tracer) =
            traced("fn sq(n) { return n * n }\nfn main(s) { return map(sq, [1, 2]) }", 3);
        call(&mut unit, "main", CallArgs::positional(vec![Value::String("".into())])).expect("call");
        let table = tracer.finish();
        assert_eq!(table.get("sq").map(|r| r.len()), Some(2));
    }

    #[test]
    fn records_are_deep_copies() {
        let (mut unit, tracer) = traced("fn touch(xs) { push(xs, 9)\n return xs }", 3);
        let list = Value::list(vec![Value::Int(1)]);
        let result = call(&mut unit, "touch", CallArgs::positional(vec![list.clone()])).expect("call");
        if let Value::List(items) = &result {
            items.borrow_mut().clear();
        }
        let table = tracer.finish();
        let record = &table.get("touch").expect("traced")[0];
        assert_eq!(record.input("xs").map(|s| s.to_string()), Some("[1]".to_string()));
        assert_eq!(record.output.as_ref().map(|s| s.to_string()), Some("[1, 9]".to_string()));
    }
}

//=====================================================
// End of file
//=====================================================
