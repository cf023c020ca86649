//=====================================================
// File: interpreter/builtins.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Native builtin library available to sandboxed units
// Objective: Register conversions, container helpers, higher-order helpers
//            and sink-bound printing, all charged to the execution budget
//=====================================================

use super::value::{
    CallArgs, ListRef, MAX_COMPARE_DEPTH, NativeArity, NativeFn, NativeFunction, Value,
};
use super::{ExceptionKind, Interpreter, OBJECT_ENTRY_BYTES, RuntimeError, VALUE_SLOT_BYTES};
use crate::ast::BinaryOp;
use crate::tokenizer::Position;
use std::cmp::Ordering;
use std::rc::Rc;

const ANY: NativeArity = NativeArity::Range { min: 0, max: None };

impl Interpreter {
    pub(super) fn init_builtins(&mut self) {
        self.register_builtin("print", ANY, &["sep", "end"], Interpreter::builtin_print);
        self.register_builtin("println", ANY, &["sep"], Interpreter::builtin_println);
        self.register_builtin("input", NativeArity::Exact(0), &[], Interpreter::builtin_input);
        self.register_builtin("len", NativeArity::Exact(1), &[], Interpreter::builtin_len);
        self.register_builtin("str", NativeArity::Exact(1), &[], Interpreter::builtin_str);
        self.register_builtin("int", NativeArity::Exact(1), &[], Interpreter::builtin_int);
        self.register_builtin("float", NativeArity::Exact(1), &[], Interpreter::builtin_float);
        self.register_builtin("bool", NativeArity::Exact(1), &[], Interpreter::builtin_bool);
        self.register_builtin("type", NativeArity::Exact(1), &[], Interpreter::builtin_type);
        self.register_builtin("abs", NativeArity::Exact(1), &[], Interpreter::builtin_abs);
        self.register_builtin(
            "min",
            NativeArity::Range { min: 1, max: None },
            &[],
            Interpreter::builtin_min,
        );
        self.register_builtin(
            "max",
            NativeArity::Range { min: 1, max: None },
            &[],
            Interpreter::builtin_max,
        );
        self.register_builtin(
            "sum",
            NativeArity::Range {
                min: 1,
                max: Some(2),
            },
            &[],
            Interpreter::builtin_sum,
        );
        self.register_builtin(
            "range",
            NativeArity::Range {
                min: 1,
                max: Some(3),
            },
            &[],
            Interpreter::builtin_range,
        );
        self.register_builtin(
            "split",
            NativeArity::Range {
                min: 1,
                max: Some(2),
            },
            &["sep"],
            Interpreter::builtin_split,
        );
        self.register_builtin("strip", NativeArity::Exact(1), &[], Interpreter::builtin_strip);
        self.register_builtin(
            "join",
            NativeArity::Range {
                min: 1,
                max: Some(2),
            },
            &["sep"],
            Interpreter::builtin_join,
        );
        self.register_builtin("push", NativeArity::Exact(2), &[], Interpreter::builtin_push);
        self.register_builtin(
            "pop",
            NativeArity::Range {
                min: 1,
                max: Some(2),
            },
            &[],
            Interpreter::builtin_pop,
        );
        self.register_builtin("insert", NativeArity::Exact(3), &[], Interpreter::builtin_insert);
        self.register_builtin(
            "contains",
            NativeArity::Exact(2),
            &[],
            Interpreter::builtin_contains,
        );
        self.register_builtin("keys", NativeArity::Exact(1), &[], Interpreter::builtin_keys);
        self.register_builtin("values", NativeArity::Exact(1), &[], Interpreter::builtin_values);
        self.register_builtin(
            "sorted",
            NativeArity::Exact(1),
            &["reverse"],
            Interpreter::builtin_sorted,
        );
        self.register_builtin(
            "reversed",
            NativeArity::Exact(1),
            &[],
            Interpreter::builtin_reversed,
        );
        self.register_builtin("map", NativeArity::Exact(2), &[], Interpreter::builtin_map);
        self.register_builtin("filter", NativeArity::Exact(2), &[], Interpreter::builtin_filter);
    }

    fn register_builtin(
        &mut self,
        name: &'static str,
        arity: NativeArity,
        keywords: &'static [&'static str],
        func: NativeFn,
    ) {
        self.builtins.insert(
            name,
            NativeFunction {
                name,
                arity,
                keywords,
                func,
            },
        );
    }

    //=============================================
    //            Argument helpers
    //=============================================

    fn here(&self) -> Position {
        Position::new(self.current_line, 0)
    }

    fn type_error(&self, builtin: &str, expected: &str, found: &Value) -> RuntimeError {
        self.raise(
            ExceptionKind::TypeError,
            format!(
                "{}() expects {}, got {}",
                builtin,
                expected,
                found.type_name()
            ),
        )
    }

    fn expect_list(&self, builtin: &str, value: &Value) -> Result<ListRef, RuntimeError> {
        match value {
            Value::List(items) => Ok(items.clone()),
            other => Err(self.type_error(builtin, "a list", other)),
        }
    }

    fn expect_int(&self, builtin: &str, value: &Value) -> Result<i64, RuntimeError> {
        match value {
            Value::Int(n) => Ok(*n),
            other => Err(self.type_error(builtin, "an int", other)),
        }
    }

    fn expect_string<'a>(&self, builtin: &str, value: &'a Value) -> Result<&'a str, RuntimeError> {
        value
            .as_str()
            .ok_or_else(|| self.type_error(builtin, "a string", value))
    }

    /// Either a single list argument or the arguments themselves.
    fn spread_items(&self, args: &CallArgs) -> Vec<Value> {
        match args.positional.as_slice() {
            [Value::List(items)] => items.borrow().clone(),
            other => other.to_vec(),
        }
    }

    fn keyword_string(&self, args: &CallArgs, name: &str, default: &str) -> Result<String, RuntimeError> {
        match args.keyword(name) {
            None | Some(Value::Null) => Ok(default.to_string()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(self.type_error(name, "a string", other)),
        }
    }

    fn render_joined(&mut self, values: &[Value], sep: &str) -> Result<String, RuntimeError> {
        let text = values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(sep);
        self.charge(text.len() as u64)?;
        Ok(text)
    }

    //=============================================
    //            Output & input
    //=============================================

    fn builtin_print(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        let sep = self.keyword_string(&args, "sep", " ")?;
        let end = self.keyword_string(&args, "end", "")?;
        let mut text = self.render_joined(&args.positional, &sep)?;
        text.push_str(&end);
        self.write_output(&text)?;
        Ok(Value::Null)
    }

    fn builtin_println(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        let sep = self.keyword_string(&args, "sep", " ")?;
        let mut text = self.render_joined(&args.positional, &sep)?;
        text.push('\n');
        self.write_output(&text)?;
        Ok(Value::Null)
    }

    fn builtin_input(&mut self, _args: CallArgs) -> Result<Value, RuntimeError> {
        match self.next_input_line() {
            Some(line) => {
                self.charge(line.len() as u64)?;
                Ok(Value::String(line))
            }
            None => Ok(Value::Null),
        }
    }

    //=============================================
    //            Conversions
    //=============================================

    fn builtin_len(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        let len = match &args.positional[0] {
            Value::String(s) => s.chars().count(),
            Value::List(items) => items.borrow().len(),
            Value::Object(entries) => entries.borrow().len(),
            other => return Err(self.type_error("len", "a string, list or object", other)),
        };
        Ok(Value::Int(len as i64))
    }

    fn builtin_str(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        let text = args.positional[0].to_string();
        self.charge(text.len() as u64)?;
        Ok(Value::String(text))
    }

    fn builtin_int(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        match &args.positional[0] {
            Value::Int(n) => Ok(Value::Int(*n)),
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            Value::Float(f) if f.is_finite() && f.abs() < 9.2e18 => Ok(Value::Int(f.trunc() as i64)),
            Value::Float(f) => Err(self.raise(
                ExceptionKind::ValueError,
                format!("cannot convert float {} to int", f),
            )),
            Value::String(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                self.raise(
                    ExceptionKind::ValueError,
                    format!("invalid literal for int(): \"{}\"", s),
                )
            }),
            other => Err(self.type_error("int", "a number or string", other)),
        }
    }

    fn builtin_float(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        match &args.positional[0] {
            Value::Int(n) => Ok(Value::Float(*n as f64)),
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
            Value::String(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                self.raise(
                    ExceptionKind::ValueError,
                    format!("could not convert string to float: \"{}\"", s),
                )
            }),
            other => Err(self.type_error("float", "a number or string", other)),
        }
    }

    fn builtin_bool(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        Ok(Value::Bool(args.positional[0].is_truthy()))
    }

    fn builtin_type(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        Ok(Value::String(args.positional[0].type_name().to_string()))
    }

    //=============================================
    //            Numeric helpers
    //=============================================

    fn builtin_abs(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        match &args.positional[0] {
            Value::Int(n) => n
                .checked_abs()
                .map(Value::Int)
                .ok_or_else(|| self.raise(ExceptionKind::ValueError, "integer overflow")),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Err(self.type_error("abs", "a number", other)),
        }
    }

    fn extreme(&mut self, name: &str, args: CallArgs, wanted: Ordering) -> Result<Value, RuntimeError> {
        let items = self.spread_items(&args);
        let mut iter = items.into_iter();
        let Some(mut best) = iter.next() else {
            return Err(self.raise(
                ExceptionKind::ValueError,
                format!("{}() arg is an empty sequence", name),
            ));
        };
        for item in iter {
            match compare_values(&item, &best) {
                Some(ordering) if ordering == wanted => best = item,
                Some(_) => {}
                None => {
                    return Err(self.raise(
                        ExceptionKind::TypeError,
                        format!(
                            "{}() cannot compare '{}' and '{}'",
                            name,
                            item.type_name(),
                            best.type_name()
                        ),
                    ));
                }
            }
        }
        Ok(best)
    }

    fn builtin_min(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        self.extreme("min", args, Ordering::Less)
    }

    fn builtin_max(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        self.extreme("max", args, Ordering::Greater)
    }

    fn builtin_sum(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        let items = self.expect_list("sum", &args.positional[0])?;
        let mut total = args.positional.get(1).cloned().unwrap_or(Value::Int(0));
        let items = items.borrow().clone();
        for item in items {
            let position = self.here();
            total = self.binary_op(BinaryOp::Add, total, item, position)?;
        }
        Ok(total)
    }

    fn builtin_range(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        let mut bounds = Vec::with_capacity(3);
        for value in &args.positional {
            bounds.push(self.expect_int("range", value)?);
        }
        let (start, stop, step) = match bounds.as_slice() {
            [stop] => (0, *stop, 1),
            [start, stop] => (*start, *stop, 1),
            [start, stop, step] => (*start, *stop, *step),
            _ => (0, 0, 1),
        };
        if step == 0 {
            return Err(self.raise(ExceptionKind::ValueError, "range() step must not be zero"));
        }

        let span = if step > 0 {
            (stop as i128 - start as i128).max(0)
        } else {
            (start as i128 - stop as i128).max(0)
        };
        let count = (span + step.unsigned_abs() as i128 - 1) / step.unsigned_abs() as i128;
        let count = u64::try_from(count).unwrap_or(u64::MAX);
        self.charge_items(usize::try_from(count).unwrap_or(usize::MAX))?;

        let mut items = Vec::with_capacity(count as usize);
        let mut current = start as i128;
        for _ in 0..count {
            self.tick()?;
            items.push(Value::Int(current as i64));
            current += step as i128;
        }
        Ok(Value::list(items))
    }

    //=============================================
    //            Strings
    //=============================================

    fn builtin_split(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        let text = self.expect_string("split", &args.positional[0])?.to_string();
        let sep = match args.positional.get(1).or_else(|| args.keyword("sep")) {
            None | Some(Value::Null) => None,
            Some(value) => Some(self.expect_string("split", value)?.to_string()),
        };
        let parts: Vec<Value> = match sep.as_deref() {
            None => text
                .split_whitespace()
                .map(|p| Value::String(p.to_string()))
                .collect(),
            Some("") => return Err(self.raise(ExceptionKind::ValueError, "empty separator")),
            Some(sep) => text
                .split(sep)
                .map(|p| Value::String(p.to_string()))
                .collect(),
        };
        self.charge_items(parts.len())?;
        self.charge(text.len() as u64)?;
        Ok(Value::list(parts))
    }

    fn builtin_strip(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        let text = self.expect_string("strip", &args.positional[0])?;
        Ok(Value::String(text.trim().to_string()))
    }

    fn builtin_join(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        let items = self.expect_list("join", &args.positional[0])?;
        let sep = match args.positional.get(1).or_else(|| args.keyword("sep")) {
            None => String::new(),
            Some(value) => self.expect_string("join", value)?.to_string(),
        };
        let items = items.borrow().clone();
        let text = self.render_joined(&items, &sep)?;
        Ok(Value::String(text))
    }

    //=============================================
    //            Containers
    //=============================================

    fn builtin_push(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        let items = self.expect_list("push", &args.positional[0])?;
        self.charge(VALUE_SLOT_BYTES)?;
        items.borrow_mut().push(args.positional[1].clone());
        Ok(Value::Null)
    }

    fn builtin_pop(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        let items = self.expect_list("pop", &args.positional[0])?;
        let len = items.borrow().len();
        if len == 0 {
            return Err(self.raise(ExceptionKind::IndexError, "pop from empty list"));
        }
        let index = match args.positional.get(1) {
            Some(value) => {
                let raw = self.expect_int("pop", value)?;
                match super::normalize_index(raw, len) {
                    Some(index) => index,
                    None => {
                        return Err(self.raise(
                            ExceptionKind::IndexError,
                            format!("pop index {} out of range for length {}", raw, len),
                        ));
                    }
                }
            }
            None => len - 1,
        };
        Ok(items.borrow_mut().remove(index))
    }

    fn builtin_insert(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        match &args.positional[0] {
            Value::List(items) => {
                let raw = self.expect_int("insert", &args.positional[1])?;
                let len = items.borrow().len() as i64;
                let index = if raw < 0 { (raw + len).max(0) } else { raw.min(len) };
                self.charge(VALUE_SLOT_BYTES)?;
                items
                    .borrow_mut()
                    .insert(index as usize, args.positional[2].clone());
                Ok(Value::Null)
            }
            Value::Object(entries) => {
                let key = self.expect_string("insert", &args.positional[1])?.to_string();
                self.charge(OBJECT_ENTRY_BYTES + key.len() as u64)?;
                entries.borrow_mut().insert(key, args.positional[2].clone());
                Ok(Value::Null)
            }
            other => Err(self.type_error("insert", "a list or object", other)),
        }
    }

    fn builtin_contains(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        let needle = &args.positional[1];
        let found = match &args.positional[0] {
            Value::List(items) => items.borrow().iter().any(|item| item == needle),
            Value::String(s) => match needle {
                Value::String(sub) => s.contains(sub.as_str()),
                other => return Err(self.type_error("contains", "a string needle", other)),
            },
            Value::Object(entries) => match needle {
                Value::String(key) => entries.borrow().contains_key(key),
                _ => false,
            },
            other => return Err(self.type_error("contains", "a list, string or object", other)),
        };
        Ok(Value::Bool(found))
    }

    fn builtin_keys(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        match &args.positional[0] {
            Value::Object(entries) => {
                let keys: Vec<Value> = entries
                    .borrow()
                    .keys()
                    .map(|k| Value::String(k.clone()))
                    .collect();
                self.charge_items(keys.len())?;
                Ok(Value::list(keys))
            }
            other => Err(self.type_error("keys", "an object", other)),
        }
    }

    fn builtin_values(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        match &args.positional[0] {
            Value::Object(entries) => {
                let values: Vec<Value> = entries.borrow().values().cloned().collect();
                self.charge_items(values.len())?;
                Ok(Value::list(values))
            }
            other => Err(self.type_error("values", "an object", other)),
        }
    }

    fn builtin_sorted(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        let mut items = match &args.positional[0] {
            Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
            other => self.expect_list("sorted", other)?.borrow().clone(),
        };
        self.charge_items(items.len())?;

        let mut incomparable = false;
        items.sort_by(|a, b| {
            compare_values(a, b).unwrap_or_else(|| {
                incomparable = true;
                Ordering::Equal
            })
        });
        if incomparable {
            return Err(self.raise(
                ExceptionKind::TypeError,
                "sorted() found values that cannot be compared",
            ));
        }
        if args.keyword("reverse").is_some_and(Value::is_truthy) {
            items.reverse();
        }
        Ok(Value::list(items))
    }

    fn builtin_reversed(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        match &args.positional[0] {
            Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
            other => {
                let mut items = self.expect_list("reversed", other)?.borrow().clone();
                self.charge_items(items.len())?;
                items.reverse();
                Ok(Value::list(items))
            }
        }
    }

    //=============================================
    //            Higher-order helpers
    //=============================================

    fn builtin_map(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        let func = args.positional[0].clone();
        let items = self.expect_list("map", &args.positional[1])?.borrow().clone();
        self.charge_items(items.len())?;
        let mut mapped = Vec::with_capacity(items.len());
        for item in items {
            mapped.push(self.call_value(&func, CallArgs::positional(vec![item]))?);
        }
        Ok(Value::list(mapped))
    }

    fn builtin_filter(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        let func = args.positional[0].clone();
        let items = self.expect_list("filter", &args.positional[1])?.borrow().clone();
        self.charge_items(items.len())?;
        let mut kept = Vec::new();
        for item in items {
            if self
                .call_value(&func, CallArgs::positional(vec![item.clone()]))?
                .is_truthy()
            {
                kept.push(item);
            }
        }
        Ok(Value::list(kept))
    }
}

/// Ordering used by `sorted`, `min` and `max`; `None` for incomparable pairs,
/// including lists nested (or cycling) deeper than the comparison bound.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    compare_at(a, b, 0)
}

fn compare_at(a: &Value, b: &Value, depth: usize) -> Option<Ordering> {
    if depth > MAX_COMPARE_DEPTH {
        return None;
    }
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::List(x), Value::List(y)) => {
            if Rc::ptr_eq(x, y) {
                return Some(Ordering::Equal);
            }
            let (x, y) = (x.try_borrow().ok()?, y.try_borrow().ok()?);
            for (left, right) in x.iter().zip(y.iter()) {
                match compare_at(left, right, depth + 1)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(x.len().cmp(&y.len()))
        }
        _ => match (a.to_number(), b.to_number()) {
            (Some(x), Some(y)) if !matches!(a, Value::Bool(_)) && !matches!(b, Value::Bool(_)) => {
                x.partial_cmp(&y)
            }
            _ => None,
        },
    }
}


//=====================================================
// End of file
//=====================================================
