//=====================================================
// File: interpreter/value.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Runtime value model for sandboxed SolvraScript
// Objective: Define values, shared mutable containers, callables and the
//            wrapper seam used to observe calls without changing semantics
//=====================================================

use super::Interpreter;
use super::errors::RuntimeError;
use crate::ast::FunctionDecl;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

//=============================================
//            Section 1: Native Function Arity
//=============================================

/// Supported arity constraints for native (built-in) functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeArity {
    /// The function expects exactly this many arguments.
    Exact(usize),
    /// Inclusive minimum and optional maximum; `None` means no upper bound.
    Range { min: usize, max: Option<usize> },
}

impl NativeArity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            NativeArity::Exact(n) => *n == count,
            NativeArity::Range { min, max } => count >= *min && max.is_none_or(|max| count <= max),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            NativeArity::Exact(1) => "1 argument".to_string(),
            NativeArity::Exact(n) => format!("{} arguments", n),
            NativeArity::Range { min, max } => match max {
                Some(max) if min == max => format!("{} arguments", min),
                Some(max) => format!("{}..={} arguments", min, max),
                None if *min == 0 => "any number of arguments".to_string(),
                None => format!("at least {} arguments", min),
            },
        }
    }
}

//=============================================
//            Section 2: Callables
//=============================================

/// Arguments of one call: positional values followed by `name: value` pairs.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            keywords: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

pub type NativeFn = fn(&mut Interpreter, CallArgs) -> Result<Value, RuntimeError>;

#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    /// Checked against positional arguments only.
    pub arity: NativeArity,
    /// Keyword arguments the builtin understands.
    pub keywords: &'static [&'static str],
    pub func: NativeFn,
}

/// A callable that stands in for another one in a unit's global table.
/// Implementors must eventually invoke `target()` with the same arguments.
pub trait FunctionWrapper {
    fn target(&self) -> &Callable;

    fn invoke(&self, interpreter: &mut Interpreter, args: CallArgs)
    -> Result<Value, RuntimeError>;
}

#[derive(Clone)]
pub enum Callable {
    Script(Rc<FunctionDecl>),
    Native(NativeFunction),
    Wrapped(Rc<dyn FunctionWrapper>),
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::Script(decl) => &decl.name,
            Callable::Native(native) => native.name,
            Callable::Wrapped(wrapper) => wrapper.target().name(),
        }
    }

    /// Formal parameter names; natives expose none.
    pub fn param_names(&self) -> Vec<String> {
        match self {
            Callable::Script(decl) => decl.params.iter().map(|p| p.name.clone()).collect(),
            Callable::Native(_) => Vec::new(),
            Callable::Wrapped(wrapper) => wrapper.target().param_names(),
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self, Callable::Script(_))
    }

    pub fn same_as(&self, other: &Callable) -> bool {
        match (self, other) {
            (Callable::Script(a), Callable::Script(b)) => Rc::ptr_eq(a, b),
            (Callable::Native(a), Callable::Native(b)) => a.name == b.name,
            (Callable::Wrapped(a), Callable::Wrapped(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Script(decl) => write!(f, "<function {}>", decl.name),
            Callable::Native(native) => write!(f, "<native function {}>", native.name),
            Callable::Wrapped(wrapper) => write!(f, "<function {}>", wrapper.target().name()),
        }
    }
}

//=============================================
//            Section 3: Runtime Values
//=============================================

pub type ListRef = Rc<RefCell<Vec<Value>>>;
pub type ObjectRef = Rc<RefCell<BTreeMap<String, Value>>>;

/// SolvraScript runtime value types. Lists and objects are shared by
/// reference; cloning a `Value` aliases the same container.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(ListRef),
    Object(ObjectRef),
    Function(Callable),
}

pub(crate) const MAX_COMPARE_DEPTH: usize = 512;

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn object(entries: BTreeMap<String, Value>) -> Self {
        Value::Object(Rc::new(RefCell::new(entries)))
    }

    /// Check if value is truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Object(entries) => !entries.borrow().is_empty(),
            Value::Function(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Identity of a shared container, used for cycle detection.
    pub fn container_id(&self) -> Option<*const ()> {
        match self {
            Value::List(items) => Some(Rc::as_ptr(items) as *const ()),
            Value::Object(entries) => Some(Rc::as_ptr(entries) as *const ()),
            _ => None,
        }
    }

    /// Quoted rendering used inside containers and by the trace report.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        render(self, true, &mut Vec::new(), &mut out);
        out
    }

    fn equals(&self, other: &Value, depth: usize) -> bool {
        if depth > MAX_COMPARE_DEPTH {
            return false;
        }
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y, depth + 1))
            }
            (Value::Object(a), Value::Object(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.equals(vb, depth + 1))
            }
            (Value::Function(a), Value::Function(b)) => a.same_as(b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other, 0)
    }
}

/// `3.0` keeps its fractional marker; everything else prints as Rust does.
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

pub(crate) fn quote(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
}

fn render(value: &Value, quoted: bool, seen: &mut Vec<*const ()>, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Float(f) => out.push_str(&format_float(*f)),
        Value::String(s) if quoted => quote(s, out),
        Value::String(s) => out.push_str(s),
        Value::Function(callable) => out.push_str(&format!("{:?}", callable)),
        Value::List(items) => {
            let id = Rc::as_ptr(items) as *const ();
            if seen.contains(&id) {
                out.push_str("[...]");
                return;
            }
            seen.push(id);
            out.push('[');
            for (i, item) in items.borrow().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render(item, true, seen, out);
            }
            out.push(']');
            seen.pop();
        }
        Value::Object(entries) => {
            let id = Rc::as_ptr(entries) as *const ();
            if seen.contains(&id) {
                out.push_str("{...}");
                return;
            }
            seen.push(id);
            out.push('{');
            for (i, (key, item)) in entries.borrow().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(key);
                out.push_str(": ");
                render(item, true, seen, out);
            }
            out.push('}');
            seen.pop();
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        render(self, false, &mut Vec::new(), &mut out);
        f.write_str(&out)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_repr() {
        let list = Value::list(vec![
            Value::Int(1),
            Value::Float(2.0),
            Value::String("a".into()),
            Value::Null,
        ]);
        assert_eq!(list.to_string(), "[1, 2.0, \"a\", null]");
        assert_eq!(Value::String("a".into()).to_string(), "a");
        assert_eq!(Value::String("a".into()).repr(), "\"a\"");
    }

    #[test]
    fn self_referencing_list_renders_marker() {
        let list = Value::list(vec![Value::Int(1)]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert_eq!(list.to_string(), "[1, [...]]");
        assert!(list == list.clone());
    }

    #[test]
    fn numeric_equality_crosses_int_and_float() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::String("2".into()));
    }

    #[test]
    fn arity_descriptions() {
        assert!(NativeArity::Range { min: 1, max: None }.accepts(4));
        assert!(!NativeArity::Range { min: 1, max: Some(2) }.accepts(3));
        assert_eq!(NativeArity::Exact(2).describe(), "2 arguments");
    }
}

//=====================================================
// End of file
//=====================================================
