//=====================================================
// File: interpreter/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Tree-walking SolvraScript interpreter for sandboxed units
// Objective: Evaluate parsed programs with call-time name resolution, a
//            bounded call depth, a cooperative execution budget and an
//            in-memory output sink
//=====================================================

//=============================================
// Section 1: Modules & Imports
//=============================================

pub mod budget;
pub mod builtins;
pub mod errors;
pub mod value;

pub use budget::{BudgetExceeded, ExecutionBudget};
pub use errors::{ExceptionKind, RuntimeError, ScriptException};
pub use value::{CallArgs, Callable, FunctionWrapper, NativeArity, NativeFunction, Value};

use crate::ast::{BinaryOp, Expr, FunctionDecl, Literal, Program, Stmt, UnaryOp};
use crate::tokenizer::Position;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::rc::Rc;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;
pub const MODULE_FRAME: &str = "<module>";

// Per-item byte costs charged to the memory budget, sized from the real
// layouts so a full quota matches what the allocator hands out.
pub(crate) const VALUE_SLOT_BYTES: u64 = size_of::<Value>() as u64;
pub(crate) const CONTAINER_BYTES: u64 =
    (size_of::<RefCell<Vec<Value>>>() + 2 * size_of::<usize>()) as u64;
pub(crate) const OBJECT_ENTRY_BYTES: u64 = (size_of::<String>() + size_of::<Value>()) as u64;

//=============================================
//            Section 2: Interpreter State
//=============================================

/// Where `print`/`println` output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Suppress,
    Capture,
}

#[derive(Debug, Clone)]
struct VariableEntry {
    value: Value,
    mutable: bool,
}

type Environment = HashMap<String, VariableEntry>;

/// One active call. Scopes belong to the frame so callees never see the
/// caller's locals.
struct Frame {
    function: String,
    scopes: Vec<Environment>,
}

pub struct Interpreter {
    globals: Environment,
    frames: Vec<Frame>,
    builtins: HashMap<&'static str, NativeFunction>,
    max_call_depth: usize,
    current_line: usize,
    budget: ExecutionBudget,
    output_mode: OutputMode,
    output: String,
    input_lines: VecDeque<String>,
}

impl Interpreter {
    pub fn new() -> Self {
        let mut interpreter = Self {
            globals: HashMap::new(),
            frames: vec![Frame {
                function: MODULE_FRAME.to_string(),
                scopes: Vec::new(),
            }],
            builtins: HashMap::new(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            current_line: 0,
            budget: ExecutionBudget::new(),
            output_mode: OutputMode::default(),
            output: String::new(),
            input_lines: VecDeque::new(),
        };
        interpreter.init_builtins();
        interpreter
    }

    pub fn set_max_call_depth(&mut self, depth: usize) {
        self.max_call_depth = depth;
    }

    pub fn budget(&self) -> &ExecutionBudget {
        &self.budget
    }

    pub fn budget_mut(&mut self) -> &mut ExecutionBudget {
        &mut self.budget
    }

    pub fn set_output_mode(&mut self, mode: OutputMode) {
        self.output_mode = mode;
        self.output.clear();
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Lines later returned one by one from `input()`.
    pub fn set_input(&mut self, payload: &str) {
        self.input_lines = payload.lines().map(str::to_string).collect();
    }

    pub(crate) fn next_input_line(&mut self) -> Option<String> {
        self.input_lines.pop_front()
    }

    //=============================================
    //            Section 3: Globals
    //=============================================

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).map(|entry| entry.value.clone())
    }

    pub fn global_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.globals.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    /// Swap the value bound to an existing global, ignoring mutability.
    /// Returns the previous value.
    pub fn replace_global(&mut self, name: &str, value: Value) -> Option<Value> {
        let entry = self.globals.get_mut(name)?;
        Some(std::mem::replace(&mut entry.value, value))
    }

    //=============================================
    //            Section 4: Faults & Budget
    //=============================================

    pub fn current_function(&self) -> &str {
        self.frames
            .last()
            .map(|frame| frame.function.as_str())
            .unwrap_or(MODULE_FRAME)
    }

    pub fn current_line(&self) -> usize {
        self.current_line
    }

    /// Build an exception attributed to the current line and frame.
    pub fn raise(&self, kind: ExceptionKind, detail: impl Into<String>) -> RuntimeError {
        RuntimeError::Exception(ScriptException {
            kind,
            detail: detail.into(),
            line: self.current_line,
            function: self.current_function().to_string(),
        })
    }

    fn raise_at(
        &mut self,
        position: Position,
        kind: ExceptionKind,
        detail: impl Into<String>,
    ) -> RuntimeError {
        self.current_line = position.line;
        self.raise(kind, detail)
    }

    fn budget_fault(&self, exceeded: BudgetExceeded) -> RuntimeError {
        match exceeded {
            BudgetExceeded::Deadline { elapsed } => self.raise(
                ExceptionKind::TimeoutError,
                format!("time limit exceeded after {} ms", elapsed.as_millis()),
            ),
            BudgetExceeded::Memory { limit, .. } => self.raise(
                ExceptionKind::MemoryError,
                format!("memory limit of {} bytes exceeded", limit),
            ),
        }
    }

    pub(crate) fn tick(&mut self) -> Result<(), RuntimeError> {
        self.budget.tick().map_err(|e| self.budget_fault(e))
    }

    /// Charge `bytes` against the ceiling. When the running estimate would
    /// overflow, live memory is measured first so values that have since
    /// been dropped stop counting.
    pub(crate) fn charge(&mut self, bytes: u64) -> Result<(), RuntimeError> {
        if self.budget.should_measure(bytes) {
            let live = self.live_bytes();
            self.budget.settle(live);
        }
        self.budget.charge(bytes).map_err(|e| self.budget_fault(e))
    }

    /// Bytes held by everything reachable from variables, plus buffered
    /// output and input. Shared containers count once; the walk keeps its
    /// own stack so deep nesting cannot overflow it.
    pub(crate) fn live_bytes(&self) -> u64 {
        let mut seen: HashSet<*const ()> = HashSet::new();
        let mut pending: Vec<Value> = Vec::new();
        let mut total = self.output.len() as u64
            + self.input_lines.iter().map(|l| l.len() as u64).sum::<u64>();

        let environments = std::iter::once(&self.globals)
            .chain(self.frames.iter().flat_map(|frame| frame.scopes.iter()));
        for environment in environments {
            for (name, entry) in environment {
                total += name.len() as u64;
                total += held_bytes(&entry.value, &mut seen, &mut pending);
            }
        }

        while let Some(container) = pending.pop() {
            match &container {
                Value::List(items) => {
                    if let Ok(items) = items.try_borrow() {
                        for item in items.iter() {
                            total += held_bytes(item, &mut seen, &mut pending);
                        }
                    }
                }
                Value::Object(entries) => {
                    if let Ok(entries) = entries.try_borrow() {
                        for (key, value) in entries.iter() {
                            total += key.len() as u64;
                            total += held_bytes(value, &mut seen, &mut pending);
                        }
                    }
                }
                _ => {}
            }
        }
        total
    }

    pub(crate) fn charge_items(&mut self, count: usize) -> Result<(), RuntimeError> {
        self.charge(CONTAINER_BYTES.saturating_add(VALUE_SLOT_BYTES.saturating_mul(count as u64)))
    }

    pub(crate) fn write_output(&mut self, text: &str) -> Result<(), RuntimeError> {
        if self.output_mode == OutputMode::Capture {
            self.charge(text.len() as u64)?;
            self.output.push_str(text);
        }
        Ok(())
    }

    //=============================================
    //            Section 5: Program Execution
    //=============================================

    /// Run top-level statements, binding functions and globals.
    pub fn execute_program(&mut self, program: &Program) -> Result<(), RuntimeError> {
        for stmt in &program.statements {
            match self.execute_statement(stmt) {
                Ok(()) => {}
                Err(RuntimeError::Return(_)) => break,
                Err(RuntimeError::Break) | Err(RuntimeError::Continue) => {
                    return Err(self.raise_at(
                        stmt.position(),
                        ExceptionKind::TypeError,
                        "'break' or 'continue' outside loop",
                    ));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn execute_statement(&mut self, stmt: &Stmt) -> Result<(), RuntimeError> {
        self.current_line = stmt.position().line;
        self.tick()?;

        match stmt {
            Stmt::VariableDecl {
                name,
                is_mutable,
                initializer,
                ..
            } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Null,
                };
                self.define_variable(name.clone(), value, *is_mutable);
                Ok(())
            }

            Stmt::FunctionDecl { decl } => {
                self.define_variable(
                    decl.name.clone(),
                    Value::Function(Callable::Script(decl.clone())),
                    false,
                );
                Ok(())
            }

            Stmt::Expression { expr, .. } => {
                self.evaluate(expr)?;
                Ok(())
            }

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Null,
                };
                Err(RuntimeError::Return(value))
            }

            Stmt::Break { .. } => Err(RuntimeError::Break),
            Stmt::Continue { .. } => Err(RuntimeError::Continue),

            Stmt::Block { statements, .. } => self.execute_block(statements, None),

            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute_statement(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute_statement(else_branch)
                } else {
                    Ok(())
                }
            }

            Stmt::While {
                condition, body, ..
            } => {
                loop {
                    self.tick()?;
                    if !self.evaluate(condition)?.is_truthy() {
                        break;
                    }
                    match self.execute_statement(body) {
                        Ok(()) | Err(RuntimeError::Continue) => {}
                        Err(RuntimeError::Break) => break,
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            }

            Stmt::For {
                variable,
                iterable,
                body,
                position,
            } => {
                let iterable = self.evaluate(iterable)?;
                let items = self.iteration_items(&iterable, *position)?;
                for item in items {
                    self.tick()?;
                    let binding = (variable.clone(), item);
                    match self.execute_loop_body(body, binding) {
                        Ok(()) | Err(RuntimeError::Continue) => {}
                        Err(RuntimeError::Break) => break,
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            }

            Stmt::Try {
                try_block,
                variable,
                catch_block,
                ..
            } => match self.execute_statement(try_block) {
                Err(RuntimeError::Exception(exception)) if !exception.kind.is_fatal() => {
                    let binding = variable
                        .as_ref()
                        .map(|name| (name.clone(), Value::String(exception.message())));
                    self.execute_loop_body(catch_block, binding)
                }
                other => other,
            },

            Stmt::Panic { message, position } => {
                let detail = match message {
                    Some(expr) => self.evaluate(expr)?.to_string(),
                    None => "explicit panic".to_string(),
                };
                Err(self.raise_at(*position, ExceptionKind::Panic, detail))
            }
        }
    }

    fn execute_block(
        &mut self,
        statements: &[Stmt],
        binding: Option<(String, Value)>,
    ) -> Result<(), RuntimeError> {
        self.push_scope();
        if let Some((name, value)) = binding {
            self.define_variable(name, value, true);
        }
        let mut result = Ok(());
        for stmt in statements {
            if let Err(e) = self.execute_statement(stmt) {
                result = Err(e);
                break;
            }
        }
        self.pop_scope();
        result
    }

    /// Loop and catch bodies get a fresh scope holding their binding.
    fn execute_loop_body(
        &mut self,
        body: &Stmt,
        binding: impl Into<Option<(String, Value)>>,
    ) -> Result<(), RuntimeError> {
        match body {
            Stmt::Block { statements, .. } => self.execute_block(statements, binding.into()),
            other => {
                self.push_scope();
                if let Some((name, value)) = binding.into() {
                    self.define_variable(name, value, true);
                }
                let result = self.execute_statement(other);
                self.pop_scope();
                result
            }
        }
    }

    fn iteration_items(
        &mut self,
        iterable: &Value,
        position: Position,
    ) -> Result<Vec<Value>, RuntimeError> {
        match iterable {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::String(s) => {
                self.charge_items(s.len())?;
                Ok(s.chars().map(|c| Value::String(c.to_string())).collect())
            }
            Value::Object(entries) => Ok(entries
                .borrow()
                .keys()
                .map(|k| Value::String(k.clone()))
                .collect()),
            other => Err(self.raise_at(
                position,
                ExceptionKind::TypeError,
                format!("'{}' object is not iterable", other.type_name()),
            )),
        }
    }

    //=============================================
    //            Section 6: Expressions
    //=============================================

    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Literal { value, .. } => match value {
                Literal::Integer(n) => Ok(Value::Int(*n)),
                Literal::Float(f) => Ok(Value::Float(*f)),
                Literal::Boolean(b) => Ok(Value::Bool(*b)),
                Literal::Null => Ok(Value::Null),
                Literal::String(s) => {
                    self.charge(s.len() as u64)?;
                    Ok(Value::String(s.clone()))
                }
            },

            Expr::Array { elements, .. } => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.evaluate(element)?);
                }
                self.charge_items(items.len())?;
                Ok(Value::list(items))
            }

            Expr::Object { properties, .. } => {
                let mut entries = BTreeMap::new();
                for (key, value) in properties {
                    let value = self.evaluate(value)?;
                    entries.insert(key.clone(), value);
                }
                self.charge(CONTAINER_BYTES + OBJECT_ENTRY_BYTES * entries.len() as u64)?;
                Ok(Value::object(entries))
            }

            Expr::Identifier { name, position } => self.lookup(name, *position),

            Expr::Binary {
                left,
                operator,
                right,
                position,
            } => match operator {
                BinaryOp::And => {
                    let left = self.evaluate(left)?;
                    if !left.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                    Ok(Value::Bool(self.evaluate(right)?.is_truthy()))
                }
                BinaryOp::Or => {
                    let left = self.evaluate(left)?;
                    if left.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                    Ok(Value::Bool(self.evaluate(right)?.is_truthy()))
                }
                op => {
                    let left = self.evaluate(left)?;
                    let right = self.evaluate(right)?;
                    self.binary_op(*op, left, right, *position)
                }
            },

            Expr::Unary {
                operator,
                operand,
                position,
            } => {
                let value = self.evaluate(operand)?;
                match (operator, value) {
                    (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
                    (UnaryOp::Minus, Value::Int(n)) => n.checked_neg().map(Value::Int).ok_or_else(
                        || self.raise_at(*position, ExceptionKind::ValueError, "integer overflow"),
                    ),
                    (UnaryOp::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
                    (UnaryOp::Minus, other) => Err(self.raise_at(
                        *position,
                        ExceptionKind::TypeError,
                        format!("bad operand type for unary -: '{}'", other.type_name()),
                    )),
                }
            }

            Expr::Call {
                callee,
                args,
                position,
            } => {
                let callee = self.evaluate(callee)?;
                let mut call_args = CallArgs::default();
                for arg in args {
                    let value = self.evaluate(&arg.value)?;
                    match &arg.name {
                        Some(name) => call_args.keywords.push((name.clone(), value)),
                        None => call_args.positional.push(value),
                    }
                }
                self.current_line = position.line;
                self.call_value(&callee, call_args)
            }

            Expr::Index {
                object,
                index,
                position,
            } => {
                let object = self.evaluate(object)?;
                let index = self.evaluate(index)?;
                self.index_value(&object, &index, *position)
            }

            Expr::Member {
                object,
                property,
                position,
            } => {
                let object = self.evaluate(object)?;
                self.member_value(&object, property, *position)
            }

            Expr::Assignment {
                target,
                operator,
                value,
                position,
            } => self.assign(target, *operator, value, *position),
        }
    }

    fn assign(
        &mut self,
        target: &Expr,
        operator: Option<BinaryOp>,
        value: &Expr,
        position: Position,
    ) -> Result<Value, RuntimeError> {
        match target {
            Expr::Identifier {
                name,
                position: target_position,
            } => {
                let rhs = self.evaluate(value)?;
                let new_value = match operator {
                    Some(op) => {
                        let current = self.lookup(name, *target_position)?;
                        self.binary_op(op, current, rhs, position)?
                    }
                    None => rhs,
                };
                self.assign_variable(name, new_value.clone(), *target_position)?;
                Ok(new_value)
            }
            Expr::Index {
                object,
                index,
                position: target_position,
            } => {
                let container = self.evaluate(object)?;
                let key = self.evaluate(index)?;
                let rhs = self.evaluate(value)?;
                let new_value = match operator {
                    Some(op) => {
                        let current = self.index_value(&container, &key, *target_position)?;
                        self.binary_op(op, current, rhs, position)?
                    }
                    None => rhs,
                };
                self.store_index(&container, key, new_value.clone(), *target_position)?;
                Ok(new_value)
            }
            Expr::Member {
                object,
                property,
                position: target_position,
            } => {
                let container = self.evaluate(object)?;
                let rhs = self.evaluate(value)?;
                let new_value = match operator {
                    Some(op) => {
                        let current = self.member_value(&container, property, *target_position)?;
                        self.binary_op(op, current, rhs, position)?
                    }
                    None => rhs,
                };
                let key = Value::String(property.clone());
                self.store_index(&container, key, new_value.clone(), *target_position)?;
                Ok(new_value)
            }
            other => Err(self.raise_at(
                other.position(),
                ExceptionKind::TypeError,
                "invalid assignment target",
            )),
        }
    }

    fn index_value(
        &mut self,
        object: &Value,
        index: &Value,
        position: Position,
    ) -> Result<Value, RuntimeError> {
        match (object, index) {
            (Value::List(items), Value::Int(i)) => {
                let items = items.borrow();
                match normalize_index(*i, items.len()) {
                    Some(idx) => Ok(items[idx].clone()),
                    None => Err(self.raise_at(
                        position,
                        ExceptionKind::IndexError,
                        format!("list index {} out of range for length {}", i, items.len()),
                    )),
                }
            }
            (Value::String(s), Value::Int(i)) => {
                let count = s.chars().count();
                match normalize_index(*i, count).and_then(|idx| s.chars().nth(idx)) {
                    Some(ch) => Ok(Value::String(ch.to_string())),
                    None => Err(self.raise_at(
                        position,
                        ExceptionKind::IndexError,
                        format!("string index {} out of range for length {}", i, count),
                    )),
                }
            }
            (Value::Object(entries), Value::String(key)) => {
                let found = entries.borrow().get(key).cloned();
                found.ok_or_else(|| {
                    self.raise_at(
                        position,
                        ExceptionKind::KeyError,
                        format!("key \"{}\" not found", key),
                    )
                })
            }
            (Value::List(_) | Value::String(_), other) => Err(self.raise_at(
                position,
                ExceptionKind::TypeError,
                format!("indices must be int, not {}", other.type_name()),
            )),
            (Value::Object(_), other) => Err(self.raise_at(
                position,
                ExceptionKind::TypeError,
                format!("object keys must be string, not {}", other.type_name()),
            )),
            (other, _) => Err(self.raise_at(
                position,
                ExceptionKind::TypeError,
                format!("'{}' object is not subscriptable", other.type_name()),
            )),
        }
    }

    fn member_value(
        &mut self,
        object: &Value,
        property: &str,
        position: Position,
    ) -> Result<Value, RuntimeError> {
        match object {
            Value::Object(_) => {
                self.index_value(object, &Value::String(property.to_string()), position)
            }
            other => Err(self.raise_at(
                position,
                ExceptionKind::TypeError,
                format!("'{}' object has no attribute '{}'", other.type_name(), property),
            )),
        }
    }

    fn store_index(
        &mut self,
        container: &Value,
        key: Value,
        value: Value,
        position: Position,
    ) -> Result<(), RuntimeError> {
        match (container, key) {
            (Value::List(items), Value::Int(i)) => {
                let len = items.borrow().len();
                match normalize_index(i, len) {
                    Some(idx) => {
                        items.borrow_mut()[idx] = value;
                        Ok(())
                    }
                    None => Err(self.raise_at(
                        position,
                        ExceptionKind::IndexError,
                        format!("list assignment index {} out of range for length {}", i, len),
                    )),
                }
            }
            (Value::Object(entries), Value::String(key)) => {
                if !entries.borrow().contains_key(&key) {
                    self.charge(OBJECT_ENTRY_BYTES + key.len() as u64)?;
                }
                entries.borrow_mut().insert(key, value);
                Ok(())
            }
            (container, key) => Err(self.raise_at(
                position,
                ExceptionKind::TypeError,
                format!(
                    "cannot assign into '{}' with key of type '{}'",
                    container.type_name(),
                    key.type_name()
                ),
            )),
        }
    }

    //=============================================
    //            Section 7: Operators
    //=============================================

    fn binary_op(
        &mut self,
        op: BinaryOp,
        left: Value,
        right: Value,
        position: Position,
    ) -> Result<Value, RuntimeError> {
        use Value::*;

        let overflow = |interp: &mut Self| {
            interp.raise_at(position, ExceptionKind::ValueError, "integer overflow")
        };

        match op {
            BinaryOp::Add => match (left, right) {
                (Int(a), Int(b)) => a.checked_add(b).map(Int).ok_or_else(|| overflow(self)),
                (String(a), b) => {
                    let b = b.to_string();
                    self.charge((a.len() + b.len()) as u64)?;
                    Ok(String(a + &b))
                }
                (a, String(b)) => {
                    let a = a.to_string();
                    self.charge((a.len() + b.len()) as u64)?;
                    Ok(String(a + &b))
                }
                (List(a), List(b)) => {
                    let mut joined = a.borrow().clone();
                    joined.extend(b.borrow().iter().cloned());
                    self.charge_items(joined.len())?;
                    Ok(Value::list(joined))
                }
                (a, b) => self.float_op(op, a, b, position),
            },
            BinaryOp::Subtract => match (left, right) {
                (Int(a), Int(b)) => a.checked_sub(b).map(Int).ok_or_else(|| overflow(self)),
                (a, b) => self.float_op(op, a, b, position),
            },
            BinaryOp::Multiply => match (left, right) {
                (Int(a), Int(b)) => a.checked_mul(b).map(Int).ok_or_else(|| overflow(self)),
                (String(s), Int(n)) | (Int(n), String(s)) => {
                    let times = n.max(0) as u64;
                    self.charge((s.len() as u64).saturating_mul(times))?;
                    Ok(String(s.repeat(times as usize)))
                }
                (List(items), Int(n)) | (Int(n), List(items)) => {
                    let base = items.borrow().clone();
                    if base.is_empty() || n <= 0 {
                        self.charge_items(0)?;
                        return Ok(Value::list(Vec::new()));
                    }
                    let times = n as u64;
                    let total = (base.len() as u64).saturating_mul(times);
                    self.charge_items(usize::try_from(total).unwrap_or(usize::MAX))?;
                    let mut repeated = Vec::with_capacity(total as usize);
                    for _ in 0..times {
                        self.tick()?;
                        repeated.extend(base.iter().cloned());
                    }
                    Ok(Value::list(repeated))
                }
                (a, b) => self.float_op(op, a, b, position),
            },
            BinaryOp::Divide => match (left, right) {
                (Int(_), Int(0)) => Err(self.raise_at(
                    position,
                    ExceptionKind::ZeroDivisionError,
                    "division by zero",
                )),
                (Int(a), Int(b)) => a.checked_div(b).map(Int).ok_or_else(|| overflow(self)),
                (a, b) => self.float_op(op, a, b, position),
            },
            BinaryOp::Modulo => match (left, right) {
                (Int(_), Int(0)) => Err(self.raise_at(
                    position,
                    ExceptionKind::ZeroDivisionError,
                    "modulo by zero",
                )),
                (Int(a), Int(b)) => a.checked_rem(b).map(Int).ok_or_else(|| overflow(self)),
                (a, b) => self.float_op(op, a, b, position),
            },
            BinaryOp::Equal => Ok(Bool(left == right)),
            BinaryOp::NotEqual => Ok(Bool(left != right)),
            BinaryOp::Less | BinaryOp::Greater | BinaryOp::LessEqual | BinaryOp::GreaterEqual => {
                let ordering = match (&left, &right) {
                    (String(a), String(b)) => Some(a.cmp(b)),
                    (Int(a), Int(b)) => Some(a.cmp(b)),
                    _ => match (numeric(&left), numeric(&right)) {
                        (Some(a), Some(b)) => a.partial_cmp(&b),
                        _ => None,
                    },
                };
                let Some(ordering) = ordering else {
                    return Err(self.raise_at(
                        position,
                        ExceptionKind::TypeError,
                        format!(
                            "'{}' not supported between '{}' and '{}'",
                            comparison_symbol(op),
                            left.type_name(),
                            right.type_name()
                        ),
                    ));
                };
                Ok(Bool(match op {
                    BinaryOp::Less => ordering.is_lt(),
                    BinaryOp::Greater => ordering.is_gt(),
                    BinaryOp::LessEqual => ordering.is_le(),
                    _ => ordering.is_ge(),
                }))
            }
            BinaryOp::And | BinaryOp::Or => {
                let result = match op {
                    BinaryOp::And => left.is_truthy() && right.is_truthy(),
                    _ => left.is_truthy() || right.is_truthy(),
                };
                Ok(Bool(result))
            }
        }
    }

    /// Mixed int/float arithmetic once the integer fast paths are exhausted.
    fn float_op(
        &mut self,
        op: BinaryOp,
        left: Value,
        right: Value,
        position: Position,
    ) -> Result<Value, RuntimeError> {
        let (Some(a), Some(b)) = (numeric(&left), numeric(&right)) else {
            return Err(self.raise_at(
                position,
                ExceptionKind::TypeError,
                format!(
                    "unsupported operand types for {}: '{}' and '{}'",
                    operator_symbol(op),
                    left.type_name(),
                    right.type_name()
                ),
            ));
        };
        match op {
            BinaryOp::Add => Ok(Value::Float(a + b)),
            BinaryOp::Subtract => Ok(Value::Float(a - b)),
            BinaryOp::Multiply => Ok(Value::Float(a * b)),
            BinaryOp::Divide | BinaryOp::Modulo if b == 0.0 => Err(self.raise_at(
                position,
                ExceptionKind::ZeroDivisionError,
                "float division by zero",
            )),
            BinaryOp::Divide => Ok(Value::Float(a / b)),
            BinaryOp::Modulo => Ok(Value::Float(a % b)),
            _ => Err(self.raise_at(
                position,
                ExceptionKind::TypeError,
                format!("unsupported operator {}", operator_symbol(op)),
            )),
        }
    }

    //=============================================
    //            Section 8: Calls
    //=============================================

    pub fn call_value(&mut self, callee: &Value, args: CallArgs) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(callable) => self.call_callable(callable, args),
            other => Err(self.raise(
                ExceptionKind::TypeError,
                format!("'{}' object is not callable", other.type_name()),
            )),
        }
    }

    pub fn call_callable(
        &mut self,
        callable: &Callable,
        args: CallArgs,
    ) -> Result<Value, RuntimeError> {
        match callable {
            Callable::Script(decl) => self.call_script(decl, args),
            Callable::Native(native) => self.call_native(native, args),
            Callable::Wrapped(wrapper) => {
                let wrapper = Rc::clone(wrapper);
                wrapper.invoke(self, args)
            }
        }
    }

    fn call_native(
        &mut self,
        native: &NativeFunction,
        args: CallArgs,
    ) -> Result<Value, RuntimeError> {
        self.tick()?;
        if !native.arity.accepts(args.positional.len()) {
            return Err(self.raise(
                ExceptionKind::ArgumentError,
                format!(
                    "{}() expects {}, got {}",
                    native.name,
                    native.arity.describe(),
                    args.positional.len()
                ),
            ));
        }
        if let Some((name, _)) = args
            .keywords
            .iter()
            .find(|(name, _)| !native.keywords.contains(&name.as_str()))
        {
            return Err(self.raise(
                ExceptionKind::ArgumentError,
                format!("{}() got an unexpected keyword argument '{}'", native.name, name),
            ));
        }
        (native.func)(self, args)
    }

    fn call_script(
        &mut self,
        decl: &Rc<FunctionDecl>,
        args: CallArgs,
    ) -> Result<Value, RuntimeError> {
        if self.frames.len() > self.max_call_depth {
            return Err(self.raise(
                ExceptionKind::RecursionError,
                format!("maximum call depth of {} exceeded", self.max_call_depth),
            ));
        }
        self.tick()?;

        let caller_line = self.current_line;
        let (bound, missing) = self.bind_arguments(decl, args)?;

        self.frames.push(Frame {
            function: decl.name.clone(),
            scopes: vec![bound],
        });

        let result = self.run_function_body(decl, missing);

        self.frames.pop();
        self.current_line = caller_line;
        result
    }

    fn run_function_body(
        &mut self,
        decl: &FunctionDecl,
        missing: Vec<usize>,
    ) -> Result<Value, RuntimeError> {
        // Defaults are evaluated in the callee frame, after the passed arguments.
        for index in missing {
            let param = &decl.params[index];
            if let Some(default) = &param.default_value {
                self.current_line = param.position.line;
                let value = self.evaluate(default)?;
                self.define_variable(param.name.clone(), value, true);
            }
        }

        for stmt in decl.body.iter() {
            match self.execute_statement(stmt) {
                Ok(()) => {}
                Err(RuntimeError::Return(value)) => return Ok(value),
                Err(RuntimeError::Break) | Err(RuntimeError::Continue) => {
                    return Err(self.raise_at(
                        stmt.position(),
                        ExceptionKind::TypeError,
                        "'break' or 'continue' outside loop",
                    ));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Value::Null)
    }

    /// Match positional and keyword arguments to parameters. Returns the bound
    /// scope plus the indices of parameters left to their defaults.
    fn bind_arguments(
        &mut self,
        decl: &FunctionDecl,
        args: CallArgs,
    ) -> Result<(Environment, Vec<usize>), RuntimeError> {
        let params = &decl.params;
        if args.positional.len() > params.len() {
            return Err(self.raise(
                ExceptionKind::ArgumentError,
                format!(
                    "{}() takes {} positional arguments but {} were given",
                    decl.name,
                    params.len(),
                    args.positional.len()
                ),
            ));
        }

        let mut slots: Vec<Option<Value>> = vec![None; params.len()];
        for (slot, value) in slots.iter_mut().zip(args.positional) {
            *slot = Some(value);
        }
        for (name, value) in args.keywords {
            let Some(index) = params.iter().position(|p| p.name == name) else {
                return Err(self.raise(
                    ExceptionKind::ArgumentError,
                    format!("{}() got an unexpected keyword argument '{}'", decl.name, name),
                ));
            };
            if slots[index].is_some() {
                return Err(self.raise(
                    ExceptionKind::ArgumentError,
                    format!("{}() got multiple values for argument '{}'", decl.name, name),
                ));
            }
            slots[index] = Some(value);
        }

        let mut scope = Environment::new();
        let mut missing = Vec::new();
        for (index, (param, slot)) in params.iter().zip(slots).enumerate() {
            match slot {
                Some(value) => {
                    scope.insert(
                        param.name.clone(),
                        VariableEntry {
                            value,
                            mutable: true,
                        },
                    );
                }
                None if param.default_value.is_some() => missing.push(index),
                None => {
                    return Err(self.raise(
                        ExceptionKind::ArgumentError,
                        format!("{}() missing required argument '{}'", decl.name, param.name),
                    ));
                }
            }
        }
        Ok((scope, missing))
    }

    //=============================================
    //            Section 9: Environment Management
    //=============================================

    fn push_scope(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.scopes.push(Environment::new());
        }
    }

    fn pop_scope(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.scopes.pop();
        }
    }

    fn define_variable(&mut self, name: String, value: Value, mutable: bool) {
        let entry = VariableEntry { value, mutable };
        match self.frames.last_mut().and_then(|f| f.scopes.last_mut()) {
            Some(scope) => {
                scope.insert(name, entry);
            }
            None => {
                self.globals.insert(name, entry);
            }
        }
    }

    fn assign_variable(
        &mut self,
        name: &str,
        value: Value,
        position: Position,
    ) -> Result<(), RuntimeError> {
        let local = self
            .frames
            .last_mut()
            .and_then(|frame| frame.scopes.iter_mut().rev().find_map(|s| s.get_mut(name)));
        let entry = match local {
            Some(entry) => Some(entry),
            None => self.globals.get_mut(name),
        };
        let immutable = match entry {
            Some(entry) if entry.mutable => {
                entry.value = value;
                return Ok(());
            }
            Some(_) => true,
            None => false,
        };
        if immutable {
            Err(self.raise_at(
                position,
                ExceptionKind::TypeError,
                format!("cannot assign to immutable variable '{}'", name),
            ))
        } else {
            Err(self.raise_at(
                position,
                ExceptionKind::NameError,
                format!("name '{}' is not defined", name),
            ))
        }
    }

    /// Locals of the current frame, then unit globals, then builtins.
    fn lookup(&mut self, name: &str, position: Position) -> Result<Value, RuntimeError> {
        if let Some(frame) = self.frames.last() {
            for scope in frame.scopes.iter().rev() {
                if let Some(entry) = scope.get(name) {
                    return Ok(entry.value.clone());
                }
            }
        }
        if let Some(entry) = self.globals.get(name) {
            return Ok(entry.value.clone());
        }
        if let Some(native) = self.builtins.get(name) {
            return Ok(Value::Function(Callable::Native(*native)));
        }
        Err(self.raise_at(
            position,
            ExceptionKind::NameError,
            format!("name '{}' is not defined", name),
        ))
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytes a value owns directly, queueing unseen containers for the walk.
fn held_bytes(value: &Value, seen: &mut HashSet<*const ()>, pending: &mut Vec<Value>) -> u64 {
    match value {
        Value::String(s) => s.len() as u64,
        Value::List(items) => match value.container_id() {
            Some(id) if seen.insert(id) => {
                let len = items.try_borrow().map(|items| items.len()).unwrap_or(0) as u64;
                pending.push(value.clone());
                CONTAINER_BYTES + VALUE_SLOT_BYTES * len
            }
            _ => 0,
        },
        Value::Object(entries) => match value.container_id() {
            Some(id) if seen.insert(id) => {
                let len = entries.try_borrow().map(|entries| entries.len()).unwrap_or(0) as u64;
                pending.push(value.clone());
                CONTAINER_BYTES + OBJECT_ENTRY_BYTES * len
            }
            _ => 0,
        },
        _ => 0,
    }
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let idx = if index < 0 { index + len } else { index };
    (0..len).contains(&idx).then_some(idx as usize)
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn operator_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Subtract => "-",
        BinaryOp::Multiply => "*",
        BinaryOp::Divide => "/",
        BinaryOp::Modulo => "%",
        other => comparison_symbol(other),
    }
}

fn comparison_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Less => "<",
        BinaryOp::Greater => ">",
        BinaryOp::LessEqual => "<=",
        BinaryOp::GreaterEqual => ">=",
        BinaryOp::Equal => "==",
        BinaryOp::NotEqual => "!=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn run(source: &str) -> Interpreter {
        let program = parse_source(source).expect("parse");
        let mut interpreter = Interpreter::new();
        interpreter.set_output_mode(OutputMode::Capture);
        interpreter.execute_program(&program).expect("execute");
        interpreter
    }

    fn call(interpreter: &mut Interpreter, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let callee = interpreter.global(name).expect("function defined");
        interpreter.call_value(&callee, CallArgs::positional(args))
    }

    #[test]
    fn shared_and_cyclic_containers_are_measured_once() {
        let single = run("let xs = [1, 2, 3]").live_bytes();
        let shared = run("let xs = [1, 2, 3]\nlet ys = xs\npush(xs, xs)").live_bytes();
        // One extra name and one extra slot. The list itself counts once.
        assert_eq!(shared, single + 2 + VALUE_SLOT_BYTES);
    }

    #[test]
    fn arithmetic_and_calls() {
        let mut interp = run("fn add(a, b = 10) { return a + b }");
        assert_eq!(call(&mut interp, "add", vec![Value::Int(1)]).expect("call"), Value::Int(11));
        assert_eq!(
            call(&mut interp, "add", vec![Value::Int(1), Value::Int(2)]).expect("call"),
            Value::Int(3)
        );
    }

    #[test]
    fn keyword_arguments_bind_by_name() {
        let program = parse_source("fn f(a, b = 1, c = 2) { return a * 100 + b * 10 + c }\nlet r = f(3, c: 5)")
            .expect("parse");
        let mut interp = Interpreter::new();
        interp.execute_program(&program).expect("execute");
        assert_eq!(interp.global("r"), Some(Value::Int(315)));
    }

    #[test]
    fn lists_are_shared_by_reference() {
        let mut interp = run("fn grow(xs) { push(xs, 4) }\nlet items = [1, 2, 3]\ngrow(items)");
        assert_eq!(interp.global("items").map(|v| v.to_string()), Some("[1, 2, 3, 4]".to_string()));
        assert!(interp.take_output().is_empty());
    }

    #[test]
    fn exception_carries_deepest_frame() {
        let mut interp = run("fn pick(xs) {\n  return xs[5]\n}\nfn main(s) {\n  return pick([1])\n}");
        let err = call(&mut interp, "main", vec![Value::String("x".into())]).expect_err("index fault");
        let exception = err.exception().expect("exception").clone();
        assert_eq!(exception.kind, ExceptionKind::IndexError);
        assert_eq!(exception.function, "pick");
        assert_eq!(exception.line, 2);
    }

    #[test]
    fn try_catch_binds_message_but_not_fatal_faults() {
        let interp = run("let mut msg = \"\"\ntry {\n  let x = 1 / 0\n} catch e {\n  msg = e\n}");
        assert_eq!(
            interp.global("msg"),
            Some(Value::String("ZeroDivisionError: division by zero".into()))
        );
    }

    #[test]
    fn recursion_depth_is_bounded() {
        let mut interp = run("fn down(n) { return down(n + 1) }");
        interp.set_max_call_depth(50);
        let err = call(&mut interp, "down", vec![Value::Int(0)]).expect_err("too deep");
        assert_eq!(err.exception().map(|e| e.kind), Some(ExceptionKind::RecursionError));
    }

    #[test]
    fn integer_overflow_is_value_error() {
        let mut interp = run("fn big(n) { return n * n }");
        let err = call(&mut interp, "big", vec![Value::Int(i64::MAX)]).expect_err("overflow");
        assert_eq!(err.exception().map(|e| e.kind), Some(ExceptionKind::ValueError));
    }

    #[test]
    fn callee_resolution_happens_at_call_time() {
        let mut interp = run("fn inner() { return 1 }\nfn outer() { return inner() }\nfn other() { return 2 }");
        let other = interp.global("other").expect("other");
        interp.replace_global("inner", other);
        assert_eq!(call(&mut interp, "outer", vec![]).expect("call"), Value::Int(2));
    }

    #[test]
    fn callee_does_not_see_caller_locals() {
        let mut interp = run("fn peek() { return hidden }\nfn main() { let hidden = 1\n return peek() }");
        let err = call(&mut interp, "main", vec![]).expect_err("name error");
        let exception = err.exception().expect("exception");
        assert_eq!(exception.kind, ExceptionKind::NameError);
        assert_eq!(exception.function, "peek");
    }

    #[test]
    fn memory_limit_trips_before_allocation() {
        let mut interp = run("fn blow() { return \"ab\" * 1000000 }");
        interp.budget_mut().set_memory_limit(Some(1024));
        let err = call(&mut interp, "blow", vec![]).expect_err("memory");
        assert!(err.is_fatal());
        assert_eq!(err.exception().map(|e| e.kind), Some(ExceptionKind::MemoryError));
    }
}

//=====================================================
// End of file
//=====================================================
