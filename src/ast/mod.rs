//=====================================================
// File: ast/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: SolvraScript Abstract Syntax Tree definitions
// Objective: Define AST node types for candidate units: statements,
//            expressions and top-level function declarations
//=====================================================

use crate::tokenizer::Position;
use std::rc::Rc;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    And,
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Minus,
}

/// Literal values
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
}

/// A call argument; `name` is set for keyword arguments (`f(sep: ",")`).
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal {
        value: Literal,
        position: Position,
    },
    Array {
        elements: Vec<Expr>,
        position: Position,
    },
    Object {
        properties: Vec<(String, Expr)>,
        position: Position,
    },
    Identifier {
        name: String,
        position: Position,
    },
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
        position: Position,
    },
    Unary {
        operator: UnaryOp,
        operand: Box<Expr>,
        position: Position,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Argument>,
        position: Position,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        position: Position,
    },
    Member {
        object: Box<Expr>,
        property: String,
        position: Position,
    },
    /// `target = value`, or `target op= value` when `operator` is set.
    Assignment {
        target: Box<Expr>,
        operator: Option<BinaryOp>,
        value: Box<Expr>,
        position: Position,
    },
}

impl Expr {
    pub fn position(&self) -> Position {
        match self {
            Expr::Literal { position, .. }
            | Expr::Array { position, .. }
            | Expr::Object { position, .. }
            | Expr::Identifier { position, .. }
            | Expr::Binary { position, .. }
            | Expr::Unary { position, .. }
            | Expr::Call { position, .. }
            | Expr::Index { position, .. }
            | Expr::Member { position, .. }
            | Expr::Assignment { position, .. } => *position,
        }
    }
}

/// Function parameter with an optional default value
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub default_value: Option<Expr>,
    pub position: Position,
}

/// Function declaration. The body is shared so function values clone cheaply.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Parameter>,
    pub body: Rc<Vec<Stmt>>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    VariableDecl {
        name: String,
        is_mutable: bool,
        initializer: Option<Expr>,
        position: Position,
    },
    FunctionDecl {
        decl: Rc<FunctionDecl>,
    },
    Expression {
        expr: Expr,
        position: Position,
    },
    Return {
        value: Option<Expr>,
        position: Position,
    },
    Break {
        position: Position,
    },
    Continue {
        position: Position,
    },
    Block {
        statements: Vec<Stmt>,
        position: Position,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        position: Position,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
        position: Position,
    },
    For {
        variable: String,
        iterable: Expr,
        body: Box<Stmt>,
        position: Position,
    },
    Try {
        try_block: Box<Stmt>,
        variable: Option<String>,
        catch_block: Box<Stmt>,
        position: Position,
    },
    Panic {
        message: Option<Expr>,
        position: Position,
    },
}

impl Stmt {
    pub fn position(&self) -> Position {
        match self {
            Stmt::FunctionDecl { decl } => decl.position,
            Stmt::VariableDecl { position, .. }
            | Stmt::Expression { position, .. }
            | Stmt::Return { position, .. }
            | Stmt::Break { position }
            | Stmt::Continue { position }
            | Stmt::Block { position, .. }
            | Stmt::If { position, .. }
            | Stmt::While { position, .. }
            | Stmt::For { position, .. }
            | Stmt::Try { position, .. }
            | Stmt::Panic { position, .. } => *position,
        }
    }
}

/// Root AST node for a candidate unit
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

impl Program {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }

    /// Names of top-level `fn` declarations in source order, without repeats.
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for stmt in &self.statements {
            if let Stmt::FunctionDecl { decl } = stmt {
                if !names.contains(&decl.name) {
                    names.push(decl.name.clone());
                }
            }
        }
        names
    }
}

//=====================================================
// End of file
//=====================================================
