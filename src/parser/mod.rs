//=====================================================
// File: parser/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Recursive descent parser for sandboxed SolvraScript units
// Objective: Build the Program AST from tokens and report syntax faults with
//            precise positions so they stay distinct from runtime faults
//=====================================================

use crate::ast::{
    Argument, BinaryOp, Expr, FunctionDecl, Literal, Parameter, Program, Stmt, UnaryOp,
};
use crate::tokenizer::{LexError, Position, Token, TokenKind, Tokenizer};
use std::rc::Rc;
use thiserror::Error;

/// Parser error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("expected {expected} but found {found} at {position}")]
    UnexpectedToken {
        expected: String,
        found: TokenKind,
        position: Position,
    },
    #[error("unexpected end of input, expected {expected} at {position}")]
    UnexpectedEndOfInput {
        expected: String,
        position: Position,
    },
    #[error("invalid syntax: {message} at {position}")]
    InvalidSyntax {
        message: String,
        position: Position,
    },
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            ParseError::UnexpectedToken { position, .. }
            | ParseError::UnexpectedEndOfInput { position, .. }
            | ParseError::InvalidSyntax { position, .. } => *position,
        }
    }
}

impl From<LexError> for ParseError {
    fn from(value: LexError) -> Self {
        ParseError::InvalidSyntax {
            message: value.message,
            position: value.position,
        }
    }
}

/// Tokenize and parse a complete unit.
pub fn parse_source(source: &str) -> Result<Program, ParseError> {
    let tokens = Tokenizer::new(source).tokenize()?;
    Parser::new(tokens).parse()
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            if self.is_at_end() {
                break;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(Program::new(statements))
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match &self.peek().kind {
            TokenKind::Let => self.parse_variable_declaration(),
            TokenKind::Fn => self.parse_function_declaration(),
            TokenKind::If => self.parse_if_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Break => {
                let position = self.advance().position;
                self.consume_statement_terminator()?;
                Ok(Stmt::Break { position })
            }
            TokenKind::Continue => {
                let position = self.advance().position;
                self.consume_statement_terminator()?;
                Ok(Stmt::Continue { position })
            }
            TokenKind::Try => self.parse_try_statement(),
            TokenKind::Panic => self.parse_panic_statement(),
            TokenKind::LeftBrace => self.parse_block_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    /// `let [mut] name [= value];`
    fn parse_variable_declaration(&mut self) -> Result<Stmt, ParseError> {
        let position = self.consume(&TokenKind::Let, "'let'")?.position;
        let is_mutable = self.match_token(&TokenKind::Mut);
        let name = self.consume_identifier("variable name")?;

        let initializer = if self.match_token(&TokenKind::Equal) {
            self.skip_newlines();
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume_statement_terminator()?;

        Ok(Stmt::VariableDecl {
            name,
            is_mutable,
            initializer,
            position,
        })
    }

    /// `fn name(params) { body }`
    fn parse_function_declaration(&mut self) -> Result<Stmt, ParseError> {
        let position = self.consume(&TokenKind::Fn, "'fn'")?.position;
        let name = self.consume_identifier("function name")?;
        self.consume(&TokenKind::LeftParen, "'(' after function name")?;

        let mut params: Vec<Parameter> = Vec::new();
        self.skip_newlines();
        if !self.check(&TokenKind::RightParen) {
            loop {
                self.skip_newlines();
                let param_position = self.peek().position;
                let param_name = self.consume_identifier("parameter name")?;
                if params.iter().any(|p| p.name == param_name) {
                    return Err(ParseError::InvalidSyntax {
                        message: format!("duplicate parameter '{}'", param_name),
                        position: param_position,
                    });
                }
                let default_value = if self.match_token(&TokenKind::Equal) {
                    Some(self.parse_expression()?)
                } else if params.iter().any(|p| p.default_value.is_some()) {
                    return Err(ParseError::InvalidSyntax {
                        message: "parameter without default follows parameter with default"
                            .to_string(),
                        position: param_position,
                    });
                } else {
                    None
                };
                params.push(Parameter {
                    name: param_name,
                    default_value,
                    position: param_position,
                });
                self.skip_newlines();
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.skip_newlines();
        self.consume(&TokenKind::RightParen, "')' after parameters")?;
        self.consume(&TokenKind::LeftBrace, "'{' before function body")?;
        let body = self.parse_block_body()?;

        Ok(Stmt::FunctionDecl {
            decl: Rc::new(FunctionDecl {
                name,
                params,
                body: Rc::new(body),
                position,
            }),
        })
    }

    /// `if condition { } [else if ... | else { }]`
    fn parse_if_statement(&mut self) -> Result<Stmt, ParseError> {
        let position = self.consume(&TokenKind::If, "'if'")?.position;
        let condition = self.parse_expression()?;
        let then_branch = Box::new(self.parse_block_statement()?);

        let else_branch = if self.match_after_newlines(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                Some(Box::new(self.parse_if_statement()?))
            } else {
                Some(Box::new(self.parse_block_statement()?))
            }
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            position,
        })
    }

    fn parse_while_statement(&mut self) -> Result<Stmt, ParseError> {
        let position = self.consume(&TokenKind::While, "'while'")?.position;
        let condition = self.parse_expression()?;
        let body = Box::new(self.parse_block_statement()?);
        Ok(Stmt::While {
            condition,
            body,
            position,
        })
    }

    fn parse_for_statement(&mut self) -> Result<Stmt, ParseError> {
        let position = self.consume(&TokenKind::For, "'for'")?.position;
        let variable = self.consume_identifier("loop variable")?;
        self.consume(&TokenKind::In, "'in' after loop variable")?;
        let iterable = self.parse_expression()?;
        let body = Box::new(self.parse_block_statement()?);
        Ok(Stmt::For {
            variable,
            iterable,
            body,
            position,
        })
    }

    fn parse_return_statement(&mut self) -> Result<Stmt, ParseError> {
        let position = self.consume(&TokenKind::Return, "'return'")?.position;
        let value = if self.at_statement_end() {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_statement_terminator()?;
        Ok(Stmt::Return { value, position })
    }

    /// `try { } catch [name] { }`
    fn parse_try_statement(&mut self) -> Result<Stmt, ParseError> {
        let position = self.consume(&TokenKind::Try, "'try'")?.position;
        let try_block = Box::new(self.parse_block_statement()?);

        if !self.match_after_newlines(&TokenKind::Catch) {
            return Err(self.unexpected("'catch' after try block"));
        }
        let variable = match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Some(name)
            }
            _ => None,
        };
        let catch_block = Box::new(self.parse_block_statement()?);

        Ok(Stmt::Try {
            try_block,
            variable,
            catch_block,
            position,
        })
    }

    fn parse_panic_statement(&mut self) -> Result<Stmt, ParseError> {
        let position = self.consume(&TokenKind::Panic, "'panic'")?.position;
        let message = if self.at_statement_end() {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_statement_terminator()?;
        Ok(Stmt::Panic { message, position })
    }

    fn parse_block_statement(&mut self) -> Result<Stmt, ParseError> {
        let position = self.consume(&TokenKind::LeftBrace, "'{'")?.position;
        let statements = self.parse_block_body()?;
        Ok(Stmt::Block {
            statements,
            position,
        })
    }

    /// Statements up to and including the closing brace.
    fn parse_block_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            if self.check(&TokenKind::RightBrace) || self.is_at_end() {
                break;
            }
            statements.push(self.parse_statement()?);
        }
        self.consume(&TokenKind::RightBrace, "'}'")?;
        Ok(statements)
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, ParseError> {
        let expr = self.parse_expression()?;
        let position = expr.position();
        self.consume_statement_terminator()?;
        Ok(Stmt::Expression { expr, position })
    }

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_logical_or()?;

        let operator = match self.peek().kind {
            TokenKind::Equal => None,
            TokenKind::PlusEqual => Some(BinaryOp::Add),
            TokenKind::MinusEqual => Some(BinaryOp::Subtract),
            TokenKind::StarEqual => Some(BinaryOp::Multiply),
            _ => return Ok(expr),
        };
        let position = self.advance().position;

        if !matches!(
            expr,
            Expr::Identifier { .. } | Expr::Index { .. } | Expr::Member { .. }
        ) {
            return Err(ParseError::InvalidSyntax {
                message: "invalid assignment target".to_string(),
                position: expr.position(),
            });
        }

        self.skip_newlines();
        let value = self.parse_assignment()?;
        Ok(Expr::Assignment {
            target: Box::new(expr),
            operator,
            value: Box::new(value),
            position,
        })
    }

    fn parse_logical_or(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_logical_and()?;
        while self.check(&TokenKind::Or) {
            let position = self.advance().position;
            self.skip_newlines();
            let right = self.parse_logical_and()?;
            expr = binary(expr, BinaryOp::Or, right, position);
        }
        Ok(expr)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_equality()?;
        while self.check(&TokenKind::And) {
            let position = self.advance().position;
            self.skip_newlines();
            let right = self.parse_equality()?;
            expr = binary(expr, BinaryOp::And, right, position);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_comparison()?;
        while let Some((op, position)) = self.match_binary_op(&[
            (TokenKind::EqualEqual, BinaryOp::Equal),
            (TokenKind::NotEqual, BinaryOp::NotEqual),
        ]) {
            let right = self.parse_comparison()?;
            expr = binary(expr, op, right, position);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_term()?;
        while let Some((op, position)) = self.match_binary_op(&[
            (TokenKind::Less, BinaryOp::Less),
            (TokenKind::Greater, BinaryOp::Greater),
            (TokenKind::LessEqual, BinaryOp::LessEqual),
            (TokenKind::GreaterEqual, BinaryOp::GreaterEqual),
        ]) {
            let right = self.parse_term()?;
            expr = binary(expr, op, right, position);
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_factor()?;
        while let Some((op, position)) = self.match_binary_op(&[
            (TokenKind::Plus, BinaryOp::Add),
            (TokenKind::Minus, BinaryOp::Subtract),
        ]) {
            let right = self.parse_factor()?;
            expr = binary(expr, op, right, position);
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_unary()?;
        while let Some((op, position)) = self.match_binary_op(&[
            (TokenKind::Star, BinaryOp::Multiply),
            (TokenKind::Slash, BinaryOp::Divide),
            (TokenKind::Percent, BinaryOp::Modulo),
        ]) {
            let right = self.parse_unary()?;
            expr = binary(expr, op, right, position);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let operator = match self.peek().kind {
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Minus,
            _ => return self.parse_call(),
        };
        let position = self.advance().position;
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            operator,
            operand: Box::new(operand),
            position,
        })
    }

    /// Postfix chain: calls, indexing and member access.
    fn parse_call(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek().kind {
                TokenKind::LeftParen => {
                    let position = self.advance().position;
                    let args = self.parse_arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        position,
                    };
                }
                TokenKind::Dot => {
                    let position = self.advance().position;
                    let property = self.consume_identifier("property name after '.'")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        position,
                    };
                }
                TokenKind::LeftBracket => {
                    let position = self.advance().position;
                    self.skip_newlines();
                    let index = self.parse_expression()?;
                    self.skip_newlines();
                    self.consume(&TokenKind::RightBracket, "']' after index")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        position,
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_arguments(&mut self) -> Result<Vec<Argument>, ParseError> {
        let mut args: Vec<Argument> = Vec::new();
        self.skip_newlines();
        if self.match_token(&TokenKind::RightParen) {
            return Ok(args);
        }

        loop {
            self.skip_newlines();
            let is_keyword = matches!(self.peek().kind, TokenKind::Identifier(_))
                && self.peek_at(1).kind == TokenKind::Colon;

            if is_keyword {
                let name = self.consume_identifier("keyword argument name")?;
                self.advance(); // ':'
                self.skip_newlines();
                let value = self.parse_expression()?;
                args.push(Argument {
                    name: Some(name),
                    value,
                });
            } else {
                let position = self.peek().position;
                let value = self.parse_expression()?;
                if args.iter().any(|arg| arg.name.is_some()) {
                    return Err(ParseError::InvalidSyntax {
                        message: "positional argument follows keyword argument".to_string(),
                        position,
                    });
                }
                args.push(Argument { name: None, value });
            }

            self.skip_newlines();
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
            if self.check(&TokenKind::RightParen) {
                break;
            }
        }

        self.consume(&TokenKind::RightParen, "')' after arguments")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        let position = token.position;

        let literal = match token.kind {
            TokenKind::Integer(n) => Literal::Integer(n),
            TokenKind::Float(f) => Literal::Float(f),
            TokenKind::String(s) => Literal::String(s),
            TokenKind::Boolean(b) => Literal::Boolean(b),
            TokenKind::Null => Literal::Null,
            TokenKind::Identifier(name) => {
                self.advance();
                return Ok(Expr::Identifier { name, position });
            }
            TokenKind::LeftParen => {
                self.advance();
                self.skip_newlines();
                let expr = self.parse_expression()?;
                self.skip_newlines();
                self.consume(&TokenKind::RightParen, "')' after expression")?;
                return Ok(expr);
            }
            TokenKind::LeftBracket => return self.parse_array_literal(),
            TokenKind::LeftBrace => return self.parse_object_literal(),
            _ => return Err(self.unexpected("expression")),
        };

        self.advance();
        Ok(Expr::Literal {
            value: literal,
            position,
        })
    }

    fn parse_array_literal(&mut self) -> Result<Expr, ParseError> {
        let position = self.consume(&TokenKind::LeftBracket, "'['")?.position;
        let mut elements = Vec::new();
        loop {
            self.skip_newlines();
            if self.check(&TokenKind::RightBracket) {
                break;
            }
            elements.push(self.parse_expression()?);
            self.skip_newlines();
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.skip_newlines();
        self.consume(&TokenKind::RightBracket, "']' after list elements")?;
        Ok(Expr::Array { elements, position })
    }

    /// `{ key: value, "other key": value }`
    fn parse_object_literal(&mut self) -> Result<Expr, ParseError> {
        let position = self.consume(&TokenKind::LeftBrace, "'{'")?.position;
        let mut properties = Vec::new();
        loop {
            self.skip_newlines();
            if self.check(&TokenKind::RightBrace) {
                break;
            }
            let key = match &self.peek().kind {
                TokenKind::Identifier(name) => name.clone(),
                TokenKind::String(s) => s.clone(),
                _ => return Err(self.unexpected("property name")),
            };
            self.advance();
            self.consume(&TokenKind::Colon, "':' after property name")?;
            self.skip_newlines();
            let value = self.parse_expression()?;
            properties.push((key, value));
            self.skip_newlines();
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.skip_newlines();
        self.consume(&TokenKind::RightBrace, "'}' after object literal")?;
        Ok(Expr::Object {
            properties,
            position,
        })
    }

    //=============================================
    //            Token helpers
    //=============================================

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let index = (self.current + offset).min(self.tokens.len().saturating_sub(1));
        &self.tokens[index]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Looks past line breaks for `kind`; rewinds when it is not there.
    fn match_after_newlines(&mut self, kind: &TokenKind) -> bool {
        let saved = self.current;
        self.skip_newlines();
        if self.match_token(kind) {
            true
        } else {
            self.current = saved;
            false
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
    }

    fn match_binary_op(&mut self, table: &[(TokenKind, BinaryOp)]) -> Option<(BinaryOp, Position)> {
        let (_, op) = table.iter().find(|(kind, _)| self.check(kind))?;
        let op = *op;
        let position = self.advance().position;
        self.skip_newlines();
        Some((op, position))
    }

    fn consume(&mut self, kind: &TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn consume_identifier(&mut self, expected: &str) -> Result<String, ParseError> {
        if let TokenKind::Identifier(name) = &self.peek().kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Semicolon | TokenKind::Newline | TokenKind::RightBrace | TokenKind::Eof
        )
    }

    fn consume_statement_terminator(&mut self) -> Result<(), ParseError> {
        match self.peek().kind {
            TokenKind::Semicolon | TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            TokenKind::RightBrace | TokenKind::Eof => Ok(()),
            _ => Err(self.unexpected("';' or end of line")),
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            ParseError::UnexpectedEndOfInput {
                expected: expected.to_string(),
                position: token.position,
            }
        } else {
            ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: token.kind.clone(),
                position: token.position,
            }
        }
    }
}

fn binary(left: Expr, operator: BinaryOp, right: Expr, position: Position) -> Expr {
    Expr::Binary {
        left: Box::new(left),
        operator,
        right: Box::new(right),
        position,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_functions_and_collects_names_in_order() {
        let program = parse_source(
            "fn parse(s) { return int(s) }\nlet limit = 3\nfn main(s) {\n  return parse(s) * 2\n}\n",
        )
        .expect("parse");
        assert_eq!(program.function_names(), vec!["parse", "main"]);
        assert_eq!(program.statements.len(), 3);
    }

    #[test]
    fn duplicate_function_names_are_reported_once() {
        let program = parse_source("fn f() { return 1 }\nfn f() { return 2 }").expect("parse");
        assert_eq!(program.function_names(), vec!["f"]);
    }

    #[test]
    fn keyword_arguments_and_defaults() {
        let program = parse_source("fn f(a, b = 2) { return a }\nf(1, b: 3)").expect("parse");
        let Stmt::Expression { expr, .. } = &program.statements[1] else {
            panic!("expected call statement");
        };
        let Expr::Call { args, .. } = expr else {
            panic!("expected call");
        };
        assert_eq!(args[0].name, None);
        assert_eq!(args[1].name.as_deref(), Some("b"));
    }

    #[test]
    fn positional_after_keyword_is_rejected() {
        let err = parse_source("f(a: 1, 2)").expect_err("invalid");
        assert!(matches!(err, ParseError::InvalidSyntax { .. }));
    }

    #[test]
    fn else_may_follow_on_next_line() {
        let program =
            parse_source("if x {\n  y = 1\n}\nelse if z {\n  y = 2\n} else {\n  y = 3\n}")
                .expect("parse");
        let Stmt::If { else_branch, .. } = &program.statements[0] else {
            panic!("expected if");
        };
        assert!(matches!(else_branch.as_deref(), Some(Stmt::If { .. })));
    }

    #[test]
    fn unclosed_function_reports_end_of_input() {
        let err = parse_source("fn demo(").expect_err("should fail");
        assert!(matches!(err, ParseError::UnexpectedEndOfInput { .. }));
    }

    #[test]
    fn invalid_assignment_target() {
        let err = parse_source("1 + 2 = 3").expect_err("should fail");
        assert_eq!(err.position().line, 1);
    }

    #[test]
    fn lexical_errors_become_syntax_errors() {
        let err = parse_source("fn main() {\n  let a = 1 @ 2\n}").expect_err("bad char");
        assert_eq!(err.position().line, 2);
    }

    #[test]
    fn parse_errors_render_with_positions() {
        let err: Box<dyn std::error::Error> =
            Box::new(parse_source("fn demo(").expect_err("should fail"));
        let text = err.to_string();
        assert!(text.starts_with("unexpected end of input, expected"), "{text}");
        assert!(text.contains(" at line 1, column "), "{text}");
    }
}

//=====================================================
// End of file
//=====================================================
