//=====================================================
// File: tokenizer.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: SolvraScript lexical analysis for sandboxed candidate units
// Objective: Turn raw candidate source text into positioned tokens that the
//            parser consumes; lexical failures surface as syntax faults
//=====================================================

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Represents the position of a token in the source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// All token kinds understood by the sandbox dialect
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,

    Identifier(String),

    // Keywords
    Let,
    Mut,
    Fn,
    If,
    Else,
    While,
    For,
    In,
    Try,
    Catch,
    Return,
    Break,
    Continue,
    Panic,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Equal,
    PlusEqual,
    MinusEqual,
    StarEqual,
    EqualEqual,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    And,
    Or,
    Not,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,

    Newline,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Integer(n) => write!(f, "{}", n),
            TokenKind::Float(n) => write!(f, "{}", n),
            TokenKind::String(s) => write!(f, "\"{}\"", s),
            TokenKind::Boolean(b) => write!(f, "{}", b),
            TokenKind::Null => write!(f, "null"),
            TokenKind::Identifier(s) => write!(f, "{}", s),
            TokenKind::Newline => write!(f, "end of line"),
            TokenKind::Eof => write!(f, "end of input"),
            _ => write!(f, "{:?}", self),
        }
    }
}

/// A token with its kind and position information
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, position: Position) -> Self {
        Self { kind, position }
    }
}

/// Lexical error with the position of the offending character.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at {position}")]
pub struct LexError {
    pub message: String,
    pub position: Position,
}

pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    keywords: HashMap<&'static str, TokenKind>,
    tokens: Vec<Token>,
}

impl Tokenizer {
    pub fn new(input: &str) -> Self {
        let keywords = HashMap::from([
            ("let", TokenKind::Let),
            ("mut", TokenKind::Mut),
            ("fn", TokenKind::Fn),
            ("if", TokenKind::If),
            ("else", TokenKind::Else),
            ("while", TokenKind::While),
            ("for", TokenKind::For),
            ("in", TokenKind::In),
            ("try", TokenKind::Try),
            ("catch", TokenKind::Catch),
            ("return", TokenKind::Return),
            ("break", TokenKind::Break),
            ("continue", TokenKind::Continue),
            ("panic", TokenKind::Panic),
            ("null", TokenKind::Null),
            ("true", TokenKind::Boolean(true)),
            ("false", TokenKind::Boolean(false)),
        ]);

        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            keywords,
            tokens: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        loop {
            self.skip_whitespace();
            if self.is_at_end() {
                break;
            }

            let start = self.current_position();
            let ch = self.current_char();

            if ch == '\n' {
                self.advance();
                self.push_newline(start);
                continue;
            }

            if ch == '/' && self.peek_char() == Some('/') {
                self.skip_comment();
                continue;
            }

            if ch == '"' {
                self.handle_string(start)?;
            } else if ch.is_ascii_digit() {
                self.handle_number(start)?;
            } else if ch.is_alphabetic() || ch == '_' {
                self.handle_identifier(start);
            } else {
                self.handle_operator_or_delimiter(start)?;
            }
        }

        let end = self.current_position();
        self.tokens.push(Token::new(TokenKind::Eof, end));
        Ok(self.tokens)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn current_char(&self) -> char {
        self.input.get(self.position).copied().unwrap_or('\0')
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) -> char {
        let ch = self.current_char();
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        ch
    }

    fn current_position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn emit(&mut self, kind: TokenKind, position: Position) {
        self.tokens.push(Token::new(kind, position));
    }

    // Consecutive blank lines collapse into one newline token.
    fn push_newline(&mut self, position: Position) {
        if !matches!(
            self.tokens.last().map(|t| &t.kind),
            Some(TokenKind::Newline) | None
        ) {
            self.emit(TokenKind::Newline, position);
        }
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end()
            && self.current_char().is_whitespace()
            && self.current_char() != '\n'
        {
            self.advance();
        }
    }

    fn skip_comment(&mut self) {
        while !self.is_at_end() && self.current_char() != '\n' {
            self.advance();
        }
    }

    fn handle_string(&mut self, start: Position) -> Result<(), LexError> {
        self.advance(); // opening quote

        let mut value = String::new();
        while !self.is_at_end() && self.current_char() != '"' {
            if self.current_char() == '\n' {
                break;
            }
            if self.current_char() == '\\' {
                self.advance();
                if self.is_at_end() {
                    break;
                }
                match self.advance() {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '\\' => value.push('\\'),
                    '"' => value.push('"'),
                    other => {
                        value.push('\\');
                        value.push(other);
                    }
                }
            } else {
                value.push(self.advance());
            }
        }

        if self.current_char() != '"' {
            return Err(LexError {
                message: "unterminated string literal".to_string(),
                position: start,
            });
        }
        self.advance(); // closing quote
        self.emit(TokenKind::String(value), start);
        Ok(())
    }

    fn handle_number(&mut self, start: Position) -> Result<(), LexError> {
        let mut number = String::new();
        let mut is_float = false;

        while !self.is_at_end() {
            let ch = self.current_char();
            if ch.is_ascii_digit() {
                number.push(self.advance());
            } else if ch == '.'
                && !is_float
                && self.peek_char().is_some_and(|next| next.is_ascii_digit())
            {
                is_float = true;
                number.push(self.advance());
            } else {
                break;
            }
        }

        let kind = if is_float {
            number.parse::<f64>().map(TokenKind::Float).ok()
        } else {
            number.parse::<i64>().map(TokenKind::Integer).ok()
        };
        match kind {
            Some(kind) => {
                self.emit(kind, start);
                Ok(())
            }
            None => Err(LexError {
                message: format!("invalid numeric literal '{}'", number),
                position: start,
            }),
        }
    }

    fn handle_identifier(&mut self, start: Position) {
        let mut identifier = String::new();
        while !self.is_at_end()
            && (self.current_char().is_alphanumeric() || self.current_char() == '_')
        {
            identifier.push(self.advance());
        }
        let kind = self
            .keywords
            .get(identifier.as_str())
            .cloned()
            .unwrap_or(TokenKind::Identifier(identifier));
        self.emit(kind, start);
    }

    fn handle_operator_or_delimiter(&mut self, start: Position) -> Result<(), LexError> {
        let ch = self.advance();
        let next_is_eq = self.current_char() == '=';

        let kind = match ch {
            '+' if next_is_eq => self.two_char(TokenKind::PlusEqual),
            '-' if next_is_eq => self.two_char(TokenKind::MinusEqual),
            '*' if next_is_eq => self.two_char(TokenKind::StarEqual),
            '=' if next_is_eq => self.two_char(TokenKind::EqualEqual),
            '!' if next_is_eq => self.two_char(TokenKind::NotEqual),
            '<' if next_is_eq => self.two_char(TokenKind::LessEqual),
            '>' if next_is_eq => self.two_char(TokenKind::GreaterEqual),
            '&' if self.current_char() == '&' => self.two_char(TokenKind::And),
            '|' if self.current_char() == '|' => self.two_char(TokenKind::Or),
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' => TokenKind::Equal,
            '!' => TokenKind::Not,
            '<' => TokenKind::Less,
            '>' => TokenKind::Greater,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            _ => {
                return Err(LexError {
                    message: format!("unexpected character '{}'", ch),
                    position: start,
                });
            }
        };

        self.emit(kind, start);
        Ok(())
    }

    fn two_char(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Tokenizer::new(input)
            .tokenize()
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_tokenization() {
        let expected = vec![
            TokenKind::Let,
            TokenKind::Identifier("x".to_string()),
            TokenKind::Equal,
            TokenKind::Integer(5),
            TokenKind::Plus,
            TokenKind::Integer(3),
            TokenKind::Star,
            TokenKind::LeftParen,
            TokenKind::Integer(2),
            TokenKind::Minus,
            TokenKind::Integer(1),
            TokenKind::RightParen,
            TokenKind::Semicolon,
            TokenKind::Eof,
        ];
        assert_eq!(kinds("let x = 5 + 3 * (2 - 1);"), expected);
    }

    #[test]
    fn test_compound_operators() {
        assert_eq!(
            kinds("+= -= *= == != <= >= && || !"),
            vec![
                TokenKind::PlusEqual,
                TokenKind::MinusEqual,
                TokenKind::StarEqual,
                TokenKind::EqualEqual,
                TokenKind::NotEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers_and_member_dot() {
        assert_eq!(
            kinds("42 1.5 xs.len"),
            vec![
                TokenKind::Integer(42),
                TokenKind::Float(1.5),
                TokenKind::Identifier("xs".to_string()),
                TokenKind::Dot,
                TokenKind::Identifier("len".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\nb" "q\"q""#),
            vec![
                TokenKind::String("a\nb".to_string()),
                TokenKind::String("q\"q".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_blank_lines_collapse() {
        assert_eq!(
            kinds("// header\n\n\nfn // trailing\n"),
            vec![TokenKind::Fn, TokenKind::Newline, TokenKind::Eof]
        );
    }

    #[test]
    fn test_position_tracking() {
        let tokens = Tokenizer::new("let\n  x = 5").tokenize().expect("tokenize");
        let x = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Identifier("x".to_string()))
            .expect("x token");
        assert_eq!(x.position, Position::new(2, 3));
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let err = Tokenizer::new("let s = \"open\nlet t = 1")
            .tokenize()
            .expect_err("unterminated");
        assert_eq!(err.position, Position::new(1, 9));
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn test_unexpected_character() {
        let err = Tokenizer::new("let a = 1 # 2").tokenize().expect_err("bad char");
        assert!(err.message.contains('#'));
    }
}

//=====================================================
// End of file
//=====================================================
