//! Hand-written lexer and recursive-descent parser for the expression
//! language: a small JS-like subset covering arithmetic, comparisons,
//! ternaries, property/index access, array/object literals, arrow
//! functions (including immediately-invoked ones), and multi-statement
//! script bodies with `let` and `return`.

use std::sync::Arc;

use serde_json::Value;

use crate::ast::{BinaryOp, Expr, Stmt};
use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Symbol(&'static str),
    Eof,
}

struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            source,
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek_char(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn next_token(&mut self) -> Result<(Token, usize), ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let Some(c) = self.peek_char() else {
            return Ok((Token::Eof, start));
        };

        if c.is_ascii_digit() || (c == '.' && self.chars.get(self.pos + 1).is_some_and(|n| n.is_ascii_digit())) {
            return Ok((self.lex_number(), start));
        }
        if c == '"' || c == '\'' {
            return self.lex_string(c).map(|t| (t, start));
        }
        if c == '_' || c.is_alphabetic() {
            return Ok((self.lex_ident(), start));
        }

        macro_rules! two {
            ($a:expr, $b:expr, $sym:expr, $fallback:expr) => {{
                self.bump();
                if self.peek_char() == Some($b) {
                    self.bump();
                    Token::Symbol($sym)
                } else {
                    Token::Symbol($fallback)
                }
            }};
        }

        let tok = match c {
            '=' => two!('=', '=', "==", "="),
            '!' => two!('!', '=', "!=", "!"),
            '<' => two!('<', '=', "<=", "<"),
            '>' => {
                self.bump();
                if self.peek_char() == Some('=') {
                    self.bump();
                    Token::Symbol(">=")
                } else if self.peek_char() == Some('>') {
                    // reserved, not used; treat as error path avoided by not matching
                    Token::Symbol(">")
                } else {
                    Token::Symbol(">")
                }
            }
            '&' => {
                self.bump();
                if self.peek_char() == Some('&') {
                    self.bump();
                    Token::Symbol("&&")
                } else {
                    return Err(ParseError::new("unexpected '&'", start));
                }
            }
            '|' => {
                self.bump();
                if self.peek_char() == Some('|') {
                    self.bump();
                    Token::Symbol("||")
                } else {
                    return Err(ParseError::new("unexpected '|'", start));
                }
            }
            '+' => {
                self.bump();
                Token::Symbol("+")
            }
            '-' => {
                self.bump();
                Token::Symbol("-")
            }
            '*' => {
                self.bump();
                Token::Symbol("*")
            }
            '/' => {
                self.bump();
                Token::Symbol("/")
            }
            '%' => {
                self.bump();
                Token::Symbol("%")
            }
            '(' => {
                self.bump();
                Token::Symbol("(")
            }
            ')' => {
                self.bump();
                Token::Symbol(")")
            }
            '[' => {
                self.bump();
                Token::Symbol("[")
            }
            ']' => {
                self.bump();
                Token::Symbol("]")
            }
            '{' => {
                self.bump();
                Token::Symbol("{")
            }
            '}' => {
                self.bump();
                Token::Symbol("}")
            }
            ',' => {
                self.bump();
                Token::Symbol(",")
            }
            '.' => {
                self.bump();
                Token::Symbol(".")
            }
            ':' => {
                self.bump();
                Token::Symbol(":")
            }
            ';' => {
                self.bump();
                Token::Symbol(";")
            }
            '?' => {
                self.bump();
                Token::Symbol("?")
            }
            _ => return Err(ParseError::new(format!("unexpected character '{c}'"), start)),
        };
        Ok((tok, start))
    }

    fn lex_number(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek_char() == Some('.')
            && self.chars.get(self.pos + 1).is_some_and(|c| c.is_ascii_digit())
        {
            self.pos += 1;
            while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        Token::Number(text.parse().unwrap_or(0.0))
    }

    fn lex_string(&mut self, quote: char) -> Result<Token, ParseError> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::new("unterminated string literal", start)),
                Some(c) if c == quote => break,
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(other) => out.push(other),
                    None => return Err(ParseError::new("unterminated escape sequence", start)),
                },
                Some(c) => out.push(c),
            }
        }
        Ok(Token::Str(out))
    }

    fn lex_ident(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek_char(), Some(c) if c == '_' || c.is_alphanumeric()) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        Token::Ident(text)
    }
}

/// Recursive-descent parser over the expression grammar.
pub struct Parser<'a> {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    /// Tokenize and prepare a parser over `source`.
    pub fn new(source: &'a str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let (tok, offset) = lexer.next_token()?;
            let is_eof = tok == Token::Eof;
            tokens.push((tok, offset));
            if is_eof {
                break;
            }
        }
        Ok(Self {
            tokens,
            pos: 0,
            source,
        })
    }

    /// Parse `source` as a single expression (used for `${...}` spans).
    pub fn parse_expression(source: &'a str) -> Result<Expr, ParseError> {
        let mut parser = Self::new(source)?;
        let expr = parser.expression()?;
        parser.expect_eof()?;
        Ok(expr)
    }

    /// Parse `source` as a script body: zero or more statements,
    /// optionally terminated by `return <expr>;`.
    pub fn parse_script(source: &'a str) -> Result<Expr, ParseError> {
        let mut parser = Self::new(source)?;
        let mut stmts = Vec::new();
        while !parser.check_eof() {
            stmts.push(parser.statement()?);
        }
        Ok(Expr::Block(stmts))
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        if self.peek_ident("return") {
            self.advance();
            if self.check_symbol(";") {
                self.advance();
                return Ok(Stmt::Return(None));
            }
            let expr = self.expression()?;
            self.consume_optional_semicolon();
            return Ok(Stmt::Return(Some(expr)));
        }
        if self.peek_ident("let") || self.peek_ident("const") {
            self.advance();
            let name = self.expect_ident()?;
            self.expect_symbol("=")?;
            let value = self.expression()?;
            self.consume_optional_semicolon();
            return Ok(Stmt::Let(Arc::from(name.as_str()), value));
        }
        let expr = self.expression()?;
        self.consume_optional_semicolon();
        Ok(Stmt::Expr(expr))
    }

    fn consume_optional_semicolon(&mut self) {
        if self.check_symbol(";") {
            self.advance();
        }
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.conditional()
    }

    fn conditional(&mut self) -> Result<Expr, ParseError> {
        let cond = self.logical_or()?;
        if self.check_symbol("?") {
            self.advance();
            let then_branch = self.expression()?;
            self.expect_symbol(":")?;
            let else_branch = self.expression()?;
            return Ok(Expr::Conditional {
                condition: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            });
        }
        Ok(cond)
    }

    fn logical_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.logical_and()?;
        while self.check_symbol("||") {
            self.advance();
            let right = self.logical_and()?;
            left = Expr::Binary {
                left: Box::new(left),
                op: BinaryOp::Or,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.equality()?;
        while self.check_symbol("&&") {
            self.advance();
            let right = self.equality()?;
            left = Expr::Binary {
                left: Box::new(left),
                op: BinaryOp::And,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.comparison()?;
        loop {
            let op = if self.check_symbol("==") {
                BinaryOp::Equal
            } else if self.check_symbol("!=") {
                BinaryOp::NotEqual
            } else {
                break;
            };
            self.advance();
            let right = self.comparison()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.additive()?;
        loop {
            let op = if self.check_symbol("<=") {
                BinaryOp::LessEqual
            } else if self.check_symbol(">=") {
                BinaryOp::GreaterEqual
            } else if self.check_symbol("<") {
                BinaryOp::LessThan
            } else if self.check_symbol(">") {
                BinaryOp::GreaterThan
            } else {
                break;
            };
            self.advance();
            let right = self.additive()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = if self.check_symbol("+") {
                BinaryOp::Add
            } else if self.check_symbol("-") {
                BinaryOp::Subtract
            } else {
                break;
            };
            self.advance();
            let right = self.multiplicative()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let op = if self.check_symbol("*") {
                BinaryOp::Multiply
            } else if self.check_symbol("/") {
                BinaryOp::Divide
            } else if self.check_symbol("%") {
                BinaryOp::Modulo
            } else {
                break;
            };
            self.advance();
            let right = self.unary()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.check_symbol("-") {
            self.advance();
            return Ok(Expr::Negate(Box::new(self.unary()?)));
        }
        if self.check_symbol("!") {
            self.advance();
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.check_symbol(".") {
                self.advance();
                let name = self.expect_ident()?;
                if let Expr::Variable(base) = &expr {
                    if base.as_ref() == "secrets" {
                        expr = Expr::SecretAccess(Arc::from(name.as_str()));
                        continue;
                    }
                }
                expr = Expr::PropertyAccess {
                    object: Box::new(expr),
                    property: Arc::from(name.as_str()),
                };
            } else if self.check_symbol("[") {
                self.advance();
                let index = self.expression()?;
                self.expect_symbol("]")?;
                expr = Expr::IndexAccess {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.check_symbol("(") {
                self.advance();
                let mut args = Vec::new();
                if !self.check_symbol(")") {
                    loop {
                        args.push(self.expression()?);
                        if self.check_symbol(",") {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect_symbol(")")?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.current().clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Literal(
                    serde_json::Number::from_f64(n)
                        .map(Value::Number)
                        .unwrap_or(Value::Null),
                ))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Value::String(s)))
            }
            Token::Ident(name) => self.primary_ident(name),
            Token::Symbol("(") => self.primary_paren_or_arrow(),
            Token::Symbol("[") => self.primary_array(),
            Token::Symbol("{") => self.primary_object(),
            _ => Err(ParseError::new("unexpected token", self.current_offset())),
        }
    }

    fn primary_ident(&mut self, name: String) -> Result<Expr, ParseError> {
        self.advance();
        match name.as_str() {
            "true" => Ok(Expr::Literal(Value::Bool(true))),
            "false" => Ok(Expr::Literal(Value::Bool(false))),
            "null" => Ok(Expr::Literal(Value::Null)),
            _ if self.check_symbol("=>") => {
                self.advance();
                let body = self.arrow_body()?;
                Ok(Expr::Lambda {
                    param: Arc::from(name.as_str()),
                    body: Box::new(body),
                })
            }
            _ => Ok(Expr::Variable(Arc::from(name.as_str()))),
        }
    }

    fn arrow_body(&mut self) -> Result<Expr, ParseError> {
        if self.check_symbol("{") {
            self.advance();
            let mut stmts = Vec::new();
            while !self.check_symbol("}") {
                stmts.push(self.statement()?);
            }
            self.expect_symbol("}")?;
            Ok(Expr::Block(stmts))
        } else {
            self.expression()
        }
    }

    /// Either a parenthesized expression, or a parenthesized
    /// arrow-function parameter list (`(a, b) => ...`). We only support
    /// the single-parameter form beyond plain grouping: `(x) => body`.
    fn primary_paren_or_arrow(&mut self) -> Result<Expr, ParseError> {
        self.advance();
        if self.check_symbol(")") {
            self.advance();
            self.expect_symbol("=>")?;
            let body = self.arrow_body()?;
            return Ok(Expr::Lambda {
                param: Arc::from("_"),
                body: Box::new(body),
            });
        }
        let inner = self.expression()?;
        self.expect_symbol(")")?;
        if self.check_symbol("=>") {
            self.advance();
            let param = match inner {
                Expr::Variable(name) => name,
                _ => return Err(ParseError::new("expected parameter name", self.current_offset())),
            };
            let body = self.arrow_body()?;
            return Ok(Expr::Lambda {
                param,
                body: Box::new(body),
            });
        }
        Ok(inner)
    }

    fn primary_array(&mut self) -> Result<Expr, ParseError> {
        self.advance();
        let mut elements = Vec::new();
        if !self.check_symbol("]") {
            loop {
                elements.push(self.expression()?);
                if self.check_symbol(",") {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_symbol("]")?;
        Ok(Expr::Array(elements))
    }

    fn primary_object(&mut self) -> Result<Expr, ParseError> {
        self.advance();
        let mut pairs = Vec::new();
        if !self.check_symbol("}") {
            loop {
                let key = match self.current().clone() {
                    Token::Ident(name) => {
                        self.advance();
                        name
                    }
                    Token::Str(s) => {
                        self.advance();
                        s
                    }
                    _ => return Err(ParseError::new("expected object key", self.current_offset())),
                };
                self.expect_symbol(":")?;
                let value = self.expression()?;
                pairs.push((key, value));
                if self.check_symbol(",") {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_symbol("}")?;
        Ok(Expr::Object(pairs))
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    fn current_offset(&self) -> usize {
        self.tokens[self.pos].1
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn check_symbol(&self, sym: &str) -> bool {
        matches!(self.current(), Token::Symbol(s) if *s == sym)
    }

    fn peek_ident(&self, name: &str) -> bool {
        matches!(self.current(), Token::Ident(s) if s == name)
    }

    fn check_eof(&self) -> bool {
        matches!(self.current(), Token::Eof)
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if self.check_eof() {
            Ok(())
        } else {
            Err(ParseError::new("unexpected trailing input", self.current_offset()))
        }
    }

    fn expect_symbol(&mut self, sym: &str) -> Result<(), ParseError> {
        if self.check_symbol(sym) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::new(
                format!("expected '{sym}'"),
                self.current_offset(),
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.current().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(ParseError::new("expected identifier", self.current_offset())),
        }
    }
}

/// Parse a standalone expression from `source`.
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    Parser::parse_expression(source)
}

/// Parse a script body (statements, optionally ending in `return`).
pub fn parse_script(source: &str) -> Result<Expr, ParseError> {
    Parser::parse_script(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arithmetic_with_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Add, .. } => {}
            other => panic!("expected top-level Add, got {other:?}"),
        }
    }

    #[test]
    fn parses_property_and_index_chains() {
        parse_expression("input.items[0].name").unwrap();
    }

    #[test]
    fn parses_arrow_function_call_iife() {
        parse_expression("(x => x + 1)(5)").unwrap();
    }

    #[test]
    fn parses_object_and_array_literals() {
        parse_expression(r#"{ a: 1, b: [1, 2, 3] }"#).unwrap();
    }

    #[test]
    fn parses_ternary() {
        parse_expression("input > 0 ? \"pos\" : \"neg\"").unwrap();
    }

    #[test]
    fn parses_script_with_let_and_return() {
        let expr = parse_script("let x = 1; let y = x + 1; return y;").unwrap();
        assert!(matches!(expr, Expr::Block(stmts) if stmts.len() == 3));
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(parse_expression("\"abc").is_err());
    }
}
