//! Recursive-descent parser for condition expressions.
//!
//! Precedence, lowest first: `||`, `&&`, comparisons, `+ -`, `* / %`,
//! unary `! -`, then postfix `.field`, `[index]` and calls.

use super::lexer::{tokenize, Spanned, Token};
use crate::errors::ExpressionError;
use crate::value::Value;
use std::fmt;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Neg,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `||`
    Or,
    /// `&&`
    And,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        };
        f.write_str(s)
    }
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value.
    Literal(Value),
    /// A name bound in the evaluation environment.
    Ident(String),
    /// `op expr`
    Unary(UnaryOp, Box<Expr>),
    /// `left op right`
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `target.field`
    Select(Box<Expr>, String),
    /// `target[index]`
    Index(Box<Expr>, Box<Expr>),
    /// `name(args...)`
    Call(String, Vec<Expr>),
}

/// Deepest expression tree the parser builds. Evaluation recurses over the
/// tree, so the bound keeps it within the stack.
pub const MAX_DEPTH: usize = 128;

/// Parses expression text into a tree.
///
/// Trees nested deeper than [`MAX_DEPTH`] are rejected as syntax errors.
pub fn parse(src: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.or_expr()?;
    parser.expect(&Token::Eof)?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map_or(&Token::Eof, |s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |s| s.offset)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), ExpressionError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {}", token.describe())))
        }
    }

    fn unexpected(&self, context: &str) -> ExpressionError {
        ExpressionError::syntax(
            self.offset(),
            format!("{context}, found {}", self.peek().describe()),
        )
    }

    fn descend(&mut self) -> Result<(), ExpressionError> {
        if self.depth >= MAX_DEPTH {
            return Err(ExpressionError::syntax(
                self.offset(),
                "expression nested too deeply",
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ExpressionError>,
    ) -> Result<T, ExpressionError> {
        self.descend()?;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, ExpressionError>,
        op_of: fn(&Token) -> Option<BinaryOp>,
    ) -> Result<Expr, ExpressionError> {
        let start = self.depth;
        let mut left = next(self)?;
        while let Some(op) = op_of(self.peek()) {
            // each operator of a left-associative chain adds a tree level
            self.descend()?;
            self.pos += 1;
            let right = next(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth = start;
        Ok(left)
    }

    fn or_expr(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(Self::and_expr, |t| (*t == Token::OrOr).then_some(BinaryOp::Or))
    }

    fn and_expr(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(Self::comparison, |t| (*t == Token::AndAnd).then_some(BinaryOp::And))
    }

    fn comparison(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(Self::additive, |t| match t {
            Token::EqEq => Some(BinaryOp::Eq),
            Token::NotEq => Some(BinaryOp::Ne),
            Token::Lt => Some(BinaryOp::Lt),
            Token::Gt => Some(BinaryOp::Gt),
            Token::Le => Some(BinaryOp::Le),
            Token::Ge => Some(BinaryOp::Ge),
            _ => None,
        })
    }

    fn additive(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(Self::multiplicative, |t| match t {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(Self::unary, |t| match t {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::Bang) {
            let inner = self.nested(Self::unary)?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        if self.eat(&Token::Minus) {
            let inner = self.nested(Self::unary)?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                match self.advance() {
                    Token::Ident(field) => expr = Expr::Select(Box::new(expr), field),
                    _ => {
                        self.pos -= 1;
                        return Err(self.unexpected("expected field name after '.'"));
                    }
                }
            } else if self.eat(&Token::LBracket) {
                let index = self.nested(Self::or_expr)?;
                self.expect(&Token::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if *self.peek() == Token::LParen {
                let Expr::Ident(name) = expr else {
                    return Err(self.unexpected("only named functions can be called"));
                };
                self.pos += 1;
                let args = self.nested(Self::arguments)?;
                expr = Expr::Call(name, args);
            } else {
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ExpressionError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.or_expr()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            self.expect(&Token::Comma)?;
        }
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.advance() {
            Token::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Token::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "nil" | "null" | "undefined" => Expr::Literal(Value::Null),
                _ => Expr::Ident(name),
            }),
            Token::LParen => {
                let inner = self.nested(Self::or_expr)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            _ => {
                self.pos -= 1;
                Err(self.unexpected("expected a value"))
            }
        }
    }
}
