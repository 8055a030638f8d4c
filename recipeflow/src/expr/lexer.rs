//! Tokenizer for condition expressions.

use crate::errors::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    AndAnd,
    OrOr,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Eof,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Int(i) => format!("integer {i}"),
            Self::Float(f) => format!("float {f}"),
            Self::Str(s) => format!("string {s:?}"),
            Self::Ident(name) => format!("identifier '{name}'"),
            Self::Eof => "end of expression".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Comma => ",",
            Self::Dot => ".",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Bang => "!",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::EqEq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            _ => "",
        }
    }
}

/// A token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub(crate) token: Token,
    pub(crate) offset: usize,
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let peek = |i: usize| chars.get(i).map(|(_, c)| *c);

    while i < chars.len() {
        let (offset, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let (token, consumed) = match c {
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            '[' => (Token::LBracket, 1),
            ']' => (Token::RBracket, 1),
            ',' => (Token::Comma, 1),
            '+' => (Token::Plus, 1),
            '-' => (Token::Minus, 1),
            '*' => (Token::Star, 1),
            '/' => (Token::Slash, 1),
            '%' => (Token::Percent, 1),
            '.' if !peek(i + 1).is_some_and(|n| n.is_ascii_digit()) => (Token::Dot, 1),
            '!' if peek(i + 1) == Some('=') => (Token::NotEq, 2),
            '!' => (Token::Bang, 1),
            '=' if peek(i + 1) == Some('=') => (Token::EqEq, 2),
            '<' if peek(i + 1) == Some('=') => (Token::Le, 2),
            '<' => (Token::Lt, 1),
            '>' if peek(i + 1) == Some('=') => (Token::Ge, 2),
            '>' => (Token::Gt, 1),
            '&' if peek(i + 1) == Some('&') => (Token::AndAnd, 2),
            '|' if peek(i + 1) == Some('|') => (Token::OrOr, 2),
            '"' | '\'' => {
                let (text, consumed) = lex_string(&chars[i..], offset)?;
                (Token::Str(text), consumed)
            }
            c if c.is_ascii_digit() || c == '.' => lex_number(src, &chars[i..], offset)?,
            c if c.is_alphabetic() || c == '_' => {
                let len = chars[i..]
                    .iter()
                    .take_while(|(_, c)| c.is_alphanumeric() || *c == '_')
                    .count();
                let name: String = chars[i..i + len].iter().map(|(_, c)| c).collect();
                (Token::Ident(name), len)
            }
            other => {
                return Err(ExpressionError::syntax(
                    offset,
                    format!("unexpected character '{other}'"),
                ))
            }
        };

        tokens.push(Spanned { token, offset });
        i += consumed;
    }

    tokens.push(Spanned {
        token: Token::Eof,
        offset: src.len(),
    });
    Ok(tokens)
}

fn lex_string(chars: &[(usize, char)], offset: usize) -> Result<(String, usize), ExpressionError> {
    let quote = chars[0].1;
    let mut text = String::new();
    let mut i = 1;
    while i < chars.len() {
        match chars[i].1 {
            c if c == quote => return Ok((text, i + 1)),
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .map(|(_, c)| *c)
                    .ok_or_else(|| ExpressionError::syntax(offset, "unterminated string"))?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                i += 2;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(ExpressionError::syntax(offset, "unterminated string"))
}

fn lex_number(src: &str, chars: &[(usize, char)], offset: usize) -> Result<(Token, usize), ExpressionError> {
    let mut len = 0;
    let mut is_float = false;
    while let Some((_, c)) = chars.get(len) {
        match c {
            '0'..='9' => len += 1,
            '.' if !is_float && chars.get(len + 1).is_some_and(|(_, n)| n.is_ascii_digit()) => {
                is_float = true;
                len += 1;
            }
            'e' | 'E' => {
                let mut exp = len + 1;
                if chars.get(exp).is_some_and(|(_, s)| *s == '+' || *s == '-') {
                    exp += 1;
                }
                if !chars.get(exp).is_some_and(|(_, d)| d.is_ascii_digit()) {
                    break;
                }
                is_float = true;
                len = exp;
                while chars.get(len).is_some_and(|(_, d)| d.is_ascii_digit()) {
                    len += 1;
                }
                break;
            }
            _ => break,
        }
    }

    let end = chars.get(len).map_or(src.len(), |(o, _)| *o);
    let text = &src[offset..end];
    let token = if is_float {
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| ExpressionError::syntax(offset, format!("invalid number '{text}'")))?
    } else {
        text.parse::<i64>()
            .map(Token::Int)
            .map_err(|_| ExpressionError::syntax(offset, format!("integer literal '{text}' out of range")))?
    };
    Ok((token, len))
}
