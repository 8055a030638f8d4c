//! Expression evaluation.

use super::parser::{BinaryOp, Expr, UnaryOp};
use crate::config::ConditionSemantics;
use crate::errors::{ExpressionError, Side};
use crate::value::Value;
use std::cmp::Ordering;

type EvalResult = Result<Value, ExpressionError>;

/// Evaluates `expr` with identifiers looked up in the map `env`.
pub fn evaluate(expr: &Expr, env: &Value, semantics: ConditionSemantics) -> EvalResult {
    Evaluator { env, semantics }.eval(expr)
}

struct Evaluator<'a> {
    env: &'a Value,
    semantics: ConditionSemantics,
}

impl Evaluator<'_> {
    const fn lenient(&self) -> bool {
        matches!(self.semantics, ConditionSemantics::Legacy)
    }

    /// Type errors collapse into the catch-all in lenient mode.
    fn type_error(&self, err: ExpressionError) -> ExpressionError {
        if self.lenient() {
            ExpressionError::Condition
        } else {
            err
        }
    }

    fn eval(&self, expr: &Expr) -> EvalResult {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Ident(name) => match self.env.get(name) {
                Some(v) => Ok(v.clone()),
                None if self.lenient() => Ok(Value::Null),
                None => Err(ExpressionError::UndefinedVariable(name.clone())),
            },
            Expr::Unary(op, inner) => {
                let v = self.eval(inner)?;
                self.unary(*op, v)
            }
            Expr::Binary(op, left, right) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                self.binary(*op, l, r)
            }
            Expr::Select(target, field) => {
                let v = self.eval(target)?;
                self.select(v, field)
            }
            Expr::Index(target, index) => {
                let v = self.eval(target)?;
                let i = self.eval(index)?;
                self.index(v, &i)
            }
            Expr::Call(name, args) => self.call(name, args),
        }
    }

    fn unary(&self, op: UnaryOp, v: Value) -> EvalResult {
        match (op, v) {
            (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (UnaryOp::Neg, Value::Int(i)) => i.checked_neg().map(Value::Int).ok_or(ExpressionError::Overflow),
            (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
            (op, v) => Err(self.type_error(ExpressionError::UnsupportedOperator {
                op: match op {
                    UnaryOp::Not => "!".to_string(),
                    UnaryOp::Neg => "-".to_string(),
                },
                operands: v.type_name().to_string(),
            })),
        }
    }

    fn select(&self, v: Value, field: &str) -> EvalResult {
        match v {
            Value::Map(mut map) => match map.swap_remove(field) {
                Some(found) => Ok(found),
                None if self.lenient() => Ok(Value::Null),
                None => Err(ExpressionError::UndefinedField(field.to_string())),
            },
            _ if self.lenient() => Ok(Value::Null),
            _ => Err(ExpressionError::SelectNonMap),
        }
    }

    fn index(&self, v: Value, index: &Value) -> EvalResult {
        match index {
            Value::Int(i) => {
                let Value::Array(mut items) = v else {
                    return Err(self.type_error(ExpressionError::IndexNonArray));
                };
                let idx = usize::try_from(*i)
                    .ok()
                    .filter(|idx| *idx < items.len())
                    .ok_or_else(|| self.type_error(ExpressionError::IndexOutOfBounds))?;
                Ok(items.swap_remove(idx))
            }
            Value::String(key) => {
                let Value::Map(mut map) = v else {
                    return Err(self.type_error(ExpressionError::IndexNonMap));
                };
                match map.swap_remove(key.as_str()) {
                    Some(found) => Ok(found),
                    None if self.lenient() => Ok(Value::Null),
                    None => Err(ExpressionError::UndefinedField(key.clone())),
                }
            }
            other => Err(self.type_error(ExpressionError::InvalidIndex(other.type_name()))),
        }
    }

    fn call(&self, name: &str, args: &[Expr]) -> EvalResult {
        if name != "concat" {
            return Err(ExpressionError::UnknownFunction(name.to_string()));
        }
        if args.len() < 2 {
            return Err(ExpressionError::ConcatArity);
        }
        let mut out = String::new();
        for (i, arg) in args.iter().enumerate() {
            match self.eval(arg)? {
                Value::String(s) => out.push_str(&s),
                _ => return Err(ExpressionError::ConcatArgument(i + 1)),
            }
        }
        Ok(Value::String(out))
    }

    fn logic_operand(&self, v: &Value, side: Side) -> Result<bool, ExpressionError> {
        if self.lenient() {
            return Ok(truthy(v));
        }
        v.as_bool().ok_or(ExpressionError::NotBoolean(side))
    }

    fn binary(&self, op: BinaryOp, l: Value, r: Value) -> EvalResult {
        let unsupported = |l: &Value, r: &Value| {
            self.type_error(ExpressionError::UnsupportedOperator {
                op: op.to_string(),
                operands: format!("{} and {}", l.type_name(), r.type_name()),
            })
        };

        match op {
            BinaryOp::And => {
                let a = self.logic_operand(&l, Side::Left)?;
                let b = self.logic_operand(&r, Side::Right)?;
                Ok(Value::Bool(a && b))
            }
            BinaryOp::Or => {
                let a = self.logic_operand(&l, Side::Left)?;
                let b = self.logic_operand(&r, Side::Right)?;
                Ok(Value::Bool(a || b))
            }
            BinaryOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
            BinaryOp::Ne => Ok(Value::Bool(!values_equal(&l, &r))),
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                let ordering = compare_numbers(&l, &r).ok_or_else(|| unsupported(&l, &r))?;
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    _ => ordering != Ordering::Less,
                }))
            }
            BinaryOp::Add => match (&l, &r) {
                (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
                _ => arithmetic(&l, &r, i64::checked_add, |a, b| a + b).ok_or_else(|| unsupported(&l, &r))?,
            },
            BinaryOp::Sub => {
                arithmetic(&l, &r, i64::checked_sub, |a, b| a - b).ok_or_else(|| unsupported(&l, &r))?
            }
            BinaryOp::Mul => {
                arithmetic(&l, &r, i64::checked_mul, |a, b| a * b).ok_or_else(|| unsupported(&l, &r))?
            }
            BinaryOp::Div => {
                if r.as_f64() == Some(0.0) && l.as_f64().is_some() {
                    return Err(ExpressionError::DivisionByZero);
                }
                arithmetic(&l, &r, i64::checked_div, |a, b| a / b).ok_or_else(|| unsupported(&l, &r))?
            }
            BinaryOp::Rem => self.remainder(&l, &r).map_err(|e| match e {
                ExpressionError::UnsupportedOperator { .. } => unsupported(&l, &r),
                other => other,
            }),
        }
    }

    fn remainder(&self, l: &Value, r: &Value) -> EvalResult {
        let (Some(_), Some(_)) = (l.as_f64(), r.as_f64()) else {
            return Err(ExpressionError::UnsupportedOperator {
                op: "%".to_string(),
                operands: String::new(),
            });
        };
        let a = l
            .as_integer()
            .ok_or_else(|| self.type_error(ExpressionError::NotInteger(Side::Left)))?;
        let b = r
            .as_integer()
            .ok_or_else(|| self.type_error(ExpressionError::NotInteger(Side::Right)))?;
        if b == 0 {
            return Err(ExpressionError::ModuloByZero);
        }
        a.checked_rem(b).map(Value::Int).ok_or(ExpressionError::Overflow)
    }
}

/// Applies a numeric operator with int/float promotion.
///
/// Returns `None` for non-numeric operands.
#[allow(clippy::cast_precision_loss)]
fn arithmetic(
    l: &Value,
    r: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Option<EvalResult> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Some(int_op(*a, *b).map(Value::Int).ok_or(ExpressionError::Overflow)),
        (Value::Int(a), Value::Float(b)) => Some(Ok(Value::Float(float_op(*a as f64, *b)))),
        (Value::Float(a), Value::Int(b)) => Some(Ok(Value::Float(float_op(*a, *b as f64)))),
        (Value::Float(a), Value::Float(b)) => Some(Ok(Value::Float(float_op(*a, *b)))),
        _ => None,
    }
}

fn compare_numbers(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        _ => l.as_f64()?.partial_cmp(&r.as_f64()?),
    }
}

/// Structural equality where integers and floats compare by value.
pub(crate) fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => l.as_f64() == r.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => l == r,
    }
}

/// Truthiness used by the lenient evaluator.
pub(crate) fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::String(s) => !s.is_empty(),
        _ => false,
    }
}
