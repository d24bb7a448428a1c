//! Compiled, type-checked conditions and their evaluation.

use crate::environment::{Field, PricingEnvironment, Value};
use thiserror::Error;

/// Runtime failure of a compiled condition. The rule is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EvalError {
    /// Divisor evaluated to zero.
    #[error("division by zero")]
    DivisionByZero,
    /// Integer arithmetic overflowed.
    #[error("integer overflow")]
    Overflow,
    /// Operand types disagree with what the compiler checked.
    #[error("type mismatch")]
    TypeMismatch,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Const {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl Const {
    fn value(&self) -> Value<'_> {
        match self {
            Self::Int(v) => Value::Int(*v),
            Self::Float(v) => Value::Float(*v),
            Self::Str(s) => Value::Str(s),
            Self::Bool(b) => Value::Bool(*b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Arith {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Op {
    Const(Const),
    Field(Field),
    Not(Box<Op>),
    Neg(Box<Op>),
    And(Box<Op>, Box<Op>),
    Or(Box<Op>, Box<Op>),
    Arith(Arith, Box<Op>, Box<Op>),
    Compare(Cmp, Box<Op>, Box<Op>),
    In {
        needle: Box<Op>,
        list: Vec<Op>,
        negated: bool,
    },
}

/// A condition compiled against the pricing environment.
///
/// Evaluation never allocates and never panics; see [`EvalError`].
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    source: String,
    root: Op,
}

impl Program {
    pub(crate) fn new(source: &str, root: Op) -> Self {
        Self {
            source: source.to_string(),
            root,
        }
    }

    /// The condition as written.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against `env`.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError`] on division by zero or integer overflow.
    pub fn evaluate(&self, env: &PricingEnvironment) -> Result<bool, EvalError> {
        match eval(&self.root, env)? {
            Value::Bool(b) => Ok(b),
            _ => Err(EvalError::TypeMismatch),
        }
    }
}

fn eval<'a>(op: &'a Op, env: &'a PricingEnvironment) -> Result<Value<'a>, EvalError> {
    match op {
        Op::Const(c) => Ok(c.value()),
        Op::Field(field) => Ok(env.get(*field)),
        Op::Not(inner) => Ok(Value::Bool(!truthy(eval(inner, env)?)?)),
        Op::Neg(inner) => match eval(inner, env)? {
            Value::Int(v) => v.checked_neg().map(Value::Int).ok_or(EvalError::Overflow),
            Value::Float(v) => Ok(Value::Float(-v)),
            _ => Err(EvalError::TypeMismatch),
        },
        Op::And(left, right) => {
            if truthy(eval(left, env)?)? {
                eval(right, env)
            } else {
                Ok(Value::Bool(false))
            }
        }
        Op::Or(left, right) => {
            if truthy(eval(left, env)?)? {
                Ok(Value::Bool(true))
            } else {
                eval(right, env)
            }
        }
        Op::Arith(arith, left, right) => arithmetic(*arith, eval(left, env)?, eval(right, env)?),
        Op::Compare(cmp, left, right) => compare(*cmp, eval(left, env)?, eval(right, env)?).map(Value::Bool),
        Op::In {
            needle,
            list,
            negated,
        } => {
            let needle = eval(needle, env)?;
            let mut found = false;
            for item in list {
                if compare(Cmp::Eq, needle, eval(item, env)?)? {
                    found = true;
                    break;
                }
            }
            Ok(Value::Bool(found != *negated))
        }
    }
}

fn truthy(value: Value<'_>) -> Result<bool, EvalError> {
    match value {
        Value::Bool(b) => Ok(b),
        _ => Err(EvalError::TypeMismatch),
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_float(value: Value<'_>) -> Result<f64, EvalError> {
    match value {
        Value::Int(v) => Ok(v as f64),
        Value::Float(v) => Ok(v),
        _ => Err(EvalError::TypeMismatch),
    }
}

#[allow(clippy::float_cmp)]
fn arithmetic<'a>(arith: Arith, left: Value<'a>, right: Value<'a>) -> Result<Value<'a>, EvalError> {
    if let (Value::Int(a), Value::Int(b), false) = (left, right, arith == Arith::Div) {
        let result = match arith {
            Arith::Add => a.checked_add(b),
            Arith::Sub => a.checked_sub(b),
            _ => a.checked_mul(b),
        };
        return result.map(Value::Int).ok_or(EvalError::Overflow);
    }

    let (a, b) = (as_float(left)?, as_float(right)?);
    let result = match arith {
        Arith::Add => a + b,
        Arith::Sub => a - b,
        Arith::Mul => a * b,
        Arith::Div => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            a / b
        }
    };
    Ok(Value::Float(result))
}

fn compare(cmp: Cmp, left: Value<'_>, right: Value<'_>) -> Result<bool, EvalError> {
    use std::cmp::Ordering;

    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(&b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(&b)),
        (a, b) => as_float(a)?.partial_cmp(&as_float(b)?),
    };

    // NaN compares unequal to everything.
    let Some(ordering) = ordering else {
        return Ok(cmp == Cmp::Ne);
    };
    Ok(match cmp {
        Cmp::Eq => ordering == Ordering::Equal,
        Cmp::Ne => ordering != Ordering::Equal,
        Cmp::Lt => ordering == Ordering::Less,
        Cmp::Le => ordering != Ordering::Greater,
        Cmp::Gt => ordering == Ordering::Greater,
        Cmp::Ge => ordering != Ordering::Less,
    })
}
