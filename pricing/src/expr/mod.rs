//! The rule condition language.
//!
//! ```text
//! day_of_week in ["Saturday", "Sunday"] && !is_holiday
//! occupancy_rate > 0.8 or days_until_departure < 3
//! base_price * quantity >= 500000
//! ```
//!
//! Literals are integers, floats, strings (single or double quoted) and
//! `true`/`false`; identifiers name [`Field`](crate::environment::Field)s.
//! [`compile`] rejects unknown fields, ill-typed operators and conditions
//! that are not boolean, so a compiled [`Program`] only fails at runtime on
//! division by zero or integer overflow.

mod compiler;
mod lexer;
mod parser;
mod program;

pub use program::{EvalError, Program};

use thiserror::Error;

/// A condition failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at position {position}")]
pub struct CompileError {
    /// Byte offset into the source.
    pub position: usize,
    /// What went wrong.
    pub message: String,
}

impl CompileError {
    /// Create an error at `position`.
    #[must_use]
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Compile a boolean condition.
///
/// # Errors
///
/// Returns a [`CompileError`] locating the first syntax or type error.
pub fn compile(source: &str) -> Result<Program, CompileError> {
    let tokens = lexer::tokenize(source)?;
    let tree = parser::parse(&tokens)?;
    let (root, ty) = compiler::check(&tree)?;
    if ty != crate::environment::Type::Bool {
        return Err(CompileError::new(
            tree.offset,
            format!("condition must be bool, found {ty}"),
        ));
    }
    Ok(Program::new(source, root))
}
