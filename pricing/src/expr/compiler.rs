//! Type checking and lowering of the syntax tree.
//!
//! Typing rules:
//!
//! - `+ - * /` need numbers. `int op int` is `int` except `/`, which is
//!   always `float`; any `float` operand makes the result `float`.
//! - `< <= > >=` compare two numbers or two strings.
//! - `== !=` and `in` need both sides numeric, both strings or both bools.
//! - `&& || !` need bools.

use super::CompileError;
use super::parser::{Ast, BinaryOp, Node, UnaryOp};
use super::program::{Arith, Cmp, Const, Op};
use crate::environment::{Field, Type};

pub(crate) fn check(node: &Node) -> Result<(Op, Type), CompileError> {
    let at = node.offset;
    match &node.ast {
        Ast::Int(v) => Ok((Op::Const(Const::Int(*v)), Type::Int)),
        Ast::Float(v) => Ok((Op::Const(Const::Float(*v)), Type::Float)),
        Ast::Str(s) => Ok((Op::Const(Const::Str(s.clone())), Type::Str)),
        Ast::Bool(b) => Ok((Op::Const(Const::Bool(*b)), Type::Bool)),
        Ast::Ident(name) => {
            let field = Field::from_name(name)
                .ok_or_else(|| CompileError::new(at, format!("unknown field '{name}'")))?;
            Ok((Op::Field(field), field.ty()))
        }
        Ast::Unary(UnaryOp::Not, operand) => {
            let op = expect(operand, Type::Bool, "'!'")?;
            Ok((Op::Not(Box::new(op)), Type::Bool))
        }
        Ast::Unary(UnaryOp::Neg, operand) => {
            let (op, ty) = check(operand)?;
            if !ty.is_numeric() {
                return Err(CompileError::new(at, format!("cannot negate {ty}")));
            }
            Ok((Op::Neg(Box::new(op)), ty))
        }
        Ast::Binary(op @ (BinaryOp::And | BinaryOp::Or), left, right) => {
            let symbol = format!("'{}'", op.symbol());
            let left = Box::new(expect(left, Type::Bool, &symbol)?);
            let right = Box::new(expect(right, Type::Bool, &symbol)?);
            let lowered = if *op == BinaryOp::And {
                Op::And(left, right)
            } else {
                Op::Or(left, right)
            };
            Ok((lowered, Type::Bool))
        }
        Ast::Binary(op, left, right) => binary(*op, left, right, at),
        Ast::In {
            needle,
            list,
            negated,
        } => {
            let (needle_op, needle_ty) = check(needle)?;
            let mut items = Vec::with_capacity(list.len());
            for item in list {
                let (item_op, item_ty) = check(item)?;
                if !equatable(needle_ty, item_ty) {
                    return Err(CompileError::new(
                        item.offset,
                        format!("list element is {item_ty}, but the value tested is {needle_ty}"),
                    ));
                }
                items.push(item_op);
            }
            Ok((
                Op::In {
                    needle: Box::new(needle_op),
                    list: items,
                    negated: *negated,
                },
                Type::Bool,
            ))
        }
    }
}

fn binary(op: BinaryOp, left: &Node, right: &Node, at: usize) -> Result<(Op, Type), CompileError> {
    let (left_op, left_ty) = check(left)?;
    let (right_op, right_ty) = check(right)?;
    let symbol = op.symbol();
    let (l, r) = (Box::new(left_op), Box::new(right_op));

    let arith = match op {
        BinaryOp::Add => Some(Arith::Add),
        BinaryOp::Sub => Some(Arith::Sub),
        BinaryOp::Mul => Some(Arith::Mul),
        BinaryOp::Div => Some(Arith::Div),
        _ => None,
    };
    if let Some(arith) = arith {
        if !left_ty.is_numeric() || !right_ty.is_numeric() {
            return Err(CompileError::new(
                at,
                format!("'{symbol}' needs numbers, found {left_ty} and {right_ty}"),
            ));
        }
        let ty = if arith == Arith::Div || left_ty == Type::Float || right_ty == Type::Float {
            Type::Float
        } else {
            Type::Int
        };
        return Ok((Op::Arith(arith, l, r), ty));
    }

    let cmp = match op {
        BinaryOp::Eq => Cmp::Eq,
        BinaryOp::Ne => Cmp::Ne,
        BinaryOp::Lt => Cmp::Lt,
        BinaryOp::Le => Cmp::Le,
        BinaryOp::Gt => Cmp::Gt,
        _ => Cmp::Ge,
    };
    let comparable = if matches!(cmp, Cmp::Eq | Cmp::Ne) {
        equatable(left_ty, right_ty)
    } else {
        (left_ty.is_numeric() && right_ty.is_numeric()) || (left_ty == Type::Str && right_ty == Type::Str)
    };
    if !comparable {
        return Err(CompileError::new(
            at,
            format!("cannot compare {left_ty} {symbol} {right_ty}"),
        ));
    }
    Ok((Op::Compare(cmp, l, r), Type::Bool))
}

fn expect(node: &Node, wanted: Type, operator: &str) -> Result<Op, CompileError> {
    let (op, ty) = check(node)?;
    if ty == wanted {
        Ok(op)
    } else {
        Err(CompileError::new(
            node.offset,
            format!("{operator} needs {wanted}, found {ty}"),
        ))
    }
}

fn equatable(a: Type, b: Type) -> bool {
    a == b || (a.is_numeric() && b.is_numeric())
}
