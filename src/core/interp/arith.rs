// src/core/interp/arith.rs

//! Shell arithmetic over the `brush_parser` expression tree, with 64-bit
//! wrapping integers as in bash.

use super::vars::VarTable;
use crate::core::syntax;
use brush_parser::ast::{
    ArithmeticExpr, ArithmeticTarget, BinaryOperator, UnaryAssignmentOperator, UnaryOperator,
};

/// How deep a variable holding another expression may be followed.
const MAX_REFERENCE_DEPTH: usize = 16;

/// Parses and evaluates `expr`. Variables are read from and assigned to
/// `vars`. The error is a message fit for stderr.
pub(crate) fn evaluate(expr: &str, vars: &mut VarTable) -> Result<i64, String> {
    evaluate_at(expr, vars, 0)
}

fn evaluate_at(expr: &str, vars: &mut VarTable, depth: usize) -> Result<i64, String> {
    if expr.trim().is_empty() {
        return Ok(0);
    }
    let parsed = syntax::parse_arithmetic(expr).map_err(|e| format!("{}: {}", expr.trim(), e))?;
    Evaluator { vars, depth }.eval(&parsed)
}

struct Evaluator<'a> {
    vars: &'a mut VarTable,
    depth: usize,
}

impl Evaluator<'_> {
    fn eval(&mut self, expr: &ArithmeticExpr) -> Result<i64, String> {
        match expr {
            ArithmeticExpr::Literal(n) => Ok(*n),
            ArithmeticExpr::Reference(target) => self.read(target),
            ArithmeticExpr::UnaryOp(op, operand) => {
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOperator::UnaryPlus => value,
                    UnaryOperator::UnaryMinus => value.wrapping_neg(),
                    UnaryOperator::LogicalNot => i64::from(value == 0),
                    UnaryOperator::BitwiseNot => !value,
                })
            }
            ArithmeticExpr::BinaryOp(BinaryOperator::LogicalAnd, left, right) => {
                if self.eval(left)? == 0 {
                    return Ok(0);
                }
                Ok(i64::from(self.eval(right)? != 0))
            }
            ArithmeticExpr::BinaryOp(BinaryOperator::LogicalOr, left, right) => {
                if self.eval(left)? != 0 {
                    return Ok(1);
                }
                Ok(i64::from(self.eval(right)? != 0))
            }
            ArithmeticExpr::BinaryOp(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                apply(op, left, right)
            }
            ArithmeticExpr::Conditional(condition, then, otherwise) => {
                if self.eval(condition)? != 0 {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            ArithmeticExpr::Assignment(target, value) => {
                let value = self.eval(value)?;
                self.write(target, value)?;
                Ok(value)
            }
            ArithmeticExpr::BinaryAssignment(op, target, value) => {
                let current = self.read(target)?;
                let rhs = self.eval(value)?;
                let updated = apply(op, current, rhs)?;
                self.write(target, updated)?;
                Ok(updated)
            }
            ArithmeticExpr::UnaryAssignment(op, target) => {
                let current = self.read(target)?;
                let (result, updated) = match op {
                    UnaryAssignmentOperator::PrefixIncrement => {
                        (current.wrapping_add(1), current.wrapping_add(1))
                    }
                    UnaryAssignmentOperator::PrefixDecrement => {
                        (current.wrapping_sub(1), current.wrapping_sub(1))
                    }
                    UnaryAssignmentOperator::PostfixIncrement => (current, current.wrapping_add(1)),
                    UnaryAssignmentOperator::PostfixDecrement => (current, current.wrapping_sub(1)),
                };
                self.write(target, updated)?;
                Ok(result)
            }
        }
    }

    fn name_of(&mut self, target: &ArithmeticTarget) -> Result<String, String> {
        match target {
            ArithmeticTarget::Variable(name) => Ok(name.clone()),
            ArithmeticTarget::ArrayElement(name, index) => {
                // Arrays are flat strings here; only element 0 exists.
                match self.eval(index)? {
                    0 => Ok(name.clone()),
                    other => Err(format!("{}[{}]: arrays are not supported", name, other)),
                }
            }
        }
    }

    fn read(&mut self, target: &ArithmeticTarget) -> Result<i64, String> {
        let name = self.name_of(target)?;
        let raw = self.vars.get(&name).unwrap_or_default().trim().to_string();
        if raw.is_empty() {
            return Ok(0);
        }
        if let Some(number) = parse_number(&raw) {
            return Ok(number);
        }
        if self.depth >= MAX_REFERENCE_DEPTH {
            return Err(format!("{}: expression recursion level exceeded", name));
        }
        evaluate_at(&raw, self.vars, self.depth + 1)
    }

    fn write(&mut self, target: &ArithmeticTarget, value: i64) -> Result<(), String> {
        let name = self.name_of(target)?;
        self.vars.set(&name, &value.to_string());
        Ok(())
    }
}

fn apply(op: &BinaryOperator, left: i64, right: i64) -> Result<i64, String> {
    let shift = || u32::try_from(right.rem_euclid(64)).unwrap_or(0);
    Ok(match op {
        BinaryOperator::Add => left.wrapping_add(right),
        BinaryOperator::Subtract => left.wrapping_sub(right),
        BinaryOperator::Multiply => left.wrapping_mul(right),
        BinaryOperator::Divide => {
            if right == 0 {
                return Err("division by 0".to_string());
            }
            left.wrapping_div(right)
        }
        BinaryOperator::Modulo => {
            if right == 0 {
                return Err("division by 0".to_string());
            }
            left.wrapping_rem(right)
        }
        BinaryOperator::Power => {
            let exponent =
                u32::try_from(right).map_err(|_| "exponent less than 0".to_string())?;
            left.wrapping_pow(exponent)
        }
        BinaryOperator::BitwiseAnd => left & right,
        BinaryOperator::BitwiseOr => left | right,
        BinaryOperator::BitwiseXor => left ^ right,
        BinaryOperator::ShiftLeft => left.wrapping_shl(shift()),
        BinaryOperator::ShiftRight => left.wrapping_shr(shift()),
        BinaryOperator::LessThan => i64::from(left < right),
        BinaryOperator::LessThanOrEqualTo => i64::from(left <= right),
        BinaryOperator::GreaterThan => i64::from(left > right),
        BinaryOperator::GreaterThanOrEqualTo => i64::from(left >= right),
        BinaryOperator::Equals => i64::from(left == right),
        BinaryOperator::NotEquals => i64::from(left != right),
        BinaryOperator::Comma => right,
        BinaryOperator::LogicalAnd => i64::from(left != 0 && right != 0),
        BinaryOperator::LogicalOr => i64::from(left != 0 || right != 0),
    })
}

/// Decimal, `0x` hex, leading-zero octal and `base#digits`.
fn parse_number(s: &str) -> Option<i64> {
    if let Some(rest) = s.strip_prefix('-') {
        return parse_number(rest).map(i64::wrapping_neg);
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    if let Some((base, digits)) = s.split_once('#') {
        let base: u32 = base.parse().ok().filter(|b| (2..=36).contains(b))?;
        return i64::from_str_radix(digits, base).ok();
    }
    if s.len() > 1 && s.starts_with('0') {
        return i64::from_str_radix(s.get(1..)?, 8).ok();
    }
    s.parse().ok()
}
