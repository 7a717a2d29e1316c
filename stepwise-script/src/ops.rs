//! 演算子の意味
//!
//! 実行時の評価とデバッガからの式評価で共有する。

use crate::ast::{BinaryOp, UnaryOp};
use std::cmp::Ordering;
use stepwise_core::Value;

/// 演算の失敗
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpError {
    pub kind: &'static str,
    pub message: String,
}

impl OpError {
    fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn operands(op: BinaryOp, lhs: &Value, rhs: &Value) -> Self {
        Self::new(
            "TypeError",
            format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op.symbol(),
                lhs.type_name(),
                rhs.type_name()
            ),
        )
    }
}

pub fn unary(op: UnaryOp, value: &Value) -> Result<Value, OpError> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| OpError::new("OverflowError", "integer overflow")),
        (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOp::Neg, v) => Err(OpError::new(
            "TypeError",
            format!("bad operand type for unary -: '{}'", v.type_name()),
        )),
    }
}

/// 二項演算（`and`/`or` の短絡評価は呼び出し側で行う）
pub fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, OpError> {
    match op {
        BinaryOp::And => Ok(Value::Bool(lhs.is_truthy() && rhs.is_truthy())),
        BinaryOp::Or => Ok(Value::Bool(lhs.is_truthy() || rhs.is_truthy())),
        BinaryOp::Eq => Ok(Value::Bool(equals(lhs, rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!equals(lhs, rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, lhs, rhs),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(op, lhs, rhs)
        }
    }
}

/// 数値は型をまたいで比較する
pub fn equals(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        _ => lhs == rhs,
    }
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, OpError> {
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => match (as_float(lhs), as_float(rhs)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return Err(OpError::new(
                    "TypeError",
                    format!(
                        "'{}' not supported between '{}' and '{}'",
                        op.symbol(),
                        lhs.type_name(),
                        rhs.type_name()
                    ),
                ))
            }
        },
    };

    // NaN との比較はすべて偽
    let result = ordering.map_or(false, |ord| match op {
        BinaryOp::Lt => ord == Ordering::Less,
        BinaryOp::Le => ord != Ordering::Greater,
        BinaryOp::Gt => ord == Ordering::Greater,
        _ => ord != Ordering::Less,
    });
    Ok(Value::Bool(result))
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, OpError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => int_arithmetic(op, *a, *b),
        (Value::Str(a), Value::Str(b)) if op == BinaryOp::Add => Ok(Value::Str(format!("{}{}", a, b))),
        _ => match (as_float(lhs), as_float(rhs)) {
            (Some(a), Some(b)) => float_arithmetic(op, a, b),
            _ => Err(OpError::operands(op, lhs, rhs)),
        },
    }
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> Result<Value, OpError> {
    if b == 0 && matches!(op, BinaryOp::Div | BinaryOp::Rem) {
        let what = if op == BinaryOp::Div { "division" } else { "modulo" };
        return Err(OpError::new("ZeroDivisionError", format!("integer {} by zero", what)));
    }
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        // 商は負の無限大方向に丸める
        BinaryOp::Div => a.checked_div(b).map(|q| {
            if a % b != 0 && (a < 0) != (b < 0) {
                q - 1
            } else {
                q
            }
        }),
        // 余りは除数と同じ符号
        BinaryOp::Rem => a.checked_rem(b).map(|r| {
            if r != 0 && (r < 0) != (b < 0) {
                r + b
            } else {
                r
            }
        }),
        _ => unreachable!("not an arithmetic operator"),
    };
    result
        .map(Value::Int)
        .ok_or_else(|| OpError::new("OverflowError", "integer overflow"))
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> Result<Value, OpError> {
    if b == 0.0 && matches!(op, BinaryOp::Div | BinaryOp::Rem) {
        return Err(OpError::new("ZeroDivisionError", "float division by zero"));
    }
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a - b * (a / b).floor(),
        _ => unreachable!("not an arithmetic operator"),
    };
    Ok(Value::Float(result))
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}
