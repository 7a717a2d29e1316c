//! デバッガからの式評価
//!
//! 実行時と同じ文法と演算を使うが、関数呼び出しは副作用があるため受け付けない。

use crate::ast::{BinaryOp, Expr};
use crate::ops;
use crate::parser::parse_expression;
use stepwise_core::{CallFrame, EvalError, ExpressionEvaluator, Value};

/// フレームの変数に対して式を評価する
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptEvaluator;

impl ScriptEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn eval(&self, expr: &Expr, frame: &CallFrame) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => frame
                .lookup(name)
                .map(|slot| slot.get())
                .ok_or_else(|| EvalError::new(format!("name '{}' is not defined", name))),
            Expr::Unary { op, operand } => {
                let operand = self.eval(operand, frame)?;
                ops::unary(*op, &operand).map_err(|e| EvalError::new(e.message))
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, frame)?;
                match op {
                    BinaryOp::And if !lhs.is_truthy() => Ok(Value::Bool(false)),
                    BinaryOp::Or if lhs.is_truthy() => Ok(Value::Bool(true)),
                    _ => {
                        let rhs = self.eval(rhs, frame)?;
                        ops::binary(*op, &lhs, &rhs).map_err(|e| EvalError::new(e.message))
                    }
                }
            }
            Expr::Call { callee, .. } => Err(EvalError::new(format!(
                "cannot call '{}' from the debugger",
                callee
            ))),
        }
    }
}

fn parse(text: &str) -> Result<Expr, EvalError> {
    parse_expression(text).map_err(|e| EvalError::new(format!("invalid syntax: {}", e.message())))
}

impl ExpressionEvaluator for ScriptEvaluator {
    fn evaluate(&self, expr: &str, frame: &CallFrame) -> Result<Value, EvalError> {
        self.eval(&parse(expr)?, frame)
    }

    /// 既存の束縛に書き込む（ハンドル経由なので実行中のフレームにも反映される）
    fn assign(&self, name: &str, expr: &str, frame: &CallFrame) -> Result<Value, EvalError> {
        let slot = frame
            .lookup(name)
            .ok_or_else(|| EvalError::new(format!("name '{}' is not defined", name)))?;
        let value = self.evaluate(expr, frame)?;
        slot.set(value.clone());
        tracing::debug!(name, %value, "variable assigned");
        Ok(value)
    }
}
