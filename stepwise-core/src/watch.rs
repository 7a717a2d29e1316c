//! 監視式

use crate::errors::{DebugError, EvalError};
use crate::frame::CallFrame;
use crate::host::ExpressionEvaluator;
use crate::value::Value;

/// 監視式の評価結果（値または評価エラー）
pub type WatchValue = Result<Value, EvalError>;

/// 監視式
#[derive(Debug, Clone, PartialEq)]
pub struct WatchedExpression {
    pub text: String,
    /// 最初の評価までは `None`
    pub last_value: Option<WatchValue>,
}

/// 1回分の評価結果
#[derive(Debug, Clone, PartialEq)]
pub struct WatchReport {
    pub index: usize,
    pub expr: String,
    pub value: WatchValue,
    pub changed: bool,
}

/// `unwatch` の対象
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchKey {
    Index(usize),
    Expr(String),
}

/// 監視式トラッカー
#[derive(Debug, Default)]
pub struct WatchTracker {
    watches: Vec<WatchedExpression>,
}

impl WatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 監視式を追加する。既に監視中なら `false`
    pub fn add(&mut self, expr: &str) -> bool {
        let expr = expr.trim();
        if self.watches.iter().any(|w| w.text == expr) {
            return false;
        }
        self.watches.push(WatchedExpression {
            text: expr.to_string(),
            last_value: None,
        });
        true
    }

    /// 監視式を削除して、その式を返す
    pub fn remove(&mut self, key: &WatchKey) -> Result<String, DebugError> {
        let index = match key {
            WatchKey::Index(index) if *index < self.watches.len() => *index,
            WatchKey::Index(index) => {
                return Err(DebugError::NotWatching(format!("#{}", index)))
            }
            WatchKey::Expr(expr) => self
                .watches
                .iter()
                .position(|w| w.text == expr.trim())
                .ok_or_else(|| DebugError::NotWatching(expr.clone()))?,
        };
        Ok(self.watches.remove(index).text)
    }

    /// 全ての監視式をフレーム内で評価し、前回の値と比較する
    pub fn evaluate_all(
        &mut self,
        frame: &CallFrame,
        evaluator: &dyn ExpressionEvaluator,
    ) -> Vec<WatchReport> {
        self.watches
            .iter_mut()
            .enumerate()
            .map(|(index, watch)| {
                let value = evaluator.evaluate(&watch.text, frame);
                let changed = watch.last_value.as_ref() != Some(&value);
                watch.last_value = Some(value.clone());
                WatchReport {
                    index,
                    expr: watch.text.clone(),
                    value,
                    changed,
                }
            })
            .collect()
    }

    /// 前回値を更新せずに評価する（停止点以外での表示用）
    pub fn preview(
        &self,
        frame: &CallFrame,
        evaluator: &dyn ExpressionEvaluator,
    ) -> Vec<WatchReport> {
        self.watches
            .iter()
            .enumerate()
            .map(|(index, watch)| {
                let value = evaluator.evaluate(&watch.text, frame);
                WatchReport {
                    index,
                    expr: watch.text.clone(),
                    changed: watch.last_value.as_ref() != Some(&value),
                    value,
                }
            })
            .collect()
    }

    pub fn watches(&self) -> &[WatchedExpression] {
        &self.watches
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }
}
