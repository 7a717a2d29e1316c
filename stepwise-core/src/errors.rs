//! エラー型
//!
//! オペレータに報告されるエラーはすべてコマンドループ内で回復される。
//! ループの外まで伝播するのは [`DebugError::InternalInvariant`] のみ。

use crate::breakpoint::BreakpointId;
use thiserror::Error;

/// 式の評価失敗（評価器コラボレータが返す）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    /// メッセージからエラーを作成する
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// デバッガのエラー分類
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebugError {
    /// 不正なコマンド入力
    #[error("{0}")]
    CommandSyntax(String),

    /// 解決できない位置指定
    #[error("Cannot resolve location '{location}': {reason}")]
    UnresolvedLocation { location: String, reason: String },

    /// ブレークポイント条件の評価失敗（警告として扱う）
    #[error("Err evaluating BP {id} condition '{condition}': {source}")]
    ConditionEval {
        id: BreakpointId,
        condition: String,
        source: EvalError,
    },

    /// printvar / setvar / watch の評価失敗
    #[error("Error: {0}")]
    ExpressionEval(#[from] EvalError),

    /// up / down が範囲外
    #[error("Cannot move further {direction} (stack has {depth} frames, focus is #{focus})")]
    NavigationRange {
        direction: &'static str,
        depth: usize,
        focus: usize,
    },

    /// 存在しないブレークポイント
    #[error("Breakpoint not found: {0}")]
    BreakpointNotFound(String),

    /// 監視していない式
    #[error("Not watching: {0}")]
    NotWatching(String),

    /// 停止中ではないため参照するフレームがない
    #[error("No frame")]
    NoFrame,

    /// 内部不変条件の違反（致命的）
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

impl DebugError {
    /// 構文エラーを作成する
    pub fn syntax(message: impl Into<String>) -> Self {
        DebugError::CommandSyntax(message.into())
    }

    /// 位置解決エラーを作成する
    pub fn unresolved(location: impl Into<String>, reason: impl Into<String>) -> Self {
        DebugError::UnresolvedLocation {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// セッションを中断すべき致命的エラーかどうか
    pub fn is_fatal(&self) -> bool {
        matches!(self, DebugError::InternalInvariant(_))
    }
}
