//! スクリプトのエラー型

use thiserror::Error;

/// スクリプトの構文エラーと実行時エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// 構文エラー
    #[error("line {line}: SyntaxError: {message}")]
    Syntax { line: usize, message: String },

    /// 実行時エラー（`kind` は `NameError` や `TypeError` など）
    #[error("line {line}: {kind}: {message}")]
    Runtime {
        line: usize,
        kind: &'static str,
        message: String,
    },

    /// `raise` 文で送出された値
    #[error("line {line}: Raised: {value}")]
    Raised { line: usize, value: String },
}

impl ScriptError {
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        ScriptError::Syntax {
            line,
            message: message.into(),
        }
    }

    pub fn runtime(line: usize, kind: &'static str, message: impl Into<String>) -> Self {
        ScriptError::Runtime {
            line,
            kind,
            message: message.into(),
        }
    }

    /// エラーが起きた行
    pub fn line(&self) -> usize {
        match self {
            ScriptError::Syntax { line, .. }
            | ScriptError::Runtime { line, .. }
            | ScriptError::Raised { line, .. } => *line,
        }
    }

    /// 例外の種類
    pub fn kind(&self) -> &str {
        match self {
            ScriptError::Syntax { .. } => "SyntaxError",
            ScriptError::Runtime { kind, .. } => kind,
            ScriptError::Raised { .. } => "Raised",
        }
    }

    /// 種類を除いたメッセージ
    pub fn message(&self) -> &str {
        match self {
            ScriptError::Syntax { message, .. } | ScriptError::Runtime { message, .. } => message,
            ScriptError::Raised { value, .. } => value,
        }
    }
}
