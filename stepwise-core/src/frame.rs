//! ソース位置とコールフレーム

use crate::value::ValueHandle;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// 解決済みのソース位置 `(file, line)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub file: String,
    pub line: usize,
}

impl Location {
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// ファイル名部分のみを取得する（表示用）
    pub fn basename(&self) -> &str {
        basename(&self.file)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.basename(), self.line)
    }
}

/// パスからファイル名部分を取り出す
pub fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
}

/// 変数名 -> 値ハンドル
pub type Bindings = BTreeMap<String, ValueHandle>;

/// 関数の活性化一つ分のスナップショット
///
/// 呼び出し元への参照は持たない。呼び出し関係はスタック上のインデックス
/// （= depth）で表す。
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// 0 が最外フレーム
    pub depth: usize,
    pub file: String,
    pub line: usize,
    pub function_name: String,
    pub locals: Bindings,
    pub globals: Bindings,
}

impl CallFrame {
    /// フレームの現在位置
    pub fn location(&self) -> Location {
        Location::new(self.file.clone(), self.line)
    }

    /// 変数を検索する（ローカル → グローバルの順）
    pub fn lookup(&self, name: &str) -> Option<&ValueHandle> {
        self.locals.get(name).or_else(|| self.globals.get(name))
    }

    /// `file:line function()` 形式の表示
    pub fn describe(&self) -> String {
        format!("{}:{} {}()", basename(&self.file), self.line, self.function_name)
    }
}
