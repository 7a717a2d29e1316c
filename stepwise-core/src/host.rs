//! ホストランタイムが提供するコラボレータ
//!
//! エンジン自身は式の評価、関数名の解決、ソースの読み出しを行わない。
//! これらはデバッグ対象のランタイム側が実装する。

use crate::errors::EvalError;
use crate::frame::{basename, CallFrame, Location};
use crate::value::Value;

/// 式評価器
pub trait ExpressionEvaluator {
    /// フレーム内で式を評価する
    fn evaluate(&self, expr: &str, frame: &CallFrame) -> Result<Value, EvalError>;

    /// フレーム内の既存の変数に式の値を代入する
    fn assign(&self, name: &str, expr: &str, frame: &CallFrame) -> Result<Value, EvalError>;
}

/// 関数の修飾名をソース位置に解決する
pub trait SymbolResolver {
    /// `Class.method` のような入れ子のスコープも解決できること
    fn resolve_function(&self, qualified_name: &str) -> Option<Location>;
}

/// ソース行の提供
pub trait SourceProvider {
    /// `line` を中心とした前後 `radius` 行を返す（ファイル範囲内に切り詰める）
    fn window(&self, file: &str, line: usize, radius: usize) -> Vec<(usize, String)>;

    /// ファイルの行数（不明なファイルなら `None`）
    fn line_count(&self, file: &str) -> Option<usize>;

    /// 行に実行文があるか（分からなければ `None`）
    ///
    /// `Some(false)` の行ではイベントが起きないので、位置指定として受け付けない。
    fn is_executable(&self, _file: &str, _line: usize) -> Option<bool> {
        None
    }

    /// オペレータが入力したファイル名を正規のパスに解決する
    fn resolve_file(&self, name: &str) -> Option<String> {
        self.line_count(name).map(|_| name.to_string())
    }
}

/// コラボレータ一式
pub struct Host {
    pub evaluator: Box<dyn ExpressionEvaluator>,
    pub symbols: Box<dyn SymbolResolver>,
    pub sources: Box<dyn SourceProvider>,
}

impl Host {
    pub fn new(
        evaluator: impl ExpressionEvaluator + 'static,
        symbols: impl SymbolResolver + 'static,
        sources: impl SourceProvider + 'static,
    ) -> Self {
        Self {
            evaluator: Box::new(evaluator),
            symbols: Box::new(symbols),
            sources: Box::new(sources),
        }
    }
}

/// ソースを持たないホスト向けの空実装
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSource;

impl SourceProvider for NoSource {
    fn window(&self, _file: &str, _line: usize, _radius: usize) -> Vec<(usize, String)> {
        Vec::new()
    }

    fn line_count(&self, _file: &str) -> Option<usize> {
        None
    }

    fn resolve_file(&self, name: &str) -> Option<String> {
        Some(name.to_string())
    }
}

/// 関数を一つも知らない解決器
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSymbols;

impl SymbolResolver for NoSymbols {
    fn resolve_function(&self, _qualified_name: &str) -> Option<Location> {
        None
    }
}

/// ファイル名の候補一覧から、完全一致または一意なベース名一致を探す
pub fn match_file<'a, I>(name: &str, known: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut by_basename = Vec::new();
    for file in known {
        if file == name {
            return Some(file.to_string());
        }
        if basename(file) == basename(name) {
            by_basename.push(file);
        }
    }
    match by_basename.as_slice() {
        [only] => Some(only.to_string()),
        _ => None,
    }
}
