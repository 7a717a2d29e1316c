//! Stepwise スクリプトランタイム
//!
//! 1行1文の小さなスクリプト言語（`.sw`）のインタプリタ。
//! デバッガエンジンに対するトレースプロバイダとして動き、式評価、
//! 関数名の解決、ソース行の提供も担当する。

pub mod ast;
pub mod errors;
pub mod eval;
pub mod lexer;
pub mod loader;
pub mod ops;
pub mod parser;
pub mod runtime;
pub mod source;
pub mod symbols;

pub use ast::{FunctionDef, Program};
pub use errors::ScriptError;
pub use eval::ScriptEvaluator;
pub use loader::ScriptLoader;
pub use parser::{parse_expression, parse_program};
pub use runtime::ScriptRuntime;
pub use source::SourceStore;
pub use symbols::{Symbol, SymbolTable};

/// スクリプトランタイムの結果型
pub type Result<T> = anyhow::Result<T>;
