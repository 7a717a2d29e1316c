//! シンボル解決機能

use crate::ast::Program;
use std::collections::BTreeMap;
use stepwise_core::{Location, SymbolResolver};

/// 関数シンボル情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// `Class.method` 形式の修飾名
    pub name: String,
    /// `fn` ヘッダの行
    pub header_line: usize,
    /// 本体の最初の実行文（空の本体なら `None`）
    pub entry_line: Option<usize>,
    pub params: Vec<String>,
}

/// スクリプトの関数テーブル
#[derive(Debug, Clone)]
pub struct SymbolTable {
    file: String,
    /// 修飾名 -> シンボル情報
    symbols_by_name: BTreeMap<String, Symbol>,
}

impl SymbolTable {
    /// パース済みのプログラムからシンボルテーブルを作成する
    pub fn new(program: &Program) -> Self {
        let symbols_by_name = program
            .functions
            .values()
            .map(|def| {
                let symbol = Symbol {
                    name: def.qualified_name.clone(),
                    header_line: def.line,
                    entry_line: def.first_statement_line(),
                    params: def.params.clone(),
                };
                (symbol.name.clone(), symbol)
            })
            .collect();

        Self {
            file: program.file.clone(),
            symbols_by_name,
        }
    }

    /// 修飾名でシンボルを検索する
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols_by_name.get(name)
    }

    /// すべてのシンボルを名前順に取得する
    pub fn all_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols_by_name.values()
    }

    /// パターンを含むシンボルを検索する
    pub fn find_symbols(&self, pattern: &str) -> Vec<&Symbol> {
        self.symbols_by_name
            .values()
            .filter(|s| s.name.contains(pattern))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.symbols_by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols_by_name.is_empty()
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve_function(&self, qualified_name: &str) -> Option<Location> {
        let symbol = self.get(qualified_name)?;
        let line = symbol.entry_line?;
        tracing::debug!(function = qualified_name, line, "function resolved");
        Some(Location::new(self.file.clone(), line))
    }
}
