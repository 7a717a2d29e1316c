//! スクリプトの読み込み機能

use crate::ast::Program;
use crate::eval::ScriptEvaluator;
use crate::parser::parse_program;
use crate::runtime::ScriptRuntime;
use crate::source::SourceStore;
use crate::symbols::SymbolTable;
use crate::Result;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use stepwise_core::Host;

/// 読み込み済みのスクリプト
pub struct ScriptLoader {
    program: Rc<Program>,
    sources: SourceStore,
}

impl ScriptLoader {
    /// ファイルからスクリプトを読み込んでパースする
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let text = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read script {:?}: {}", path, e))?;

        Self::from_source(&path.to_string_lossy(), &text)
    }

    /// 文字列からスクリプトを作成する
    pub fn from_source(file: &str, text: &str) -> Result<Self> {
        let program = parse_program(file, text)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", file, e))?;
        tracing::debug!(file, functions = program.functions.len(), "script loaded");

        let mut sources = SourceStore::new();
        sources.insert(file, text);
        sources.mark_executable(file, program.statement_lines());

        Ok(Self {
            program: Rc::new(program),
            sources,
        })
    }

    /// パース済みのプログラムへの参照を取得
    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn file(&self) -> &str {
        &self.program.file
    }

    /// 関数テーブルを作成する
    pub fn symbols(&self) -> SymbolTable {
        SymbolTable::new(&self.program)
    }

    pub fn sources(&self) -> &SourceStore {
        &self.sources
    }

    /// 実行用のランタイムを作成する
    pub fn runtime(&self) -> ScriptRuntime {
        ScriptRuntime::new(Rc::clone(&self.program))
    }

    /// デバッガに渡すコラボレータ一式を作成する
    pub fn host(&self) -> Host {
        Host::new(ScriptEvaluator::new(), self.symbols(), self.sources.clone())
    }
}
