//! ソース行情報

use std::collections::{BTreeMap, BTreeSet};
use stepwise_core::host::match_file;
use stepwise_core::SourceProvider;

/// 読み込んだソースファイルの行
#[derive(Debug, Clone, Default)]
pub struct SourceStore {
    /// ファイルパス -> 行（0始まりで格納）
    files: BTreeMap<String, Vec<String>>,
    /// ファイルパス -> 実行文のある行
    executable: BTreeMap<String, BTreeSet<usize>>,
}

impl SourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// ファイルの内容を登録する
    pub fn insert(&mut self, file: impl Into<String>, text: &str) {
        self.files
            .insert(file.into(), text.lines().map(str::to_string).collect());
    }

    /// 実行文のある行を登録する
    pub fn mark_executable(&mut self, file: impl Into<String>, lines: BTreeSet<usize>) {
        self.executable.insert(file.into(), lines);
    }

    /// 1行を取得する（1始まり）
    pub fn line(&self, file: &str, line: usize) -> Option<&str> {
        let index = line.checked_sub(1)?;
        self.files.get(file)?.get(index).map(String::as_str)
    }

    /// 登録済みのファイル
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }
}

impl SourceProvider for SourceStore {
    fn window(&self, file: &str, line: usize, radius: usize) -> Vec<(usize, String)> {
        let Some(lines) = self.files.get(file) else {
            return Vec::new();
        };
        if lines.is_empty() {
            return Vec::new();
        }
        let first = line.saturating_sub(radius).max(1);
        let last = line.saturating_add(radius).min(lines.len());
        (first..=last)
            .filter_map(|number| self.line(file, number).map(|text| (number, text.to_string())))
            .collect()
    }

    fn line_count(&self, file: &str) -> Option<usize> {
        self.files.get(file).map(Vec::len)
    }

    fn is_executable(&self, file: &str, line: usize) -> Option<bool> {
        self.executable.get(file).map(|lines| lines.contains(&line))
    }

    fn resolve_file(&self, name: &str) -> Option<String> {
        match_file(name, self.files())
    }
}
