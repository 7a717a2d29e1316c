//! セッション状態と設定

use crate::breakpoint::BreakpointRegistry;
use crate::controller::{ExecutionController, RunMode, StopReason};
use crate::stack::StackNavigator;
use crate::watch::WatchTracker;
use std::collections::VecDeque;

/// セッション設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// 最初のイベントで停止する
    pub stop_on_entry: bool,
    /// `list` で現在行の前後に表示する行数
    pub list_radius: usize,
    /// 保持するコマンド履歴の件数
    pub history_limit: usize,
    /// プロンプトに表示する名前
    pub prompt: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stop_on_entry: true,
            list_radius: 2,
            history_limit: 100,
            prompt: "stepwise".to_string(),
        }
    }
}

/// 上限付きのコマンド履歴
#[derive(Debug)]
pub struct CommandHistory {
    entries: VecDeque<String>,
    limit: usize,
    /// これまでに記録した総数（表示用の通し番号）
    total: usize,
}

impl CommandHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
            total: 0,
        }
    }

    /// コマンドを記録する。上限を超えたら古いものから捨てる
    pub fn push(&mut self, line: &str) {
        if self.limit == 0 {
            return;
        }
        if self.entries.len() == self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(line.to_string());
        self.total += 1;
    }

    /// 直前に記録したコマンド
    pub fn last(&self) -> Option<&str> {
        self.entries.back().map(String::as_str)
    }

    /// 最新 `n` 件を通し番号付きで取得する
    pub fn recent(&self, n: usize) -> Vec<(usize, &str)> {
        let skip = self.entries.len().saturating_sub(n);
        let first_number = self.total - self.entries.len() + skip;
        self.entries
            .iter()
            .skip(skip)
            .enumerate()
            .map(|(i, line)| (first_number + i, line.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// セッション状態
///
/// アタッチ時に作られ、`quit` かプログラム終了で役目を終える。
/// プロセス全体で共有されるシングルトンではない。
pub struct SessionState {
    pub controller: ExecutionController,
    pub stack: StackNavigator,
    pub breakpoints: BreakpointRegistry,
    pub watches: WatchTracker,
    pub history: CommandHistory,
    /// 直近の停止理由
    pub stop_reason: Option<StopReason>,
}

impl SessionState {
    /// 設定からセッション状態を作成する
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            controller: ExecutionController::new(config.stop_on_entry),
            stack: StackNavigator::new(),
            breakpoints: BreakpointRegistry::new(),
            watches: WatchTracker::new(),
            history: CommandHistory::new(config.history_limit),
            stop_reason: None,
        }
    }

    /// 現在の実行モード
    pub fn run_mode(&self) -> &RunMode {
        self.controller.mode()
    }

    /// フォーカスインデックス
    pub fn focus_index(&self) -> usize {
        self.stack.focus_index()
    }
}
