//! ブレークポイント管理

use crate::errors::DebugError;
use crate::frame::{CallFrame, Location};
use crate::host::{ExpressionEvaluator, SourceProvider, SymbolResolver};
use crate::parse::LocationSpec;
use std::collections::BTreeMap;
use std::fmt;

/// ブレークポイントID（セッション中は再利用しない）
pub type BreakpointId = usize;

/// ブレークポイントの指定方法
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointSite {
    /// 行指定
    Line,
    /// 関数名指定（作成時に一度だけ解決済み）
    Function(String),
}

/// ブレークポイント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub location: Location,
    pub site: BreakpointSite,
    pub condition: Option<String>,
    pub enabled: bool,
    /// 残りの無視回数
    pub ignore_count: usize,
    /// 条件が真となった一致回数（停止した回を含む）
    pub hit_count: usize,
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Breakpoint {} at {}", self.id, self.location)?;
        if let BreakpointSite::Function(name) = &self.site {
            write!(f, " ({})", name)?;
        }
        if let Some(cond) = &self.condition {
            write!(f, " if {}", cond)?;
        }
        Ok(())
    }
}

/// 一致判定の結果
#[derive(Debug, Default)]
pub struct MatchResult {
    pub should_stop: bool,
    /// 停止を引き起こしたブレークポイント（複数なら最小のID）
    pub breakpoint_id: Option<BreakpointId>,
    /// 条件評価に失敗したときの警告
    pub warnings: Vec<DebugError>,
}

/// 位置指定の解決に必要なコラボレータ
pub struct LocationResolver<'a> {
    pub symbols: &'a dyn SymbolResolver,
    pub sources: &'a dyn SourceProvider,
    /// 行番号のみの指定で使うファイル（フォーカスフレームのファイル）
    pub current_file: Option<&'a str>,
}

impl<'a> LocationResolver<'a> {
    /// 位置指定を `(file, line)` に解決する
    pub fn resolve(&self, spec: &LocationSpec) -> Result<Location, DebugError> {
        let location = match spec {
            LocationSpec::Line(line) => {
                let file = self
                    .current_file
                    .ok_or_else(|| DebugError::unresolved(spec.to_string(), "no current file"))?;
                Location::new(file, *line)
            }
            LocationSpec::FileLine { file, line } => {
                let file = self
                    .sources
                    .resolve_file(file)
                    .ok_or_else(|| DebugError::unresolved(spec.to_string(), "unknown file"))?;
                Location::new(file, *line)
            }
            LocationSpec::Function(name) => self
                .symbols
                .resolve_function(name)
                .ok_or_else(|| DebugError::unresolved(spec.to_string(), "function not found"))?,
        };

        if let Some(count) = self.sources.line_count(&location.file) {
            if location.line == 0 || location.line > count {
                return Err(DebugError::unresolved(
                    spec.to_string(),
                    format!("line {} is out of range (file has {} lines)", location.line, count),
                ));
            }
        }
        if self.sources.is_executable(&location.file, location.line) == Some(false) {
            return Err(DebugError::unresolved(
                spec.to_string(),
                format!("no executable statement on line {}", location.line),
            ));
        }

        Ok(location)
    }
}

/// ブレークポイントレジストリ
pub struct BreakpointRegistry {
    breakpoints: BTreeMap<BreakpointId, Breakpoint>,
    next_id: BreakpointId,
}

impl BreakpointRegistry {
    /// 新しいレジストリを作成する
    pub fn new() -> Self {
        Self {
            breakpoints: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// 位置指定を解決してブレークポイントを登録する
    ///
    /// 解決に失敗した場合は登録しない（IDも消費しない）。
    pub fn register(
        &mut self,
        spec: &LocationSpec,
        condition: Option<String>,
        resolver: &LocationResolver<'_>,
    ) -> Result<&Breakpoint, DebugError> {
        let location = resolver.resolve(spec)?;
        let site = match spec {
            LocationSpec::Function(name) => BreakpointSite::Function(name.clone()),
            _ => BreakpointSite::Line,
        };
        Ok(self.insert(location, site, condition))
    }

    /// 解決済みの位置にブレークポイントを追加する
    pub fn insert(
        &mut self,
        location: Location,
        site: BreakpointSite,
        condition: Option<String>,
    ) -> &Breakpoint {
        let id = self.next_id;
        self.next_id += 1;

        tracing::debug!(id, %location, ?condition, "breakpoint registered");
        self.breakpoints.entry(id).or_insert(Breakpoint {
            id,
            location,
            site,
            condition,
            enabled: true,
            ignore_count: 0,
            hit_count: 0,
        })
    }

    /// フレームの位置に一致するブレークポイントを評価する
    ///
    /// 同じ位置のブレークポイントはすべて評価する（無効・無視中のものがあっても
    /// 他の評価は打ち切らない）。
    pub fn match_frame(
        &mut self,
        frame: &CallFrame,
        evaluator: &dyn ExpressionEvaluator,
    ) -> MatchResult {
        let mut result = MatchResult::default();

        for bp in self.breakpoints.values_mut() {
            if !bp.enabled || bp.location.line != frame.line || bp.location.file != frame.file {
                continue;
            }

            let condition_true = match &bp.condition {
                None => true,
                Some(cond) => match evaluator.evaluate(cond, frame) {
                    Ok(value) => value.is_truthy(),
                    Err(err) => {
                        tracing::warn!(id = bp.id, condition = %cond, %err, "breakpoint condition failed");
                        result.warnings.push(DebugError::ConditionEval {
                            id: bp.id,
                            condition: cond.clone(),
                            source: err,
                        });
                        false
                    }
                },
            };
            if !condition_true {
                continue;
            }

            bp.hit_count += 1;
            if bp.ignore_count > 0 {
                bp.ignore_count -= 1;
                tracing::debug!(id = bp.id, left = bp.ignore_count, "breakpoint hit ignored");
                continue;
            }

            result.should_stop = true;
            // BTreeMapの走査順なので最初に見つかったものが最小ID
            if result.breakpoint_id.is_none() {
                result.breakpoint_id = Some(bp.id);
            }
        }

        result
    }

    /// ブレークポイントを有効化する
    pub fn enable(&mut self, id: BreakpointId) -> Result<(), DebugError> {
        self.get_mut(id)?.enabled = true;
        Ok(())
    }

    /// ブレークポイントを無効化する
    pub fn disable(&mut self, id: BreakpointId) -> Result<(), DebugError> {
        self.get_mut(id)?.enabled = false;
        Ok(())
    }

    /// 無視回数を設定する
    pub fn set_ignore(&mut self, id: BreakpointId, count: usize) -> Result<(), DebugError> {
        self.get_mut(id)?.ignore_count = count;
        Ok(())
    }

    /// IDでブレークポイントを削除する
    pub fn clear(&mut self, id: BreakpointId) -> Result<Breakpoint, DebugError> {
        self.breakpoints
            .remove(&id)
            .ok_or_else(|| DebugError::BreakpointNotFound(id.to_string()))
    }

    /// 位置にあるブレークポイントをすべて削除する
    pub fn clear_at(&mut self, location: &Location) -> Result<Vec<BreakpointId>, DebugError> {
        let ids: Vec<BreakpointId> = self
            .breakpoints
            .values()
            .filter(|bp| &bp.location == location)
            .map(|bp| bp.id)
            .collect();
        if ids.is_empty() {
            return Err(DebugError::BreakpointNotFound(location.to_string()));
        }
        for id in &ids {
            self.breakpoints.remove(id);
        }
        Ok(ids)
    }

    /// すべてのブレークポイントを削除する（IDカウンタはそのまま）
    pub fn clear_all(&mut self) -> usize {
        let count = self.breakpoints.len();
        self.breakpoints.clear();
        count
    }

    /// ブレークポイントを取得する
    pub fn get(&self, id: BreakpointId) -> Option<&Breakpoint> {
        self.breakpoints.get(&id)
    }

    fn get_mut(&mut self, id: BreakpointId) -> Result<&mut Breakpoint, DebugError> {
        self.breakpoints
            .get_mut(&id)
            .ok_or_else(|| DebugError::BreakpointNotFound(id.to_string()))
    }

    /// 全てのブレークポイントをID順に取得する
    pub fn all(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    /// ブレークポイントの数を取得する
    pub fn count(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}

impl Default for BreakpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}
