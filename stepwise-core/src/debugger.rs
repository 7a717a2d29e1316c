//! デバッガのメインロジック
//!
//! トレースイベントを実行制御に渡し、停止と判定されたらスタックを取り込んで
//! コマンドループに入る。ループから戻るまでホストのスレッドは止まったままになる。

use crate::breakpoint::BreakpointId;
use crate::console::Console;
use crate::controller::{Decision, StopReason};
use crate::errors::DebugError;
use crate::host::Host;
use crate::interpreter::location_resolver;
use crate::parse::LocationSpec;
use crate::session::{SessionConfig, SessionState};
use crate::trace::{EventSink, StackWalker, TraceEvent, TraceProvider, TraceRouter, Verdict};
use crate::watch::WatchReport;
use crate::Result;

/// 現在行を示すマーカー
pub(crate) const CURRENT_LINE_MARKER: &str = "---> ";

/// デバッガ
pub struct Debugger {
    /// セッション設定
    pub(crate) config: SessionConfig,
    /// セッション状態
    pub(crate) state: SessionState,
    /// ホストのコラボレータ
    pub(crate) host: Host,
    /// オペレータコンソール
    pub(crate) console: Box<dyn Console>,
    /// 空行で繰り返すコマンド
    pub(crate) last_command: Option<String>,
}

impl Debugger {
    /// 新しいデバッガを作成する
    pub fn new(config: SessionConfig, host: Host, console: Box<dyn Console>) -> Self {
        let state = SessionState::new(&config);
        Self {
            config,
            state,
            host,
            console,
            last_command: None,
        }
    }

    /// セッション状態を取得する
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// 実行前にブレークポイントを設定する
    ///
    /// 停止中でなければ行番号のみの指定は解決できない。
    pub fn set_breakpoint(
        &mut self,
        location: &LocationSpec,
        condition: Option<String>,
    ) -> std::result::Result<BreakpointId, DebugError> {
        let resolver = location_resolver(&self.host, &self.state.stack);
        let bp = self.state.breakpoints.register(location, condition, &resolver)?;
        let (id, message) = (bp.id, format!("{} set", bp));
        self.say(message);
        Ok(id)
    }

    /// トレースプロバイダにアタッチしてプログラムを最後まで実行する
    pub fn attach<P: TraceProvider + ?Sized>(self, provider: &mut P) -> Result<Self> {
        let mut router = TraceRouter::new(self);
        provider.subscribe(&mut router)?;
        let mut debugger = router.into_inner();
        if !debugger.state.controller.is_terminated() {
            // ProgramEnded を送らないプロバイダでもセッションは閉じる
            debugger.state.controller.terminate();
        }
        Ok(debugger)
    }

    /// コンソールに1行出力する
    pub(crate) fn say(&mut self, line: impl AsRef<str>) {
        self.console.write_line(line.as_ref());
    }

    /// 停止処理：スタックの取り込み、停止位置の表示、コマンドループ
    fn suspend(
        &mut self,
        reason: StopReason,
        stack: &dyn StackWalker,
    ) -> std::result::Result<Verdict, DebugError> {
        self.state.stack.capture(stack.capture())?;
        self.state.stop_reason = Some(reason.clone());

        self.show_location(&format!("{}", reason))?;
        match &reason {
            StopReason::Finish { value } => self.say(format!("Returned: {}", value)),
            StopReason::Exception(info) => {
                self.say("Exception:");
                self.say(format!("  {}", info));
            }
            _ => {}
        }
        self.show_watches_at_stop()?;

        self.interaction_loop()?;
        self.state.stack.release();

        if self.state.controller.is_terminated() {
            Ok(Verdict::Detach)
        } else {
            Ok(Verdict::Resume)
        }
    }

    /// フォーカスフレームの位置とソース窓を表示する
    pub(crate) fn show_location(&mut self, heading: &str) -> std::result::Result<(), DebugError> {
        let window = self
            .state
            .stack
            .list(self.host.sources.as_ref(), self.config.list_radius)?;
        let focus_is_topmost = self.state.stack.focus_is_topmost();
        let header = format!(
            " Frame {}: {}",
            self.state.stack.focus_index(),
            self.state.stack.focus()?.describe()
        );

        self.say(format!("{} at:", heading));
        self.say(header);
        for (number, text) in window.lines {
            let prefix = if number == window.current_line && focus_is_topmost {
                CURRENT_LINE_MARKER
            } else {
                "     "
            };
            self.say(format!(" {}{:4} {}", prefix, number, text));
        }
        self.say("");
        Ok(())
    }

    /// 停止時に監視式を評価して表示する
    fn show_watches_at_stop(&mut self) -> std::result::Result<(), DebugError> {
        if self.state.watches.is_empty() {
            return Ok(());
        }
        let frame = self.state.stack.focus()?;
        let reports = self
            .state
            .watches
            .evaluate_all(frame, self.host.evaluator.as_ref());
        self.show_watch_reports(&reports);
        Ok(())
    }

    /// 監視式の評価結果を表示する
    pub(crate) fn show_watch_reports(&mut self, reports: &[WatchReport]) {
        let header = format!(
            "Watched Expressions (frame {}):",
            self.state.stack.focus_index()
        );
        self.say(header);
        for report in reports {
            let marker = if report.changed { " (changed)" } else { "" };
            let line = match &report.value {
                Ok(value) => format!("  {}: {} = {}{}", report.index, report.expr, value, marker),
                Err(err) => format!("  {}: {} = Error: {}{}", report.index, report.expr, err, marker),
            };
            self.say(line);
        }
        self.say("");
    }
}

impl EventSink for Debugger {
    fn dispatch(&mut self, event: &TraceEvent, stack: &dyn StackWalker) -> Result<Verdict> {
        let outcome = self.state.controller.on_event(
            event,
            &mut self.state.breakpoints,
            self.host.evaluator.as_ref(),
        )?;

        for warning in &outcome.warnings {
            self.say(format!("Warning: {}", warning));
        }

        match outcome.decision {
            Decision::Continue => Ok(Verdict::Resume),
            Decision::Terminate => {
                if matches!(event, TraceEvent::ProgramEnded) {
                    self.say("Program finished.");
                }
                Ok(Verdict::Detach)
            }
            Decision::Stop(reason) => Ok(self.suspend(reason, stack)?),
        }
    }
}
