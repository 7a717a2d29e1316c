//! 実行制御（ステップ実行の状態機械）

use crate::breakpoint::{BreakpointId, BreakpointRegistry};
use crate::errors::DebugError;
use crate::frame::Location;
use crate::host::ExpressionEvaluator;
use crate::trace::{ExceptionInfo, TraceEvent};
use crate::value::Value;
use std::fmt;

/// 実行モード
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// ブレークポイントと例外でのみ停止
    Running,
    /// 深さ `depth` 以下の次の文で停止
    SteppingOver { depth: usize },
    /// 次の文または関数呼び出しで停止
    SteppingInto,
    /// 深さ `target_depth` のフレームが戻ったら停止
    RunningUntilReturn { target_depth: usize },
    /// 指定位置に深さ `max_depth` 以下で到達したら停止
    RunningUntilLine { location: Location, max_depth: usize },
    /// オペレータが操作中
    Stopped,
    /// 終了またはデタッチ済み
    Terminated,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Running => write!(f, "running"),
            RunMode::SteppingOver { depth } => write!(f, "stepping over (depth {})", depth),
            RunMode::SteppingInto => write!(f, "stepping into"),
            RunMode::RunningUntilReturn { target_depth } => {
                write!(f, "running until return (depth {})", target_depth)
            }
            RunMode::RunningUntilLine { location, max_depth } => {
                write!(f, "running until {} (depth <= {})", location, max_depth)
            }
            RunMode::Stopped => write!(f, "stopped"),
            RunMode::Terminated => write!(f, "terminated"),
        }
    }
}

/// 停止理由
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    InitialEntry,
    Step,
    Next,
    /// `finish` の対象フレームが値を返した
    Finish { value: Value },
    Until,
    Breakpoint(BreakpointId),
    Exception(ExceptionInfo),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::InitialEntry => write!(f, "Initial entry"),
            StopReason::Step => write!(f, "Step"),
            StopReason::Next => write!(f, "Next"),
            StopReason::Finish { .. } => write!(f, "Finish"),
            StopReason::Until => write!(f, "Until"),
            StopReason::Breakpoint(id) => write!(f, "Breakpoint {}", id),
            StopReason::Exception(_) => write!(f, "Exception"),
        }
    }
}

/// イベントに対する判定
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// そのまま実行を続ける
    Continue,
    /// 停止してオペレータに制御を渡す
    Stop(StopReason),
    /// セッション終了
    Terminate,
}

/// 判定とその過程で出た警告
#[derive(Debug)]
pub struct Outcome {
    pub decision: Decision,
    pub warnings: Vec<DebugError>,
}

impl Outcome {
    fn new(decision: Decision) -> Self {
        Self {
            decision,
            warnings: Vec::new(),
        }
    }
}

/// 実行制御
pub struct ExecutionController {
    mode: RunMode,
    /// 最初の停止がまだ起きていない
    awaiting_entry: bool,
}

impl ExecutionController {
    /// 新しい実行制御を作成する
    ///
    /// `stop_on_entry` なら最初の呼び出し／文イベントで停止する。
    pub fn new(stop_on_entry: bool) -> Self {
        let mode = if stop_on_entry {
            RunMode::SteppingInto
        } else {
            RunMode::Running
        };
        Self {
            mode,
            awaiting_entry: stop_on_entry,
        }
    }

    /// 現在の実行モード
    pub fn mode(&self) -> &RunMode {
        &self.mode
    }

    pub fn is_stopped(&self) -> bool {
        self.mode == RunMode::Stopped
    }

    pub fn is_terminated(&self) -> bool {
        self.mode == RunMode::Terminated
    }

    /// 停止中から実行を再開する（`next`/`step`/`continue`/`finish`/`rununtil`）
    pub fn resume(&mut self, mode: RunMode) {
        tracing::debug!(from = %self.mode, to = %mode, "run mode change");
        self.mode = mode;
    }

    /// セッションを終了状態にする（`quit` またはプログラム終了）
    pub fn terminate(&mut self) {
        tracing::debug!(from = %self.mode, "session terminated");
        self.mode = RunMode::Terminated;
    }

    /// イベントを受けて遷移する
    ///
    /// 1. 例外 → 無条件に停止
    /// 2. プログラム終了 → 終了
    /// 3. ブレークポイント一致 → 停止
    /// 4. 実行モード自身の停止条件 → 停止
    /// 5. それ以外は継続
    pub fn on_event(
        &mut self,
        event: &TraceEvent,
        breakpoints: &mut BreakpointRegistry,
        evaluator: &dyn ExpressionEvaluator,
    ) -> Result<Outcome, DebugError> {
        match self.mode {
            RunMode::Terminated => return Ok(Outcome::new(Decision::Terminate)),
            RunMode::Stopped => {
                return Err(DebugError::InternalInvariant(format!(
                    "'{}' event delivered while stopped",
                    event.kind()
                )))
            }
            _ => {}
        }

        let mut outcome = match event {
            TraceEvent::ExceptionRaised { error, .. } => {
                Outcome::new(Decision::Stop(StopReason::Exception(error.clone())))
            }
            TraceEvent::ProgramEnded => {
                self.terminate();
                return Ok(Outcome::new(Decision::Terminate));
            }
            TraceEvent::StatementEntered { frame } => {
                let matched = breakpoints.match_frame(frame, evaluator);
                let decision = match matched.breakpoint_id {
                    Some(id) if matched.should_stop => Decision::Stop(StopReason::Breakpoint(id)),
                    _ => self.mode_decision(event),
                };
                Outcome {
                    decision,
                    warnings: matched.warnings,
                }
            }
            _ => Outcome::new(self.mode_decision(event)),
        };

        if let Decision::Stop(reason) = &mut outcome.decision {
            if self.awaiting_entry {
                self.awaiting_entry = false;
                if matches!(reason, StopReason::Step) {
                    *reason = StopReason::InitialEntry;
                }
            }
            tracing::debug!(%reason, from = %self.mode, "stopping");
            self.mode = RunMode::Stopped;
        }

        Ok(outcome)
    }

    /// 実行モード自身の停止条件
    fn mode_decision(&self, event: &TraceEvent) -> Decision {
        let stop = match (&self.mode, event) {
            (RunMode::SteppingInto, TraceEvent::StatementEntered { .. })
            | (RunMode::SteppingInto, TraceEvent::CallEntered { .. }) => Some(StopReason::Step),
            (RunMode::SteppingOver { depth }, TraceEvent::StatementEntered { frame })
                if frame.depth <= *depth =>
            {
                Some(StopReason::Next)
            }
            (
                RunMode::RunningUntilReturn { target_depth },
                TraceEvent::CallReturned {
                    returning_frame,
                    value,
                    ..
                },
            ) if returning_frame.depth == *target_depth => Some(StopReason::Finish {
                value: value.clone(),
            }),
            (
                RunMode::RunningUntilLine {
                    location,
                    max_depth,
                },
                TraceEvent::StatementEntered { frame },
            ) if frame.depth <= *max_depth
                && frame.line == location.line
                && frame.file == location.file =>
            {
                Some(StopReason::Until)
            }
            _ => None,
        };

        match stop {
            Some(reason) => Decision::Stop(reason),
            None => Decision::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoint::BreakpointSite;
    use crate::errors::EvalError;
    use crate::frame::{Bindings, CallFrame};

    struct NoEval;

    impl ExpressionEvaluator for NoEval {
        fn evaluate(&self, _expr: &str, _frame: &CallFrame) -> Result<Value, EvalError> {
            Err(EvalError::new("no evaluator"))
        }

        fn assign(&self, _name: &str, _expr: &str, _frame: &CallFrame) -> Result<Value, EvalError> {
            Err(EvalError::new("no evaluator"))
        }
    }

    fn frame(depth: usize, line: usize) -> CallFrame {
        CallFrame {
            depth,
            file: "f.sw".into(),
            line,
            function_name: format!("fn{}", depth),
            locals: Bindings::new(),
            globals: Bindings::new(),
        }
    }

    fn line(depth: usize, line: usize) -> TraceEvent {
        TraceEvent::StatementEntered {
            frame: frame(depth, line),
        }
    }

    fn call(depth: usize) -> TraceEvent {
        TraceEvent::CallEntered {
            new_frame: frame(depth, 1),
        }
    }

    fn ret(depth: usize) -> TraceEvent {
        TraceEvent::CallReturned {
            returning_frame: frame(depth, 9),
            caller_frame: depth.checked_sub(1).map(|d| frame(d, 2)),
            value: Value::Int(depth as i64),
        }
    }

    fn feed(ctl: &mut ExecutionController, reg: &mut BreakpointRegistry, ev: &TraceEvent) -> Decision {
        ctl.on_event(ev, reg, &NoEval).unwrap().decision
    }

    #[test]
    fn test_initial_entry_stop() {
        let mut ctl = ExecutionController::new(true);
        let mut reg = BreakpointRegistry::new();
        assert_eq!(
            feed(&mut ctl, &mut reg, &call(0)),
            Decision::Stop(StopReason::InitialEntry)
        );
        assert!(ctl.is_stopped());

        ctl.resume(RunMode::SteppingInto);
        assert_eq!(feed(&mut ctl, &mut reg, &line(0, 1)), Decision::Stop(StopReason::Step));
    }

    #[test]
    fn test_running_ignores_plain_events() {
        let mut ctl = ExecutionController::new(false);
        let mut reg = BreakpointRegistry::new();
        for ev in [call(0), line(0, 1), call(1), line(1, 3), ret(1)] {
            assert_eq!(feed(&mut ctl, &mut reg, &ev), Decision::Continue);
        }
        assert_eq!(ctl.mode(), &RunMode::Running);
    }

    #[test]
    fn test_step_over_never_descends() {
        let mut ctl = ExecutionController::new(false);
        let mut reg = BreakpointRegistry::new();
        ctl.resume(RunMode::SteppingOver { depth: 1 });

        for ev in [call(2), line(2, 5), line(2, 6), ret(2)] {
            assert_eq!(feed(&mut ctl, &mut reg, &ev), Decision::Continue);
        }
        assert_eq!(feed(&mut ctl, &mut reg, &line(1, 4)), Decision::Stop(StopReason::Next));
    }

    #[test]
    fn test_step_over_stops_in_caller_after_return() {
        let mut ctl = ExecutionController::new(false);
        let mut reg = BreakpointRegistry::new();
        ctl.resume(RunMode::SteppingOver { depth: 1 });

        assert_eq!(feed(&mut ctl, &mut reg, &ret(1)), Decision::Continue);
        assert_eq!(feed(&mut ctl, &mut reg, &line(0, 7)), Decision::Stop(StopReason::Next));
    }

    #[test]
    fn test_step_into_stops_at_call() {
        let mut ctl = ExecutionController::new(false);
        let mut reg = BreakpointRegistry::new();
        ctl.resume(RunMode::SteppingInto);
        assert_eq!(feed(&mut ctl, &mut reg, &call(3)), Decision::Stop(StopReason::Step));
    }

    #[test]
    fn test_finish_waits_for_target_depth() {
        let mut ctl = ExecutionController::new(false);
        let mut reg = BreakpointRegistry::new();
        ctl.resume(RunMode::RunningUntilReturn { target_depth: 1 });

        for ev in [line(1, 3), call(2), line(2, 5), ret(2), line(1, 4)] {
            assert_eq!(feed(&mut ctl, &mut reg, &ev), Decision::Continue);
        }
        assert_eq!(
            feed(&mut ctl, &mut reg, &ret(1)),
            Decision::Stop(StopReason::Finish {
                value: Value::Int(1)
            })
        );
    }

    #[test]
    fn test_run_until_line_respects_depth() {
        let mut ctl = ExecutionController::new(false);
        let mut reg = BreakpointRegistry::new();
        ctl.resume(RunMode::RunningUntilLine {
            location: Location::new("f.sw", 8),
            max_depth: 1,
        });

        assert_eq!(feed(&mut ctl, &mut reg, &line(2, 8)), Decision::Continue);
        assert_eq!(feed(&mut ctl, &mut reg, &line(1, 7)), Decision::Continue);
        assert_eq!(feed(&mut ctl, &mut reg, &line(1, 8)), Decision::Stop(StopReason::Until));
    }

    #[test]
    fn test_breakpoint_wins_over_step_over() {
        let mut ctl = ExecutionController::new(false);
        let mut reg = BreakpointRegistry::new();
        let id = reg
            .insert(Location::new("f.sw", 5), BreakpointSite::Line, None)
            .id;
        ctl.resume(RunMode::SteppingOver { depth: 0 });

        assert_eq!(
            feed(&mut ctl, &mut reg, &line(2, 5)),
            Decision::Stop(StopReason::Breakpoint(id))
        );
    }

    #[test]
    fn test_exception_always_stops() {
        let mut ctl = ExecutionController::new(false);
        let mut reg = BreakpointRegistry::new();
        let ev = TraceEvent::ExceptionRaised {
            frame: frame(1, 3),
            error: ExceptionInfo::new("ZeroDivisionError", "division by zero"),
        };
        assert!(matches!(
            feed(&mut ctl, &mut reg, &ev),
            Decision::Stop(StopReason::Exception(_))
        ));
    }

    #[test]
    fn test_program_end_and_terminated() {
        let mut ctl = ExecutionController::new(false);
        let mut reg = BreakpointRegistry::new();
        assert_eq!(feed(&mut ctl, &mut reg, &TraceEvent::ProgramEnded), Decision::Terminate);
        assert!(ctl.is_terminated());
        assert_eq!(feed(&mut ctl, &mut reg, &line(0, 1)), Decision::Terminate);
    }

    #[test]
    fn test_event_while_stopped_is_invariant_violation() {
        let mut ctl = ExecutionController::new(true);
        let mut reg = BreakpointRegistry::new();
        feed(&mut ctl, &mut reg, &call(0));
        let err = ctl.on_event(&line(0, 1), &mut reg, &NoEval).unwrap_err();
        assert!(err.is_fatal());
    }
}
