//! コマンドインタプリタ
//!
//! 停止中だけ動くループ。1回の反復で1コマンドを読み、実行モードが
//! `Stopped` から変わるか `quit` されるまで繰り返す。

use crate::breakpoint::{BreakpointId, LocationResolver};
use crate::command::{canonical_name, usage, ClearTarget, Command, InfoKind, ALIASES, COMMANDS};
use crate::controller::{RunMode, StopReason};
use crate::debugger::{Debugger, CURRENT_LINE_MARKER};
use crate::errors::DebugError;
use crate::frame::{basename, Bindings, CallFrame};
use crate::host::Host;
use crate::parse::LocationSpec;
use crate::stack::StackNavigator;

/// `info history` で表示する件数
const HISTORY_SHOWN: usize = 20;

/// 位置指定の解決器を作る（行番号のみの指定はフォーカスフレームのファイル）
pub(crate) fn location_resolver<'a>(host: &'a Host, stack: &'a StackNavigator) -> LocationResolver<'a> {
    LocationResolver {
        symbols: host.symbols.as_ref(),
        sources: host.sources.as_ref(),
        current_file: stack.focus().ok().map(|frame| frame.file.as_str()),
    }
}

impl Debugger {
    /// 停止中のコマンドループ
    ///
    /// オペレータ向けのエラーはここで表示して握りつぶす。
    /// 致命的なエラーだけを呼び出し元に返す。
    pub(crate) fn interaction_loop(&mut self) -> Result<(), DebugError> {
        while self.state.controller.is_stopped() {
            let prompt = self.prompt()?;
            let input = match self.console.read_line(&prompt) {
                Some(input) => input,
                None => {
                    // 入力終端は quit と同じ
                    self.say("");
                    self.execute(Command::Quit)?;
                    break;
                }
            };

            let trimmed = input.trim();
            let line = if trimmed.is_empty() {
                match self.last_command.clone() {
                    Some(last) => {
                        self.say(format!("(Repeating: {})", last));
                        last
                    }
                    None => continue,
                }
            } else {
                self.state.history.push(trimmed);
                self.last_command = Some(trimmed.to_string());
                trimmed.to_string()
            };

            if let Err(err) = Command::parse(&line).and_then(|command| self.execute(command)) {
                if err.is_fatal() {
                    return Err(err);
                }
                tracing::debug!(%err, "command failed");
                self.say(err.to_string());
            }
        }
        Ok(())
    }

    /// `(stepwise file:line func())` 形式のプロンプト
    fn prompt(&self) -> Result<String, DebugError> {
        let frame = self.state.stack.focus()?;
        let inspecting = if self.state.stack.focus_is_topmost() {
            String::new()
        } else {
            format!(" (inspecting frame {})", self.state.stack.focus_index())
        };
        Ok(format!("({} {}){} ", self.config.prompt, frame.describe(), inspecting))
    }

    /// コマンドを1つ実行する
    pub fn execute(&mut self, command: Command) -> Result<(), DebugError> {
        tracing::debug!(?command, "execute");
        match command {
            Command::Next => {
                let depth = self.state.stack.topmost()?.depth;
                self.state.controller.resume(RunMode::SteppingOver { depth });
            }
            Command::Step => self.state.controller.resume(RunMode::SteppingInto),
            Command::Continue => {
                self.say("Continuing...");
                self.state.controller.resume(RunMode::Running);
            }
            Command::Finish => self.handle_finish()?,
            Command::RunUntil(location) => self.handle_run_until(&location)?,
            Command::Quit => {
                self.say("Quitting.");
                self.state.controller.terminate();
            }
            Command::Break {
                location,
                condition,
            } => self.handle_break(&location, condition)?,
            Command::Clear(target) => self.handle_clear(target)?,
            Command::Ignore { id, count } => {
                self.state.breakpoints.set_ignore(id, count)?;
                self.say(format!("BP {} will ignore {} hits.", id, count));
            }
            Command::Enable(id) => {
                self.state.breakpoints.enable(id)?;
                self.say(format!("Breakpoint {} enabled.", id));
            }
            Command::Disable(id) => {
                self.state.breakpoints.disable(id)?;
                self.say(format!("Breakpoint {} disabled.", id));
            }
            Command::Backtrace | Command::Info(InfoKind::Stack) => self.show_backtrace()?,
            Command::Up(n) => {
                self.state.stack.up(n)?;
                self.show_focus_moved()?;
            }
            Command::Down(n) => {
                self.state.stack.down(n)?;
                self.show_focus_moved()?;
            }
            Command::List => self.show_source()?,
            Command::Print(expr) => {
                let frame = self.state.stack.focus()?;
                let value = self.host.evaluator.evaluate(&expr, frame)?;
                self.say(format!("{} = {}", expr, value));
            }
            Command::Set { name, expr } => {
                let frame = self.state.stack.focus()?;
                let value = self.host.evaluator.assign(&name, &expr, frame)?;
                self.say(format!("Set {} = {}", name, value));
            }
            Command::Watch(expr) => self.handle_watch(&expr)?,
            Command::Unwatch(key) => {
                let expr = self.state.watches.remove(&key)?;
                self.say(format!("Unwatched: {}", expr));
            }
            Command::Info(kind) => self.handle_info(kind)?,
            Command::Help(topic) => self.handle_help(topic.as_deref()),
        }
        Ok(())
    }

    /// finish: 実行中のフレームが戻るまで実行する
    ///
    /// 戻り値の時点で止まっている場合、実行中のフレームはもう戻っているので呼び出し元を対象にする。
    fn handle_finish(&mut self) -> Result<(), DebugError> {
        let topmost = self.state.stack.topmost()?;
        let frame = match self.state.stop_reason {
            Some(StopReason::Finish { .. }) if topmost.depth > 0 => {
                &self.state.stack.frames()[topmost.depth - 1]
            }
            _ => topmost,
        };
        if frame.depth == 0 {
            self.say("Cannot 'finish' from the outermost frame.");
            return Ok(());
        }
        let (target_depth, message) = (frame.depth, format!("Finishing {}()...", frame.function_name));
        self.say(message);
        self.state
            .controller
            .resume(RunMode::RunningUntilReturn { target_depth });
        Ok(())
    }

    /// rununtil: 現在または外側のフレームで指定位置に到達するまで実行する
    fn handle_run_until(&mut self, spec: &LocationSpec) -> Result<(), DebugError> {
        let location = location_resolver(&self.host, &self.state.stack).resolve(spec)?;
        let max_depth = self.state.stack.topmost()?.depth;
        self.say(format!("Running until {}...", location));
        self.state.controller.resume(RunMode::RunningUntilLine {
            location,
            max_depth,
        });
        Ok(())
    }

    /// break: ブレークポイントを設定する
    fn handle_break(&mut self, spec: &LocationSpec, condition: Option<String>) -> Result<(), DebugError> {
        let resolver = location_resolver(&self.host, &self.state.stack);
        let message = format!(
            "{} set",
            self.state.breakpoints.register(spec, condition, &resolver)?
        );
        self.say(message);
        Ok(())
    }

    /// clear: ブレークポイントを削除する
    fn handle_clear(&mut self, target: ClearTarget) -> Result<(), DebugError> {
        let cleared: Vec<BreakpointId> = match target {
            ClearTarget::Id(id) => vec![self.state.breakpoints.clear(id)?.id],
            ClearTarget::Location(spec) => {
                let location = location_resolver(&self.host, &self.state.stack).resolve(&spec)?;
                self.state.breakpoints.clear_at(&location)?
            }
            ClearTarget::All => {
                let count = self.state.breakpoints.clear_all();
                self.say(format!("All breakpoints cleared ({}).", count));
                return Ok(());
            }
        };
        for id in cleared {
            self.say(format!("Breakpoint {} cleared.", id));
        }
        Ok(())
    }

    /// watch: 監視式を追加して現在値を表示する
    fn handle_watch(&mut self, expr: &str) -> Result<(), DebugError> {
        if self.state.watches.add(expr) {
            self.say(format!("Watching: {}", expr));
        } else {
            self.say(format!("Already watching: {}", expr));
        }
        self.show_watch_preview()
    }

    /// 前回値を更新せずに監視式を表示する
    fn show_watch_preview(&mut self) -> Result<(), DebugError> {
        let frame = self.state.stack.focus()?;
        let reports = self.state.watches.preview(frame, self.host.evaluator.as_ref());
        self.show_watch_reports(&reports);
        Ok(())
    }

    /// up/down の後にフォーカスフレームを表示する
    fn show_focus_moved(&mut self) -> Result<(), DebugError> {
        let heading = format!("Frame {}", self.state.stack.focus_index());
        self.show_location(&heading)
    }

    /// list: フォーカスフレームの周辺のソースを表示する
    fn show_source(&mut self) -> Result<(), DebugError> {
        let window = self
            .state
            .stack
            .list(self.host.sources.as_ref(), self.config.list_radius)?;
        if window.lines.is_empty() {
            self.say(format!("No source available for {}.", basename(&window.file)));
            return Ok(());
        }
        let focus_is_topmost = self.state.stack.focus_is_topmost();
        self.say(format!("File {}:", basename(&window.file)));
        for (number, text) in window.lines {
            let prefix = if number == window.current_line {
                if focus_is_topmost {
                    CURRENT_LINE_MARKER
                } else {
                    "  -> "
                }
            } else {
                "     "
            };
            self.say(format!(" {}{:4} {}", prefix, number, text));
        }
        Ok(())
    }

    /// backtrace: 新しいフレームから順に表示する
    ///
    /// `*` は実行中のフレーム、`->` はフォーカスフレーム。
    fn show_backtrace(&mut self) -> Result<(), DebugError> {
        let stack = &self.state.stack;
        if !stack.is_captured() {
            return Err(DebugError::NoFrame);
        }
        let topmost = stack.len() - 1;
        let lines: Vec<String> = stack
            .frames()
            .iter()
            .rev()
            .map(|frame| {
                let focus = if frame.depth == stack.focus_index() { "->" } else { "  " };
                let exec = if frame.depth == topmost { "*" } else { " " };
                format!(
                    "{}{}#{}: {}() at {}:{}",
                    focus,
                    exec,
                    frame.depth,
                    frame.function_name,
                    basename(&frame.file),
                    frame.line
                )
            })
            .collect();

        self.say("Call Stack (most recent first):");
        for line in lines {
            self.say(line);
        }
        self.say("");
        Ok(())
    }

    /// info サブコマンド
    fn handle_info(&mut self, kind: InfoKind) -> Result<(), DebugError> {
        match kind {
            InfoKind::Locals => {
                let frame = self.state.stack.focus()?;
                let heading = format!("Locals (frame {}):", frame.depth);
                let lines = binding_lines(&frame.locals, "  No locals.");
                self.say(heading);
                self.say_all(lines);
            }
            InfoKind::Globals => {
                let frame = self.state.stack.focus()?;
                let heading = format!("Globals (frame {}):", frame.depth);
                let lines = binding_lines(&frame.globals, "  No globals.");
                self.say(heading);
                self.say_all(lines);
            }
            InfoKind::Breakpoints => self.show_breakpoints(),
            InfoKind::Watch => {
                if self.state.watches.is_empty() {
                    self.say("  No watched expressions.");
                } else {
                    self.show_watch_preview()?;
                }
            }
            InfoKind::Stack => self.show_backtrace()?,
            InfoKind::Frame => {
                let lines = frame_info(
                    self.state.stack.focus()?,
                    self.state.stack.focus_is_topmost(),
                );
                self.say_all(lines);
            }
            InfoKind::History => {
                let lines: Vec<String> = self
                    .state
                    .history
                    .recent(HISTORY_SHOWN)
                    .into_iter()
                    .map(|(number, line)| format!("  {:3}: {}", number, line))
                    .collect();
                self.say("History:");
                if lines.is_empty() {
                    self.say("  No history.");
                }
                self.say_all(lines);
            }
        }
        Ok(())
    }

    /// ブレークポイントの一覧表
    fn show_breakpoints(&mut self) {
        if self.state.breakpoints.is_empty() {
            self.say("  No breakpoints set.");
            return;
        }
        let rows: Vec<String> = self
            .state
            .breakpoints
            .all()
            .map(|bp| {
                format!(
                    "  {:<3} {:<3} {:<4} {:<6} {:<35.35} {}",
                    bp.id,
                    if bp.enabled { "y" } else { "n" },
                    bp.hit_count,
                    bp.ignore_count,
                    bp.condition.as_deref().unwrap_or(""),
                    bp.location
                )
            })
            .collect();
        self.say("Breakpoints:");
        self.say(format!(
            "  {:<3} {:<3} {:<4} {:<6} {:<35} {}",
            "ID", "Enb", "Hits", "Ignore", "Condition", "Location"
        ));
        self.say_all(rows);
    }

    /// help: コマンド一覧または個別の使い方
    fn handle_help(&mut self, topic: Option<&str>) {
        let Some(topic) = topic else {
            self.say("Commands:");
            let width = COMMANDS.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
            for (name, text) in COMMANDS {
                self.say(format!("  {:<width$}  {}", name, text, width = width));
            }
            self.say("");
            self.say("Aliases:");
            let width = ALIASES.iter().map(|(alias, _)| alias.len()).max().unwrap_or(0);
            let mut aliases = ALIASES.to_vec();
            aliases.sort();
            for (alias, name) in aliases {
                self.say(format!("  {:<width$} -> {}", alias, name, width = width));
            }
            self.say("");
            self.say("Use 'help <cmd>' for specific command help.");
            return;
        };

        let name = canonical_name(topic);
        match usage(name) {
            Some(text) => {
                if name != topic {
                    self.say(format!("'{}' is alias for '{}'.", topic, name));
                }
                self.say(text);
            }
            None => self.say(format!("No help for '{}'. Unknown.", topic)),
        }
    }

    fn say_all(&mut self, lines: Vec<String>) {
        for line in lines {
            self.say(line);
        }
    }
}

/// 変数一覧の表示行
fn binding_lines(bindings: &Bindings, empty: &str) -> Vec<String> {
    if bindings.is_empty() {
        return vec![empty.to_string()];
    }
    bindings
        .iter()
        .map(|(name, handle)| format!("  {}: {}", name, handle.get()))
        .collect()
}

fn frame_info(frame: &CallFrame, executing: bool) -> Vec<String> {
    let mut lines = vec![
        format!("Frame Info (idx {}):", frame.depth),
        format!("  Func: {}", frame.function_name),
        format!("  File: {}", frame.file),
        format!("  Line: {}", frame.line),
    ];
    if !executing {
        lines.push("  Not the executing frame.".to_string());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::{ScriptedConsole, Transcript};
    use crate::errors::EvalError;
    use crate::host::{ExpressionEvaluator, NoSource, SourceProvider, SymbolResolver};
    use crate::frame::Location;
    use crate::session::SessionConfig;
    use crate::value::{Value, ValueHandle};

    /// 変数名だけを評価し、既存の変数へ整数を代入できる評価器
    struct VarEval;

    impl ExpressionEvaluator for VarEval {
        fn evaluate(&self, expr: &str, frame: &CallFrame) -> Result<Value, EvalError> {
            frame
                .lookup(expr.trim())
                .map(ValueHandle::get)
                .ok_or_else(|| EvalError::new(format!("name '{}' is not defined", expr)))
        }

        fn assign(&self, name: &str, expr: &str, frame: &CallFrame) -> Result<Value, EvalError> {
            let value = expr
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| EvalError::new("integer expected"))?;
            let slot = frame
                .lookup(name)
                .ok_or_else(|| EvalError::new(format!("name '{}' is not defined", name)))?;
            slot.set(value.clone());
            Ok(value)
        }
    }

    struct OneFunction;

    impl SymbolResolver for OneFunction {
        fn resolve_function(&self, name: &str) -> Option<Location> {
            (name == "work").then(|| Location::new("t.sw", 7))
        }
    }

    fn stack(x: &ValueHandle) -> Vec<CallFrame> {
        let mut globals = Bindings::new();
        globals.insert("x".into(), x.clone());
        let mut locals = Bindings::new();
        locals.insert("n".into(), ValueHandle::new(Value::Int(5)));
        vec![
            CallFrame {
                depth: 0,
                file: "t.sw".into(),
                line: 12,
                function_name: "<module>".into(),
                locals: globals.clone(),
                globals: globals.clone(),
            },
            CallFrame {
                depth: 1,
                file: "t.sw".into(),
                line: 8,
                function_name: "work".into(),
                locals,
                globals,
            },
        ]
    }

    /// 14行の `t.sw`（各行は "line N"）
    struct Text;

    impl SourceProvider for Text {
        fn window(&self, _file: &str, line: usize, radius: usize) -> Vec<(usize, String)> {
            let first = line.saturating_sub(radius).max(1);
            let last = (line + radius).min(14);
            (first..=last).map(|n| (n, format!("line {}", n))).collect()
        }

        fn line_count(&self, file: &str) -> Option<usize> {
            (file == "t.sw").then_some(14)
        }
    }

    fn stopped(commands: &[&str]) -> (Debugger, Transcript) {
        stopped_with(NoSource, commands)
    }

    fn stopped_with(
        sources: impl SourceProvider + 'static,
        commands: &[&str],
    ) -> (Debugger, Transcript) {
        let console = ScriptedConsole::new(commands.iter().copied());
        let transcript = console.transcript();
        let host = Host::new(VarEval, OneFunction, sources);
        let mut debugger = Debugger::new(SessionConfig::default(), host, Box::new(console));
        debugger
            .state
            .stack
            .capture(stack(&ValueHandle::new(Value::Int(1))))
            .unwrap();
        debugger.state.controller.resume(RunMode::Stopped);
        (debugger, transcript)
    }

    fn output(transcript: &Transcript) -> String {
        transcript.borrow().join("\n")
    }

    #[test]
    fn test_errors_do_not_end_the_loop() {
        let (mut debugger, transcript) = stopped(&["frobnicate", "up 5", "p nope", "p n", "c"]);
        debugger.interaction_loop().unwrap();

        let out = output(&transcript);
        assert!(out.contains("Unknown command: 'frobnicate'"));
        assert!(out.contains("Cannot move further up"));
        assert!(out.contains("Error: name 'nope' is not defined"));
        assert!(out.contains("n = 5"));
        assert_eq!(debugger.state.run_mode(), &RunMode::Running);
        assert_eq!(debugger.state.focus_index(), 1);
    }

    #[test]
    fn test_next_and_finish_use_executing_frame() {
        let (mut debugger, _) = stopped(&["up", "n"]);
        debugger.interaction_loop().unwrap();
        assert_eq!(debugger.state.run_mode(), &RunMode::SteppingOver { depth: 1 });

        let (mut debugger, _) = stopped(&["up", "fin"]);
        debugger.interaction_loop().unwrap();
        assert_eq!(
            debugger.state.run_mode(),
            &RunMode::RunningUntilReturn { target_depth: 1 }
        );
    }

    #[test]
    fn test_finish_from_return_stop_targets_caller() {
        // work (深さ1) が戻った時点で止まっている。呼び出し元は最外フレーム
        let (mut debugger, transcript) = stopped(&["fin", "c"]);
        debugger.state.stop_reason = Some(StopReason::Finish {
            value: Value::Int(3),
        });
        debugger.interaction_loop().unwrap();
        assert!(output(&transcript).contains("Cannot 'finish' from the outermost frame."));
        assert!(!output(&transcript).contains("Finishing work()..."));

        // 深さ2の helper が戻った時点なら work の戻りまで進める
        let (mut debugger, transcript) = stopped(&["fin"]);
        let mut frames = debugger.state.stack.frames().to_vec();
        frames.push(CallFrame {
            depth: 2,
            line: 3,
            function_name: "helper".into(),
            ..frames[1].clone()
        });
        debugger.state.stack.capture(frames).unwrap();
        debugger.state.stop_reason = Some(StopReason::Finish {
            value: Value::Int(3),
        });
        debugger.interaction_loop().unwrap();
        assert!(output(&transcript).contains("Finishing work()..."));
        assert_eq!(
            debugger.state.run_mode(),
            &RunMode::RunningUntilReturn { target_depth: 1 }
        );
    }

    #[test]
    fn test_until_resolves_against_focus_file() {
        let (mut debugger, transcript) = stopped_with(Text, &["until 99", "until 10"]);
        debugger.interaction_loop().unwrap();

        let out = output(&transcript);
        assert!(out.contains("Cannot resolve location '99': line 99 is out of range"));
        assert!(out.contains("Running until t.sw:10..."));
        assert_eq!(
            debugger.state.run_mode(),
            &RunMode::RunningUntilLine {
                location: Location::new("t.sw", 10),
                max_depth: 1,
            }
        );
    }

    #[test]
    fn test_list_marks_focus_line() {
        let (mut debugger, transcript) = stopped_with(Text, &["up", "l", "down", "l", "c"]);
        debugger.interaction_loop().unwrap();

        let lines = transcript.borrow();
        assert!(lines.iter().any(|l| l == "File t.sw:"));
        // 実行中でないフレームの行
        assert!(lines.iter().any(|l| l == "   ->   12 line 12"));
        assert!(lines.iter().any(|l| l == "Frame 1 at:"));
        // 実行中のフレームの行
        assert!(lines.iter().any(|l| l == " --->    8 line 8"));
        assert!(lines.iter().any(|l| l == "         7 line 7"));
        drop(lines);
        assert_eq!(debugger.state.focus_index(), 1);
    }

    #[test]
    fn test_inspection_uses_focus_frame() {
        let (mut debugger, transcript) = stopped(&["up", "p n", "set x = 9", "p x", "q"]);
        debugger.interaction_loop().unwrap();

        let out = output(&transcript);
        assert!(out.contains("(stepwise t.sw:12 <module>()) (inspecting frame 0) p n"));
        assert!(out.contains("Error: name 'n' is not defined"));
        assert!(out.contains("Set x = 9"));
        assert!(out.contains("x = 9"));
        assert!(debugger.state.controller.is_terminated());
    }

    #[test]
    fn test_breakpoint_commands() {
        let (mut debugger, transcript) = stopped(&[
            "b 9 if n == 5",
            "break work",
            "disable 1",
            "ignore 2 3",
            "info breakpoints",
            "cl t.sw:7",
            "clear 7",
            "c",
        ]);
        debugger.interaction_loop().unwrap();

        let out = output(&transcript);
        assert!(out.contains("Breakpoint 1 at t.sw:9 if n == 5 set"));
        assert!(out.contains("Breakpoint 2 at t.sw:7 (work) set"));
        assert!(out.contains("BP 2 will ignore 3 hits."));
        assert!(out.contains("Breakpoint 2 cleared."));
        assert!(out.contains("Breakpoint not found: 7"));
        assert_eq!(debugger.state.breakpoints.count(), 1);
        assert!(!debugger.state.breakpoints.get(1).unwrap().enabled);
    }

    #[test]
    fn test_empty_line_repeats_last_command() {
        let (mut debugger, transcript) = stopped(&["up", "", "c"]);
        debugger.interaction_loop().unwrap();

        let out = output(&transcript);
        assert!(out.contains("(Repeating: up)"));
        assert!(out.contains("Cannot move further up"));
        assert_eq!(debugger.state.history.len(), 2);
    }

    #[test]
    fn test_end_of_input_quits() {
        let (mut debugger, transcript) = stopped(&[]);
        debugger.interaction_loop().unwrap();
        assert!(debugger.state.controller.is_terminated());
        assert!(output(&transcript).contains("Quitting."));
    }

    #[test]
    fn test_backtrace_and_watch() {
        let (mut debugger, transcript) = stopped(&["watch n", "watch n", "bt", "unwatch 0", "c"]);
        debugger.interaction_loop().unwrap();

        let out = output(&transcript);
        assert!(out.contains("Watching: n"));
        assert!(out.contains("Already watching: n"));
        assert!(out.contains("  0: n = 5"));
        assert!(out.contains("->*#1: work() at t.sw:8"));
        assert!(out.contains("   #0: <module>() at t.sw:12"));
        assert!(out.contains("Unwatched: n"));
        assert!(debugger.state.watches.is_empty());
    }

    #[test]
    fn test_help_topics() {
        let (mut debugger, transcript) = stopped(&["help bt", "help nope", "c"]);
        debugger.interaction_loop().unwrap();

        let out = output(&transcript);
        assert!(out.contains("'bt' is alias for 'backtrace'."));
        assert!(out.contains("No help for 'nope'. Unknown."));
    }
}
