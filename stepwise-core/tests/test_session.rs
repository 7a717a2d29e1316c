//! 記録済みのイベント列を流してセッション全体を確認するテスト

use stepwise_core::{
    Bindings, CallFrame, Debugger, EvalError, ExceptionInfo, ExpressionEvaluator, Host, Location,
    Result, ScriptedConsole, SessionConfig, SymbolResolver, TraceEvent, TraceHandler,
    TraceProvider, Transcript, Value, ValueHandle, Verdict,
};
use stepwise_core::host::NoSource;

/// 記録済みのイベントを順に送るプロバイダ
struct Replay {
    steps: Vec<(TraceEvent, Vec<CallFrame>)>,
    delivered: usize,
}

impl TraceProvider for Replay {
    fn subscribe(&mut self, handler: &mut dyn TraceHandler) -> Result<()> {
        for (event, stack) in self.steps.drain(..) {
            self.delivered += 1;
            if handler.on_event(event, &stack)? == Verdict::Detach {
                break;
            }
        }
        Ok(())
    }
}

/// イベント列を組み立てる
struct Trace {
    file: &'static str,
    stack: Vec<CallFrame>,
    steps: Vec<(TraceEvent, Vec<CallFrame>)>,
}

impl Trace {
    fn new(file: &'static str) -> Self {
        Self {
            file,
            stack: Vec::new(),
            steps: Vec::new(),
        }
    }

    fn call(&mut self, function: &str, line: usize) -> &mut Self {
        let frame = CallFrame {
            depth: self.stack.len(),
            file: self.file.to_string(),
            line,
            function_name: function.to_string(),
            locals: Bindings::new(),
            globals: Bindings::new(),
        };
        self.stack.push(frame.clone());
        self.steps.push((TraceEvent::CallEntered { new_frame: frame }, self.stack.clone()));
        self
    }

    fn line(&mut self, line: usize, vars: &[(&str, i64)]) -> &mut Self {
        let top = self.stack.last_mut().unwrap();
        top.line = line;
        top.locals = vars
            .iter()
            .map(|(name, v)| (name.to_string(), ValueHandle::new(Value::Int(*v))))
            .collect();
        let frame = top.clone();
        self.steps.push((TraceEvent::StatementEntered { frame }, self.stack.clone()));
        self
    }

    fn ret(&mut self, value: i64) -> &mut Self {
        let returning_frame = self.stack.last().unwrap().clone();
        let caller_frame = self.stack.iter().rev().nth(1).cloned();
        self.steps.push((
            TraceEvent::CallReturned {
                returning_frame,
                caller_frame,
                value: Value::Int(value),
            },
            self.stack.clone(),
        ));
        self.stack.pop();
        self
    }

    fn raise(&mut self, kind: &str, message: &str) -> &mut Self {
        let frame = self.stack.last().unwrap().clone();
        self.steps.push((
            TraceEvent::ExceptionRaised {
                frame,
                error: ExceptionInfo::new(kind, message),
            },
            self.stack.clone(),
        ));
        self
    }

    fn end(&mut self) -> Replay {
        self.steps.push((TraceEvent::ProgramEnded, Vec::new()));
        Replay {
            steps: std::mem::take(&mut self.steps),
            delivered: 0,
        }
    }
}

/// `name`、整数、`a == b` だけを扱う評価器
struct MiniEval;

impl MiniEval {
    fn atom(&self, text: &str, frame: &CallFrame) -> std::result::Result<Value, EvalError> {
        let text = text.trim();
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Int(i));
        }
        frame
            .lookup(text)
            .map(ValueHandle::get)
            .ok_or_else(|| EvalError::new(format!("name '{}' is not defined", text)))
    }
}

impl ExpressionEvaluator for MiniEval {
    fn evaluate(&self, expr: &str, frame: &CallFrame) -> std::result::Result<Value, EvalError> {
        match expr.split_once("==") {
            Some((lhs, rhs)) => Ok(Value::Bool(self.atom(lhs, frame)? == self.atom(rhs, frame)?)),
            None => self.atom(expr, frame),
        }
    }

    fn assign(&self, name: &str, expr: &str, frame: &CallFrame) -> std::result::Result<Value, EvalError> {
        let value = self.evaluate(expr, frame)?;
        frame
            .lookup(name)
            .ok_or_else(|| EvalError::new(format!("name '{}' is not defined", name)))?
            .set(value.clone());
        Ok(value)
    }
}

struct Functions(&'static [(&'static str, &'static str, usize)]);

impl SymbolResolver for Functions {
    fn resolve_function(&self, name: &str) -> Option<Location> {
        self.0
            .iter()
            .find(|(function, _, _)| *function == name)
            .map(|(_, file, line)| Location::new(*file, *line))
    }
}

fn session(
    config: SessionConfig,
    functions: &'static [(&'static str, &'static str, usize)],
    commands: &[&str],
) -> (Debugger, Transcript) {
    let console = ScriptedConsole::new(commands.iter().copied());
    let transcript = console.transcript();
    let host = Host::new(MiniEval, Functions(functions), NoSource);
    (Debugger::new(config, host, Box::new(console)), transcript)
}

fn count(transcript: &Transcript, needle: &str) -> usize {
    transcript.borrow().iter().filter(|l| l.contains(needle)).count()
}

fn contains(transcript: &Transcript, needle: &str) -> bool {
    count(transcript, needle) > 0
}

/// 出力からバックトレースを取り出す
fn backtraces(transcript: &Transcript) -> Vec<Vec<String>> {
    let lines = transcript.borrow();
    let mut traces = Vec::new();
    let mut current: Option<Vec<String>> = None;
    for line in lines.iter() {
        match current.as_mut() {
            Some(frames) if line.is_empty() => {
                traces.push(std::mem::take(frames));
                current = None;
            }
            Some(frames) => frames.push(line.clone()),
            None if line == "Call Stack (most recent first):" => current = Some(Vec::new()),
            None => {}
        }
    }
    traces
}

/// `for i in 0..5` の本体（3行目）を回すトレース
fn loop_trace() -> Replay {
    let mut trace = Trace::new("loop.sw");
    trace.call("<module>", 1).line(1, &[]).line(2, &[("total", 1)]);
    let mut total = 1;
    for i in 0..5 {
        trace.line(3, &[("total", total), ("i", i)]);
        total *= i;
        trace.line(2, &[("total", total), ("i", i)]);
    }
    trace.ret(0).end()
}

#[test]
fn test_conditional_breakpoint_in_loop() {
    let (debugger, transcript) = session(
        SessionConfig::default(),
        &[],
        &["break 3 if i == 3", "continue", "printvar i", "continue"],
    );
    let mut provider = loop_trace();
    let debugger = debugger.attach(&mut provider).unwrap();

    assert!(contains(&transcript, "Initial entry at:"));
    assert!(contains(&transcript, "Breakpoint 1 at loop.sw:3 if i == 3 set"));
    assert_eq!(count(&transcript, "Breakpoint 1 at:"), 1);
    assert!(contains(&transcript, "i = 3"));
    assert!(contains(&transcript, "Program finished."));

    let bp = debugger.state().breakpoints.get(1).unwrap();
    assert_eq!(bp.hit_count, 1);
    assert_eq!(bp.ignore_count, 0);
    assert!(debugger.state().controller.is_terminated());
}

#[test]
fn test_ignore_count_skips_hits() {
    let (debugger, transcript) = session(
        SessionConfig::default(),
        &[],
        &["b 3", "ignore 1 2", "c", "p i", "disable 1", "c"],
    );
    let debugger = debugger.attach(&mut loop_trace()).unwrap();

    assert_eq!(count(&transcript, "Breakpoint 1 at:"), 1);
    assert!(contains(&transcript, "i = 2"));
    let bp = debugger.state().breakpoints.get(1).unwrap();
    assert_eq!(bp.hit_count, 3);
    assert_eq!(bp.ignore_count, 0);
}

#[test]
fn test_failing_condition_warns_without_stopping() {
    let config = SessionConfig {
        stop_on_entry: false,
        ..SessionConfig::default()
    };
    let (mut debugger, transcript) = session(config, &[], &[]);
    debugger
        .set_breakpoint(
            &stepwise_core::LocationSpec::FileLine {
                file: "loop.sw".into(),
                line: 3,
            },
            Some("nope == 1".into()),
        )
        .unwrap();
    let debugger = debugger.attach(&mut loop_trace()).unwrap();

    assert_eq!(
        count(&transcript, "Warning: Err evaluating BP 1 condition 'nope == 1'"),
        5
    );
    assert_eq!(count(&transcript, "Breakpoint 1 at:"), 0);
    assert_eq!(debugger.state().breakpoints.get(1).unwrap().hit_count, 0);
}

#[test]
fn test_function_breakpoint_and_backtrace() {
    let mut trace = Trace::new("prog.sw");
    trace
        .call("<module>", 9)
        .line(9, &[])
        .call("work", 5)
        .line(6, &[("n", 2)])
        .ret(42)
        .line(10, &[]);
    let mut provider = trace.ret(0).end();

    let (debugger, transcript) = session(
        SessionConfig::default(),
        &[("work", "prog.sw", 6)],
        &["break work", "bt", "c", "bt", "info frame", "c"],
    );
    debugger.attach(&mut provider).unwrap();

    assert!(contains(&transcript, "Breakpoint 1 at prog.sw:6 (work) set"));
    assert!(contains(&transcript, " Frame 1: prog.sw:6 work()"));

    let traces = backtraces(&transcript);
    assert_eq!(traces.len(), 2);
    assert_eq!(traces[1].len(), traces[0].len() + 1);
    assert_eq!(traces[1][0], "->*#1: work() at prog.sw:6");
    assert_eq!(traces[1][1], "   #0: <module>() at prog.sw:9");
    assert!(contains(&transcript, "  Func: work"));
}

#[test]
fn test_step_over_stays_at_depth() {
    let mut trace = Trace::new("prog.sw");
    trace
        .call("<module>", 1)
        .line(1, &[])
        .call("f", 3)
        .line(4, &[])
        .ret(0)
        .line(2, &[]);
    let mut provider = trace.ret(0).end();

    let (debugger, transcript) = session(SessionConfig::default(), &[], &["next", "next", "c"]);
    debugger.attach(&mut provider).unwrap();

    assert_eq!(count(&transcript, "Next at:"), 2);
    assert!(contains(&transcript, " Frame 0: prog.sw:1 <module>()"));
    assert!(contains(&transcript, " Frame 0: prog.sw:2 <module>()"));
    assert!(!contains(&transcript, "f()"));
}

#[test]
fn test_finish_waits_for_own_return() {
    let mut trace = Trace::new("prog.sw");
    trace
        .call("<module>", 1)
        .line(1, &[])
        .call("outer", 4)
        .line(5, &[])
        .call("inner", 8)
        .line(9, &[])
        .ret(1)
        .line(6, &[])
        .ret(7)
        .line(2, &[]);
    let mut provider = trace.ret(0).end();

    let (debugger, transcript) = session(
        SessionConfig::default(),
        &[],
        &["step", "step", "step", "finish", "bt", "c"],
    );
    debugger.attach(&mut provider).unwrap();

    assert!(contains(&transcript, "Finishing outer()..."));
    assert_eq!(count(&transcript, "Finish at:"), 1);
    assert!(contains(&transcript, "Returned: 7"));
    assert!(!contains(&transcript, "Returned: 1"));
    // 戻り時点ではまだ outer のフレームがスタックにある
    assert_eq!(backtraces(&transcript)[0][0], "->*#1: outer() at prog.sw:6");
}

#[test]
fn test_exception_always_stops() {
    let mut trace = Trace::new("prog.sw");
    trace
        .call("<module>", 1)
        .line(1, &[])
        .raise("ZeroDivisionError", "division by zero");
    let mut provider = trace.end();

    let config = SessionConfig {
        stop_on_entry: false,
        ..SessionConfig::default()
    };
    let (debugger, transcript) = session(config, &[], &["c"]);
    debugger.attach(&mut provider).unwrap();

    assert!(contains(&transcript, "Exception at:"));
    assert!(contains(&transcript, "  ZeroDivisionError: division by zero"));
}

#[test]
fn test_quit_detaches() {
    let mut provider = loop_trace();
    let total = provider.steps.len();
    let (debugger, transcript) = session(SessionConfig::default(), &[], &["quit"]);
    let debugger = debugger.attach(&mut provider).unwrap();

    assert_eq!(provider.delivered, 1);
    assert!(total > 1);
    assert!(contains(&transcript, "Quitting."));
    assert!(!contains(&transcript, "Program finished."));
    assert!(debugger.state().controller.is_terminated());
}

#[test]
fn test_watch_reports_changes_between_stops() {
    let (debugger, transcript) = session(
        SessionConfig::default(),
        &[],
        &["b 3", "c", "watch total", "c", "c", "clear all", "c"],
    );
    debugger.attach(&mut loop_trace()).unwrap();

    assert!(contains(&transcript, "Watching: total"));
    // 1回目: total = 1 (i=0), 2回目: total = 0 (i=1), 3回目: total = 0 (i=2)
    assert_eq!(count(&transcript, "  0: total = 0 (changed)"), 1);
    assert_eq!(
        transcript
            .borrow()
            .iter()
            .filter(|l| l.as_str() == "  0: total = 0")
            .count(),
        1
    );
    assert!(contains(&transcript, "All breakpoints cleared (1)."));
}

#[test]
fn test_empty_stack_at_stop_is_fatal() {
    let frame = CallFrame {
        depth: 0,
        file: "bad.sw".into(),
        line: 1,
        function_name: "<module>".into(),
        locals: Bindings::new(),
        globals: Bindings::new(),
    };
    let mut provider = Replay {
        steps: vec![(TraceEvent::CallEntered { new_frame: frame }, Vec::new())],
        delivered: 0,
    };
    let (debugger, _) = session(SessionConfig::default(), &[], &["c"]);
    let err = debugger.attach(&mut provider).err().unwrap();
    assert!(err.to_string().contains("internal invariant"));
}
