//! スクリプトの実行とトレースイベントの送出
//!
//! インタプリタ自身がトレースプロバイダになる。イベントは実行と同じスレッドで
//! 同期的に送り、ハンドラが判定を返すまで次の文に進まない。

use crate::ast::{BinaryOp, Expr, FunctionDef, Program, Stmt, StmtKind};
use crate::errors::ScriptError;
use crate::ops;
use crate::Result;
use std::rc::Rc;
use stepwise_core::{
    Bindings, CallFrame, ExceptionInfo, StackWalker, TraceEvent, TraceHandler, TraceProvider,
    Transcript, Value, ValueHandle, Verdict,
};

/// 呼び出しの深さの上限
pub const DEFAULT_MAX_DEPTH: usize = 200;

/// トップレベルのフレーム名
pub const MODULE_FRAME: &str = "<module>";

/// 実行中の関数の活性化
struct Activation {
    /// 表示名（修飾名）
    function: String,
    /// 名前解決のスコープ（トップレベルは空）
    scope: String,
    line: usize,
    /// `None` ならトップレベル（ローカル = グローバル）
    locals: Option<Bindings>,
}

/// 文の実行結果
enum Flow {
    Normal,
    Return(Value),
}

/// 実行の中断理由
enum Interrupt {
    /// 送出された直後（まだ例外イベントを送っていない）
    Raised(ScriptError),
    /// 例外イベント送出済みで巻き戻し中
    Unwinding(ScriptError),
    /// ハンドラの致命的なエラー
    Host(anyhow::Error),
}

impl From<ScriptError> for Interrupt {
    fn from(err: ScriptError) -> Self {
        Interrupt::Raised(err)
    }
}

impl From<anyhow::Error> for Interrupt {
    fn from(err: anyhow::Error) -> Self {
        Interrupt::Host(err)
    }
}

/// スクリプトランタイム
pub struct ScriptRuntime {
    program: Rc<Program>,
    globals: Bindings,
    frames: Vec<Activation>,
    /// デタッチされるまでイベントを送る
    tracing: bool,
    max_depth: usize,
    /// `print` の出力先（`None` なら標準出力）
    output: Option<Transcript>,
    uncaught: Option<ScriptError>,
}

/// 停止時のスタック取得用ビュー
struct LiveStack<'a>(&'a ScriptRuntime);

impl StackWalker for LiveStack<'_> {
    fn capture(&self) -> Vec<CallFrame> {
        self.0.snapshot()
    }
}

impl ScriptRuntime {
    pub fn new(program: Rc<Program>) -> Self {
        Self {
            program,
            globals: Bindings::new(),
            frames: Vec::new(),
            tracing: false,
            max_depth: DEFAULT_MAX_DEPTH,
            output: None,
            uncaught: None,
        }
    }

    /// `print` の出力を記録に流す
    pub fn with_output(mut self, output: Transcript) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// 捕捉されなかった例外（プログラムが例外で終わった場合）
    pub fn uncaught(&self) -> Option<&ScriptError> {
        self.uncaught.as_ref()
    }

    /// 実行後のグローバル変数の値
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).map(ValueHandle::get)
    }

    /// トレースせずに実行する
    pub fn run(&mut self) -> Result<()> {
        self.execute(&mut NullHandler, false)
    }

    fn execute(&mut self, handler: &mut dyn TraceHandler, traced: bool) -> Result<()> {
        self.globals = Bindings::new();
        self.frames.clear();
        self.uncaught = None;
        self.tracing = traced;

        let program = Rc::clone(&self.program);
        let entry_line = program.body.first().map_or(1, |stmt| stmt.line);
        self.frames.push(Activation {
            function: MODULE_FRAME.to_string(),
            scope: String::new(),
            line: entry_line,
            locals: None,
        });
        tracing::debug!(file = %program.file, "program started");

        let result = self.run_module(&program.body, handler);
        self.frames.clear();
        match result {
            Ok(()) => {}
            Err(Interrupt::Raised(err)) | Err(Interrupt::Unwinding(err)) => {
                tracing::debug!(%err, "program ended with an uncaught exception");
                self.uncaught = Some(err);
            }
            Err(Interrupt::Host(err)) => return Err(err),
        }

        self.emit(handler, |_| TraceEvent::ProgramEnded)?;
        self.tracing = false;
        Ok(())
    }

    fn run_module(&mut self, body: &[Stmt], handler: &mut dyn TraceHandler) -> std::result::Result<(), Interrupt> {
        self.emit(handler, |rt| TraceEvent::CallEntered {
            new_frame: rt.top_frame(),
        })?;
        self.exec_block(body, handler)?;
        self.emit(handler, |rt| TraceEvent::CallReturned {
            returning_frame: rt.top_frame(),
            caller_frame: None,
            value: Value::Nil,
        })?;
        Ok(())
    }

    /// イベントを送る。デタッチ後は何もしない
    fn emit<F>(&mut self, handler: &mut dyn TraceHandler, make: F) -> Result<()>
    where
        F: FnOnce(&ScriptRuntime) -> TraceEvent,
    {
        if !self.tracing {
            return Ok(());
        }
        let event = make(self);
        tracing::trace!(kind = event.kind(), "emit");
        if handler.on_event(event, &LiveStack(self))? == Verdict::Detach {
            tracing::debug!("handler detached");
            self.tracing = false;
        }
        Ok(())
    }

    /// 最外フレームから順のスナップショット
    pub fn snapshot(&self) -> Vec<CallFrame> {
        (0..self.frames.len()).map(|depth| self.frame_at(depth)).collect()
    }

    fn frame_at(&self, depth: usize) -> CallFrame {
        let activation = &self.frames[depth];
        CallFrame {
            depth,
            file: self.program.file.clone(),
            line: activation.line,
            function_name: activation.function.clone(),
            locals: activation
                .locals
                .clone()
                .unwrap_or_else(|| self.globals.clone()),
            globals: self.globals.clone(),
        }
    }

    fn top_frame(&self) -> CallFrame {
        self.frame_at(self.frames.len() - 1)
    }

    fn current(&self) -> &Activation {
        &self.frames[self.frames.len() - 1]
    }

    fn current_line(&self) -> usize {
        self.current().line
    }

    fn set_line(&mut self, line: usize) {
        if let Some(activation) = self.frames.last_mut() {
            activation.line = line;
        }
    }

    fn exec_block(&mut self, body: &[Stmt], handler: &mut dyn TraceHandler) -> std::result::Result<Flow, Interrupt> {
        for stmt in body {
            if let Flow::Return(value) = self.exec_stmt(stmt, handler)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    /// 文を実行する。送出された例外はここで最内フレームの例外イベントになる
    fn exec_stmt(&mut self, stmt: &Stmt, handler: &mut dyn TraceHandler) -> std::result::Result<Flow, Interrupt> {
        self.set_line(stmt.line);
        self.emit_statement(handler)?;

        match self.exec_stmt_kind(stmt, handler) {
            Err(Interrupt::Raised(err)) => {
                self.set_line(err.line());
                let error = ExceptionInfo::new(err.kind(), err.message());
                self.emit(handler, |rt| TraceEvent::ExceptionRaised {
                    frame: rt.top_frame(),
                    error,
                })?;
                Err(Interrupt::Unwinding(err))
            }
            other => other,
        }
    }

    fn emit_statement(&mut self, handler: &mut dyn TraceHandler) -> Result<()> {
        self.emit(handler, |rt| TraceEvent::StatementEntered {
            frame: rt.top_frame(),
        })
    }

    fn exec_stmt_kind(&mut self, stmt: &Stmt, handler: &mut dyn TraceHandler) -> std::result::Result<Flow, Interrupt> {
        match &stmt.kind {
            StmtKind::Let { name, value } => {
                let value = self.eval(value, handler)?;
                self.bind(name, value);
            }
            StmtKind::Assign { name, value } => {
                let value = self.eval(value, handler)?;
                self.assign(name, value)?;
            }
            StmtKind::Print(exprs) => {
                let mut parts = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    parts.push(self.eval(expr, handler)?.to_plain_string());
                }
                self.write_output(parts.join(" "));
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, handler)?,
                    None => Value::Nil,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                let branch = if self.eval(cond, handler)?.is_truthy() {
                    then_body
                } else {
                    else_body
                };
                return self.exec_block(branch, handler);
            }
            StmtKind::While { cond, body } => loop {
                if !self.eval(cond, handler)?.is_truthy() {
                    break;
                }
                if let Flow::Return(value) = self.exec_block(body, handler)? {
                    return Ok(Flow::Return(value));
                }
                // 条件の再評価ごとにヘッダ行のイベントを送る
                self.set_line(stmt.line);
                self.emit_statement(handler)?;
            },
            StmtKind::For {
                var,
                start,
                end,
                body,
            } => {
                let start = self.eval_int(start, handler)?;
                let end = self.eval_int(end, handler)?;
                let mut i = start;
                while i < end {
                    self.bind(var, Value::Int(i));
                    if let Flow::Return(value) = self.exec_block(body, handler)? {
                        return Ok(Flow::Return(value));
                    }
                    i += 1;
                    self.set_line(stmt.line);
                    self.emit_statement(handler)?;
                }
            }
            StmtKind::Raise(expr) => {
                let value = self.eval(expr, handler)?;
                return Err(Interrupt::Raised(ScriptError::Raised {
                    line: stmt.line,
                    value: value.to_plain_string(),
                }));
            }
            StmtKind::Expr(expr) => {
                self.eval(expr, handler)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn write_output(&self, line: String) {
        match &self.output {
            Some(transcript) => transcript.borrow_mut().push(line),
            None => println!("{}", line),
        }
    }

    /// 現在のフレームに束縛する（既存の束縛なら格納先を書き換える）
    fn bind(&mut self, name: &str, value: Value) {
        let globals = &mut self.globals;
        let bindings = match self.frames.last_mut().and_then(|a| a.locals.as_mut()) {
            Some(locals) => locals,
            None => globals,
        };
        match bindings.get(name) {
            Some(slot) => slot.set(value),
            None => {
                bindings.insert(name.to_string(), ValueHandle::new(value));
            }
        }
    }

    /// 既存のローカル、なければグローバルに代入する
    fn assign(&mut self, name: &str, value: Value) -> std::result::Result<(), ScriptError> {
        let local = self
            .current()
            .locals
            .as_ref()
            .and_then(|locals| locals.get(name));
        match local.or_else(|| self.globals.get(name)) {
            Some(slot) => {
                slot.set(value);
                Ok(())
            }
            None => Err(self.name_error(name)),
        }
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        self.current()
            .locals
            .as_ref()
            .and_then(|locals| locals.get(name))
            .or_else(|| self.globals.get(name))
            .map(ValueHandle::get)
    }

    fn name_error(&self, name: &str) -> ScriptError {
        ScriptError::runtime(
            self.current_line(),
            "NameError",
            format!("name '{}' is not defined", name),
        )
    }

    fn eval_int(&mut self, expr: &Expr, handler: &mut dyn TraceHandler) -> std::result::Result<i64, Interrupt> {
        match self.eval(expr, handler)? {
            Value::Int(i) => Ok(i),
            other => Err(ScriptError::runtime(
                self.current_line(),
                "TypeError",
                format!("range bound must be int, not '{}'", other.type_name()),
            )
            .into()),
        }
    }

    fn eval(&mut self, expr: &Expr, handler: &mut dyn TraceHandler) -> std::result::Result<Value, Interrupt> {
        let line = self.current_line();
        let value = match expr {
            Expr::Literal(value) => value.clone(),
            Expr::Name(name) => self.lookup(name).ok_or_else(|| self.name_error(name))?,
            Expr::Unary { op, operand } => {
                let operand = self.eval(operand, handler)?;
                ops::unary(*op, &operand)
                    .map_err(|e| ScriptError::runtime(line, e.kind, e.message))?
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, handler)?;
                match op {
                    BinaryOp::And if !lhs.is_truthy() => Value::Bool(false),
                    BinaryOp::Or if lhs.is_truthy() => Value::Bool(true),
                    _ => {
                        let rhs = self.eval(rhs, handler)?;
                        ops::binary(*op, &lhs, &rhs)
                            .map_err(|e| ScriptError::runtime(line, e.kind, e.message))?
                    }
                }
            }
            Expr::Call { callee, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, handler)?);
                }
                self.call(callee, values, handler)?
            }
        };
        Ok(value)
    }

    /// 関数を呼び出す（ユーザー定義、なければ組み込み）
    fn call(
        &mut self,
        callee: &str,
        args: Vec<Value>,
        handler: &mut dyn TraceHandler,
    ) -> std::result::Result<Value, Interrupt> {
        let line = self.current_line();
        let def = match self.program.lookup_function(&self.current().scope, callee) {
            Some(def) => Rc::clone(def),
            None => return builtin(callee, &args, line).map_err(Interrupt::from),
        };

        if def.params.len() != args.len() {
            return Err(ScriptError::runtime(
                line,
                "TypeError",
                format!(
                    "{}() takes {} argument(s) but {} were given",
                    def.qualified_name,
                    def.params.len(),
                    args.len()
                ),
            )
            .into());
        }
        if self.frames.len() >= self.max_depth {
            return Err(ScriptError::runtime(line, "RecursionError", "maximum call depth exceeded").into());
        }

        self.invoke(&def, args, handler)
    }

    fn invoke(
        &mut self,
        def: &FunctionDef,
        args: Vec<Value>,
        handler: &mut dyn TraceHandler,
    ) -> std::result::Result<Value, Interrupt> {
        let locals: Bindings = def
            .params
            .iter()
            .cloned()
            .zip(args.into_iter().map(ValueHandle::new))
            .collect();
        self.frames.push(Activation {
            function: def.qualified_name.clone(),
            scope: def.qualified_name.clone(),
            line: def.line,
            locals: Some(locals),
        });

        let result = self.run_activation(def, handler);
        self.frames.pop();
        result
    }

    /// 呼び出しイベント、本体、戻りイベント（フレームはまだスタック上）
    fn run_activation(
        &mut self,
        def: &FunctionDef,
        handler: &mut dyn TraceHandler,
    ) -> std::result::Result<Value, Interrupt> {
        self.emit(handler, |rt| TraceEvent::CallEntered {
            new_frame: rt.top_frame(),
        })?;
        let value = match self.exec_block(&def.body, handler)? {
            Flow::Return(value) => value,
            Flow::Normal => Value::Nil,
        };
        let returned = value.clone();
        self.emit(handler, move |rt| TraceEvent::CallReturned {
            returning_frame: rt.top_frame(),
            caller_frame: Some(rt.frame_at(rt.frames.len() - 2)),
            value: returned,
        })?;
        Ok(value)
    }
}

impl TraceProvider for ScriptRuntime {
    fn subscribe(&mut self, handler: &mut dyn TraceHandler) -> Result<()> {
        self.execute(handler, true)
    }
}

/// トレースしない実行で使うハンドラ
struct NullHandler;

impl TraceHandler for NullHandler {
    fn on_event(&mut self, _event: TraceEvent, _stack: &dyn StackWalker) -> Result<Verdict> {
        Ok(Verdict::Detach)
    }
}

/// 組み込み関数
fn builtin(name: &str, args: &[Value], line: usize) -> std::result::Result<Value, ScriptError> {
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(ScriptError::runtime(
                line,
                "TypeError",
                format!("{}() takes {} argument(s) but {} were given", name, n, args.len()),
            ))
        }
    };

    match name {
        "len" => {
            arity(1)?;
            match &args[0] {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                other => Err(ScriptError::runtime(
                    line,
                    "TypeError",
                    format!("object of type '{}' has no len()", other.type_name()),
                )),
            }
        }
        "str" => {
            arity(1)?;
            Ok(Value::Str(args[0].to_plain_string()))
        }
        "abs" => {
            arity(1)?;
            match &args[0] {
                Value::Int(i) => i
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| ScriptError::runtime(line, "OverflowError", "integer overflow")),
                Value::Float(x) => Ok(Value::Float(x.abs())),
                other => Err(ScriptError::runtime(
                    line,
                    "TypeError",
                    format!("bad operand type for abs(): '{}'", other.type_name()),
                )),
            }
        }
        _ => Err(ScriptError::runtime(
            line,
            "NameError",
            format!("function '{}' is not defined", name),
        )),
    }
}
