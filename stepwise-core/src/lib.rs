//! Stepwise デバッガのコア機能
//!
//! ホストランタイムから届くトレースイベントを受け取り、ブレークポイント、
//! ステップ実行、スタック参照、監視式を扱う実行制御エンジン。
//! 式の評価やソースの読み出しはホスト側のコラボレータ（[`host`]）に任せる。

pub mod breakpoint;
pub mod command;
pub mod console;
pub mod controller;
pub mod debugger;
pub mod errors;
pub mod frame;
pub mod host;
pub mod interpreter;
pub mod parse;
pub mod session;
pub mod stack;
pub mod trace;
pub mod value;
pub mod watch;

pub use breakpoint::{Breakpoint, BreakpointId, BreakpointRegistry, BreakpointSite};
pub use command::Command;
pub use console::{Console, ScriptedConsole, Transcript};
pub use controller::{ExecutionController, RunMode, StopReason};
pub use debugger::Debugger;
pub use errors::{DebugError, EvalError};
pub use frame::{Bindings, CallFrame, Location};
pub use host::{ExpressionEvaluator, Host, SourceProvider, SymbolResolver};
pub use parse::LocationSpec;
pub use session::{SessionConfig, SessionState};
pub use stack::StackNavigator;
pub use trace::{
    EventSink, ExceptionInfo, StackWalker, TraceEvent, TraceHandler, TraceProvider, TraceRouter,
    Verdict,
};
pub use value::{Value, ValueHandle};
pub use watch::WatchTracker;

/// デバッガの結果型
pub type Result<T> = anyhow::Result<T>;
