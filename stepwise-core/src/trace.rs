//! トレースイベントとルーティング
//!
//! ホストランタイムはイベントを1つずつ同期的に配送し、判定が返るまで
//! プログラムを進めない。バッファリングは行わない。

use crate::frame::CallFrame;
use crate::value::Value;
use crate::Result;
use std::fmt;

/// 例外の情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    /// 例外の種類（`RuntimeError` など）
    pub kind: String,
    pub message: String,
}

impl ExceptionInfo {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ExceptionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// トレースプロバイダが送るイベント
#[derive(Debug, Clone)]
pub enum TraceEvent {
    /// 文の実行直前
    StatementEntered { frame: CallFrame },
    /// 関数に入った直後
    CallEntered { new_frame: CallFrame },
    /// 関数本体の実行完了（フレームはまだスタック上にある）
    CallReturned {
        returning_frame: CallFrame,
        /// 最外フレームが戻る場合は `None`
        caller_frame: Option<CallFrame>,
        value: Value,
    },
    /// 例外の送出
    ExceptionRaised { frame: CallFrame, error: ExceptionInfo },
    /// プログラムの終了
    ProgramEnded,
}

impl TraceEvent {
    /// イベントの対象フレーム
    pub fn frame(&self) -> Option<&CallFrame> {
        match self {
            TraceEvent::StatementEntered { frame } => Some(frame),
            TraceEvent::CallEntered { new_frame } => Some(new_frame),
            TraceEvent::CallReturned {
                returning_frame, ..
            } => Some(returning_frame),
            TraceEvent::ExceptionRaised { frame, .. } => Some(frame),
            TraceEvent::ProgramEnded => None,
        }
    }

    /// ログ用のイベント名
    pub fn kind(&self) -> &'static str {
        match self {
            TraceEvent::StatementEntered { .. } => "line",
            TraceEvent::CallEntered { .. } => "call",
            TraceEvent::CallReturned { .. } => "return",
            TraceEvent::ExceptionRaised { .. } => "exception",
            TraceEvent::ProgramEnded => "end",
        }
    }
}

/// イベント処理後にホストへ返す判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// 実行を続ける（トレースも継続）
    Resume,
    /// デタッチする。以降イベントを送らずに最後まで実行してよい
    Detach,
}

/// 停止時にコールスタック全体を取得する手段
pub trait StackWalker {
    /// 最外フレームから順に並んだスタック
    fn capture(&self) -> Vec<CallFrame>;
}

impl StackWalker for [CallFrame] {
    fn capture(&self) -> Vec<CallFrame> {
        self.to_vec()
    }
}

impl StackWalker for Vec<CallFrame> {
    fn capture(&self) -> Vec<CallFrame> {
        self.clone()
    }
}

/// トレースイベントの受け手（ホストから見たインターフェース）
pub trait TraceHandler {
    fn on_event(&mut self, event: TraceEvent, stack: &dyn StackWalker) -> Result<Verdict>;
}

/// トレースイベントの送り手
pub trait TraceProvider {
    /// ハンドラを登録してプログラムを実行する。プログラムが終わるまで戻らない
    fn subscribe(&mut self, handler: &mut dyn TraceHandler) -> Result<()>;
}

/// ルーターから転送を受ける実行制御側のインターフェース
pub trait EventSink {
    fn dispatch(&mut self, event: &TraceEvent, stack: &dyn StackWalker) -> Result<Verdict>;
}

/// トレースイベントルーター
///
/// 最新のフレーム以外の状態は持たず、イベントをそのまま転送する。
/// 一度デタッチしたら以降のイベントは転送しない。
pub struct TraceRouter<S> {
    sink: S,
    latest_frame: Option<CallFrame>,
    detached: bool,
    routed: u64,
}

impl<S: EventSink> TraceRouter<S> {
    /// 新しいルーターを作成する
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            latest_frame: None,
            detached: false,
            routed: 0,
        }
    }

    /// 最後に受け取ったフレーム
    pub fn latest_frame(&self) -> Option<&CallFrame> {
        self.latest_frame.as_ref()
    }

    /// デタッチ済みかどうか
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// 転送したイベント数
    pub fn routed(&self) -> u64 {
        self.routed
    }

    /// ルーターを破棄して転送先を取り出す
    pub fn into_inner(self) -> S {
        self.sink
    }
}

impl<S: EventSink> TraceHandler for TraceRouter<S> {
    fn on_event(&mut self, event: TraceEvent, stack: &dyn StackWalker) -> Result<Verdict> {
        if self.detached {
            return Ok(Verdict::Detach);
        }

        if let Some(frame) = event.frame() {
            self.latest_frame = Some(frame.clone());
        }
        tracing::trace!(kind = event.kind(), latest = ?self.latest_frame.as_ref().map(|f| f.describe()), "routing event");

        self.routed += 1;
        let verdict = self.sink.dispatch(&event, stack)?;
        if verdict == Verdict::Detach {
            self.detached = true;
        }
        Ok(verdict)
    }
}
