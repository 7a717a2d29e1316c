//! デバッガコマンド

use crate::breakpoint::BreakpointId;
use crate::errors::DebugError;
use crate::parse::{parse_assignment, parse_count, parse_location, LocationSpec};
use crate::watch::WatchKey;

/// `clear` の対象
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearTarget {
    Id(BreakpointId),
    Location(LocationSpec),
    All,
}

/// `info` の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoKind {
    Locals,
    Globals,
    Breakpoints,
    Watch,
    Stack,
    Frame,
    History,
}

/// デバッガコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 次の行へ（呼び出しはまたぐ）
    Next,
    /// ステップ実行（呼び出しに入る）
    Step,
    /// 実行継続
    Continue,
    /// ブレークポイントを設定
    Break {
        location: LocationSpec,
        condition: Option<String>,
    },
    /// ブレークポイントを削除
    Clear(ClearTarget),
    /// 無視回数を設定
    Ignore { id: BreakpointId, count: usize },
    /// ブレークポイントを有効化
    Enable(BreakpointId),
    /// ブレークポイントを無効化
    Disable(BreakpointId),
    /// バックトレース表示
    Backtrace,
    /// 呼び出し元のフレームへ
    Up(usize),
    /// 呼び出し先のフレームへ
    Down(usize),
    /// ソース表示
    List,
    /// 式を評価して表示
    Print(String),
    /// 変数に代入
    Set { name: String, expr: String },
    /// 監視式を追加
    Watch(String),
    /// 監視式を削除
    Unwatch(WatchKey),
    /// 情報表示
    Info(InfoKind),
    /// 現在の関数から抜けるまで実行
    Finish,
    /// 指定位置まで実行
    RunUntil(LocationSpec),
    /// 終了（デタッチ）
    Quit,
    /// ヘルプ表示
    Help(Option<String>),
}

/// 短縮名 -> 正式名
pub const ALIASES: &[(&str, &str)] = &[
    ("b", "break"),
    ("bt", "backtrace"),
    ("c", "continue"),
    ("cl", "clear"),
    ("exit", "quit"),
    ("fin", "finish"),
    ("h", "help"),
    ("l", "list"),
    ("n", "next"),
    ("p", "printvar"),
    ("print", "printvar"),
    ("q", "quit"),
    ("s", "step"),
    ("set", "setvar"),
    ("until", "rununtil"),
    ("where", "backtrace"),
    ("?", "help"),
];

/// 正式名と使い方
pub const COMMANDS: &[(&str, &str)] = &[
    ("next", "n: Step to next line (step over calls)."),
    ("step", "s: Step into call or to next line."),
    ("continue", "c: Continue execution."),
    ("break", "b [<file>:]<line>|<func> [if <cond>]: Set breakpoint."),
    ("clear", "cl <id|loc|all>: Clear breakpoint(s)."),
    ("ignore", "ignore <id> <count>: Set ignore count for breakpoint."),
    ("enable", "enable <id>: Enable breakpoint."),
    ("disable", "disable <id>: Disable breakpoint."),
    ("backtrace", "bt: Print call stack. '*' exec frame, '->' inspect frame."),
    ("up", "up [N]: Move N levels up call stack (older frame)."),
    ("down", "down [N]: Move N levels down call stack (newer frame)."),
    ("list", "l: List source around current inspection frame line."),
    ("printvar", "p <expr>: Evaluate and print expression in inspection frame."),
    ("setvar", "set <var> = <expr>: Set variable in inspection frame."),
    ("watch", "watch <expr>: Add expression to watch list."),
    ("unwatch", "unwatch <expr|idx>: Remove expression from watch list."),
    (
        "info",
        "info <locals|globals|breakpoints|watch|stack|frame|history>: Display info.",
    ),
    ("finish", "fin: Execute until current function returns."),
    ("rununtil", "until <loc>: Continue until location in current or outer frame."),
    ("quit", "q: Quit debugger and let the program run to completion."),
    ("help", "h [cmd]: List commands or show help for one command."),
];

/// 短縮名を正式名に展開する
pub fn canonical_name(word: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == word)
        .map(|(_, name)| *name)
        .unwrap_or(word)
}

/// コマンドの使い方を取得する
pub fn usage(name: &str) -> Option<&'static str> {
    COMMANDS
        .iter()
        .find(|(command, _)| *command == name)
        .map(|(_, usage)| *usage)
}

impl Command {
    /// コマンド文字列をパースする
    ///
    /// 空行はここでは扱わない（直前のコマンドの繰り返しは呼び出し側の責務）。
    pub fn parse(input: &str) -> Result<Self, DebugError> {
        let input = input.trim();
        let (word, args) = match input.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (input, ""),
        };
        if word.is_empty() {
            return Err(DebugError::syntax("Empty command"));
        }

        let name = canonical_name(word);
        let command = match name {
            "next" => no_args(name, args, Command::Next)?,
            "step" => no_args(name, args, Command::Step)?,
            "continue" => no_args(name, args, Command::Continue)?,
            "backtrace" => no_args(name, args, Command::Backtrace)?,
            "list" => no_args(name, args, Command::List)?,
            "finish" => no_args(name, args, Command::Finish)?,
            "quit" => Command::Quit,
            "break" => parse_break(args)?,
            "clear" => parse_clear(args)?,
            "ignore" => parse_ignore(args)?,
            "enable" => Command::Enable(parse_id(args)?),
            "disable" => Command::Disable(parse_id(args)?),
            "up" => Command::Up(optional_count(args)?),
            "down" => Command::Down(optional_count(args)?),
            "printvar" => Command::Print(required(args, "Expression required.")?),
            "setvar" => {
                let (name, expr) = parse_assignment(args)?;
                Command::Set { name, expr }
            }
            "watch" => Command::Watch(required(args, "Expression required.")?),
            "unwatch" => parse_unwatch(args)?,
            "info" => Command::Info(parse_info(args)?),
            "rununtil" => Command::RunUntil(parse_location(args)?),
            "help" => Command::Help((!args.is_empty()).then(|| args.to_string())),
            _ => {
                return Err(DebugError::syntax(format!(
                    "Unknown command: '{}'. Type 'help' for available commands.",
                    word
                )))
            }
        };
        Ok(command)
    }
}

fn no_args(name: &str, args: &str, command: Command) -> Result<Command, DebugError> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(DebugError::syntax(format!("'{}' takes no arguments", name)))
    }
}

fn required(args: &str, message: &str) -> Result<String, DebugError> {
    if args.is_empty() {
        Err(DebugError::syntax(message))
    } else {
        Ok(args.to_string())
    }
}

fn optional_count(args: &str) -> Result<usize, DebugError> {
    if args.is_empty() {
        Ok(1)
    } else {
        parse_count(args, "count")
    }
}

fn parse_id(args: &str) -> Result<BreakpointId, DebugError> {
    if args.is_empty() {
        return Err(DebugError::syntax("Breakpoint id required."));
    }
    parse_count(args, "breakpoint id")
}

fn parse_break(args: &str) -> Result<Command, DebugError> {
    if args.is_empty() {
        return Err(DebugError::syntax("Location required."));
    }
    let (location, condition) = match args.split_once(" if ") {
        Some((loc, cond)) => {
            let cond = cond.trim();
            if cond.is_empty() {
                return Err(DebugError::syntax("Condition required after 'if'."));
            }
            (loc, Some(cond.to_string()))
        }
        None => (args, None),
    };
    Ok(Command::Break {
        location: parse_location(location)?,
        condition,
    })
}

fn parse_clear(args: &str) -> Result<Command, DebugError> {
    if args.is_empty() {
        return Err(DebugError::syntax("Arg required: <id|loc|all>."));
    }
    if args.eq_ignore_ascii_case("all") {
        return Ok(Command::Clear(ClearTarget::All));
    }
    // 数字だけならID、それ以外は位置
    if let Ok(id) = args.parse::<BreakpointId>() {
        return Ok(Command::Clear(ClearTarget::Id(id)));
    }
    Ok(Command::Clear(ClearTarget::Location(parse_location(args)?)))
}

fn parse_ignore(args: &str) -> Result<Command, DebugError> {
    let parts: Vec<&str> = args.split_whitespace().collect();
    match parts.as_slice() {
        [id, count] => Ok(Command::Ignore {
            id: parse_count(id, "breakpoint id")?,
            count: parse_count(count, "count")?,
        }),
        _ => Err(DebugError::syntax("Usage: ignore <id> <count>")),
    }
}

fn parse_unwatch(args: &str) -> Result<Command, DebugError> {
    if args.is_empty() {
        return Err(DebugError::syntax("Expr or idx required."));
    }
    let key = match args.parse::<usize>() {
        Ok(index) => WatchKey::Index(index),
        Err(_) => WatchKey::Expr(args.to_string()),
    };
    Ok(Command::Unwatch(key))
}

fn parse_info(args: &str) -> Result<InfoKind, DebugError> {
    match args {
        "locals" => Ok(InfoKind::Locals),
        "globals" => Ok(InfoKind::Globals),
        "breakpoints" | "break" | "b" => Ok(InfoKind::Breakpoints),
        "watch" => Ok(InfoKind::Watch),
        "stack" => Ok(InfoKind::Stack),
        "frame" => Ok(InfoKind::Frame),
        "history" => Ok(InfoKind::History),
        "" => Err(DebugError::syntax("Subtopic required.")),
        other => Err(DebugError::syntax(format!("Unknown info: {}.", other))),
    }
}
