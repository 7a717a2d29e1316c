//! Stepwise CLI - コマンドラインインターフェース
//!
//! スクリプトを読み込み、デバッガセッションを対話モードまたはバッチモードで実行する

mod repl;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use repl::ReplConsole;
use std::fs;
use stepwise_core::parse::parse_location;
use stepwise_core::{Console, Debugger, LocationSpec, ScriptedConsole, SessionConfig};
use stepwise_script::ScriptLoader;
use tracing_subscriber::EnvFilter;

/// Stepwise - Source-level debugger for stepwise scripts
#[derive(Parser)]
#[command(name = "stepwise")]
#[command(version = "0.1.0")]
#[command(about = "Source-level debugger for stepwise scripts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: DebugCommand,
}

#[derive(Subcommand)]
enum DebugCommand {
    /// Run a script under the debugger
    Run {
        /// Path to the script
        script: String,

        /// Read debugger commands from a file instead of the terminal
        #[arg(long)]
        batch: Option<String>,

        /// Do not stop before the first statement
        #[arg(long)]
        no_stop_on_entry: bool,

        /// Number of source lines shown around the current line
        #[arg(long, default_value_t = 2)]
        list_radius: usize,

        /// Set a breakpoint before starting (`LOC [if COND]`, repeatable)
        #[arg(short, long = "break", value_name = "LOC")]
        breaks: Vec<String>,

        /// Enable debug logging on stderr
        #[arg(short, long)]
        verbose: bool,
    },

    /// Parse a script and list its functions
    Check {
        /// Path to the script
        script: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        DebugCommand::Run {
            script,
            batch,
            no_stop_on_entry,
            list_radius,
            breaks,
            verbose,
        } => {
            init_logging(verbose);
            let config = SessionConfig {
                stop_on_entry: !no_stop_on_entry,
                list_radius,
                ..SessionConfig::default()
            };
            run_script(&script, config, batch.as_deref(), &breaks)
        }
        DebugCommand::Check { script } => {
            init_logging(false);
            check_script(&script)
        }
    }
}

/// ログ出力を初期化する（標準エラー出力）
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// デバッガ付きでスクリプトを実行する
fn run_script(
    path: &str,
    config: SessionConfig,
    batch: Option<&str>,
    breaks: &[String],
) -> Result<()> {
    let loader = ScriptLoader::load(path)?;

    let console: Box<dyn Console> = match batch {
        Some(file) => Box::new(ScriptedConsole::new(read_batch(file)?).with_echo(true)),
        None => {
            println!("Stepwise - Script Debugger");
            println!("Loaded script: {}", loader.file());
            println!("Type 'help' for available commands, 'quit' to exit.");
            println!();
            Box::new(ReplConsole::new()?)
        }
    };

    let mut debugger = Debugger::new(config, loader.host(), console);
    for arg in breaks {
        let (spec, condition) = parse_break_arg(arg, loader.file())?;
        debugger
            .set_breakpoint(&spec, condition)
            .with_context(|| format!("Invalid --break '{}'", arg))?;
    }

    let mut runtime = loader.runtime();
    debugger.attach(&mut runtime)?;

    if let Some(err) = runtime.uncaught() {
        bail!("Script ended with an uncaught exception: {}", err);
    }
    Ok(())
}

/// バッチファイルからコマンドを読む（空行と `#` で始まる行は読み飛ばす）
fn read_batch(path: &str) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file {:?}", path))?;
    Ok(batch_commands(&text))
}

fn batch_commands(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// `--break` の引数をパースする
///
/// 行番号だけの指定はまだフォーカスフレームがないので、スクリプトのファイルとして扱う。
fn parse_break_arg(arg: &str, script: &str) -> Result<(LocationSpec, Option<String>)> {
    let (location, condition) = match arg.split_once(" if ") {
        Some((location, condition)) => (location, Some(condition.trim().to_string())),
        None => (arg, None),
    };
    let spec = match parse_location(location)? {
        LocationSpec::Line(line) => LocationSpec::FileLine {
            file: script.to_string(),
            line,
        },
        spec => spec,
    };
    Ok((spec, condition.filter(|c| !c.is_empty())))
}

/// パースのみ行い、関数一覧を表示する
fn check_script(path: &str) -> Result<()> {
    let loader = ScriptLoader::load(path)?;
    let symbols = loader.symbols();
    println!("{}: OK", loader.file());

    if symbols.is_empty() {
        println!("No functions found");
        return Ok(());
    }

    println!("Functions ({} found):", symbols.len());
    for (i, sym) in symbols.all_symbols().enumerate() {
        match sym.entry_line {
            Some(entry) => println!(
                "  {}. {}({}) @ line {} (entry: {})",
                i + 1,
                sym.name,
                sym.params.join(", "),
                sym.header_line,
                entry
            ),
            None => println!(
                "  {}. {}({}) @ line {} (empty body)",
                i + 1,
                sym.name,
                sym.params.join(", "),
                sym.header_line
            ),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_options() {
        let cli = Cli::try_parse_from([
            "stepwise",
            "run",
            "demos/loop.sw",
            "--no-stop-on-entry",
            "--list-radius",
            "4",
            "--break",
            "3 if i == 3",
            "-b",
            "work",
        ])
        .unwrap();

        match cli.command {
            DebugCommand::Run {
                script,
                batch,
                no_stop_on_entry,
                list_radius,
                breaks,
                verbose,
            } => {
                assert_eq!(script, "demos/loop.sw");
                assert!(batch.is_none());
                assert!(no_stop_on_entry);
                assert_eq!(list_radius, 4);
                assert_eq!(breaks, vec!["3 if i == 3".to_string(), "work".to_string()]);
                assert!(!verbose);
            }
            DebugCommand::Check { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_parses_check() {
        let cli = Cli::try_parse_from(["stepwise", "check", "demos/loop.sw"]).unwrap();
        assert!(matches!(cli.command, DebugCommand::Check { script } if script == "demos/loop.sw"));
    }

    #[test]
    fn test_break_arg_uses_script_file_for_bare_lines() {
        let (spec, condition) = parse_break_arg("3 if i == 3", "demos/loop.sw").unwrap();
        assert_eq!(
            spec,
            LocationSpec::FileLine {
                file: "demos/loop.sw".into(),
                line: 3
            }
        );
        assert_eq!(condition.as_deref(), Some("i == 3"));

        let (spec, condition) = parse_break_arg("Counter.bump", "demos/loop.sw").unwrap();
        assert_eq!(spec, LocationSpec::Function("Counter.bump".into()));
        assert!(condition.is_none());

        assert!(parse_break_arg("3x", "demos/loop.sw").is_err());
    }

    #[test]
    fn test_batch_commands_skip_blank_and_comment_lines() {
        let commands = batch_commands("# setup\nbreak 3\n\n  continue  \nquit\n");
        assert_eq!(commands, vec!["break 3", "continue", "quit"]);
    }
}
