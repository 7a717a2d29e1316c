//! オペレータとの入出力

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// 行単位のオペレータコンソール
pub trait Console {
    /// プロンプトを表示して1行読む。入力終端なら `None`
    fn read_line(&mut self, prompt: &str) -> Option<String>;

    /// 1行出力する
    fn write_line(&mut self, line: &str);
}

/// 出力の記録（共有ハンドル）
pub type Transcript = Rc<RefCell<Vec<String>>>;

/// あらかじめ用意したコマンドを順に返すコンソール
///
/// テストとバッチ実行で使う。出力は共有の [`Transcript`] に記録される。
pub struct ScriptedConsole {
    commands: VecDeque<String>,
    transcript: Transcript,
    echo: bool,
}

impl ScriptedConsole {
    /// コマンド列からコンソールを作成する
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            transcript: Rc::new(RefCell::new(Vec::new())),
            echo: false,
        }
    }

    /// 出力を標準出力にも流す
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// 出力記録へのハンドルを取得する
    pub fn transcript(&self) -> Transcript {
        Rc::clone(&self.transcript)
    }

    /// 未消費のコマンド数
    pub fn remaining(&self) -> usize {
        self.commands.len()
    }

    fn record(&mut self, line: String) {
        if self.echo {
            println!("{}", line);
        }
        self.transcript.borrow_mut().push(line);
    }
}

impl Console for ScriptedConsole {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        let command = self.commands.pop_front()?;
        self.record(format!("{}{}", prompt, command));
        Some(command)
    }

    fn write_line(&mut self, line: &str) {
        self.record(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_console_records_prompt_and_output() {
        let mut console = ScriptedConsole::new(["bt", "c"]);
        let transcript = console.transcript();

        assert_eq!(console.read_line("(dbg) "), Some("bt".to_string()));
        console.write_line("#0 main()");
        assert_eq!(console.remaining(), 1);
        assert_eq!(console.read_line("(dbg) "), Some("c".to_string()));
        assert_eq!(console.read_line("(dbg) "), None);

        let lines = transcript.borrow();
        assert_eq!(*lines, vec!["(dbg) bt", "#0 main()", "(dbg) c"]);
    }
}
