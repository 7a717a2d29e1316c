//! rustyline を使った対話コンソール

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use stepwise_core::Console;

/// 端末からコマンドを読むコンソール
pub struct ReplConsole {
    editor: DefaultEditor,
}

impl ReplConsole {
    pub fn new() -> Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl Console for ReplConsole {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    if let Err(e) = self.editor.add_history_entry(trimmed) {
                        tracing::debug!(error = %e, "failed to record line history");
                    }
                }
                Some(line)
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                None
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                None
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                None
            }
        }
    }

    fn write_line(&mut self, line: &str) {
        println!("{}", line);
    }
}
