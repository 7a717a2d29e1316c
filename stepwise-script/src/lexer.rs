//! 字句解析（1行単位）

use crate::errors::ScriptError;
use logos::{Lexer, Logos};

/// トークン
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"#[^\n]*")]
pub enum Token {
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),
    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),
    #[regex(r#""([^"\\]|\\.)*""#, unquote)]
    #[regex(r#"'([^'\\]|\\.)*'"#, unquote)]
    Str(String),
    /// 識別子とキーワード
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("..")]
    DotDot,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("=")]
    Assign,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
}

/// 引用符を外してエスケープを展開する
fn unquote(lex: &mut Lexer<Token>) -> String {
    let slice = lex.slice();
    let mut out = String::with_capacity(slice.len());
    let mut chars = slice[1..slice.len() - 1].chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// 予約語
pub const KEYWORDS: &[&str] = &[
    "and", "class", "else", "end", "false", "fn", "for", "if", "in", "let", "nil", "not", "or",
    "print", "raise", "return", "true", "while",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

impl Token {
    /// 指定したキーワードかどうか
    pub fn is_keyword(&self, word: &str) -> bool {
        matches!(self, Token::Ident(name) if name == word)
    }
}

/// 1行をトークン列にする。`#` 以降はコメント
pub fn tokenize(line_no: usize, text: &str) -> Result<Vec<Token>, ScriptError> {
    let mut lexer = Token::lexer(text);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push(token),
            Err(()) => {
                let slice = lexer.slice();
                let message = if slice.starts_with('"') || slice.starts_with('\'') {
                    "unterminated string".to_string()
                } else if slice.starts_with(|c: char| c.is_ascii_digit()) {
                    format!("invalid number '{}'", slice)
                } else {
                    format!("unexpected character '{}'", slice)
                };
                return Err(ScriptError::syntax(line_no, message));
            }
        }
    }

    Ok(tokens)
}
