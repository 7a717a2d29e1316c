//! パース関連のユーティリティ関数

use crate::errors::DebugError;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// オペレータが入力した位置指定（未解決）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationSpec {
    /// 行番号のみ（フォーカスフレームのファイル）
    Line(usize),
    /// `file:line`
    FileLine { file: String, line: usize },
    /// 関数の修飾名（`Class.method` など）
    Function(String),
}

impl fmt::Display for LocationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationSpec::Line(line) => write!(f, "{}", line),
            LocationSpec::FileLine { file, line } => write!(f, "{}:{}", file, line),
            LocationSpec::Function(name) => write!(f, "{}", name),
        }
    }
}

fn qualified_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // 例: main, Counter.bump, outer.inner_1
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
            .expect("qualified name pattern is valid")
    })
}

fn assignment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+?)\s*$")
            .expect("assignment pattern is valid")
    })
}

/// 行番号をパースする（1始まり）
pub fn parse_line(s: &str) -> Result<usize, DebugError> {
    let s = s.trim();
    match s.parse::<usize>() {
        Ok(0) => Err(DebugError::syntax("Line numbers start at 1")),
        Ok(line) => Ok(line),
        Err(_) => Err(DebugError::syntax(format!("Invalid line number '{}'", s))),
    }
}

/// 回数指定をパースする（`up 2` の `2` など）
pub fn parse_count(s: &str, what: &str) -> Result<usize, DebugError> {
    let s = s.trim();
    s.parse::<usize>()
        .map_err(|_| DebugError::syntax(format!("Invalid {} '{}'", what, s)))
}

/// 位置指定をパースする
///
/// 行番号、`file:line`、関数の修飾名のいずれか
///
/// # Examples
/// ```
/// use stepwise_core::parse::{parse_location, LocationSpec};
///
/// assert_eq!(parse_location("12").unwrap(), LocationSpec::Line(12));
/// assert_eq!(
///     parse_location("loop.sw:4").unwrap(),
///     LocationSpec::FileLine { file: "loop.sw".into(), line: 4 }
/// );
/// assert_eq!(
///     parse_location("Counter.bump").unwrap(),
///     LocationSpec::Function("Counter.bump".into())
/// );
/// ```
pub fn parse_location(s: &str) -> Result<LocationSpec, DebugError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(DebugError::syntax("Location required"));
    }

    if s.chars().all(|c| c.is_ascii_digit()) {
        return parse_line(s).map(LocationSpec::Line);
    }

    // ファイル名に':'が含まれてもよいように最後の':'で分割する
    if let Some((file, line)) = s.rsplit_once(':') {
        if file.is_empty() {
            return Err(DebugError::syntax(format!("Missing file name in '{}'", s)));
        }
        return Ok(LocationSpec::FileLine {
            file: file.to_string(),
            line: parse_line(line)?,
        });
    }

    if qualified_name_pattern().is_match(s) {
        Ok(LocationSpec::Function(s.to_string()))
    } else {
        Err(DebugError::syntax(format!("Invalid location '{}'", s)))
    }
}

/// `<name> = <expr>` をパースする
pub fn parse_assignment(s: &str) -> Result<(String, String), DebugError> {
    assignment_pattern()
        .captures(s)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .ok_or_else(|| DebugError::syntax("Usage: setvar <name> = <expr>"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location_line() {
        assert_eq!(parse_location(" 7 ").unwrap(), LocationSpec::Line(7));
        assert!(parse_location("0").is_err());
    }

    #[test]
    fn test_parse_location_file_line() {
        assert_eq!(
            parse_location("demos/loop.sw:12").unwrap(),
            LocationSpec::FileLine {
                file: "demos/loop.sw".into(),
                line: 12
            }
        );
        assert!(parse_location("loop.sw:abc").is_err());
        assert!(parse_location(":3").is_err());
    }

    #[test]
    fn test_parse_location_function() {
        assert_eq!(
            parse_location("outer.inner").unwrap(),
            LocationSpec::Function("outer.inner".into())
        );
        assert!(parse_location("not a name").is_err());
        assert!(parse_location("a..b").is_err());
        assert!(parse_location("").is_err());
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("total = total * 2").unwrap(),
            ("total".to_string(), "total * 2".to_string())
        );
        // `==` は代入ではない式の一部として右辺に残る
        assert_eq!(
            parse_assignment("flag = a == b").unwrap(),
            ("flag".to_string(), "a == b".to_string())
        );
        assert!(parse_assignment("1x = 3").is_err());
        assert!(parse_assignment("x =").is_err());
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("3", "count").unwrap(), 3);
        assert!(parse_count("-1", "count").is_err());
    }
}
