//! 構文木

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use stepwise_core::Value;

/// 単項演算子
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// 二項演算子
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

/// 式
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `f(x)` や `Class.method(x)`
    Call {
        callee: String,
        args: Vec<Expr>,
    },
}

/// 文（行番号付き）
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Let { name: String, value: Expr },
    Assign { name: String, value: Expr },
    Print(Vec<Expr>),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While { cond: Expr, body: Vec<Stmt> },
    For {
        var: String,
        start: Expr,
        end: Expr,
        body: Vec<Stmt>,
    },
    Raise(Expr),
    Expr(Expr),
}

/// 関数定義
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    /// `Class.method` や `outer.inner` の形の修飾名
    pub qualified_name: String,
    pub params: Vec<String>,
    /// `fn` ヘッダの行
    pub line: usize,
    pub body: Vec<Stmt>,
}

impl FunctionDef {
    /// 本体の最初の実行文の行（空の本体なら `None`）
    pub fn first_statement_line(&self) -> Option<usize> {
        self.body.first().map(|stmt| stmt.line)
    }
}

/// パース済みのスクリプト
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub file: String,
    /// トップレベルの文（`<module>` フレームで実行する）
    pub body: Vec<Stmt>,
    /// 修飾名 -> 関数定義
    pub functions: BTreeMap<String, Rc<FunctionDef>>,
}

impl Program {
    /// 呼び出し名をスコープの内側から外側へ順に探す
    ///
    /// `scope` は呼び出し元の関数の修飾名（トップレベルなら空文字列）。
    pub fn lookup_function(&self, scope: &str, callee: &str) -> Option<&Rc<FunctionDef>> {
        let mut scope = scope;
        loop {
            let candidate = if scope.is_empty() {
                callee.to_string()
            } else {
                format!("{}.{}", scope, callee)
            };
            if let Some(def) = self.functions.get(&candidate) {
                return Some(def);
            }
            if scope.is_empty() {
                return None;
            }
            scope = scope.rsplit_once('.').map_or("", |(outer, _)| outer);
        }
    }

    /// 実行文のある行（トップレベルとすべての関数本体）
    pub fn statement_lines(&self) -> BTreeSet<usize> {
        let mut lines = BTreeSet::new();
        collect_lines(&self.body, &mut lines);
        for def in self.functions.values() {
            collect_lines(&def.body, &mut lines);
        }
        lines
    }
}

fn collect_lines(body: &[Stmt], lines: &mut BTreeSet<usize>) {
    for stmt in body {
        lines.insert(stmt.line);
        match &stmt.kind {
            StmtKind::If {
                then_body,
                else_body,
                ..
            } => {
                collect_lines(then_body, lines);
                collect_lines(else_body, lines);
            }
            StmtKind::While { body, .. } | StmtKind::For { body, .. } => collect_lines(body, lines),
            _ => {}
        }
    }
}
