//! 構文解析
//!
//! 1行1文。ブロックは `end` で閉じる。関数とクラスの定義はパース時に
//! 修飾名で登録され、実行文としては残らない。

use crate::ast::{BinaryOp, Expr, FunctionDef, Program, Stmt, StmtKind, UnaryOp};
use crate::errors::ScriptError;
use crate::lexer::{is_keyword, tokenize, Token};
use std::collections::BTreeMap;
use std::rc::Rc;
use stepwise_core::Value;

/// スクリプト全体をパースする
pub fn parse_program(file: &str, source: &str) -> Result<Program, ScriptError> {
    let mut lines = Vec::new();
    for (index, text) in source.lines().enumerate() {
        let tokens = tokenize(index + 1, text)?;
        if !tokens.is_empty() {
            lines.push(Line {
                number: index + 1,
                tokens,
            });
        }
    }

    let mut parser = Parser {
        lines,
        pos: 0,
        functions: BTreeMap::new(),
    };
    let top = Scope {
        name: String::new(),
        kind: ScopeKind::Module,
    };
    let (body, _) = parser.parse_block(&top, &[])?;

    Ok(Program {
        file: file.to_string(),
        body,
        functions: parser.functions,
    })
}

/// 単独の式をパースする（デバッガの式評価用）
pub fn parse_expression(text: &str) -> Result<Expr, ScriptError> {
    let tokens = tokenize(1, text)?;
    if tokens.is_empty() {
        return Err(ScriptError::syntax(1, "empty expression"));
    }
    let mut cursor = Cursor::new(1, &tokens);
    let expr = cursor.expr()?;
    cursor.finish()?;
    Ok(expr)
}

struct Line {
    number: usize,
    tokens: Vec<Token>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Module,
    Function,
    Class,
}

struct Scope {
    /// 修飾名（トップレベルは空）
    name: String,
    kind: ScopeKind,
}

impl Scope {
    fn child(&self, name: &str, kind: ScopeKind) -> Scope {
        let name = if self.name.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.name, name)
        };
        Scope { name, kind }
    }
}

struct Parser {
    lines: Vec<Line>,
    pos: usize,
    functions: BTreeMap<String, Rc<FunctionDef>>,
}

impl Parser {
    /// `terminators` のどれかだけの行まで読み、その語を返す
    fn parse_block(
        &mut self,
        scope: &Scope,
        terminators: &[&str],
    ) -> Result<(Vec<Stmt>, Option<String>), ScriptError> {
        let opened_at = self.lines.get(self.pos.saturating_sub(1)).map_or(1, |l| l.number);
        let mut body = Vec::new();

        while self.pos < self.lines.len() {
            let line = &self.lines[self.pos];
            if let [Token::Ident(word)] = line.tokens.as_slice() {
                if terminators.contains(&word.as_str()) {
                    let word = word.clone();
                    self.pos += 1;
                    return Ok((body, Some(word)));
                }
            }
            if let Some(stmt) = self.parse_statement(scope)? {
                if scope.kind == ScopeKind::Class {
                    return Err(ScriptError::syntax(
                        stmt.line,
                        "only 'fn' definitions are allowed in a class body",
                    ));
                }
                body.push(stmt);
            }
        }

        if terminators.is_empty() {
            Ok((body, None))
        } else {
            Err(ScriptError::syntax(
                opened_at,
                format!("block is never closed with '{}'", terminators.join("' or '")),
            ))
        }
    }

    /// 1文をパースする。定義文は登録だけして `None` を返す
    fn parse_statement(&mut self, scope: &Scope) -> Result<Option<Stmt>, ScriptError> {
        let line = &self.lines[self.pos];
        let number = line.number;
        let tokens = line.tokens.clone();
        self.pos += 1;

        let mut cursor = Cursor::new(number, &tokens);
        let keyword = match tokens.first() {
            Some(Token::Ident(word)) if is_keyword(word) => word.as_str(),
            _ => "",
        };

        let kind = match keyword {
            "fn" => {
                cursor.advance();
                self.parse_function(scope, number, &mut cursor)?;
                return Ok(None);
            }
            "class" => {
                cursor.advance();
                let name = cursor.ident()?;
                cursor.finish()?;
                if scope.kind == ScopeKind::Class {
                    return Err(ScriptError::syntax(number, "classes cannot be nested"));
                }
                let class_scope = scope.child(&name, ScopeKind::Class);
                self.parse_block(&class_scope, &["end"])?;
                return Ok(None);
            }
            "let" => {
                cursor.advance();
                let name = cursor.ident()?;
                cursor.expect(&Token::Assign, "'='")?;
                let value = cursor.expr()?;
                StmtKind::Let { name, value }
            }
            "print" => {
                cursor.advance();
                let mut values = Vec::new();
                if !cursor.at_end() {
                    values.push(cursor.expr()?);
                    while cursor.eat(&Token::Comma) {
                        values.push(cursor.expr()?);
                    }
                }
                StmtKind::Print(values)
            }
            "return" => {
                cursor.advance();
                if scope.kind != ScopeKind::Function {
                    return Err(ScriptError::syntax(number, "'return' outside function"));
                }
                let value = if cursor.at_end() { None } else { Some(cursor.expr()?) };
                StmtKind::Return(value)
            }
            "raise" => {
                cursor.advance();
                StmtKind::Raise(cursor.expr()?)
            }
            "if" => {
                cursor.advance();
                let cond = cursor.expr()?;
                cursor.finish()?;
                let (then_body, closed_by) = self.parse_block(scope, &["else", "end"])?;
                let else_body = if closed_by.as_deref() == Some("else") {
                    self.parse_block(scope, &["end"])?.0
                } else {
                    Vec::new()
                };
                StmtKind::If {
                    cond,
                    then_body,
                    else_body,
                }
            }
            "while" => {
                cursor.advance();
                let cond = cursor.expr()?;
                cursor.finish()?;
                let (body, _) = self.parse_block(scope, &["end"])?;
                StmtKind::While { cond, body }
            }
            "for" => {
                cursor.advance();
                let var = cursor.ident()?;
                cursor.expect_keyword("in")?;
                let start = cursor.expr()?;
                cursor.expect(&Token::DotDot, "'..'")?;
                let end = cursor.expr()?;
                cursor.finish()?;
                let (body, _) = self.parse_block(scope, &["end"])?;
                StmtKind::For {
                    var,
                    start,
                    end,
                    body,
                }
            }
            "" if matches!(tokens.get(1), Some(Token::Assign)) => {
                let name = cursor.ident()?;
                cursor.advance();
                StmtKind::Assign {
                    name,
                    value: cursor.expr()?,
                }
            }
            "" | "not" | "true" | "false" | "nil" => StmtKind::Expr(cursor.expr()?),
            other => {
                return Err(ScriptError::syntax(
                    number,
                    format!("unexpected '{}'", other),
                ))
            }
        };
        cursor.finish()?;

        Ok(Some(Stmt { line: number, kind }))
    }

    /// `fn name(a, b)` から `end` までを登録する
    fn parse_function(
        &mut self,
        scope: &Scope,
        number: usize,
        cursor: &mut Cursor<'_>,
    ) -> Result<(), ScriptError> {
        let name = cursor.ident()?;
        cursor.expect(&Token::LParen, "'('")?;
        let mut params = Vec::new();
        if !cursor.eat(&Token::RParen) {
            loop {
                let param = cursor.ident()?;
                if params.contains(&param) {
                    return Err(ScriptError::syntax(
                        number,
                        format!("duplicate parameter '{}'", param),
                    ));
                }
                params.push(param);
                if cursor.eat(&Token::RParen) {
                    break;
                }
                cursor.expect(&Token::Comma, "',' or ')'")?;
            }
        }
        cursor.finish()?;

        let fn_scope = scope.child(&name, ScopeKind::Function);
        let (body, _) = self.parse_block(&fn_scope, &["end"])?;
        if self.functions.contains_key(&fn_scope.name) {
            return Err(ScriptError::syntax(
                number,
                format!("function '{}' is already defined", fn_scope.name),
            ));
        }
        tracing::trace!(function = %fn_scope.name, line = number, "function defined");
        self.functions.insert(
            fn_scope.name.clone(),
            Rc::new(FunctionDef {
                qualified_name: fn_scope.name,
                params,
                line: number,
                body,
            }),
        );
        Ok(())
    }
}

/// 1行分のトークンを読み進める式パーサ
struct Cursor<'a> {
    line: usize,
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(line: usize, tokens: &'a [Token]) -> Self {
        Self {
            line,
            tokens,
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::syntax(self.line, message)
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.peek().map_or(false, |t| t.is_keyword(word)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), ScriptError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), ScriptError> {
        if self.eat_keyword(word) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", word)))
        }
    }

    fn finish(&self) -> Result<(), ScriptError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.error(format!("unexpected {:?}", token))),
        }
    }

    /// キーワード以外の識別子
    fn ident(&mut self) -> Result<String, ScriptError> {
        match self.advance() {
            Some(Token::Ident(name)) if !is_keyword(name) => Ok(name.clone()),
            _ => Err(self.error("expected a name")),
        }
    }

    pub fn expr(&mut self) -> Result<Expr, ScriptError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.and_expr()?;
        while self.eat_keyword("or") {
            let rhs = self.and_expr()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.not_expr()?;
        while self.eat_keyword("and") {
            let rhs = self.not_expr()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr, ScriptError> {
        if self.eat_keyword("not") {
            let operand = self.not_expr()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::Ne,
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.additive()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn additive(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        if self.eat(&Token::Minus) {
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let token = self
            .advance()
            .ok_or_else(|| self.error("unexpected end of line"))?;
        match token {
            Token::Int(i) => Ok(Expr::Literal(Value::Int(*i))),
            Token::Float(x) => Ok(Expr::Literal(Value::Float(*x))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s.clone()))),
            Token::Ident(word) if word == "true" => Ok(Expr::Literal(Value::Bool(true))),
            Token::Ident(word) if word == "false" => Ok(Expr::Literal(Value::Bool(false))),
            Token::Ident(word) if word == "nil" => Ok(Expr::Literal(Value::Nil)),
            Token::Ident(word) if !is_keyword(word) => self.name_or_call(word.clone()),
            Token::LParen => {
                let expr = self.expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(expr)
            }
            other => Err(self.error(format!("unexpected {:?}", other))),
        }
    }

    /// `name`、`name(args)`、`A.b(args)`
    fn name_or_call(&mut self, first: String) -> Result<Expr, ScriptError> {
        let mut path = first;
        while self.eat(&Token::Dot) {
            path.push('.');
            path.push_str(&self.ident()?);
        }

        if !self.eat(&Token::LParen) {
            if path.contains('.') {
                return Err(self.error(format!("attribute access is not supported: '{}'", path)));
            }
            return Ok(Expr::Name(path));
        }

        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.expr()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(&Token::Comma, "',' or ')'")?;
            }
        }
        Ok(Expr::Call { callee: path, args })
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}
