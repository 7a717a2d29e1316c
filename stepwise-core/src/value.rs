//! ランタイム値と値ハンドル

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// デバッグ対象ランタイムの値
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// 関数への参照（修飾名）
    Function(String),
}

impl Value {
    /// 型名を取得する
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Function(_) => "function",
        }
    }

    /// 真偽値として評価する
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Function(_) => true,
        }
    }

    /// `print`文向けの表示（文字列は引用符なし）
    pub fn to_plain_string(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// デバッガ向けの表示（文字列は引用符付き）
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => {
                if x.fract() == 0.0 && x.is_finite() {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Function(name) => write!(f, "<function {}>", name),
        }
    }
}

/// 変数の格納先への共有ハンドル
///
/// スナップショットはハンドルを複製して保持するので、`setvar`による書き込みは
/// 実行中のフレームからも見える。
#[derive(Debug, Clone)]
pub struct ValueHandle(Rc<RefCell<Value>>);

impl ValueHandle {
    /// 新しい格納先を作成する
    pub fn new(value: Value) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    /// 現在の値を取得する
    pub fn get(&self) -> Value {
        self.0.borrow().clone()
    }

    /// 値を書き換える
    pub fn set(&self, value: Value) {
        *self.0.borrow_mut() = value;
    }

    /// 同じ格納先を指しているかどうか
    pub fn same_slot(&self, other: &ValueHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Value> for ValueHandle {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
