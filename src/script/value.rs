//! Runtime values for the restricted script language.
//!
//! Lists and maps have Python-like aliasing semantics (shared, mutable via
//! the mediation hooks), so they sit behind `Rc<RefCell<…>>`. Everything a
//! value can do — arithmetic, comparison, rendering, JSON conversion — is
//! depth-bounded so a script cannot drive the host into unbounded
//! recursion through self-referential structures.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::SandboxError;
use crate::result::frame::Frame;
use crate::result::ResultObject;
use crate::sandbox::imports::Module;
use crate::sandbox::BuiltinFn;

use super::ast::BinOp;

/// Bound on structural recursion (equality, rendering, serialization).
const MAX_VALUE_DEPTH: usize = 64;

pub type ListRef = Rc<RefCell<Vec<Value>>>;
/// Insertion-ordered string-keyed map. Linear lookup — script maps are
/// small (rows, parameter sets).
pub type MapRef = Rc<RefCell<Vec<(String, Value)>>>;

#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(ListRef),
    Map(MapRef),
    Frame(Rc<Frame>),
    Module(Arc<Module>),
    Builtin(Builtin),
    /// The opaque handle to the live result of the current execution.
    /// Scripts can only pass it to the result-builder capabilities.
    Result(Rc<RefCell<ResultObject>>),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn map(entries: Vec<(String, Value)>) -> Self {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Frame(_) => "frame",
            Value::Module(_) => "module",
            Value::Builtin(_) => "function",
            Value::Result(_) => "result",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Map(entries) => !entries.borrow().is_empty(),
            Value::Frame(frame) => !frame.is_empty(),
            Value::Module(_) | Value::Builtin(_) | Value::Result(_) => true,
        }
    }

    /// Display form: what `print` and `str()` produce. Strings render raw;
    /// containers render like their literals.
    pub fn render(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.repr_depth(0),
        }
    }

    pub fn repr(&self) -> String {
        self.repr_depth(0)
    }

    fn repr_depth(&self, depth: usize) -> String {
        if depth > MAX_VALUE_DEPTH {
            return "…".to_string();
        }
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(true) => "true".to_string(),
            Value::Bool(false) => "false".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::Str(s) => format!("{s:?}"),
            Value::List(items) => {
                let inner: Vec<String> = items
                    .borrow()
                    .iter()
                    .map(|v| v.repr_depth(depth + 1))
                    .collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Map(entries) => {
                let inner: Vec<String> = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{k:?}: {}", v.repr_depth(depth + 1)))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Frame(frame) => {
                format!("<frame {}x{}>", frame.rows.len(), frame.columns.len())
            }
            Value::Module(module) => format!("<module '{}'>", module.name),
            Value::Builtin(b) => format!("<function '{}'>", b.name),
            Value::Result(_) => "<result>".to_string(),
        }
    }

    /// Structural equality with Python-like numeric cross-typing
    /// (`1 == 1.0`). Fails instead of recursing forever on pathological
    /// self-referential structures.
    pub fn deep_eq(&self, other: &Value) -> Result<bool, SandboxError> {
        self.deep_eq_depth(other, 0)
    }

    fn deep_eq_depth(&self, other: &Value, depth: usize) -> Result<bool, SandboxError> {
        if depth > MAX_VALUE_DEPTH {
            return Err(SandboxError::runtime(
                "comparison of too deeply nested values",
            ));
        }
        let eq = match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    if !x.deep_eq_depth(y, depth + 1)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Value::Map(a), Value::Map(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return Ok(false);
                }
                // Key order is insignificant for equality.
                for (key, value) in a.iter() {
                    match b.iter().find(|(k, _)| k == key) {
                        Some((_, other_value)) => {
                            if !value.deep_eq_depth(other_value, depth + 1)? {
                                return Ok(false);
                            }
                        }
                        None => return Ok(false),
                    }
                }
                true
            }
            (Value::Frame(a), Value::Frame(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(
                a.func as *const (),
                b.func as *const (),
            ),
            (Value::Result(a), Value::Result(b)) => Rc::ptr_eq(a, b),
            _ => false,
        };
        Ok(eq)
    }

    /// Ordering for `<`-family comparisons: numbers with numbers, strings
    /// with strings. Anything else is an error, not an arbitrary order.
    pub fn compare(&self, other: &Value) -> Result<Ordering, SandboxError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(|| {
                    SandboxError::runtime("cannot order nan values")
                }),
                _ => Err(SandboxError::runtime(format!(
                    "cannot order values of type '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                ))),
            },
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Convert to a JSON value for result rows and the serialized output.
    /// Handles, functions, and frames are not data and refuse to convert.
    pub fn to_json(&self) -> Result<serde_json::Value, SandboxError> {
        self.to_json_depth(0)
    }

    fn to_json_depth(&self, depth: usize) -> Result<serde_json::Value, SandboxError> {
        if depth > MAX_VALUE_DEPTH {
            return Err(SandboxError::runtime(
                "value is too deeply nested to serialize",
            ));
        }
        match self {
            Value::Null => Ok(serde_json::Value::Null),
            Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Value::Int(n) => Ok(serde_json::Value::from(*n)),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .ok_or_else(|| {
                    SandboxError::runtime("non-finite float is not serializable")
                }),
            Value::Str(s) => Ok(serde_json::Value::String(s.clone())),
            Value::List(items) => {
                let mut out = Vec::new();
                for item in items.borrow().iter() {
                    out.push(item.to_json_depth(depth + 1)?);
                }
                Ok(serde_json::Value::Array(out))
            }
            Value::Map(entries) => {
                let mut out = serde_json::Map::new();
                for (key, value) in entries.borrow().iter() {
                    out.insert(key.clone(), value.to_json_depth(depth + 1)?);
                }
                Ok(serde_json::Value::Object(out))
            }
            other => Err(SandboxError::runtime(format!(
                "value of type '{}' is not serializable",
                other.type_name()
            ))),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::list(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Arithmetic shared by binary expressions and the in-place mediation
/// hook, so `a + b` and `a += b` cannot drift apart.
pub fn arith(op: BinOp, left: &Value, right: &Value) -> Result<Value, SandboxError> {
    let type_error = || {
        SandboxError::runtime(format!(
            "unsupported operand types for {}: '{}' and '{}'",
            op.describe(),
            left.type_name(),
            right.type_name()
        ))
    };

    match op {
        BinOp::Add => match (left, right) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(*b)
                .map(Value::Int)
                .ok_or_else(|| SandboxError::runtime("integer overflow in +")),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                Ok(Value::list(items))
            }
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(Value::Float(x + y)),
                _ => Err(type_error()),
            },
        },
        BinOp::Sub => match (left, right) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_sub(*b)
                .map(Value::Int)
                .ok_or_else(|| SandboxError::runtime("integer overflow in -")),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(Value::Float(x - y)),
                _ => Err(type_error()),
            },
        },
        BinOp::Mul => match (left, right) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_mul(*b)
                .map(Value::Int)
                .ok_or_else(|| SandboxError::runtime("integer overflow in *")),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(Value::Float(x * y)),
                _ => Err(type_error()),
            },
        },
        BinOp::Div => match (left.as_f64(), right.as_f64()) {
            (Some(_), Some(y)) if y == 0.0 => {
                Err(SandboxError::runtime("division by zero"))
            }
            (Some(x), Some(y)) => Ok(Value::Float(x / y)),
            _ => Err(type_error()),
        },
        BinOp::Mod => match (left, right) {
            (Value::Int(_), Value::Int(0)) => Err(SandboxError::runtime("division by zero")),
            (Value::Int(a), Value::Int(b)) => a
                .checked_rem_euclid(*b)
                .map(Value::Int)
                .ok_or_else(|| SandboxError::runtime("integer overflow in %")),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(_), Some(y)) if y == 0.0 => {
                    Err(SandboxError::runtime("division by zero"))
                }
                (Some(x), Some(y)) => Ok(Value::Float(x.rem_euclid(y))),
                _ => Err(type_error()),
            },
        },
        _ => Err(SandboxError::runtime(format!(
            "'{}' is not an arithmetic operator",
            op.describe()
        ))),
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.deep_eq(other).unwrap_or(false)
    }
}
