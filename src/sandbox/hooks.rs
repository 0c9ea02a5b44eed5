//! Mediation hooks: the single choke point between script code and every
//! primitive operation on values. The interpreter never indexes, iterates,
//! unpacks, or dispatches an in-place operator directly — it calls in
//! here, so policy lives in exactly one place.
//!
//! Attribute access is mediated too: reads on maps and modules, writes on
//! maps, everything else denied. Leading-underscore names are always
//! denied.

use crate::error::SandboxError;
use crate::script::ast::BinOp;
use crate::script::value::{arith, Value};

use super::capabilities::frame_records;

/// The fixed set of recognized in-place operator tokens.
pub const INPLACE_OPS: &[(&str, BinOp)] = &[
    ("+=", BinOp::Add),
    ("-=", BinOp::Sub),
    ("*=", BinOp::Mul),
    ("/=", BinOp::Div),
    ("%=", BinOp::Mod),
];

/// `obj[key]` reads.
pub fn get_item(obj: &Value, key: &Value) -> Result<Value, SandboxError> {
    match (obj, key) {
        (Value::List(items), Value::Int(idx)) => {
            let items = items.borrow();
            let pos = resolve_index(*idx, items.len())
                .ok_or_else(|| SandboxError::runtime("list index out of range"))?;
            Ok(items[pos].clone())
        }
        (Value::List(_), other) => Err(SandboxError::runtime(format!(
            "list indices must be integers, got '{}'",
            other.type_name()
        ))),
        (Value::Str(s), Value::Int(idx)) => {
            let chars: Vec<char> = s.chars().collect();
            let pos = resolve_index(*idx, chars.len())
                .ok_or_else(|| SandboxError::runtime("string index out of range"))?;
            Ok(Value::Str(chars[pos].to_string()))
        }
        (Value::Map(entries), Value::Str(key)) => entries
            .borrow()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| SandboxError::runtime(format!("map has no key '{key}'"))),
        (Value::Map(_), other) => Err(SandboxError::runtime(format!(
            "map keys must be strings, got '{}'",
            other.type_name()
        ))),
        (other, _) => Err(SandboxError::runtime(format!(
            "'{}' is not indexable",
            other.type_name()
        ))),
    }
}

/// `obj[key] = value` writes.
pub fn set_item(obj: &Value, key: &Value, value: Value) -> Result<(), SandboxError> {
    match (obj, key) {
        (Value::List(items), Value::Int(idx)) => {
            let mut items = items.borrow_mut();
            let len = items.len();
            let pos = resolve_index(*idx, len)
                .ok_or_else(|| SandboxError::runtime("list index out of range"))?;
            items[pos] = value;
            Ok(())
        }
        (Value::Map(entries), Value::Str(key)) => {
            let mut entries = entries.borrow_mut();
            match entries.iter_mut().find(|(k, _)| k == key) {
                Some((_, slot)) => *slot = value,
                None => entries.push((key.clone(), value)),
            }
            Ok(())
        }
        (Value::Map(_), other) => Err(SandboxError::runtime(format!(
            "map keys must be strings, got '{}'",
            other.type_name()
        ))),
        (other, _) => Err(SandboxError::runtime(format!(
            "'{}' does not support item assignment",
            other.type_name()
        ))),
    }
}

/// `obj.name` reads. Policy: map fields and module members only.
pub fn get_attr(obj: &Value, name: &str) -> Result<Value, SandboxError> {
    if name.starts_with('_') {
        return Err(SandboxError::capability(format!(
            "access to attribute '{name}' is not permitted"
        )));
    }
    match obj {
        Value::Map(entries) => entries
            .borrow()
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| SandboxError::runtime(format!("map has no field '{name}'"))),
        Value::Module(module) => module.get(name).ok_or_else(|| {
            SandboxError::runtime(format!(
                "module '{}' has no member '{name}'",
                module.name
            ))
        }),
        other => Err(SandboxError::capability(format!(
            "attribute access is not permitted on '{}'",
            other.type_name()
        ))),
    }
}

/// `obj.name = value` writes. Policy: map fields only.
pub fn set_attr(obj: &Value, name: &str, value: Value) -> Result<(), SandboxError> {
    if name.starts_with('_') {
        return Err(SandboxError::capability(format!(
            "access to attribute '{name}' is not permitted"
        )));
    }
    match obj {
        Value::Map(_) => set_item(obj, &Value::Str(name.to_string()), value),
        other => Err(SandboxError::capability(format!(
            "attribute assignment is not permitted on '{}'",
            other.type_name()
        ))),
    }
}

/// `for … in obj`. Produces a snapshot the loop walks, so mutating the
/// source inside the loop cannot skip or repeat elements.
pub fn iterate(obj: &Value) -> Result<Vec<Value>, SandboxError> {
    match obj {
        Value::List(items) => Ok(items.borrow().clone()),
        Value::Map(entries) => Ok(entries
            .borrow()
            .iter()
            .map(|(k, _)| Value::Str(k.clone()))
            .collect()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Frame(frame) => Ok(frame_records(frame)),
        other => Err(SandboxError::runtime(format!(
            "'{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// Guarded sequence unpack: validates arity before producing any value.
pub fn unpack(value: &Value, arity: usize) -> Result<Vec<Value>, SandboxError> {
    match value {
        Value::List(items) => {
            let items = items.borrow();
            if items.len() != arity {
                return Err(SandboxError::capability(format!(
                    "cannot unpack {} values into {arity} targets",
                    items.len()
                )));
            }
            Ok(items.clone())
        }
        other => Err(SandboxError::capability(format!(
            "cannot unpack '{}'",
            other.type_name()
        ))),
    }
}

/// In-place operator dispatch, restricted to the recognized token set.
/// Recognized operators evaluate through the same arithmetic as their
/// binary counterparts.
pub fn inplace(op: &str, lhs: &Value, rhs: &Value) -> Result<Value, SandboxError> {
    match INPLACE_OPS.iter().find(|(token, _)| *token == op) {
        Some((_, bin_op)) => arith(*bin_op, lhs, rhs),
        None => Err(SandboxError::capability(format!(
            "'{op}' is not a supported in-place operator"
        ))),
    }
}

fn resolve_index(idx: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let pos = if idx < 0 { idx + len } else { idx };
    if (0..len).contains(&pos) {
        Some(pos as usize)
    } else {
        None
    }
}
