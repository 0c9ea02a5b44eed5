//! Allowlist-gated, memoizing module loader.
//!
//! A module is either native (compiled in: `math`, `strings`) or declared
//! as a `NAME.toml` file of scalar constants under one of the configured
//! search roots. Roots are instance-scoped — resolution never touches
//! process-wide state, so independent sandboxes cannot interfere.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::error::SandboxError;
use crate::script::value::{Builtin, Value};

use super::capabilities::{check_arity, num_arg, str_arg};
use super::{BuiltinFn, ExecCtx};

/// A loaded module: a named bag of constants and functions.
/// Entries materialize into [`Value`]s on attribute access.
#[derive(Debug)]
pub struct Module {
    pub name: String,
    entries: Vec<(String, ModuleEntry)>,
}

#[derive(Clone, Debug)]
enum ModuleEntry {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Func(&'static str, BuiltinFn),
}

impl Module {
    pub fn get(&self, attr: &str) -> Option<Value> {
        self.entries.iter().find(|(name, _)| name == attr).map(|(_, entry)| match entry {
            ModuleEntry::Bool(b) => Value::Bool(*b),
            ModuleEntry::Int(n) => Value::Int(*n),
            ModuleEntry::Float(n) => Value::Float(*n),
            ModuleEntry::Str(s) => Value::Str(s.clone()),
            ModuleEntry::Func(name, func) => Value::Builtin(Builtin { name, func: *func }),
        })
    }
}

/// Resolves import requests against the operator allowlist, memoizing
/// loaded modules for the lifetime of the sandbox instance.
pub struct ImportBroker {
    allowed: HashSet<String>,
    roots: Vec<PathBuf>,
    /// Lock held across load: concurrent first-imports of the same module
    /// are serialized and the load is idempotent. Never evicted.
    cache: Mutex<HashMap<String, Arc<Module>>>,
}

impl ImportBroker {
    pub fn new(allowed: impl IntoIterator<Item = String>, roots: Vec<PathBuf>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
            roots,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `name`: allowlist check, then cache, then load.
    pub fn import(&self, name: &str) -> Result<Arc<Module>, SandboxError> {
        if !self.allowed.contains(name) {
            return Err(SandboxError::import_not_allowed(name));
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(module) = cache.get(name) {
            return Ok(Arc::clone(module));
        }

        let module = Arc::new(self.load(name)?);
        debug!("Loaded module '{name}'");
        cache.insert(name.to_string(), Arc::clone(&module));
        Ok(module)
    }

    fn load(&self, name: &str) -> Result<Module, SandboxError> {
        if let Some(module) = native_module(name) {
            return Ok(module);
        }
        for root in &self.roots {
            let path = root.join(format!("{name}.toml"));
            if path.is_file() {
                return load_declared_module(name, &path);
            }
        }
        Err(SandboxError::runtime(format!(
            "module '{name}' was not found in any module search root"
        )))
    }
}

/// Parse a declarative module: a flat TOML table of scalar constants.
fn load_declared_module(name: &str, path: &std::path::Path) -> Result<Module, SandboxError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        SandboxError::runtime(format!("module '{name}' could not be read: {e}"))
    })?;
    let table: toml::Table = toml::from_str(&text).map_err(|e| {
        SandboxError::runtime(format!("module '{name}' is not valid TOML: {e}"))
    })?;

    let mut entries = Vec::new();
    for (key, value) in table {
        let entry = match value {
            toml::Value::Boolean(b) => ModuleEntry::Bool(b),
            toml::Value::Integer(n) => ModuleEntry::Int(n),
            toml::Value::Float(n) => ModuleEntry::Float(n),
            toml::Value::String(s) => ModuleEntry::Str(s),
            _ => {
                return Err(SandboxError::runtime(format!(
                    "module '{name}' entry '{key}' must be a scalar"
                )));
            }
        };
        entries.push((key, entry));
    }
    Ok(Module {
        name: name.to_string(),
        entries,
    })
}

// ── Native modules ────────────────────────────────────────

fn native_module(name: &str) -> Option<Module> {
    let entries: Vec<(String, ModuleEntry)> = match name {
        "math" => vec![
            ("pi".into(), ModuleEntry::Float(std::f64::consts::PI)),
            ("e".into(), ModuleEntry::Float(std::f64::consts::E)),
            ("tau".into(), ModuleEntry::Float(std::f64::consts::TAU)),
            ("sqrt".into(), ModuleEntry::Func("sqrt", math_sqrt)),
            ("floor".into(), ModuleEntry::Func("floor", math_floor)),
            ("ceil".into(), ModuleEntry::Func("ceil", math_ceil)),
            ("pow".into(), ModuleEntry::Func("pow", math_pow)),
            ("exp".into(), ModuleEntry::Func("exp", math_exp)),
            ("log".into(), ModuleEntry::Func("log", math_log)),
            ("log10".into(), ModuleEntry::Func("log10", math_log10)),
        ],
        "strings" => vec![
            ("upper".into(), ModuleEntry::Func("upper", str_upper)),
            ("lower".into(), ModuleEntry::Func("lower", str_lower)),
            ("trim".into(), ModuleEntry::Func("trim", str_trim)),
            ("split".into(), ModuleEntry::Func("split", str_split)),
            ("join".into(), ModuleEntry::Func("join", str_join)),
            ("replace".into(), ModuleEntry::Func("replace", str_replace)),
            ("starts_with".into(), ModuleEntry::Func("starts_with", str_starts_with)),
            ("ends_with".into(), ModuleEntry::Func("ends_with", str_ends_with)),
        ],
        _ => return None,
    };
    Some(Module {
        name: name.to_string(),
        entries,
    })
}

fn math_sqrt(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("sqrt", args, 1)?;
    let x = num_arg("sqrt", args, 0)?;
    if x < 0.0 {
        return Err(SandboxError::runtime("sqrt of a negative number"));
    }
    Ok(Value::Float(x.sqrt()))
}

fn math_floor(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("floor", args, 1)?;
    float_to_int("floor", num_arg("floor", args, 0)?.floor())
}

fn math_ceil(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("ceil", args, 1)?;
    float_to_int("ceil", num_arg("ceil", args, 0)?.ceil())
}

fn math_pow(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("pow", args, 2)?;
    Ok(Value::Float(
        num_arg("pow", args, 0)?.powf(num_arg("pow", args, 1)?),
    ))
}

fn math_exp(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("exp", args, 1)?;
    Ok(Value::Float(num_arg("exp", args, 0)?.exp()))
}

fn math_log(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("log", args, 1)?;
    let x = num_arg("log", args, 0)?;
    if x <= 0.0 {
        return Err(SandboxError::runtime("log of a non-positive number"));
    }
    Ok(Value::Float(x.ln()))
}

fn math_log10(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("log10", args, 1)?;
    let x = num_arg("log10", args, 0)?;
    if x <= 0.0 {
        return Err(SandboxError::runtime("log10 of a non-positive number"));
    }
    Ok(Value::Float(x.log10()))
}

fn float_to_int(fname: &str, x: f64) -> Result<Value, SandboxError> {
    if x >= i64::MIN as f64 && x <= i64::MAX as f64 {
        Ok(Value::Int(x as i64))
    } else {
        Err(SandboxError::runtime(format!(
            "{fname} result is out of integer range"
        )))
    }
}

fn str_upper(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("upper", args, 1)?;
    Ok(Value::Str(str_arg("upper", args, 0)?.to_uppercase()))
}

fn str_lower(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("lower", args, 1)?;
    Ok(Value::Str(str_arg("lower", args, 0)?.to_lowercase()))
}

fn str_trim(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("trim", args, 1)?;
    Ok(Value::Str(str_arg("trim", args, 0)?.trim().to_string()))
}

fn str_split(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("split", args, 2)?;
    let s = str_arg("split", args, 0)?;
    let sep = str_arg("split", args, 1)?;
    if sep.is_empty() {
        return Err(SandboxError::runtime("split separator must be non-empty"));
    }
    Ok(Value::list(
        s.split(sep.as_str())
            .map(|part| Value::Str(part.to_string()))
            .collect(),
    ))
}

fn str_join(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("join", args, 2)?;
    let sep = str_arg("join", args, 0)?;
    let Value::List(items) = &args[1] else {
        return Err(SandboxError::runtime(format!(
            "join expects a list, got '{}'",
            args[1].type_name()
        )));
    };
    let mut parts = Vec::new();
    for item in items.borrow().iter() {
        match item {
            Value::Str(s) => parts.push(s.clone()),
            other => {
                return Err(SandboxError::runtime(format!(
                    "join expects a list of strings, found '{}'",
                    other.type_name()
                )));
            }
        }
    }
    Ok(Value::Str(parts.join(&sep)))
}

fn str_replace(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("replace", args, 3)?;
    let s = str_arg("replace", args, 0)?;
    let from = str_arg("replace", args, 1)?;
    let to = str_arg("replace", args, 2)?;
    if from.is_empty() {
        return Err(SandboxError::runtime("replace pattern must be non-empty"));
    }
    Ok(Value::Str(s.replace(from.as_str(), &to)))
}

fn str_starts_with(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("starts_with", args, 2)?;
    Ok(Value::Bool(
        str_arg("starts_with", args, 0)?.starts_with(str_arg("starts_with", args, 1)?.as_str()),
    ))
}

fn str_ends_with(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("ends_with", args, 2)?;
    Ok(Value::Bool(
        str_arg("ends_with", args, 0)?.ends_with(str_arg("ends_with", args, 1)?.as_str()),
    ))
}
