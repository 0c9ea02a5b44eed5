//! The capability table: the finite set of names a script may reference.
//!
//! Three layers, all explicit enumerations:
//! - a baseline of pure, side-effect-free builtins;
//! - an extended catalog operators may opt into via `additional_builtins`
//!   (unknown names fail sandbox construction — config is trusted but
//!   typos must surface);
//! - the session bindings: print controls, result-builder operations, and
//!   the host-service calls.
//!
//! The table itself is `Send + Sync` (fn pointers and constants only);
//! per-execution `Value`s are materialized fresh for every run.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::bail;

use crate::error::SandboxError;
use crate::host::template;
use crate::host::SourceRef;
use crate::result::frame::Frame;
use crate::result::{ResultObject, Row, TYPE_CONSTANTS};
use crate::script::value::{Builtin, Value};

use super::{hooks, BuiltinFn, ExecCtx};

/// Pure primitives every script gets. Deliberately excludes file, network,
/// process, environment, and reflection capabilities.
const BASELINE_BUILTINS: &[(&str, BuiltinFn)] = &[
    ("abs", builtin_abs),
    ("all", builtin_all),
    ("any", builtin_any),
    ("bool", builtin_bool),
    ("enumerate", builtin_enumerate),
    ("float", builtin_float),
    ("int", builtin_int),
    ("len", builtin_len),
    ("list", builtin_list),
    ("max", builtin_max),
    ("min", builtin_min),
    ("range", builtin_range),
    ("reversed", builtin_reversed),
    ("round", builtin_round),
    ("sorted", builtin_sorted),
    ("str", builtin_str),
    ("sum", builtin_sum),
    ("zip", builtin_zip),
];

/// Catalog the operator can enable by name through `additional_builtins`.
const EXTENDED_BUILTINS: &[(&str, BuiltinFn)] = &[
    ("chr", builtin_chr),
    ("divmod", builtin_divmod),
    ("hex", builtin_hex),
    ("ord", builtin_ord),
    ("repr", builtin_repr),
];

/// Always-present session bindings: output control, result building, and
/// the host-service surface.
const SESSION_BINDINGS: &[(&str, BuiltinFn)] = &[
    ("print", builtin_print),
    ("enable_print_log", builtin_enable_print_log),
    ("disable_print_log", builtin_disable_print_log),
    ("add_result_column", builtin_add_result_column),
    ("add_result_row", builtin_add_result_row),
    ("dataframe_to_result", builtin_dataframe_to_result),
    ("get_query_result", builtin_get_query_result),
    ("execute_query", builtin_execute_query),
    ("execute_by_query_id", builtin_execute_by_query_id),
    ("get_source_schema", builtin_get_source_schema),
    ("get_current_user", builtin_get_current_user),
];

#[derive(Clone, Copy, Debug)]
enum TableEntry {
    Builtin(&'static str, BuiltinFn),
    /// A `TYPE_*` column-type constant (materializes as its string form).
    TypeConst(&'static str),
}

/// The fixed name → capability mapping of one sandbox instance. Built once
/// from configuration, immutable thereafter, shared read-only across
/// concurrently running executions.
#[derive(Debug)]
pub struct CapabilityTable {
    entries: HashMap<String, TableEntry>,
}

impl CapabilityTable {
    /// Build the table: baseline, plus `additional` names resolved against
    /// the extended catalog (deduplicated against what is already there).
    pub fn build(additional: &[String]) -> anyhow::Result<Self> {
        let mut entries = HashMap::new();
        for &(name, func) in BASELINE_BUILTINS.iter().chain(SESSION_BINDINGS) {
            entries.insert(name.to_string(), TableEntry::Builtin(name, func));
        }
        for &(name, column_type) in TYPE_CONSTANTS {
            entries.insert(name.to_string(), TableEntry::TypeConst(column_type.as_str()));
        }

        for name in additional {
            if entries.contains_key(name.as_str()) {
                continue;
            }
            match EXTENDED_BUILTINS.iter().find(|(n, _)| *n == name.as_str()) {
                Some(&(n, func)) => {
                    entries.insert(n.to_string(), TableEntry::Builtin(n, func));
                }
                None => bail!("unknown additional builtin '{name}'"),
            }
        }

        Ok(Self { entries })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Materialize the per-execution namespace: every table entry as a
    /// fresh `Value`, plus the opaque `result` handle.
    pub fn materialize(&self, result: &Rc<RefCell<ResultObject>>) -> HashMap<String, Value> {
        let mut ns: HashMap<String, Value> = self
            .entries
            .iter()
            .map(|(name, entry)| {
                let value = match *entry {
                    TableEntry::Builtin(name, func) => Value::Builtin(Builtin { name, func }),
                    TableEntry::TypeConst(type_str) => Value::Str(type_str.to_string()),
                };
                (name.clone(), value)
            })
            .collect();
        ns.insert("result".to_string(), Value::Result(Rc::clone(result)));
        ns
    }
}

// ── Argument helpers ──────────────────────────────────────

pub(crate) fn check_arity(fname: &str, args: &[Value], expected: usize) -> Result<(), SandboxError> {
    if args.len() != expected {
        return Err(SandboxError::runtime(format!(
            "{fname}() takes {expected} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

pub(crate) fn check_arity_range(
    fname: &str,
    args: &[Value],
    min: usize,
    max: usize,
) -> Result<(), SandboxError> {
    if args.len() < min || args.len() > max {
        return Err(SandboxError::runtime(format!(
            "{fname}() takes {min} to {max} arguments, got {}",
            args.len()
        )));
    }
    Ok(())
}

pub(crate) fn num_arg(fname: &str, args: &[Value], idx: usize) -> Result<f64, SandboxError> {
    args[idx].as_f64().ok_or_else(|| {
        SandboxError::runtime(format!(
            "{fname}() expects a number, got '{}'",
            args[idx].type_name()
        ))
    })
}

pub(crate) fn int_arg(fname: &str, args: &[Value], idx: usize) -> Result<i64, SandboxError> {
    match &args[idx] {
        Value::Int(n) => Ok(*n),
        other => Err(SandboxError::runtime(format!(
            "{fname}() expects an integer, got '{}'",
            other.type_name()
        ))),
    }
}

pub(crate) fn str_arg(fname: &str, args: &[Value], idx: usize) -> Result<String, SandboxError> {
    match &args[idx] {
        Value::Str(s) => Ok(s.clone()),
        other => Err(SandboxError::runtime(format!(
            "{fname}() expects a string, got '{}'",
            other.type_name()
        ))),
    }
}

fn result_arg(fname: &str, args: &[Value]) -> Result<Rc<RefCell<ResultObject>>, SandboxError> {
    match args.first() {
        Some(Value::Result(rc)) => Ok(Rc::clone(rc)),
        Some(other) => Err(SandboxError::runtime(format!(
            "{fname}() expects the result object as its first argument, got '{}'",
            other.type_name()
        ))),
        None => Err(SandboxError::runtime(format!(
            "{fname}() expects the result object as its first argument"
        ))),
    }
}

fn source_ref_arg(fname: &str, args: &[Value], idx: usize) -> Result<SourceRef, SandboxError> {
    match &args[idx] {
        Value::Int(id) => Ok(SourceRef::Id(*id)),
        Value::Str(name) => Ok(SourceRef::Name(name.clone())),
        other => Err(SandboxError::runtime(format!(
            "{fname}() expects a data source name or id, got '{}'",
            other.type_name()
        ))),
    }
}

// ── Frame conversions ─────────────────────────────────────

/// Frame rows as script values: one insertion-ordered map per row.
pub(crate) fn frame_records(frame: &Frame) -> Vec<Value> {
    frame
        .record_rows()
        .into_iter()
        .map(|row| {
            Value::map(
                row.0
                    .into_iter()
                    .map(|(name, cell)| (name, Value::from_json(&cell)))
                    .collect(),
            )
        })
        .collect()
}

/// The record form host query results take inside scripts:
/// `{"columns": [{name, friendly_name, type}], "rows": [{…}]}`.
fn frame_to_record_value(frame: &Frame) -> Value {
    let columns: Vec<Value> = frame
        .columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            Value::map(vec![
                ("name".to_string(), Value::Str(column.name.clone())),
                ("friendly_name".to_string(), Value::Str(column.name.clone())),
                (
                    "type".to_string(),
                    Value::Str(frame.infer_column_type(idx).as_str().to_string()),
                ),
            ])
        })
        .collect();
    Value::map(vec![
        ("columns".to_string(), Value::list(columns)),
        ("rows".to_string(), Value::list(frame_records(frame))),
    ])
}

// ── Baseline builtins ─────────────────────────────────────

fn builtin_abs(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("abs", args, 1)?;
    match &args[0] {
        Value::Int(n) => n
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| SandboxError::runtime("integer overflow in abs()")),
        Value::Float(n) => Ok(Value::Float(n.abs())),
        other => Err(SandboxError::runtime(format!(
            "abs() expects a number, got '{}'",
            other.type_name()
        ))),
    }
}

fn builtin_all(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("all", args, 1)?;
    Ok(Value::Bool(
        hooks::iterate(&args[0])?.iter().all(Value::is_truthy),
    ))
}

fn builtin_any(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("any", args, 1)?;
    Ok(Value::Bool(
        hooks::iterate(&args[0])?.iter().any(Value::is_truthy),
    ))
}

fn builtin_bool(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("bool", args, 1)?;
    Ok(Value::Bool(args[0].is_truthy()))
}

fn builtin_enumerate(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity_range("enumerate", args, 1, 2)?;
    let start = if args.len() == 2 {
        int_arg("enumerate", args, 1)?
    } else {
        0
    };
    let items = hooks::iterate(&args[0])?;
    Ok(Value::list(
        items
            .into_iter()
            .enumerate()
            .map(|(i, v)| Value::list(vec![Value::Int(start + i as i64), v]))
            .collect(),
    ))
}

fn builtin_float(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("float", args, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Float(*n as f64)),
        Value::Float(n) => Ok(Value::Float(*n)),
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            SandboxError::runtime(format!("could not convert '{s}' to float"))
        }),
        other => Err(SandboxError::runtime(format!(
            "float() cannot convert '{}'",
            other.type_name()
        ))),
    }
}

fn builtin_int(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("int", args, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(n) => {
            let truncated = n.trunc();
            if truncated >= i64::MIN as f64 && truncated <= i64::MAX as f64 {
                Ok(Value::Int(truncated as i64))
            } else {
                Err(SandboxError::runtime("float is out of integer range"))
            }
        }
        Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            SandboxError::runtime(format!("could not convert '{s}' to int"))
        }),
        other => Err(SandboxError::runtime(format!(
            "int() cannot convert '{}'",
            other.type_name()
        ))),
    }
}

fn builtin_len(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("len", args, 1)?;
    let len = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Map(entries) => entries.borrow().len(),
        Value::Frame(frame) => frame.rows.len(),
        other => {
            return Err(SandboxError::runtime(format!(
                "'{}' has no length",
                other.type_name()
            )));
        }
    };
    Ok(Value::Int(len as i64))
}

fn builtin_list(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("list", args, 1)?;
    Ok(Value::list(hooks::iterate(&args[0])?))
}

fn builtin_max(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    extremum("max", args, std::cmp::Ordering::Greater)
}

fn builtin_min(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    extremum("min", args, std::cmp::Ordering::Less)
}

fn extremum(
    fname: &str,
    args: &[Value],
    keep: std::cmp::Ordering,
) -> Result<Value, SandboxError> {
    let values = if args.len() == 1 {
        hooks::iterate(&args[0])?
    } else {
        args.to_vec()
    };
    let mut values = values.into_iter();
    let mut best = values.next().ok_or_else(|| {
        SandboxError::runtime(format!("{fname}() arg is an empty sequence"))
    })?;
    for value in values {
        if value.compare(&best)? == keep {
            best = value;
        }
    }
    Ok(best)
}

/// Eagerly materialized integer range. Bounded so a single call cannot
/// exhaust host memory — the sandbox has no other internal quota.
fn builtin_range(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    const MAX_RANGE_LEN: i64 = 10_000_000;

    check_arity_range("range", args, 1, 3)?;
    let (start, stop, step) = match args.len() {
        1 => (0, int_arg("range", args, 0)?, 1),
        2 => (int_arg("range", args, 0)?, int_arg("range", args, 1)?, 1),
        _ => (
            int_arg("range", args, 0)?,
            int_arg("range", args, 1)?,
            int_arg("range", args, 2)?,
        ),
    };
    if step == 0 {
        return Err(SandboxError::runtime("range() step must not be zero"));
    }

    let span = if step > 0 { stop - start } else { start - stop };
    let count = if span <= 0 {
        0
    } else {
        (span + step.abs() - 1) / step.abs()
    };
    if count > MAX_RANGE_LEN {
        return Err(SandboxError::runtime(format!(
            "range() of {count} elements exceeds the {MAX_RANGE_LEN} element limit"
        )));
    }

    let mut items = Vec::with_capacity(count as usize);
    let mut current = start;
    for _ in 0..count {
        items.push(Value::Int(current));
        current += step;
    }
    Ok(Value::list(items))
}

fn builtin_reversed(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("reversed", args, 1)?;
    let mut items = hooks::iterate(&args[0])?;
    items.reverse();
    Ok(Value::list(items))
}

fn builtin_round(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity_range("round", args, 1, 2)?;
    let x = num_arg("round", args, 0)?;
    if args.len() == 1 {
        let rounded = x.round();
        if rounded >= i64::MIN as f64 && rounded <= i64::MAX as f64 {
            Ok(Value::Int(rounded as i64))
        } else {
            Err(SandboxError::runtime("round() result is out of integer range"))
        }
    } else {
        let digits = int_arg("round", args, 1)?;
        let factor = 10f64.powi(digits.clamp(-18, 18) as i32);
        Ok(Value::Float((x * factor).round() / factor))
    }
}

fn builtin_sorted(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("sorted", args, 1)?;
    let mut items = hooks::iterate(&args[0])?;
    // Validate comparability up front; sort_by cannot carry errors out.
    for pair in items.windows(2) {
        pair[0].compare(&pair[1])?;
    }
    let mut failed = false;
    items.sort_by(|a, b| match a.compare(b) {
        Ok(ordering) => ordering,
        Err(_) => {
            failed = true;
            std::cmp::Ordering::Equal
        }
    });
    if failed {
        return Err(SandboxError::runtime("sorted() elements are not comparable"));
    }
    Ok(Value::list(items))
}

fn builtin_str(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("str", args, 1)?;
    Ok(Value::Str(args[0].render()))
}

fn builtin_sum(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("sum", args, 1)?;
    let mut total = Value::Int(0);
    for item in hooks::iterate(&args[0])? {
        total = crate::script::value::arith(crate::script::ast::BinOp::Add, &total, &item)?;
    }
    Ok(total)
}

fn builtin_zip(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    if args.is_empty() {
        return Ok(Value::list(vec![]));
    }
    let mut sequences = Vec::with_capacity(args.len());
    for arg in args {
        sequences.push(hooks::iterate(arg)?);
    }
    let shortest = sequences.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(shortest);
    for i in 0..shortest {
        out.push(Value::list(
            sequences.iter().map(|seq| seq[i].clone()).collect(),
        ));
    }
    Ok(Value::list(out))
}

// ── Extended catalog ──────────────────────────────────────

fn builtin_chr(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("chr", args, 1)?;
    let code = int_arg("chr", args, 0)?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::Str(c.to_string()))
        .ok_or_else(|| SandboxError::runtime(format!("chr() argument {code} is out of range")))
}

fn builtin_divmod(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("divmod", args, 2)?;
    let a = int_arg("divmod", args, 0)?;
    let b = int_arg("divmod", args, 1)?;
    if b == 0 {
        return Err(SandboxError::runtime("division by zero"));
    }
    let (q, r) = (
        a.checked_div_euclid(b),
        a.checked_rem_euclid(b),
    );
    match (q, r) {
        (Some(q), Some(r)) => Ok(Value::list(vec![Value::Int(q), Value::Int(r)])),
        _ => Err(SandboxError::runtime("integer overflow in divmod()")),
    }
}

fn builtin_hex(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("hex", args, 1)?;
    let n = int_arg("hex", args, 0)?;
    let text = if n < 0 {
        format!("-0x{:x}", n.unsigned_abs())
    } else {
        format!("0x{n:x}")
    };
    Ok(Value::Str(text))
}

fn builtin_ord(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("ord", args, 1)?;
    let s = str_arg("ord", args, 0)?;
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::Int(c as i64)),
        _ => Err(SandboxError::runtime(
            "ord() expects a single-character string",
        )),
    }
}

fn builtin_repr(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("repr", args, 1)?;
    Ok(Value::Str(args[0].repr()))
}

// ── Session bindings ──────────────────────────────────────

fn builtin_print(ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    let line = args
        .iter()
        .map(Value::render)
        .collect::<Vec<_>>()
        .join(" ");
    ctx.output.borrow_mut().write(&line);
    Ok(Value::Null)
}

fn builtin_enable_print_log(ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("enable_print_log", args, 0)?;
    ctx.output.borrow_mut().enable();
    Ok(Value::Null)
}

fn builtin_disable_print_log(ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("disable_print_log", args, 0)?;
    ctx.output.borrow_mut().disable();
    Ok(Value::Null)
}

fn builtin_add_result_column(
    _ctx: &mut ExecCtx<'_>,
    args: &[Value],
) -> Result<Value, SandboxError> {
    check_arity("add_result_column", args, 4)?;
    let result = result_arg("add_result_column", args)?;
    let name = str_arg("add_result_column", args, 1)?;
    let friendly_name = str_arg("add_result_column", args, 2)?;
    let type_str = str_arg("add_result_column", args, 3)?;
    result.borrow_mut().add_column(&name, &friendly_name, &type_str)?;
    Ok(Value::Null)
}

fn builtin_add_result_row(_ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("add_result_row", args, 2)?;
    let result = result_arg("add_result_row", args)?;
    let Value::Map(entries) = &args[1] else {
        return Err(SandboxError::runtime(format!(
            "add_result_row() expects a map of values, got '{}'",
            args[1].type_name()
        )));
    };
    let mut row = Row::default();
    for (key, value) in entries.borrow().iter() {
        row.0.push((key.clone(), value.to_json()?));
    }
    result.borrow_mut().add_row(row);
    Ok(Value::Null)
}

fn builtin_dataframe_to_result(
    _ctx: &mut ExecCtx<'_>,
    args: &[Value],
) -> Result<Value, SandboxError> {
    check_arity("dataframe_to_result", args, 2)?;
    let result = result_arg("dataframe_to_result", args)?;
    let Value::Frame(frame) = &args[1] else {
        return Err(SandboxError::runtime(format!(
            "dataframe_to_result() expects a dataframe, got '{}'",
            args[1].type_name()
        )));
    };
    result.borrow_mut().ingest_frame(frame)?;
    Ok(Value::Null)
}

fn builtin_get_query_result(ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("get_query_result", args, 1)?;
    let query_id = int_arg("get_query_result", args, 0)?;
    let frame = ctx.host.get_query_result(query_id)?;
    Ok(frame_to_record_value(&frame))
}

fn builtin_execute_query(ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity_range("execute_query", args, 2, 3)?;
    let source = source_ref_arg("execute_query", args, 0)?;
    let query = str_arg("execute_query", args, 1)?;
    let frame = ctx.host.run_query(&source, &query)?;
    if args.len() == 3 {
        let result_type = str_arg("execute_query", args, 2)?;
        if result_type != "dataframe" {
            return Err(SandboxError::runtime(format!(
                "unknown result type '{result_type}'"
            )));
        }
        return Ok(Value::Frame(Rc::new(frame)));
    }
    Ok(frame_to_record_value(&frame))
}

fn builtin_execute_by_query_id(
    ctx: &mut ExecCtx<'_>,
    args: &[Value],
) -> Result<Value, SandboxError> {
    check_arity_range("execute_by_query_id", args, 1, 2)?;
    let query_id = int_arg("execute_by_query_id", args, 0)?;
    let query = ctx.host.get_query(query_id)?;
    let param_names = template::collect_parameters(&query.query_text);

    let (rendered, missing) = match args.get(1) {
        None => (query.query_text.clone(), param_names),
        Some(Value::Map(entries)) => {
            let params: Vec<(String, String)> = entries
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.render()))
                .collect();
            let missing = param_names
                .into_iter()
                .filter(|name| !params.iter().any(|(k, _)| k == name))
                .collect();
            (template::render(&query.query_text, &params), missing)
        }
        Some(other) => {
            return Err(SandboxError::runtime(format!(
                "execute_by_query_id() expects a map of parameters, got '{}'",
                other.type_name()
            )));
        }
    };

    if !missing.is_empty() {
        return Err(SandboxError::host(format!(
            "Missing parameter value for: {}",
            missing.join(", ")
        )));
    }

    let frame = ctx.host.run_query(&query.data_source, &rendered)?;
    Ok(frame_to_record_value(&frame))
}

fn builtin_get_source_schema(ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("get_source_schema", args, 1)?;
    let source = source_ref_arg("get_source_schema", args, 0)?;
    let schema = ctx.host.get_schema(&source)?;
    Ok(Value::list(
        schema
            .into_iter()
            .map(|table| {
                Value::map(vec![
                    ("name".to_string(), Value::Str(table.name)),
                    (
                        "columns".to_string(),
                        Value::list(table.columns.into_iter().map(Value::Str).collect()),
                    ),
                ])
            })
            .collect(),
    ))
}

fn builtin_get_current_user(ctx: &mut ExecCtx<'_>, args: &[Value]) -> Result<Value, SandboxError> {
    check_arity("get_current_user", args, 0)?;
    let user = ctx.host.current_user();
    Ok(Value::map(vec![
        ("id".to_string(), Value::Int(user.id)),
        ("name".to_string(), Value::Str(user.name)),
        ("email".to_string(), Value::Str(user.email)),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::host::static_host::{StaticHost, StaticHostConfig};
    use crate::sandbox::imports::ImportBroker;
    use crate::sandbox::output::OutputCapture;

    struct Fixture {
        output: RefCell<OutputCapture>,
        imports: ImportBroker,
        host: StaticHost,
        result: Rc<RefCell<ResultObject>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                output: RefCell::new(OutputCapture::new()),
                imports: ImportBroker::new(vec![], vec![]),
                host: StaticHost::new(StaticHostConfig::default()),
                result: Rc::new(RefCell::new(ResultObject::new())),
            }
        }

        fn ctx(&self) -> ExecCtx<'_> {
            ExecCtx {
                output: &self.output,
                result: Rc::clone(&self.result),
                imports: &self.imports,
                host: &self.host,
            }
        }
    }

    fn call(fixture: &Fixture, func: BuiltinFn, args: &[Value]) -> Result<Value, SandboxError> {
        let mut ctx = fixture.ctx();
        func(&mut ctx, args)
    }

    #[test]
    fn test_build_rejects_unknown_additional_builtin() {
        let err = CapabilityTable::build(&["eval".to_string()]).unwrap_err();
        assert!(err.to_string().contains("'eval'"));
    }

    #[test]
    fn test_build_layers_extended_catalog() {
        let table = CapabilityTable::build(&[]).unwrap();
        assert!(!table.contains("divmod"));

        let table = CapabilityTable::build(&["divmod".to_string(), "hex".to_string()]).unwrap();
        assert!(table.contains("divmod"));
        assert!(table.contains("hex"));
        // Baseline and session bindings are always there
        assert!(table.contains("len"));
        assert!(table.contains("add_result_column"));
        assert!(table.contains("TYPE_DATETIME"));
    }

    #[test]
    fn test_additional_duplicates_are_deduplicated() {
        // Names already in the table are silently skipped, not doubled.
        let table =
            CapabilityTable::build(&["len".to_string(), "divmod".to_string(), "divmod".to_string()])
                .unwrap();
        assert!(table.contains("len"));
        assert!(table.contains("divmod"));
    }

    #[test]
    fn test_materialize_injects_result_handle() {
        let fixture = Fixture::new();
        let table = CapabilityTable::build(&[]).unwrap();
        let ns = table.materialize(&fixture.result);
        assert!(matches!(ns.get("result"), Some(Value::Result(_))));
        assert!(matches!(ns.get("print"), Some(Value::Builtin(_))));
        assert_eq!(
            ns.get("TYPE_INTEGER"),
            Some(&Value::Str("integer".to_string()))
        );
    }

    #[test]
    fn test_pure_builtins() {
        let fixture = Fixture::new();
        assert_eq!(
            call(&fixture, builtin_abs, &[Value::Int(-5)]).unwrap(),
            Value::Int(5)
        );
        assert_eq!(
            call(&fixture, builtin_len, &[Value::Str("héllo".into())]).unwrap(),
            Value::Int(5)
        );
        assert_eq!(
            call(
                &fixture,
                builtin_sum,
                &[Value::list(vec![Value::Int(1), Value::Float(2.5)])]
            )
            .unwrap(),
            Value::Float(3.5)
        );
        assert_eq!(
            call(
                &fixture,
                builtin_max,
                &[Value::Int(3), Value::Int(9), Value::Int(4)]
            )
            .unwrap(),
            Value::Int(9)
        );
        assert_eq!(
            call(&fixture, builtin_range, &[Value::Int(3)]).unwrap(),
            Value::list(vec![Value::Int(0), Value::Int(1), Value::Int(2)])
        );
        assert_eq!(
            call(
                &fixture,
                builtin_sorted,
                &[Value::list(vec![Value::Int(3), Value::Int(1), Value::Int(2)])]
            )
            .unwrap(),
            Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn test_range_guards() {
        let fixture = Fixture::new();
        let err = call(
            &fixture,
            builtin_range,
            &[Value::Int(0), Value::Int(10), Value::Int(0)],
        )
        .unwrap_err();
        assert!(err.message.contains("step"));

        let err = call(&fixture, builtin_range, &[Value::Int(i64::MAX)]).unwrap_err();
        assert!(err.message.contains("limit"));
    }

    #[test]
    fn test_zip_and_enumerate() {
        let fixture = Fixture::new();
        let zipped = call(
            &fixture,
            builtin_zip,
            &[
                Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
                Value::list(vec![Value::Str("a".into()), Value::Str("b".into())]),
            ],
        )
        .unwrap();
        assert_eq!(
            zipped,
            Value::list(vec![
                Value::list(vec![Value::Int(1), Value::Str("a".into())]),
                Value::list(vec![Value::Int(2), Value::Str("b".into())]),
            ])
        );

        let enumerated = call(
            &fixture,
            builtin_enumerate,
            &[Value::list(vec![Value::Str("x".into())]), Value::Int(10)],
        )
        .unwrap();
        assert_eq!(
            enumerated,
            Value::list(vec![Value::list(vec![Value::Int(10), Value::Str("x".into())])])
        );
    }

    #[test]
    fn test_print_writes_to_capture_only() {
        let fixture = Fixture::new();
        call(
            &fixture,
            builtin_print,
            &[Value::Str("rows:".into()), Value::Int(42)],
        )
        .unwrap();
        let output = fixture.output.borrow();
        assert_eq!(output.lines().len(), 1);
        assert!(output.lines()[0].ends_with("rows: 42"));
    }

    #[test]
    fn test_print_toggle_bindings() {
        let fixture = Fixture::new();
        call(&fixture, builtin_disable_print_log, &[]).unwrap();
        call(&fixture, builtin_print, &[Value::Str("dropped".into())]).unwrap();
        call(&fixture, builtin_enable_print_log, &[]).unwrap();
        call(&fixture, builtin_print, &[Value::Str("kept".into())]).unwrap();
        assert_eq!(fixture.output.borrow().lines().len(), 1);
    }

    #[test]
    fn test_add_result_column_and_row() {
        let fixture = Fixture::new();
        let handle = Value::Result(Rc::clone(&fixture.result));
        call(
            &fixture,
            builtin_add_result_column,
            &[
                handle.clone(),
                Value::Str("x".into()),
                Value::Str("X".into()),
                Value::Str("integer".into()),
            ],
        )
        .unwrap();
        call(
            &fixture,
            builtin_add_result_row,
            &[handle, Value::map(vec![("x".into(), Value::Int(1))])],
        )
        .unwrap();

        let result = fixture.result.borrow();
        assert_eq!(result.columns.len(), 1);
        assert_eq!(result.rows.len(), 1);
    }

    #[test]
    fn test_add_result_column_bad_type_is_column_type_error() {
        let fixture = Fixture::new();
        let handle = Value::Result(Rc::clone(&fixture.result));
        let err = call(
            &fixture,
            builtin_add_result_column,
            &[
                handle,
                Value::Str("x".into()),
                Value::Str("X".into()),
                Value::Str("decimal".into()),
            ],
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ColumnType);
        assert!(fixture.result.borrow().columns.is_empty());
    }

    #[test]
    fn test_result_arg_must_be_the_handle() {
        let fixture = Fixture::new();
        let err = call(
            &fixture,
            builtin_add_result_row,
            &[Value::map(vec![]), Value::map(vec![])],
        )
        .unwrap_err();
        assert!(err.message.contains("result object"));
    }

    #[test]
    fn test_host_error_maps_to_host_service_kind() {
        let fixture = Fixture::new();
        let err = call(&fixture, builtin_get_query_result, &[Value::Int(9)]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::HostService);
        assert!(err.message.contains("Query id 9 does not exist."));
    }

    #[test]
    fn test_get_current_user_shape() {
        let fixture = Fixture::new();
        let user = call(&fixture, builtin_get_current_user, &[]).unwrap();
        assert_eq!(
            hooks::get_attr(&user, "name").unwrap(),
            Value::Str("admin".into())
        );
    }
}
