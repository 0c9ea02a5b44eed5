//! Tree-walking evaluator for compiled scripts.
//!
//! The interpreter owns the flat script namespace and performs NO primitive
//! operation on values directly: indexing, attribute access, iteration,
//! unpacking, and in-place operators all go through the mediation hooks in
//! `crate::sandbox::hooks`.

use std::collections::HashMap;

use crate::error::SandboxError;
use crate::sandbox::{hooks, ExecCtx};

use super::ast::{BinOp, Expr, Program, Stmt, Target, UnOp};
use super::value::{arith, Value};

enum Flow {
    Normal,
    Break,
    Continue,
}

fn undefined(name: &str) -> SandboxError {
    SandboxError::runtime(format!("name '{name}' is not defined"))
}

/// One interpreter per execution. The namespace starts as the materialized
/// capability table and accumulates script variables on top.
pub struct Interp {
    ns: HashMap<String, Value>,
}

impl Interp {
    pub fn new(ns: HashMap<String, Value>) -> Self {
        Self { ns }
    }

    pub fn run(&mut self, program: &Program, ctx: &mut ExecCtx<'_>) -> Result<(), SandboxError> {
        for stmt in &program.stmts {
            match self.exec_stmt(stmt, ctx)? {
                Flow::Normal => {}
                // The parser rejects loop control outside loops; this is a
                // backstop, not a reachable path.
                Flow::Break | Flow::Continue => {
                    return Err(SandboxError::runtime("loop control outside of a loop"));
                }
            }
        }
        Ok(())
    }

    fn exec_block(&mut self, stmts: &[Stmt], ctx: &mut ExecCtx<'_>) -> Result<Flow, SandboxError> {
        for stmt in stmts {
            match self.exec_stmt(stmt, ctx)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, ctx: &mut ExecCtx<'_>) -> Result<Flow, SandboxError> {
        match stmt {
            Stmt::Import { module, .. } => {
                let handle = ctx.imports.import(module)?;
                self.ns.insert(module.clone(), Value::Module(handle));
                Ok(Flow::Normal)
            }
            Stmt::Assign { targets, value, .. } => {
                let value = self.eval(value, ctx)?;
                if targets.len() == 1 {
                    self.assign(&targets[0], value, ctx)?;
                } else {
                    let parts = hooks::unpack(&value, targets.len())?;
                    for (target, part) in targets.iter().zip(parts) {
                        self.assign(target, part, ctx)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::AugAssign {
                name, op, value, ..
            } => {
                let rhs = self.eval(value, ctx)?;
                let current = self.ns.get(name).cloned().ok_or_else(|| undefined(name))?;
                let updated = hooks::inplace(op.token(), &current, &rhs)?;
                self.ns.insert(name.clone(), updated);
                Ok(Flow::Normal)
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                if self.eval(cond, ctx)?.is_truthy() {
                    self.exec_block(then_body, ctx)
                } else {
                    self.exec_block(else_body, ctx)
                }
            }
            Stmt::For {
                targets,
                iter,
                body,
            } => {
                let source = self.eval(iter, ctx)?;
                for item in hooks::iterate(&source)? {
                    if targets.len() == 1 {
                        self.ns.insert(targets[0].clone(), item);
                    } else {
                        let parts = hooks::unpack(&item, targets.len())?;
                        for (name, part) in targets.iter().zip(parts) {
                            self.ns.insert(name.clone(), part);
                        }
                    }
                    match self.exec_block(body, ctx)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        Flow::Continue => continue,
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break { .. } => Ok(Flow::Break),
            Stmt::Continue { .. } => Ok(Flow::Continue),
            Stmt::Expr(expr) => {
                self.eval(expr, ctx)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn assign(
        &mut self,
        target: &Target,
        value: Value,
        ctx: &mut ExecCtx<'_>,
    ) -> Result<(), SandboxError> {
        match target {
            Target::Name(name) => {
                self.ns.insert(name.clone(), value);
                Ok(())
            }
            Target::Index { obj, key } => {
                let obj = self.eval(obj, ctx)?;
                let key = self.eval(key, ctx)?;
                hooks::set_item(&obj, &key, value)
            }
            Target::Attr { obj, name } => {
                let obj = self.eval(obj, ctx)?;
                hooks::set_attr(&obj, name, value)
            }
        }
    }

    fn eval(&mut self, expr: &Expr, ctx: &mut ExecCtx<'_>) -> Result<Value, SandboxError> {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(n) => Ok(Value::Float(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Name(name) => self.ns.get(name).cloned().ok_or_else(|| undefined(name)),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, ctx)?);
                }
                Ok(Value::list(values))
            }
            Expr::Map(entries) => {
                let mut out: Vec<(String, Value)> = Vec::with_capacity(entries.len());
                for (key_expr, value_expr) in entries {
                    let key = match self.eval(key_expr, ctx)? {
                        Value::Str(s) => s,
                        other => {
                            return Err(SandboxError::runtime(format!(
                                "map keys must be strings, got '{}'",
                                other.type_name()
                            )));
                        }
                    };
                    let value = self.eval(value_expr, ctx)?;
                    // Duplicate keys: last one wins
                    match out.iter_mut().find(|(k, _)| *k == key) {
                        Some((_, slot)) => *slot = value,
                        None => out.push((key, value)),
                    }
                }
                Ok(Value::map(out))
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, ctx)?;
                match op {
                    UnOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnOp::Neg => match value {
                        Value::Int(n) => n.checked_neg().map(Value::Int).ok_or_else(|| {
                            SandboxError::runtime("integer overflow in negation")
                        }),
                        Value::Float(n) => Ok(Value::Float(-n)),
                        other => Err(SandboxError::runtime(format!(
                            "cannot negate '{}'",
                            other.type_name()
                        ))),
                    },
                }
            }
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right, ctx),
            Expr::Call { func, args } => {
                let callee = self.eval(func, ctx)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, ctx)?);
                }
                match callee {
                    Value::Builtin(builtin) => (builtin.func)(ctx, &values),
                    other => Err(SandboxError::runtime(format!(
                        "'{}' is not callable",
                        other.type_name()
                    ))),
                }
            }
            Expr::Index { obj, key } => {
                let obj = self.eval(obj, ctx)?;
                let key = self.eval(key, ctx)?;
                hooks::get_item(&obj, &key)
            }
            Expr::Attr { obj, name } => {
                let obj = self.eval(obj, ctx)?;
                hooks::get_attr(&obj, name)
            }
        }
    }

    fn eval_binary(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        ctx: &mut ExecCtx<'_>,
    ) -> Result<Value, SandboxError> {
        // Short-circuit forms return the deciding operand, Python-style.
        match op {
            BinOp::And => {
                let lhs = self.eval(left, ctx)?;
                if !lhs.is_truthy() {
                    return Ok(lhs);
                }
                return self.eval(right, ctx);
            }
            BinOp::Or => {
                let lhs = self.eval(left, ctx)?;
                if lhs.is_truthy() {
                    return Ok(lhs);
                }
                return self.eval(right, ctx);
            }
            _ => {}
        }

        let lhs = self.eval(left, ctx)?;
        let rhs = self.eval(right, ctx)?;
        match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                arith(op, &lhs, &rhs)
            }
            BinOp::Eq => Ok(Value::Bool(lhs.deep_eq(&rhs)?)),
            BinOp::NotEq => Ok(Value::Bool(!lhs.deep_eq(&rhs)?)),
            BinOp::Lt => Ok(Value::Bool(lhs.compare(&rhs)? == std::cmp::Ordering::Less)),
            BinOp::LtEq => Ok(Value::Bool(
                lhs.compare(&rhs)? != std::cmp::Ordering::Greater,
            )),
            BinOp::Gt => Ok(Value::Bool(
                lhs.compare(&rhs)? == std::cmp::Ordering::Greater,
            )),
            BinOp::GtEq => Ok(Value::Bool(lhs.compare(&rhs)? != std::cmp::Ordering::Less)),
            BinOp::In => self.eval_membership(&lhs, &rhs),
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        }
    }

    fn eval_membership(&self, needle: &Value, haystack: &Value) -> Result<Value, SandboxError> {
        match haystack {
            Value::List(items) => {
                for item in items.borrow().iter() {
                    if needle.deep_eq(item)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Value::Map(entries) => match needle {
                Value::Str(key) => Ok(Value::Bool(entries.borrow().iter().any(|(k, _)| k == key))),
                other => Err(SandboxError::runtime(format!(
                    "map membership expects a string key, got '{}'",
                    other.type_name()
                ))),
            },
            Value::Str(s) => match needle {
                Value::Str(sub) => Ok(Value::Bool(s.contains(sub.as_str()))),
                other => Err(SandboxError::runtime(format!(
                    "string membership expects a string, got '{}'",
                    other.type_name()
                ))),
            },
            other => Err(SandboxError::runtime(format!(
                "'in' is not supported on '{}'",
                other.type_name()
            ))),
        }
    }
}
