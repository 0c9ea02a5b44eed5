//! AST for the restricted script grammar.
//!
//! The parser only ever produces nodes from this file; anything a script
//! could write that has no representation here is rejected at compile time.

/// A compiled script: a statement list bound to no namespace yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `import name` — resolved through the import broker at run time.
    Import { module: String, line: usize },
    /// `a = expr`, `a, b = expr`, `xs[0] = expr`, `m.field = expr`
    Assign {
        targets: Vec<Target>,
        value: Expr,
        line: usize,
    },
    /// `name += expr` and friends. Only plain variables are valid targets.
    AugAssign {
        name: String,
        op: AugOp,
        value: Expr,
        line: usize,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    For {
        targets: Vec<String>,
        iter: Expr,
        body: Vec<Stmt>,
    },
    Break { line: usize },
    Continue { line: usize },
    Expr(Expr),
}

/// Assignment target forms. Index and attribute stores are routed through
/// the mediation hooks at run time.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Index { obj: Expr, key: Expr },
    Attr { obj: Expr, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl AugOp {
    /// The operator token as dispatched through the in-place mediation hook.
    pub fn token(self) -> &'static str {
        match self {
            AugOp::Add => "+=",
            AugOp::Sub => "-=",
            AugOp::Mul => "*=",
            AugOp::Div => "/=",
            AugOp::Mod => "%=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    List(Vec<Expr>),
    /// Map literal; keys are expressions that must evaluate to strings.
    Map(Vec<(Expr, Expr)>),
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        obj: Box<Expr>,
        key: Box<Expr>,
    },
    Attr {
        obj: Box<Expr>,
        name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// Membership: list element, map key, or substring.
    In,
    /// Short-circuit; returns the deciding operand like Python.
    And,
    Or,
}

impl BinOp {
    pub fn describe(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Lt => "<",
            BinOp::LtEq => "<=",
            BinOp::Gt => ">",
            BinOp::GtEq => ">=",
            BinOp::In => "in",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }
}
