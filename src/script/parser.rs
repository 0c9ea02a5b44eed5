//! Recursive-descent parser for the restricted script grammar.
//!
//! Parsing IS the validation pass: the grammar has no representation for
//! reflection, unrestricted attribute traversal, function definitions, or
//! unbounded recursion, so any script using them fails here with a
//! `RestrictionViolation` before any namespace or side effect exists.

use crate::error::SandboxError;

use super::ast::{AugOp, BinOp, Expr, Program, Stmt, Target, UnOp};
use super::lexer::{tokenize, Tok, Token};

/// Maximum statement/expression nesting. Scripts are short retrieval steps;
/// anything deeper is hostile or generated.
const MAX_DEPTH: usize = 64;

pub fn parse(src: &str) -> Result<Program, SandboxError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        loop_depth: 0,
    };
    parser.parse_program()
}

fn tok_name(tok: &Tok) -> String {
    match tok {
        Tok::Ident(name) => format!("identifier '{name}'"),
        Tok::Int(n) => format!("number {n}"),
        Tok::Float(n) => format!("number {n}"),
        Tok::Str(_) => "string literal".to_string(),
        Tok::Import => "'import'".to_string(),
        Tok::If => "'if'".to_string(),
        Tok::Else => "'else'".to_string(),
        Tok::For => "'for'".to_string(),
        Tok::In => "'in'".to_string(),
        Tok::Break => "'break'".to_string(),
        Tok::Continue => "'continue'".to_string(),
        Tok::And => "'and'".to_string(),
        Tok::Or => "'or'".to_string(),
        Tok::Not => "'not'".to_string(),
        Tok::True => "'true'".to_string(),
        Tok::False => "'false'".to_string(),
        Tok::Null => "'null'".to_string(),
        Tok::Assign => "'='".to_string(),
        Tok::Eq => "'=='".to_string(),
        Tok::NotEq => "'!='".to_string(),
        Tok::Lt => "'<'".to_string(),
        Tok::LtEq => "'<='".to_string(),
        Tok::Gt => "'>'".to_string(),
        Tok::GtEq => "'>='".to_string(),
        Tok::Plus => "'+'".to_string(),
        Tok::Minus => "'-'".to_string(),
        Tok::Star => "'*'".to_string(),
        Tok::Slash => "'/'".to_string(),
        Tok::Percent => "'%'".to_string(),
        Tok::PlusEq => "'+='".to_string(),
        Tok::MinusEq => "'-='".to_string(),
        Tok::StarEq => "'*='".to_string(),
        Tok::SlashEq => "'/='".to_string(),
        Tok::PercentEq => "'%='".to_string(),
        Tok::LParen => "'('".to_string(),
        Tok::RParen => "')'".to_string(),
        Tok::LBracket => "'['".to_string(),
        Tok::RBracket => "']'".to_string(),
        Tok::LBrace => "'{'".to_string(),
        Tok::RBrace => "'}'".to_string(),
        Tok::Comma => "','".to_string(),
        Tok::Colon => "':'".to_string(),
        Tok::Dot => "'.'".to_string(),
        Tok::Semi => "';'".to_string(),
        Tok::Newline => "end of line".to_string(),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    loop_depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Location of the current token, or of the end of input.
    fn loc(&self) -> (usize, usize) {
        if let Some(t) = self.tokens.get(self.pos) {
            (t.line, t.col)
        } else if let Some(t) = self.tokens.last() {
            (t.line, t.col + 1)
        } else {
            (1, 1)
        }
    }

    fn err_here(&self, reason: impl std::fmt::Display) -> SandboxError {
        let (line, col) = self.loc();
        SandboxError::restriction(line, col, reason)
    }

    fn expect(&mut self, tok: Tok, context: &str) -> Result<Token, SandboxError> {
        match self.peek() {
            Some(t) if *t == tok => Ok(self.bump().expect("peeked token exists")),
            Some(other) => Err(self.err_here(format!(
                "expected {} {context}, found {}",
                tok_name(&tok),
                tok_name(other)
            ))),
            None => Err(self.err_here(format!(
                "expected {} {context}, found end of script",
                tok_name(&tok)
            ))),
        }
    }

    fn expect_ident(&mut self, context: &str) -> Result<(String, usize), SandboxError> {
        match self.peek() {
            Some(Tok::Ident(_)) => {
                let t = self.bump().expect("peeked token exists");
                let Tok::Ident(name) = t.tok else {
                    unreachable!()
                };
                Ok((name, t.line))
            }
            Some(other) => Err(self.err_here(format!(
                "expected identifier {context}, found {}",
                tok_name(other)
            ))),
            None => Err(self.err_here(format!(
                "expected identifier {context}, found end of script"
            ))),
        }
    }

    /// Skip statement separators (newlines and semicolons).
    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(Tok::Newline) | Some(Tok::Semi)) {
            self.pos += 1;
        }
    }

    /// Skip newlines only — used inside bracketed contexts where line
    /// breaks are insignificant.
    fn skip_newlines(&mut self) {
        while self.peek() == Some(&Tok::Newline) {
            self.pos += 1;
        }
    }

    fn enter(&mut self) -> Result<(), SandboxError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.err_here(format!("nesting exceeds {MAX_DEPTH} levels")));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ── Statements ────────────────────────────────────────

    fn parse_program(&mut self) -> Result<Program, SandboxError> {
        let mut stmts = Vec::new();
        self.skip_separators();
        while self.peek().is_some() {
            stmts.push(self.parse_stmt()?);
            self.end_of_stmt()?;
            self.skip_separators();
        }
        Ok(Program { stmts })
    }

    /// After a statement there must be a separator, the end of the script,
    /// or the closing brace of the enclosing block.
    fn end_of_stmt(&mut self) -> Result<(), SandboxError> {
        match self.peek() {
            None | Some(Tok::Newline) | Some(Tok::Semi) | Some(Tok::RBrace) => Ok(()),
            Some(other) => Err(self.err_here(format!(
                "unexpected {} after statement",
                tok_name(other)
            ))),
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt, SandboxError> {
        match self.peek() {
            Some(Tok::Import) => {
                self.bump();
                let (module, line) = self.expect_ident("after 'import'")?;
                Ok(Stmt::Import { module, line })
            }
            Some(Tok::If) => {
                self.bump();
                self.parse_if_tail()
            }
            Some(Tok::For) => self.parse_for(),
            Some(Tok::Break) => {
                let t = self.bump().expect("peeked token exists");
                if self.loop_depth == 0 {
                    return Err(SandboxError::restriction(
                        t.line,
                        t.col,
                        "'break' outside of a loop",
                    ));
                }
                Ok(Stmt::Break { line: t.line })
            }
            Some(Tok::Continue) => {
                let t = self.bump().expect("peeked token exists");
                if self.loop_depth == 0 {
                    return Err(SandboxError::restriction(
                        t.line,
                        t.col,
                        "'continue' outside of a loop",
                    ));
                }
                Ok(Stmt::Continue { line: t.line })
            }
            Some(_) => self.parse_assign_or_expr(),
            None => Err(self.err_here("expected a statement, found end of script")),
        }
    }

    fn parse_if_tail(&mut self) -> Result<Stmt, SandboxError> {
        self.enter()?;
        let cond = self.parse_expr()?;
        let then_body = self.parse_block()?;
        let mut else_body = Vec::new();

        // Allow `}` newline `else` as well as `} else {`
        let saved = self.pos;
        self.skip_newlines();
        if self.eat(&Tok::Else) {
            if self.eat(&Tok::If) {
                else_body.push(self.parse_if_tail()?);
            } else {
                else_body = self.parse_block()?;
            }
        } else {
            self.pos = saved;
        }

        self.leave();
        Ok(Stmt::If {
            cond,
            then_body,
            else_body,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, SandboxError> {
        self.enter()?;
        self.bump(); // 'for'
        let mut targets = Vec::new();
        let (first, _) = self.expect_ident("after 'for'")?;
        targets.push(first);
        while self.eat(&Tok::Comma) {
            let (name, _) = self.expect_ident("in loop target list")?;
            targets.push(name);
        }
        self.expect(Tok::In, "after loop targets")?;
        let iter = self.parse_expr()?;
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        self.leave();
        Ok(Stmt::For {
            targets,
            iter,
            body: body?,
        })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, SandboxError> {
        self.enter()?;
        self.expect(Tok::LBrace, "to open a block")?;
        let mut stmts = Vec::new();
        self.skip_separators();
        while self.peek() != Some(&Tok::RBrace) {
            if self.peek().is_none() {
                return Err(self.err_here("unclosed block, expected '}'"));
            }
            stmts.push(self.parse_stmt()?);
            self.end_of_stmt()?;
            self.skip_separators();
        }
        self.bump(); // '}'
        self.leave();
        Ok(stmts)
    }

    fn parse_assign_or_expr(&mut self) -> Result<Stmt, SandboxError> {
        let (line, col) = self.loc();
        let first = self.parse_expr()?;

        match self.peek() {
            Some(Tok::Assign) => {
                self.bump();
                let targets = vec![expr_to_target(first, line, col)?];
                let value = self.parse_expr()?;
                Ok(Stmt::Assign {
                    targets,
                    value,
                    line,
                })
            }
            Some(Tok::Comma) => {
                // `a, b = expr` — unpack assignment
                let mut targets = vec![expr_to_target(first, line, col)?];
                while self.eat(&Tok::Comma) {
                    let (tline, tcol) = self.loc();
                    let expr = self.parse_expr()?;
                    targets.push(expr_to_target(expr, tline, tcol)?);
                }
                self.expect(Tok::Assign, "after unpack targets")?;
                let value = self.parse_expr()?;
                Ok(Stmt::Assign {
                    targets,
                    value,
                    line,
                })
            }
            Some(Tok::PlusEq) | Some(Tok::MinusEq) | Some(Tok::StarEq)
            | Some(Tok::SlashEq) | Some(Tok::PercentEq) => {
                let op = match self.bump().expect("peeked token exists").tok {
                    Tok::PlusEq => AugOp::Add,
                    Tok::MinusEq => AugOp::Sub,
                    Tok::StarEq => AugOp::Mul,
                    Tok::SlashEq => AugOp::Div,
                    Tok::PercentEq => AugOp::Mod,
                    _ => unreachable!(),
                };
                let Expr::Name(name) = first else {
                    return Err(SandboxError::restriction(
                        line,
                        col,
                        "in-place assignment is only supported on plain variables",
                    ));
                };
                let value = self.parse_expr()?;
                Ok(Stmt::AugAssign {
                    name,
                    op,
                    value,
                    line,
                })
            }
            _ => Ok(Stmt::Expr(first)),
        }
    }

    // ── Expressions ───────────────────────────────────────

    fn parse_expr(&mut self) -> Result<Expr, SandboxError> {
        self.enter()?;
        let expr = self.parse_or();
        self.leave();
        expr
    }

    fn parse_or(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.parse_and()?;
        while self.eat(&Tok::Or) {
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.parse_not()?;
        while self.eat(&Tok::And) {
            let right = self.parse_not()?;
            left = Expr::Binary {
                op: BinOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, SandboxError> {
        if self.eat(&Tok::Not) {
            self.enter()?;
            let operand = self.parse_not()?;
            self.leave();
            return Ok(Expr::Unary {
                op: UnOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Eq) => BinOp::Eq,
                Some(Tok::NotEq) => BinOp::NotEq,
                Some(Tok::Lt) => BinOp::Lt,
                Some(Tok::LtEq) => BinOp::LtEq,
                Some(Tok::Gt) => BinOp::Gt,
                Some(Tok::GtEq) => BinOp::GtEq,
                Some(Tok::In) => BinOp::In,
                _ => break,
            };
            self.bump();
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let right = self.parse_term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinOp::Mul,
                Some(Tok::Slash) => BinOp::Div,
                Some(Tok::Percent) => BinOp::Mod,
                _ => break,
            };
            self.bump();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, SandboxError> {
        if self.eat(&Tok::Minus) {
            self.enter()?;
            let operand = self.parse_unary()?;
            self.leave();
            return Ok(Expr::Unary {
                op: UnOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, SandboxError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Tok::LParen) => {
                    self.bump();
                    let args = self.parse_exprs_until(Tok::RParen, "call arguments")?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                    };
                }
                Some(Tok::LBracket) => {
                    self.bump();
                    self.skip_newlines();
                    let key = self.parse_expr()?;
                    self.skip_newlines();
                    self.expect(Tok::RBracket, "to close index")?;
                    expr = Expr::Index {
                        obj: Box::new(expr),
                        key: Box::new(key),
                    };
                }
                Some(Tok::Dot) => {
                    self.bump();
                    let (name, _) = self.expect_ident("after '.'")?;
                    expr = Expr::Attr {
                        obj: Box::new(expr),
                        name,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, SandboxError> {
        match self.peek() {
            Some(Tok::Int(n)) => {
                let expr = Expr::Int(*n);
                self.bump();
                Ok(expr)
            }
            Some(Tok::Float(n)) => {
                let expr = Expr::Float(*n);
                self.bump();
                Ok(expr)
            }
            Some(Tok::Str(_)) => {
                let t = self.bump().expect("peeked token exists");
                let Tok::Str(s) = t.tok else { unreachable!() };
                Ok(Expr::Str(s))
            }
            Some(Tok::True) => {
                self.bump();
                Ok(Expr::Bool(true))
            }
            Some(Tok::False) => {
                self.bump();
                Ok(Expr::Bool(false))
            }
            Some(Tok::Null) => {
                self.bump();
                Ok(Expr::Null)
            }
            Some(Tok::Ident(_)) => {
                let (name, _) = self.expect_ident("")?;
                Ok(Expr::Name(name))
            }
            Some(Tok::LParen) => {
                self.bump();
                self.skip_newlines();
                let expr = self.parse_expr()?;
                self.skip_newlines();
                self.expect(Tok::RParen, "to close parenthesized expression")?;
                Ok(expr)
            }
            Some(Tok::LBracket) => {
                self.bump();
                let items = self.parse_exprs_until(Tok::RBracket, "list literal")?;
                Ok(Expr::List(items))
            }
            Some(Tok::LBrace) => {
                self.bump();
                self.parse_map_literal()
            }
            Some(other) => Err(self.err_here(format!("unexpected {}", tok_name(other)))),
            None => Err(self.err_here("unexpected end of script")),
        }
    }

    /// Comma-separated expressions up to `closer`. Newlines are
    /// insignificant inside the brackets.
    fn parse_exprs_until(&mut self, closer: Tok, context: &str) -> Result<Vec<Expr>, SandboxError> {
        let mut items = Vec::new();
        self.skip_newlines();
        if self.eat(&closer) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr()?);
            self.skip_newlines();
            if self.eat(&Tok::Comma) {
                self.skip_newlines();
                // Trailing comma before the closer
                if self.eat(&closer) {
                    return Ok(items);
                }
                continue;
            }
            self.expect(closer, &format!("to close {context}"))?;
            return Ok(items);
        }
    }

    fn parse_map_literal(&mut self) -> Result<Expr, SandboxError> {
        let mut entries = Vec::new();
        self.skip_newlines();
        if self.eat(&Tok::RBrace) {
            return Ok(Expr::Map(entries));
        }
        loop {
            let key = self.parse_expr()?;
            self.skip_newlines();
            self.expect(Tok::Colon, "after map key")?;
            self.skip_newlines();
            let value = self.parse_expr()?;
            entries.push((key, value));
            self.skip_newlines();
            if self.eat(&Tok::Comma) {
                self.skip_newlines();
                if self.eat(&Tok::RBrace) {
                    return Ok(Expr::Map(entries));
                }
                continue;
            }
            self.expect(Tok::RBrace, "to close map literal")?;
            return Ok(Expr::Map(entries));
        }
    }
}

fn expr_to_target(expr: Expr, line: usize, col: usize) -> Result<Target, SandboxError> {
    match expr {
        Expr::Name(name) => Ok(Target::Name(name)),
        Expr::Index { obj, key } => Ok(Target::Index {
            obj: *obj,
            key: *key,
        }),
        Expr::Attr { obj, name } => Ok(Target::Attr { obj: *obj, name }),
        _ => Err(SandboxError::restriction(
            line,
            col,
            "cannot assign to this expression",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn parse_ok(src: &str) -> Program {
        parse(src).unwrap()
    }

    fn parse_err(src: &str) -> SandboxError {
        parse(src).unwrap_err()
    }

    #[test]
    fn test_assignment_and_expression_statement() {
        let p = parse_ok("x = 1\nprint(x)");
        assert_eq!(p.stmts.len(), 2);
        assert!(matches!(&p.stmts[0], Stmt::Assign { targets, .. } if targets.len() == 1));
        assert!(matches!(&p.stmts[1], Stmt::Expr(Expr::Call { .. })));
    }

    #[test]
    fn test_import_statement() {
        let p = parse_ok("import math");
        assert_eq!(
            p.stmts,
            vec![Stmt::Import {
                module: "math".into(),
                line: 1
            }]
        );
    }

    #[test]
    fn test_unpack_assignment() {
        let p = parse_ok("a, b = pair");
        let Stmt::Assign { targets, .. } = &p.stmts[0] else {
            panic!("expected assignment");
        };
        assert_eq!(
            targets,
            &vec![Target::Name("a".into()), Target::Name("b".into())]
        );
    }

    #[test]
    fn test_index_and_attr_targets() {
        let p = parse_ok("row[\"x\"] = 1\nm.field = 2");
        assert!(matches!(&p.stmts[0], Stmt::Assign { targets, .. }
            if matches!(targets[0], Target::Index { .. })));
        assert!(matches!(&p.stmts[1], Stmt::Assign { targets, .. }
            if matches!(targets[0], Target::Attr { .. })));
    }

    #[test]
    fn test_augmented_assignment_plain_name_only() {
        let p = parse_ok("total += 1");
        assert!(matches!(&p.stmts[0], Stmt::AugAssign { op: AugOp::Add, .. }));

        let err = parse_err("row[\"x\"] += 1");
        assert_eq!(err.kind, ErrorKind::RestrictionViolation);
        assert!(err.message.contains("plain variables"));
    }

    #[test]
    fn test_if_else_if_chain() {
        let p = parse_ok("if a { x = 1 } else if b { x = 2 } else { x = 3 }");
        let Stmt::If { else_body, .. } = &p.stmts[0] else {
            panic!("expected if");
        };
        assert!(matches!(&else_body[0], Stmt::If { .. }));
    }

    #[test]
    fn test_else_on_next_line() {
        let p = parse_ok("if a {\n  x = 1\n}\nelse {\n  x = 2\n}");
        let Stmt::If { else_body, .. } = &p.stmts[0] else {
            panic!("expected if");
        };
        assert_eq!(else_body.len(), 1);
    }

    #[test]
    fn test_for_with_unpack_targets() {
        let p = parse_ok("for k, v in pairs { print(k, v) }");
        let Stmt::For { targets, .. } = &p.stmts[0] else {
            panic!("expected for");
        };
        assert_eq!(targets, &vec!["k".to_string(), "v".to_string()]);
    }

    #[test]
    fn test_break_outside_loop_rejected() {
        let err = parse_err("break");
        assert_eq!(err.kind, ErrorKind::RestrictionViolation);
        assert!(err.message.contains("'break' outside of a loop"));
    }

    #[test]
    fn test_break_inside_loop_ok() {
        parse_ok("for x in xs { break }");
    }

    #[test]
    fn test_operator_precedence() {
        let p = parse_ok("x = 1 + 2 * 3");
        let Stmt::Assign { value, .. } = &p.stmts[0] else {
            panic!("expected assignment");
        };
        // Must parse as 1 + (2 * 3)
        let Expr::Binary { op: BinOp::Add, right, .. } = value else {
            panic!("expected addition at the top: {value:?}");
        };
        assert!(matches!(**right, Expr::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn test_multiline_literals_inside_brackets() {
        parse_ok("x = [\n  1,\n  2,\n]\ny = {\n  \"a\": 1,\n  \"b\": 2\n}\nprint(\n  x,\n  y\n)");
    }

    #[test]
    fn test_map_literal_vs_block() {
        let p = parse_ok("m = {\"a\": 1}\nif true { m = {} }");
        assert!(matches!(&p.stmts[0], Stmt::Assign { value: Expr::Map(entries), .. }
            if entries.len() == 1));
    }

    #[test]
    fn test_postfix_chain() {
        let p = parse_ok("v = rows[0].name");
        let Stmt::Assign { value, .. } = &p.stmts[0] else {
            panic!("expected assignment");
        };
        let Expr::Attr { obj, name } = value else {
            panic!("expected attribute access: {value:?}");
        };
        assert_eq!(name, "name");
        assert!(matches!(**obj, Expr::Index { .. }));
    }

    #[test]
    fn test_two_statements_on_one_line_need_semicolon() {
        let err = parse_err("x = 1 y = 2");
        assert_eq!(err.kind, ErrorKind::RestrictionViolation);
        parse_ok("x = 1; y = 2");
    }

    #[test]
    fn test_nesting_depth_guard() {
        let mut src = String::from("x = ");
        for _ in 0..200 {
            src.push('(');
        }
        src.push('1');
        for _ in 0..200 {
            src.push(')');
        }
        let err = parse_err(&src);
        assert_eq!(err.kind, ErrorKind::RestrictionViolation);
        assert!(err.message.contains("nesting"));
    }

    #[test]
    fn test_unclosed_block() {
        let err = parse_err("if a { x = 1");
        assert!(err.message.contains("unclosed block"));
    }

    #[test]
    fn test_assign_to_literal_rejected() {
        let err = parse_err("1 = 2");
        assert!(err.message.contains("cannot assign"));
    }

    #[test]
    fn test_compilation_is_pure_rejection_no_panic() {
        // A grab bag of malformed scripts; all must fail cleanly.
        for src in [
            "import",
            "for in xs { }",
            "if { }",
            "x = ",
            "a, 1 = b",
            "x = [1, 2",
            "m = {\"a\" 1}",
            "not",
        ] {
            let err = parse_err(src);
            assert_eq!(err.kind, ErrorKind::RestrictionViolation, "src: {src}");
        }
    }
}
