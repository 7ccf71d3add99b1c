//! Indented tree dumps of the AST, used by tests and for debugging.

use std::fmt::{self, Write};

use crate::{
    ast::{
        Block, Clause, Decl, Else, Expr, ExprKind, File, Func, If, Info, Stmt, StmtKind, Typed,
        Untyped,
    },
    util::fmt::{Context, Show},
};

const INDENT_WIDTH: usize = 2;

/// Renders a whole file. Spans are printed only when `spans` is set.
pub fn file<'a, I: InfoWriter>(
    ctx: &'a Context<'a>,
    file: &'a File<I>,
    spans: bool,
) -> impl fmt::Display + 'a {
    Tree {
        ctx,
        spans,
        node: Node::File(file),
    }
}

/// Renders a single expression, with spans.
pub fn expr<'a, I: InfoWriter>(ctx: &'a Context<'a>, expr: &'a Expr<I>) -> impl fmt::Display + 'a {
    Tree {
        ctx,
        spans: true,
        node: Node::Expr(expr),
    }
}

enum Node<'a, I: Info> {
    File(&'a File<I>),
    Expr(&'a Expr<I>),
}

struct Tree<'a, I: Info> {
    ctx: &'a Context<'a>,
    spans: bool,
    node: Node<'a, I>,
}

impl<I: InfoWriter> fmt::Display for Tree<'_, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = Printer {
            ctx: self.ctx,
            spans: self.spans,
        };
        match self.node {
            Node::File(file) => {
                for decl in &file.decls {
                    p.decl(f, 0, decl)?;
                }
                Ok(())
            }
            Node::Expr(expr) => p.expr(f, 0, expr),
        }
    }
}

struct Printer<'a> {
    ctx: &'a Context<'a>,
    spans: bool,
}

impl Printer<'_> {
    fn decl<I: InfoWriter>(&self, w: &mut impl Write, i: usize, decl: &Decl<I>) -> fmt::Result {
        let ctx = self.ctx;
        sp(w, i)?;
        match decl {
            Decl::Const(c) => {
                write!(w, "const {}", c.name.display(ctx))?;
                if let Some(ty) = &c.ty {
                    write!(w, ": {}", ty.display(ctx))?;
                }
                writeln!(w)?;
                self.expr(w, i + 1, &c.value)?;
            }
            Decl::Struct(s) => {
                writeln!(w, "struct {}", s.name.display(ctx))?;
                for field in &s.fields {
                    sp(w, i + 1)?;
                    writeln!(
                        w,
                        "field {}: {}",
                        field.name.display(ctx),
                        field.ty.display(ctx)
                    )?;
                }
            }
            Decl::Func(func) => self.func(w, i, func)?,
        }
        Ok(())
    }

    fn func<I: InfoWriter>(&self, w: &mut impl Write, i: usize, func: &Func<I>) -> fmt::Result {
        let ctx = self.ctx;
        write!(w, "func ")?;
        if let Some(receiver) = &func.receiver {
            write!(w, "{}.", receiver.display(ctx))?;
        }
        write!(w, "{}(", func.name.display(ctx))?;
        for (idx, param) in func.params.iter().enumerate() {
            if idx > 0 {
                write!(w, ", ")?;
            }
            write!(w, "{}: {}", param.name.display(ctx), param.ty.display(ctx))?;
        }
        write!(w, ")")?;
        if let Some(ret) = &func.ret {
            write!(w, " -> {}", ret.display(ctx))?;
        }
        writeln!(w)?;
        for clause in func.pre.iter().chain(&func.post) {
            self.clause(w, i + 1, clause)?;
        }
        sp(w, i + 1)?;
        writeln!(w, "body")?;
        self.block(w, i + 2, &func.body)
    }

    fn clause<I: InfoWriter>(
        &self,
        w: &mut impl Write,
        i: usize,
        clause: &Clause<I>,
    ) -> fmt::Result {
        sp(w, i)?;
        write!(w, "{}", clause.kind.keyword())?;
        if let Some(reason) = clause.reason {
            write!(w, " via {:?}", &*self.ctx.tm.get(reason))?;
        }
        writeln!(w)?;
        self.expr(w, i + 1, &clause.cond)
    }

    fn block<I: InfoWriter>(&self, w: &mut impl Write, i: usize, block: &Block<I>) -> fmt::Result {
        for stmt in &block.stmts {
            self.stmt(w, i, stmt)?;
        }
        Ok(())
    }

    fn stmt<I: InfoWriter>(&self, w: &mut impl Write, i: usize, stmt: &Stmt<I>) -> fmt::Result {
        let ctx = self.ctx;
        match &stmt.kind {
            StmtKind::Var { name, ty, value } => {
                sp(w, i)?;
                writeln!(w, "var {}: {}", name.display(ctx), ty.display(ctx))?;
                if let Some(value) = value {
                    self.expr(w, i + 1, value)?;
                }
            }
            StmtKind::Assign { target, op, value } => {
                sp(w, i)?;
                writeln!(w, "assign {op:?}")?;
                self.expr(w, i + 1, target)?;
                self.expr(w, i + 1, value)?;
            }
            StmtKind::If(if_) => {
                sp(w, i)?;
                writeln!(w, "if")?;
                self.if_arms(w, i + 1, if_)?;
            }
            StmtKind::While {
                cond,
                invariants,
                body,
            } => {
                sp(w, i)?;
                writeln!(w, "while")?;
                self.expr(w, i + 1, cond)?;
                for inv in invariants {
                    self.clause(w, i + 1, inv)?;
                }
                sp(w, i + 1)?;
                writeln!(w, "body")?;
                self.block(w, i + 2, body)?;
            }
            StmtKind::Assert(clause) => self.clause(w, i, clause)?,
            StmtKind::Expr(expr) => {
                sp(w, i)?;
                writeln!(w, "expr")?;
                self.expr(w, i + 1, expr)?;
            }
            StmtKind::Return(value) => {
                sp(w, i)?;
                writeln!(w, "return")?;
                if let Some(value) = value {
                    self.expr(w, i + 1, value)?;
                }
            }
            StmtKind::Break => {
                sp(w, i)?;
                writeln!(w, "break")?;
            }
            StmtKind::Continue => {
                sp(w, i)?;
                writeln!(w, "continue")?;
            }
        }
        Ok(())
    }

    /// Condition, `then` arm and any `else` arm, all at indentation `i`.
    fn if_arms<I: InfoWriter>(&self, w: &mut impl Write, i: usize, if_: &If<I>) -> fmt::Result {
        self.expr(w, i, &if_.cond)?;
        sp(w, i)?;
        writeln!(w, "then")?;
        self.block(w, i + 1, &if_.then)?;
        match &if_.otherwise {
            Some(Else::If(nested)) => {
                sp(w, i)?;
                writeln!(w, "else if")?;
                self.if_arms(w, i + 1, nested)
            }
            Some(Else::Block(block)) => {
                sp(w, i)?;
                writeln!(w, "else")?;
                self.block(w, i + 1, block)
            }
            None => Ok(()),
        }
    }

    fn expr<I: InfoWriter>(&self, w: &mut impl Write, i: usize, expr: &Expr<I>) -> fmt::Result {
        let ctx = self.ctx;
        sp(w, i)?;
        match &expr.kind {
            ExprKind::Int(value) => write!(w, "int {value}")?,
            ExprKind::Bool(value) => write!(w, "bool {value}")?,
            ExprKind::Id(ident) => write!(w, "ident {}", ident.display(ctx))?,
            ExprKind::This => write!(w, "this")?,
            ExprKind::Result => write!(w, "result")?,
            ExprKind::Unary { op, .. } => write!(w, "unary {op:?}")?,
            ExprKind::Binary { op, .. } => write!(w, "binary {op:?}")?,
            ExprKind::Call { callee, .. } => write!(w, "call {}", callee.display(ctx))?,
            ExprKind::Field { field, .. } => write!(w, "field {}", field.display(ctx))?,
            ExprKind::Index { .. } => write!(w, "index")?,
            ExprKind::Slice { .. } => write!(w, "slice")?,
            ExprKind::As { ty, .. } => write!(w, "as {}", ty.display(ctx))?,
            ExprKind::Paren(_) => write!(w, "paren")?,
        }
        if self.spans {
            write!(w, " ({})", expr.span)?;
        }
        I::write_info(w, ctx, &expr.info)?;
        writeln!(w)?;

        match &expr.kind {
            ExprKind::Int(_)
            | ExprKind::Bool(_)
            | ExprKind::Id(_)
            | ExprKind::This
            | ExprKind::Result => Ok(()),
            ExprKind::Unary { expr: inner, .. }
            | ExprKind::As { expr: inner, .. }
            | ExprKind::Paren(inner) => self.expr(w, i + 1, inner),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.expr(w, i + 1, lhs)?;
                self.expr(w, i + 1, rhs)
            }
            ExprKind::Call { receiver, args, .. } => {
                if let Some(receiver) = receiver {
                    sp(w, i + 1)?;
                    writeln!(w, "receiver")?;
                    self.expr(w, i + 2, receiver)?;
                }
                if !args.is_empty() {
                    sp(w, i + 1)?;
                    writeln!(w, "arguments")?;
                    for arg in args {
                        self.expr(w, i + 2, arg)?;
                    }
                }
                Ok(())
            }
            ExprKind::Field { base, .. } => self.expr(w, i + 1, base),
            ExprKind::Index { base, index } => {
                self.expr(w, i + 1, base)?;
                self.expr(w, i + 1, index)
            }
            ExprKind::Slice { base, lo, hi } => {
                self.expr(w, i + 1, base)?;
                if let Some(lo) = lo {
                    self.expr(w, i + 1, lo)?;
                }
                sp(w, i + 1)?;
                writeln!(w, "..")?;
                if let Some(hi) = hi {
                    self.expr(w, i + 1, hi)?;
                }
                Ok(())
            }
        }
    }
}

fn sp(w: &mut impl Write, i: usize) -> fmt::Result {
    write!(w, "{:width$}", "", width = i * INDENT_WIDTH)
}

/// Prints whatever the tree carries on each expression.
pub trait InfoWriter: Info {
    fn write_info(w: &mut impl Write, ctx: &Context<'_>, info: &Self::Expr) -> fmt::Result;
}

impl InfoWriter for Untyped {
    fn write_info(_: &mut impl Write, _: &Context<'_>, (): &()) -> fmt::Result {
        Ok(())
    }
}

impl InfoWriter for Typed {
    fn write_info(w: &mut impl Write, ctx: &Context<'_>, ty: &Self::Expr) -> fmt::Result {
        write!(w, " %: {}", ty.display(ctx))
    }
}
