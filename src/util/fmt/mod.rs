use std::fmt;

use crate::{
    ast::{Expr, ExprKind, Ident, Info, TypeExpr, TypeExprKind, UnaryOperator},
    types::Type,
    util::intern::TokenMap,
};

pub mod tree;

pub struct Context<'tm> {
    pub tm: &'tm TokenMap,
}

/// Analogous to [`std::fmt::Display`], but also contains the program context,
/// such as the current [`TokenMap`].
pub trait Show {
    fn show(&self, f: &mut fmt::Formatter<'_>, ctx: &Context<'_>) -> fmt::Result;

    /// Returns a type which can be displayed.
    fn display(&self, ctx: &Context<'_>) -> impl fmt::Display
    where
        Self: Sized,
    {
        Display(self, ctx)
    }
}

struct Display<'this, 'ctx, 'tm, T: Show>(pub &'this T, pub &'ctx Context<'tm>);

impl<T> fmt::Display for Display<'_, '_, '_, T>
where
    T: Show,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Display(this, ctx) = self;
        this.show(f, ctx)
    }
}

impl Show for Ident {
    fn show(&self, f: &mut fmt::Formatter<'_>, ctx: &Context<'_>) -> fmt::Result {
        f.write_str(&ctx.tm.get(self.name))
    }
}

impl Show for Type {
    fn show(&self, f: &mut fmt::Formatter<'_>, ctx: &Context<'_>) -> fmt::Result {
        match self {
            Type::Ideal => write!(f, "integer constant"),
            Type::Bool => write!(f, "bool"),
            Type::Int { kind, range } => {
                write!(f, "{}", kind.name())?;
                if *range != kind.range() {
                    write!(f, "[{}..{}]", range.lo(), range.hi())?;
                }
                Ok(())
            }
            Type::Array { len, elem } => write!(f, "[{len}]{}", elem.display(ctx)),
            Type::Slice(elem) => write!(f, "[]{}", elem.display(ctx)),
            Type::Ptr(inner) => write!(f, "ptr {}", inner.display(ctx)),
            Type::Struct(name) => f.write_str(&ctx.tm.get(*name)),
            Type::Void => write!(f, "void"),
        }
    }
}

impl Show for TypeExpr {
    fn show(&self, f: &mut fmt::Formatter<'_>, ctx: &Context<'_>) -> fmt::Result {
        match &self.kind {
            TypeExprKind::Named(name) => name.show(f, ctx),
            TypeExprKind::Refined { base, lo, hi } => {
                base.show(f, ctx)?;
                f.write_str("[")?;
                if let Some(lo) = lo {
                    lo.show(f, ctx)?;
                }
                f.write_str("..")?;
                if let Some(hi) = hi {
                    hi.show(f, ctx)?;
                }
                f.write_str("]")
            }
            TypeExprKind::Array { len, elem } => {
                write!(f, "[{}]{}", len.display(ctx), elem.display(ctx))
            }
            TypeExprKind::Slice(elem) => write!(f, "[]{}", elem.display(ctx)),
            TypeExprKind::Ptr(inner) => write!(f, "ptr {}", inner.display(ctx)),
        }
    }
}

/// Renders the expression back into source form.
impl<I: Info> Show for Expr<I> {
    fn show(&self, f: &mut fmt::Formatter<'_>, ctx: &Context<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Int(value) => write!(f, "{value}"),
            ExprKind::Bool(value) => write!(f, "{value}"),
            ExprKind::Id(ident) => ident.show(f, ctx),
            ExprKind::This => f.write_str("this"),
            ExprKind::Result => f.write_str("result"),
            ExprKind::Unary { op, expr } => match op {
                UnaryOperator::Neg => write!(f, "-{}", expr.display(ctx)),
                UnaryOperator::Not => write!(f, "not {}", expr.display(ctx)),
            },
            ExprKind::Binary { op, lhs, rhs } => write!(
                f,
                "{} {} {}",
                lhs.display(ctx),
                op.symbol(),
                rhs.display(ctx)
            ),
            ExprKind::Call {
                receiver,
                callee,
                args,
            } => {
                if let Some(receiver) = receiver {
                    write!(f, "{}.", receiver.display(ctx))?;
                }
                write!(f, "{}(", callee.display(ctx))?;
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    arg.show(f, ctx)?;
                }
                f.write_str(")")
            }
            ExprKind::Field { base, field } => {
                write!(f, "{}.{}", base.display(ctx), field.display(ctx))
            }
            ExprKind::Index { base, index } => {
                write!(f, "{}[{}]", base.display(ctx), index.display(ctx))
            }
            ExprKind::Slice { base, lo, hi } => {
                write!(f, "{}[", base.display(ctx))?;
                if let Some(lo) = lo {
                    lo.show(f, ctx)?;
                }
                f.write_str("..")?;
                if let Some(hi) = hi {
                    hi.show(f, ctx)?;
                }
                f.write_str("]")
            }
            ExprKind::As { expr, ty } => write!(f, "{} as {}", expr.display(ctx), ty.display(ctx)),
            ExprKind::Paren(inner) => write!(f, "({})", inner.display(ctx)),
        }
    }
}
