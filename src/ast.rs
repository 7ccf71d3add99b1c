// file ::= (decl ';')*
// decl ::= const ID [':' type] '=' expr
//        | struct ID '(' [field (',' field)* [',']] ')'
//        | func [ID '.'] ID '(' [param (',' param)* [',']] ')' ['->' type]
//              (',' (pre | post) expr [via STR])* [','] block
// field, param ::= ID ':' type
// type ::= ID ['[' [expr] '..' [expr] ']']
//        | '[' expr ']' type
//        | '[' ']' type
//        | ptr type
// block ::= '{' (stmt ';')* '}'
// stmt ::= var ID ':' type ['=' expr]
//        | expr ('=' | '+=' | '-=') expr
//        | if expr block [else (if ... | block)]
//        | while expr (',' inv expr [via STR])* block
//        | assert expr [via STR]
//        | return [expr]
//        | break
//        | continue
//        | expr
// expr ::= literal | ID | this | result | '(' expr ')'
//        | ('-' | not) expr
//        | expr binop expr
//        | expr as type
//        | [expr '.'] ID '(' [expr (',' expr)*] ')'
//        | expr '.' ID
//        | expr '[' expr ']'
//        | expr '[' [expr] '..' [expr] ']'

// Precedence
//
// postfix: call, field, index, slice
// - not
// as
// * / %
// + - ~+ ~-
// << >>
// &
// | ^
// == != < <= > >=
// and
// or

use std::fmt::Debug;

use crate::{source::SourceFile, token::Span, types::Type, util::intern::Id};

/// Selects what the tree carries on each expression.
pub trait Info: Debug + PartialEq + Clone {
    type Expr: Debug + PartialEq + Clone;
}

/// Parser output.
#[derive(Debug, PartialEq, Clone)]
pub struct Untyped;

impl Info for Untyped {
    type Expr = ();
}

/// Verifier output; every expression carries its resolved type.
#[derive(Debug, PartialEq, Clone)]
pub struct Typed;

impl Info for Typed {
    type Expr = Type;
}

#[derive(Debug, PartialEq, Clone)]
pub struct File<I: Info> {
    pub source: SourceFile,
    pub decls: Vec<Decl<I>>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Decl<I: Info> {
    Const(Const<I>),
    Struct(Struct),
    Func(Func<I>),
}

impl<I: Info> Decl<I> {
    /// The top-level name, or for methods the method name.
    pub fn name(&self) -> &Ident {
        match self {
            Decl::Const(c) => &c.name,
            Decl::Struct(s) => &s.name,
            Decl::Func(f) => &f.name,
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Const<I: Info> {
    pub name: Ident,
    pub ty: Option<TypeExpr>,
    pub value: Expr<I>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Struct {
    pub name: Ident,
    pub fields: Vec<Binding>,
}

/// A struct field or a function parameter.
#[derive(Debug, PartialEq, Clone)]
pub struct Binding {
    pub name: Ident,
    pub ty: TypeExpr,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Func<I: Info> {
    /// The struct this function is a method of.
    pub receiver: Option<Ident>,
    pub name: Ident,
    pub params: Vec<Binding>,
    pub ret: Option<TypeExpr>,
    pub pre: Vec<Clause<I>>,
    pub post: Vec<Clause<I>>,
    pub body: Block<I>,
}

/// A boolean the program claims to hold, with an optional `via` label.
#[derive(Debug, PartialEq, Clone)]
pub struct Clause<I: Info> {
    pub kind: ClauseKind,
    pub cond: Expr<I>,
    pub reason: Option<Id>,
    pub span: Span,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClauseKind {
    Assert,
    Pre,
    Post,
    Inv,
}

impl ClauseKind {
    pub fn keyword(self) -> &'static str {
        match self {
            ClauseKind::Assert => "assert",
            ClauseKind::Pre => "pre",
            ClauseKind::Post => "post",
            ClauseKind::Inv => "inv",
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Block<I: Info> {
    pub stmts: Vec<Stmt<I>>,
    pub span: Span,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Stmt<I: Info> {
    pub kind: StmtKind<I>,
    pub span: Span,
}

#[derive(Debug, PartialEq, Clone)]
pub enum StmtKind<I: Info> {
    Var {
        name: Ident,
        ty: TypeExpr,
        /// Zero when absent.
        value: Option<Expr<I>>,
    },
    Assign {
        target: Expr<I>,
        op: AssignOperator,
        value: Expr<I>,
    },
    If(If<I>),
    While {
        cond: Expr<I>,
        invariants: Vec<Clause<I>>,
        body: Block<I>,
    },
    Assert(Clause<I>),
    Expr(Expr<I>),
    Return(Option<Expr<I>>),
    Break,
    Continue,
}

#[derive(Debug, PartialEq, Clone)]
pub struct If<I: Info> {
    pub cond: Expr<I>,
    pub then: Block<I>,
    pub otherwise: Option<Else<I>>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Else<I: Info> {
    If(Box<If<I>>),
    Block(Block<I>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AssignOperator {
    Set,
    Add,
    Sub,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Expr<I: Info> {
    pub kind: ExprKind<I>,
    pub span: Span,
    pub info: I::Expr,
}

impl<I: Info> Expr<I> {
    /// Looks through any parentheses.
    pub fn strip_parens(&self) -> &Expr<I> {
        match &self.kind {
            ExprKind::Paren(inner) => inner.strip_parens(),
            _ => self,
        }
    }

    /// Whether `pred` holds for this expression or any expression nested in
    /// it. Type expressions are not entered.
    pub fn any(&self, pred: &mut impl FnMut(&Expr<I>) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        match &self.kind {
            ExprKind::Int(_)
            | ExprKind::Bool(_)
            | ExprKind::Id(_)
            | ExprKind::This
            | ExprKind::Result => false,
            ExprKind::Unary { expr, .. } | ExprKind::As { expr, .. } | ExprKind::Paren(expr) => {
                expr.any(pred)
            }
            ExprKind::Binary { lhs, rhs, .. } => lhs.any(pred) || rhs.any(pred),
            ExprKind::Call { receiver, args, .. } => {
                receiver.as_ref().is_some_and(|r| r.any(pred)) || args.iter().any(|a| a.any(pred))
            }
            ExprKind::Field { base, .. } => base.any(pred),
            ExprKind::Index { base, index } => base.any(pred) || index.any(pred),
            ExprKind::Slice { base, lo, hi } => {
                base.any(pred)
                    || lo.as_ref().is_some_and(|e| e.any(pred))
                    || hi.as_ref().is_some_and(|e| e.any(pred))
            }
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum ExprKind<I: Info> {
    Int(u64),
    Bool(bool),
    Id(Ident),
    This,
    Result,
    Unary {
        op: UnaryOperator,
        expr: Box<Expr<I>>,
    },
    Binary {
        op: BinaryOperator,
        lhs: Box<Expr<I>>,
        rhs: Box<Expr<I>>,
    },
    /// A free function call, a method call, or the builtin `x.len()`.
    Call {
        receiver: Option<Box<Expr<I>>>,
        callee: Ident,
        args: Vec<Expr<I>>,
    },
    Field {
        base: Box<Expr<I>>,
        field: Ident,
    },
    Index {
        base: Box<Expr<I>>,
        index: Box<Expr<I>>,
    },
    Slice {
        base: Box<Expr<I>>,
        lo: Option<Box<Expr<I>>>,
        hi: Option<Box<Expr<I>>>,
    },
    As {
        expr: Box<Expr<I>>,
        ty: TypeExpr,
    },
    Paren(Box<Expr<I>>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnaryOperator {
    Neg,
    Not,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    WrappingAdd,
    WrappingSub,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOperator {
    pub fn is_comparison(self) -> bool {
        use BinaryOperator::*;
        matches!(self, Eq | Ne | Lt | Le | Gt | Ge)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }

    /// Whether exchanging the operands gives the same value.
    pub fn is_commutative(self) -> bool {
        use BinaryOperator::*;
        matches!(self, Add | Mul | BitAnd | BitOr | BitXor | Eq | Ne | And | Or)
    }

    /// The comparison which holds exactly when this one does not.
    pub fn negated(self) -> Option<BinaryOperator> {
        use BinaryOperator::*;
        let negated = match self {
            Eq => Ne,
            Ne => Eq,
            Lt => Ge,
            Le => Gt,
            Gt => Le,
            Ge => Lt,
            _ => return None,
        };
        Some(negated)
    }

    /// The comparison with its operands exchanged: `a < b` is `b > a`.
    pub fn flipped(self) -> Option<BinaryOperator> {
        use BinaryOperator::*;
        let flipped = match self {
            Eq => Eq,
            Ne => Ne,
            Lt => Gt,
            Le => Ge,
            Gt => Lt,
            Ge => Le,
            _ => return None,
        };
        Some(flipped)
    }

    pub fn symbol(self) -> &'static str {
        use BinaryOperator::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Rem => "%",
            Shl => "<<",
            Shr => ">>",
            BitAnd => "&",
            BitOr => "|",
            BitXor => "^",
            WrappingAdd => "~+",
            WrappingSub => "~-",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
            And => "and",
            Or => "or",
        }
    }
}

/// A type as written. Lengths and refinement bounds are constant
/// expressions, evaluated by the verifier.
#[derive(Debug, PartialEq, Clone)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

#[derive(Debug, PartialEq, Clone)]
pub enum TypeExprKind {
    Named(Ident),
    Refined {
        base: Ident,
        lo: Option<Box<Expr<Untyped>>>,
        hi: Option<Box<Expr<Untyped>>>,
    },
    Array {
        len: Box<Expr<Untyped>>,
        elem: Box<TypeExpr>,
    },
    Slice(Box<TypeExpr>),
    Ptr(Box<TypeExpr>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ident {
    pub name: Id,
    pub span: Span,
}

impl From<Ident> for Id {
    fn from(value: Ident) -> Self {
        value.name
    }
}

impl From<&Ident> for Id {
    fn from(value: &Ident) -> Self {
        value.name
    }
}
