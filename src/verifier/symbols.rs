use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::{facts::Facts, scope::Scope, Checker, Mode};
use crate::{
    ast::{
        BinaryOperator, Clause, Const, Decl, Expr, ExprKind, File, Func, Ident, Info, Struct,
        TypeExpr, TypeExprKind, Typed, UnaryOperator, Untyped,
    },
    error::{CheckError, CheckErrorKind},
    interval::Interval,
    source::{Location, SourceFile},
    token::Span,
    types::{IntKind, Type},
    util::{
        fmt::{Context, Show},
        intern::{well_known, Id, TokenMap},
    },
};

type Result<T, E = CheckError> = std::result::Result<T, E>;

/// Everything declared at the top level of a program, resolved.
#[derive(Debug, Default)]
pub struct SymbolTable {
    /// Where each const, struct and free function is declared.
    globals: FxHashMap<Id, Location>,
    methods: FxHashMap<FuncKey, Location>,
    pub consts: FxHashMap<Id, ConstSymbol>,
    pub structs: FxHashMap<Id, StructSymbol>,
    pub funcs: FxHashMap<FuncKey, FuncSymbol>,
}

impl SymbolTable {
    pub fn global_location(&self, name: Id) -> Option<&Location> {
        self.globals.get(&name)
    }
}

#[derive(Clone, Debug)]
pub struct ConstSymbol {
    /// [`Type::Ideal`] unless the declaration names a type.
    pub ty: Type,
    pub value: i128,
}

#[derive(Clone, Debug)]
pub struct StructSymbol {
    pub fields: Vec<(Id, Type)>,
}

impl StructSymbol {
    pub fn field(&self, name: Id) -> Option<&Type> {
        self.fields
            .iter()
            .find_map(|(field, ty)| (*field == name).then_some(ty))
    }
}

/// Methods are keyed by their receiver, so `a.decode` and `b.decode` do not
/// collide with each other or with a free `decode`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FuncKey {
    pub receiver: Option<Id>,
    pub name: Id,
}

impl FuncKey {
    pub fn of<I: Info>(func: &Func<I>) -> FuncKey {
        FuncKey {
            receiver: func.receiver.map(|r| r.name),
            name: func.name.name,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FuncSymbol {
    pub params: Vec<(Id, Type)>,
    pub ret: Type,
    pub pre: Vec<Clause<Typed>>,
    pub post: Vec<Clause<Typed>>,
    /// Methods and functions taking a `ptr` may modify state visible to the
    /// caller.
    pub effectful: bool,
}

/// Registers and resolves every top-level declaration. `files` must already
/// be in canonical order.
#[tracing::instrument(level = "debug", skip_all, fields(files = files.len()))]
pub fn build(tm: &TokenMap, files: &[File<Untyped>]) -> Result<SymbolTable> {
    let mut resolver = Resolver::new(tm);
    resolver.register(files)?;
    resolver.resolve(files)?;
    let mut table = resolver.table;

    // Clauses may call any function, so they are typed against the table
    // once every signature is known.
    let mut clauses = Vec::with_capacity(table.funcs.len());
    for file in files {
        for decl in &file.decls {
            let Decl::Func(func) = decl else {
                continue;
            };
            let key = FuncKey::of(func);
            let mut checker = Checker::new(tm, &table, &file.source);
            checker.scope = Scope::for_func(func, &table.funcs[&key]);
            let facts = Facts::default();
            let pre = func
                .pre
                .iter()
                .map(|clause| checker.clause(clause, &facts, Mode::TypeOnly))
                .collect::<Result<Vec<_>>>()?;
            checker.scope.allow_result = true;
            let post = func
                .post
                .iter()
                .map(|clause| checker.clause(clause, &facts, Mode::TypeOnly))
                .collect::<Result<Vec<_>>>()?;
            clauses.push((key, pre, post));
        }
    }
    for (key, pre, post) in clauses {
        if let Some(symbol) = table.funcs.get_mut(&key) {
            symbol.pre = pre;
            symbol.post = post;
        }
    }

    tracing::debug!(
        consts = table.consts.len(),
        structs = table.structs.len(),
        funcs = table.funcs.len(),
        "resolved symbols"
    );
    Ok(table)
}

/// What type and constant resolution needs to know about the program.
pub(super) trait Globals {
    fn tm(&self) -> &TokenMap;

    fn is_struct(&self, name: Id) -> bool;

    fn is_global(&self, name: Id) -> bool;

    /// The value of the constant `ident` refers to, resolving it first if
    /// needed.
    fn const_value(&mut self, ident: &Ident, source: &SourceFile) -> Result<i128>;
}

struct Resolver<'a> {
    tm: &'a TokenMap,
    table: SymbolTable,
    struct_names: FxHashSet<Id>,
    pending: FxHashMap<Id, (&'a SourceFile, &'a Const<Untyped>)>,
    /// Constants whose value is being folded, for cycle detection.
    resolving: FxHashSet<Id>,
}

impl<'a> Resolver<'a> {
    fn new(tm: &'a TokenMap) -> Resolver<'a> {
        Resolver {
            tm,
            table: SymbolTable::default(),
            struct_names: FxHashSet::default(),
            pending: FxHashMap::default(),
            resolving: FxHashSet::default(),
        }
    }

    /// Records every top-level name, reporting the first duplicate.
    fn register(&mut self, files: &'a [File<Untyped>]) -> Result<()> {
        // Define built-ins, which keeps them from being redefined.
        let builtin = Location {
            file: Arc::from("<builtin>"),
            line: 0,
            column: 0,
        };
        for &(id, _) in well_known::ALL {
            if IntKind::from_name(id).is_some() || id == well_known::BOOL {
                self.table.globals.insert(id, builtin.clone());
            }
        }

        for file in files {
            for decl in &file.decls {
                let name = decl.name();
                let here = file.source.locate(name.span.lo);
                let first = match decl {
                    Decl::Func(func) if func.receiver.is_some() => {
                        self.table.methods.get(&FuncKey::of(func)).cloned()
                    }
                    _ => self.table.globals.get(&name.name).cloned(),
                };
                if let Some(first) = first {
                    return Err(CheckError {
                        location: here,
                        kind: CheckErrorKind::DuplicateName {
                            name: self.tm.get(name.name).to_string(),
                            first,
                        },
                    });
                }
                match decl {
                    Decl::Func(func) if func.receiver.is_some() => {
                        self.table.methods.insert(FuncKey::of(func), here);
                    }
                    Decl::Const(c) => {
                        self.pending.insert(name.name, (&file.source, c));
                        self.table.globals.insert(name.name, here);
                    }
                    Decl::Struct(_) => {
                        self.struct_names.insert(name.name);
                        self.table.globals.insert(name.name, here);
                    }
                    Decl::Func(_) => {
                        self.table.globals.insert(name.name, here);
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolves constants, struct fields and signatures in program order.
    /// Constants referenced before their declaration are resolved on demand.
    fn resolve(&mut self, files: &'a [File<Untyped>]) -> Result<()> {
        for file in files {
            let source = &file.source;
            for decl in &file.decls {
                match decl {
                    Decl::Const(c) => {
                        if self.pending.contains_key(&c.name.name) {
                            self.constant(source, c)?;
                        }
                    }
                    Decl::Struct(s) => {
                        let symbol = self.structure(source, s)?;
                        self.table.structs.insert(s.name.name, symbol);
                    }
                    Decl::Func(func) => {
                        let symbol = self.signature(source, func)?;
                        self.table.funcs.insert(FuncKey::of(func), symbol);
                    }
                }
            }
        }
        Ok(())
    }

    fn constant(&mut self, source: &SourceFile, decl: &Const<Untyped>) -> Result<i128> {
        let name = decl.name.name;
        self.resolving.insert(name);
        let value = fold(self, source, &decl.value)?;
        let ty = match &decl.ty {
            None => Type::Ideal,
            Some(ty_expr) => {
                let ty = resolve_type(self, source, ty_expr)?;
                let Some(range) = ty.int_kind().and(ty.value_range()) else {
                    return Err(error(
                        source,
                        ty_expr.span,
                        CheckErrorKind::TypeMismatch {
                            expected: "integer type".to_string(),
                            found: show(self.tm, &ty),
                        },
                    ));
                };
                if !range.contains(value) {
                    return Err(error(
                        source,
                        decl.value.span,
                        CheckErrorKind::PossibleOverflow {
                            expr: show(self.tm, &decl.value),
                            bound: Interval::singleton(value),
                            ty: show(self.tm, &ty),
                            range,
                        },
                    ));
                }
                ty
            }
        };
        self.resolving.remove(&name);
        self.pending.remove(&name);
        self.table.consts.insert(name, ConstSymbol { ty, value });
        Ok(value)
    }

    fn structure(&mut self, source: &SourceFile, decl: &Struct) -> Result<StructSymbol> {
        let mut fields: Vec<(Id, Type)> = Vec::with_capacity(decl.fields.len());
        for (idx, field) in decl.fields.iter().enumerate() {
            if let Some(first) = decl.fields[..idx]
                .iter()
                .find(|other| other.name.name == field.name.name)
            {
                return Err(error(
                    source,
                    field.name.span,
                    CheckErrorKind::DuplicateName {
                        name: self.tm.get(field.name.name).to_string(),
                        first: source.locate(first.name.span.lo),
                    },
                ));
            }
            fields.push((field.name.name, resolve_type(self, source, &field.ty)?));
        }
        Ok(StructSymbol { fields })
    }

    fn signature(&mut self, source: &SourceFile, func: &Func<Untyped>) -> Result<FuncSymbol> {
        if let Some(receiver) = &func.receiver {
            if !self.struct_names.contains(&receiver.name) {
                return Err(not_a(&*self, source, receiver, "struct"));
            }
        }

        let mut params: Vec<(Id, Type)> = Vec::with_capacity(func.params.len());
        for (idx, param) in func.params.iter().enumerate() {
            let name = param.name.name;
            let first = match func.params[..idx].iter().find(|other| other.name.name == name) {
                Some(other) => Some(source.locate(other.name.span.lo)),
                None => self.table.globals.get(&name).cloned(),
            };
            if let Some(first) = first {
                return Err(error(
                    source,
                    param.name.span,
                    CheckErrorKind::DuplicateName {
                        name: self.tm.get(name).to_string(),
                        first,
                    },
                ));
            }
            params.push((name, resolve_type(self, source, &param.ty)?));
        }

        let ret = match &func.ret {
            Some(ty) => resolve_type(self, source, ty)?,
            None => Type::Void,
        };
        let effectful =
            func.receiver.is_some() || params.iter().any(|(_, ty)| matches!(ty, Type::Ptr(_)));
        Ok(FuncSymbol {
            params,
            ret,
            pre: Vec::new(),
            post: Vec::new(),
            effectful,
        })
    }
}

impl Globals for Resolver<'_> {
    fn tm(&self) -> &TokenMap {
        self.tm
    }

    fn is_struct(&self, name: Id) -> bool {
        self.struct_names.contains(&name)
    }

    fn is_global(&self, name: Id) -> bool {
        self.table.globals.contains_key(&name)
    }

    fn const_value(&mut self, ident: &Ident, source: &SourceFile) -> Result<i128> {
        if let Some(symbol) = self.table.consts.get(&ident.name) {
            return Ok(symbol.value);
        }
        if self.resolving.contains(&ident.name) {
            return Err(error(
                source,
                ident.span,
                CheckErrorKind::CyclicConstant {
                    name: self.tm.get(ident.name).to_string(),
                },
            ));
        }
        match self.pending.get(&ident.name).copied() {
            Some((decl_source, decl)) => self.constant(decl_source, decl),
            None => Err(not_a(&*self, source, ident, "constant")),
        }
    }
}

/// The resolved table, seen from function bodies.
pub(super) struct Frozen<'a> {
    pub tm: &'a TokenMap,
    pub symbols: &'a SymbolTable,
}

impl Globals for Frozen<'_> {
    fn tm(&self) -> &TokenMap {
        self.tm
    }

    fn is_struct(&self, name: Id) -> bool {
        self.symbols.structs.contains_key(&name)
    }

    fn is_global(&self, name: Id) -> bool {
        self.symbols.globals.contains_key(&name)
    }

    fn const_value(&mut self, ident: &Ident, source: &SourceFile) -> Result<i128> {
        match self.symbols.consts.get(&ident.name) {
            Some(symbol) => Ok(symbol.value),
            None => Err(not_a(&*self, source, ident, "constant")),
        }
    }
}

pub(super) fn resolve_type(
    g: &mut impl Globals,
    source: &SourceFile,
    ty: &TypeExpr,
) -> Result<Type> {
    match &ty.kind {
        TypeExprKind::Named(name) => {
            if let Some(kind) = IntKind::from_name(name.name) {
                Ok(Type::int(kind))
            } else if name.name == well_known::BOOL {
                Ok(Type::Bool)
            } else if g.is_struct(name.name) {
                Ok(Type::Struct(name.name))
            } else {
                Err(not_a(&*g, source, name, "type"))
            }
        }
        TypeExprKind::Refined { base, lo, hi } => {
            let Some(kind) = IntKind::from_name(base.name) else {
                return Err(not_a(&*g, source, base, "integer type"));
            };
            let full = kind.range();
            let mut bound = |expr: &Option<Box<Expr<Untyped>>>, default: i128| -> Result<i128> {
                let Some(expr) = expr else {
                    return Ok(default);
                };
                let value = fold(g, source, expr)?;
                if full.contains(value) {
                    Ok(value)
                } else {
                    Err(error(
                        source,
                        expr.span,
                        CheckErrorKind::PossibleOverflow {
                            expr: show(g.tm(), &**expr),
                            bound: Interval::singleton(value),
                            ty: kind.name().to_string(),
                            range: full,
                        },
                    ))
                }
            };
            let lo = bound(lo, full.lo())?;
            let hi = bound(hi, full.hi())?;
            if lo > hi {
                return Err(error(
                    source,
                    ty.span,
                    CheckErrorKind::TypeMismatch {
                        expected: "non-empty range".to_string(),
                        found: format!("{lo}..{hi}"),
                    },
                ));
            }
            Ok(Type::Int {
                kind,
                range: Interval::new(lo, hi),
            })
        }
        TypeExprKind::Array { len, elem } => {
            let value = fold(g, source, len)?;
            let Ok(n) = u64::try_from(value) else {
                return Err(error(
                    source,
                    len.span,
                    CheckErrorKind::PossibleOverflow {
                        expr: show(g.tm(), &**len),
                        bound: Interval::singleton(value),
                        ty: IntKind::U64.name().to_string(),
                        range: IntKind::U64.range(),
                    },
                ));
            };
            Ok(Type::Array {
                len: n,
                elem: Box::new(resolve_type(g, source, elem)?),
            })
        }
        TypeExprKind::Slice(elem) => Ok(Type::Slice(Box::new(resolve_type(g, source, elem)?))),
        TypeExprKind::Ptr(inner) => Ok(Type::Ptr(Box::new(resolve_type(g, source, inner)?))),
    }
}

/// Evaluates a constant expression exactly.
pub(super) fn fold(
    g: &mut impl Globals,
    source: &SourceFile,
    expr: &Expr<Untyped>,
) -> Result<i128> {
    use BinaryOperator::*;
    match &expr.kind {
        ExprKind::Int(value) => Ok(i128::from(*value)),
        ExprKind::Id(ident) => g.const_value(ident, source),
        ExprKind::Paren(inner) => fold(g, source, inner),
        ExprKind::Unary {
            op: UnaryOperator::Neg,
            expr: inner,
        } => {
            let value = fold(g, source, inner)?;
            value
                .checked_neg()
                .ok_or_else(|| too_large(&*g, source, expr))
        }
        ExprKind::Binary {
            op: op @ (Add | Sub | Mul | Div | Rem | Shl | Shr | BitAnd | BitOr | BitXor),
            lhs,
            rhs,
        } => {
            let a = fold(g, source, lhs)?;
            let b = fold(g, source, rhs)?;
            if matches!(op, Div | Rem) && b == 0 {
                return Err(error(
                    source,
                    rhs.span,
                    CheckErrorKind::PossibleDivisionByZero {
                        expr: show(g.tm(), expr),
                        bound: Interval::singleton(0),
                    },
                ));
            }
            fold_binary(*op, a, b).ok_or_else(|| too_large(&*g, source, expr))
        }
        ExprKind::As { expr: inner, ty } => {
            let value = fold(g, source, inner)?;
            let target = resolve_type(g, source, ty)?;
            let Some(range) = target.int_kind().and(target.value_range()) else {
                return Err(error(
                    source,
                    ty.span,
                    CheckErrorKind::TypeMismatch {
                        expected: "integer type".to_string(),
                        found: show(g.tm(), &target),
                    },
                ));
            };
            if !range.contains(value) {
                return Err(error(
                    source,
                    expr.span,
                    CheckErrorKind::PossibleOverflow {
                        expr: show(g.tm(), expr),
                        bound: Interval::singleton(value),
                        ty: show(g.tm(), &target),
                        range,
                    },
                ));
            }
            Ok(value)
        }
        _ => Err(error(
            source,
            expr.span,
            CheckErrorKind::TypeMismatch {
                expected: "constant expression".to_string(),
                found: show(g.tm(), expr),
            },
        )),
    }
}

/// Exact evaluation of a binary operator over literals. Booleans are 0 and 1.
/// `None` when the result is not an integer (a zero divisor, an oversized
/// shift, `i128` overflow) or depends on a width (wrapping operators).
pub(super) fn fold_binary(op: BinaryOperator, a: i128, b: i128) -> Option<i128> {
    use BinaryOperator::*;
    match op {
        Add => a.checked_add(b),
        Sub => a.checked_sub(b),
        Mul => a.checked_mul(b),
        Div => a.checked_div(b),
        Rem => a.checked_rem(b),
        Shl if (0..127).contains(&b) => a.checked_mul(1 << b),
        Shr if (0..128).contains(&b) => Some(a >> b),
        Shl | Shr => None,
        BitAnd => Some(a & b),
        BitOr => Some(a | b),
        BitXor => Some(a ^ b),
        WrappingAdd | WrappingSub => None,
        Eq => Some(i128::from(a == b)),
        Ne => Some(i128::from(a != b)),
        Lt => Some(i128::from(a < b)),
        Le => Some(i128::from(a <= b)),
        Gt => Some(i128::from(a > b)),
        Ge => Some(i128::from(a >= b)),
        And => Some(i128::from(a != 0 && b != 0)),
        Or => Some(i128::from(a != 0 || b != 0)),
    }
}

fn error(source: &SourceFile, span: Span, kind: CheckErrorKind) -> CheckError {
    CheckError {
        location: source.locate(span.lo),
        kind,
    }
}

fn show(tm: &TokenMap, value: &impl Show) -> String {
    value.display(&Context { tm }).to_string()
}

/// `ident` names something other than what is `expected`, or nothing.
fn not_a(g: &impl Globals, source: &SourceFile, ident: &Ident, expected: &str) -> CheckError {
    let name = g.tm().get(ident.name).to_string();
    let kind = if g.is_global(ident.name) {
        CheckErrorKind::TypeMismatch {
            expected: expected.to_string(),
            found: name,
        }
    } else {
        CheckErrorKind::UnresolvedName { name }
    };
    error(source, ident.span, kind)
}

fn too_large(g: &impl Globals, source: &SourceFile, expr: &Expr<Untyped>) -> CheckError {
    error(
        source,
        expr.span,
        CheckErrorKind::PossibleOverflow {
            expr: show(g.tm(), expr),
            bound: Interval::FULL,
            ty: "integer constant".to_string(),
            range: Interval::FULL,
        },
    )
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::util::test_utils::{accept, reject};

    #[test]
    fn fold_binary_is_exact() {
        use BinaryOperator::*;
        assert_eq!(fold_binary(Add, 250, 10), Some(260));
        assert_eq!(fold_binary(Div, -7, 2), Some(-3));
        assert_eq!(fold_binary(Rem, -7, 2), Some(-1));
        assert_eq!(fold_binary(Div, 1, 0), None);
        assert_eq!(fold_binary(Shl, 1, 64), Some(1 << 64));
        assert_eq!(fold_binary(Shl, 1, 200), None);
        assert_eq!(fold_binary(WrappingAdd, 255, 1), None);
        assert_eq!(fold_binary(Lt, 1, 2), Some(1));
        assert_eq!(fold_binary(Or, 0, 0), Some(0));
    }

    #[test]
    fn constants_resolve_out_of_order() {
        let program = accept(indoc! {"
            const TOTAL: u16 = HEADER + BODY * 2;
            const BODY = 1 << 4;
            const HEADER = 8;
        "});
        let values: Vec<i128> = program.symbols.consts.values().map(|c| c.value).collect();
        assert!(values.contains(&40));
        assert!(values.contains(&16));
        assert!(values.contains(&8));
    }

    #[test]
    fn cyclic_constants() {
        let (kind, at) = reject(indoc! {"
            const A = B + 1;
            const B = A;
        "});
        assert_eq!(kind, CheckErrorKind::CyclicConstant { name: "A".to_string() });
        assert_eq!(at, (2, 11));
    }

    #[test]
    fn builtin_types_cannot_be_redeclared() {
        let (kind, at) = reject("struct u8(x: u16);");
        let CheckErrorKind::DuplicateName { name, first } = kind else {
            panic!("unexpected {kind:?}");
        };
        assert_eq!(name, "u8");
        assert_eq!(&*first.file, "<builtin>");
        assert_eq!(at, (1, 8));
    }

    #[test]
    fn methods_are_keyed_by_receiver() {
        accept(indoc! {"
            struct a(x: u8);
            struct b(x: u8);
            func a.get() -> u8 { return this.x; };
            func b.get() -> u8 { return this.x; };
            func get() -> u8 { return 0; };
        "});
        let (kind, at) = reject(indoc! {"
            struct a(x: u8);
            func a.get() -> u8 { return this.x; };
            func a.get() -> u8 { return 1; };
        "});
        assert!(matches!(kind, CheckErrorKind::DuplicateName { .. }));
        assert_eq!(at, (3, 8));
    }

    #[test]
    fn refinements_and_lengths() {
        let (kind, _) = reject("struct s(x: u8[0..300]);");
        assert!(matches!(kind, CheckErrorKind::PossibleOverflow { .. }));
        let (kind, _) = reject("struct s(x: u8[9..3]);");
        assert_eq!(
            kind,
            CheckErrorKind::TypeMismatch {
                expected: "non-empty range".to_string(),
                found: "9..3".to_string(),
            }
        );
        let (kind, _) = reject("struct s(x: [0 - 1]u8);");
        assert!(matches!(kind, CheckErrorKind::PossibleOverflow { .. }));
        let (kind, _) = reject("struct s(x: nothing);");
        assert_eq!(kind, CheckErrorKind::UnresolvedName { name: "nothing".to_string() });
    }

    #[test]
    fn duplicate_fields_and_params() {
        let (kind, at) = reject("struct s(x: u8, x: u16);");
        assert!(matches!(kind, CheckErrorKind::DuplicateName { .. }));
        assert_eq!(at, (1, 17));
        let (kind, _) = reject("const n = 1; func f(n: u8) {};");
        assert!(matches!(kind, CheckErrorKind::DuplicateName { .. }));
    }
}
